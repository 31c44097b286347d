//! 启动标定：操作员输入第一个杯子当前所在的槽位
//!
//! 输入错误只导致重新提示，不会终止进程。等待输入期间收到中断时放弃标定。

use crate::session::SessionEvent;
use crossbeam_channel::{Receiver, bounded, select};
use science_protocol::{CupSlot, N_SLOTS};
use std::io::{self, BufRead, Write};
use std::thread;
use thiserror::Error;
use tracing::debug;

/// 提示语
pub const CALIBRATION_PROMPT: &str = "What is the position of the first cup?";

/// 标定输入错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("Invalid input '{0}'! Try again.")]
    NotAnInteger(String),

    #[error("Valid slots are in between 0 and {max}. Try again.", max = .slots - 1)]
    OutOfRange { value: i64, slots: u8 },
}

/// 解析标定输入
pub fn parse_calibration(input: &str) -> Result<CupSlot, CalibrationError> {
    let trimmed = input.trim();
    let value: i64 = trimmed
        .parse()
        .map_err(|_| CalibrationError::NotAnInteger(trimmed.to_string()))?;

    u8::try_from(value)
        .ok()
        .and_then(CupSlot::new)
        .ok_or(CalibrationError::OutOfRange {
            value,
            slots: N_SLOTS,
        })
}

/// 在后台线程上逐行读取输入
///
/// 输入结束、读取失败或接收端被丢弃时线程退出，通道随之关闭。
pub fn spawn_line_reader<R>(mut input: R) -> io::Result<Receiver<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = bounded(0);

    thread::Builder::new()
        .name("science-calibration-input".into())
        .spawn(move || {
            let mut line = String::new();
            loop {
                line.clear();
                match input.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(line.clone()).is_err() {
                            break;
                        }
                    },
                    Err(e) => {
                        debug!("Calibration input closed: {}", e);
                        break;
                    },
                }
            }
        })?;

    Ok(rx)
}

/// 提示并等待合法槽位
///
/// 输入结束（EOF）或收到 [`SessionEvent::Interrupt`] 时返回 `Ok(None)`。
pub fn prompt_calibration<W: Write>(
    lines: &Receiver<String>,
    events: &Receiver<SessionEvent>,
    mut output: W,
) -> io::Result<Option<CupSlot>> {
    loop {
        write!(output, "{} ", CALIBRATION_PROMPT)?;
        output.flush()?;

        let line = loop {
            select! {
                recv(lines) -> line => match line {
                    Ok(line) => break line,
                    Err(_) => return Ok(None),
                },
                recv(events) -> event => match event {
                    Ok(SessionEvent::Interrupt) | Err(_) => {
                        writeln!(output)?;
                        return Ok(None);
                    },
                    // 标定阶段没有按键源
                    Ok(SessionEvent::Key(_)) => {},
                },
            }
        };

        match parse_calibration(&line) {
            Ok(slot) => return Ok(Some(slot)),
            Err(e) => writeln!(output, "{}", e)?,
        }
    }
}
