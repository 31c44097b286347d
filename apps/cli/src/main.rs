//! # Science Teleop
//!
//! 科学载荷键盘遥操作：钻臂（↑/↓）、钻头（W/S）、样品转盘（←/→）。
//!
//! ```bash
//! # 在 can0 上运行（默认 mode-select 接线）
//! science-teleop
//!
//! # 无硬件调试：只打印将要发送的帧
//! science-teleop --nocan --debug
//!
//! # 旧接线 + 自定义配置
//! science-teleop --variant neutral --config science.toml --interface can1
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use crossbeam_channel::{Receiver, unbounded};
use science_can::{CanAdapter, CanError, LoggingAdapter, SharedBus};
use science_control::{
    CALIBRATION_PROMPT, Session, SessionEvent, parse_calibration, prompt_calibration,
    spawn_line_reader,
};
use science_driver::{DeploymentConfig, Variant};
use science_protocol::CupSlot;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

mod keyboard;
mod logging;

use keyboard::KeyboardSource;

/// 接线预设
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum VariantArg {
    ModeSelect,
    Neutral,
}

impl From<VariantArg> for Variant {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::ModeSelect => Variant::ModeSelect,
            VariantArg::Neutral => Variant::Neutral,
        }
    }
}

/// Science Teleop - 科学载荷键盘遥操作
#[derive(Parser, Debug)]
#[command(name = "science-teleop")]
#[command(about = "Keyboard teleoperation of the rover science subsystem", long_about = None)]
#[command(version)]
struct Args {
    /// 不打开 CAN 总线，只记录将要发送的帧
    #[arg(long)]
    nocan: bool,

    /// 详细日志（包括每个按键事件）
    #[arg(long)]
    debug: bool,

    /// 接线预设
    #[arg(long, value_enum, default_value_t = VariantArg::ModeSelect)]
    variant: VariantArg,

    /// TOML 配置文件（覆盖预设）
    #[arg(long)]
    config: Option<PathBuf>,

    /// CAN 接口名（覆盖配置）
    #[arg(long)]
    interface: Option<String>,

    /// 自动重复间隔（毫秒，覆盖配置），用于过滤重复和推断松开
    #[arg(long)]
    repeat_delay_ms: Option<u64>,

    /// 按下到第一次自动重复的最长等待（毫秒，覆盖配置）
    #[arg(long)]
    first_repeat_ms: Option<u64>,
}

impl Args {
    fn deployment_config(&self) -> Result<DeploymentConfig> {
        let mut config = match &self.config {
            Some(path) => DeploymentConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => {
                if self.variant == VariantArg::Neutral {
                    warn!("Neutral preset serials are unconfirmed; pass --config for real hardware");
                }
                DeploymentConfig::preset(self.variant.into())
            },
        };
        if let Some(interface) = &self.interface {
            config.interface = interface.clone();
        }
        if let Some(delay) = self.repeat_delay_ms {
            config.repeat_delay_ms = delay;
        }
        if let Some(grace) = self.first_repeat_ms {
            config.first_repeat_grace_ms = grace;
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

/// 读取第一个杯子的位置；操作员取消或中断时返回 `None`
fn calibrate(events: &Receiver<SessionEvent>) -> Result<Option<CupSlot>> {
    if !io::stdin().is_terminal() {
        let lines = spawn_line_reader(io::BufReader::new(io::stdin()))?;
        return Ok(prompt_calibration(&lines, events, io::stderr())?);
    }

    loop {
        let answer = match inquire::Text::new(CALIBRATION_PROMPT).prompt() {
            Ok(answer) => answer,
            Err(
                inquire::InquireError::OperationCanceled
                | inquire::InquireError::OperationInterrupted,
            ) => return Ok(None),
            Err(e) => return Err(anyhow::anyhow!("Calibration prompt failed: {}", e)),
        };

        match parse_calibration(&answer) {
            Ok(slot) => return Ok(Some(slot)),
            Err(e) => eprintln!("{}", e),
        }
    }
}

fn open_adapter(
    nocan: bool,
    config: &DeploymentConfig,
) -> Result<Box<dyn CanAdapter + Send>, CanError> {
    if nocan {
        info!("Running without CAN; frames are only logged");
        return Ok(Box::new(LoggingAdapter::new()));
    }

    #[cfg(target_os = "linux")]
    {
        let adapter = science_can::SocketCanAdapter::new(config.interface.as_str())?;
        info!("Opened CAN interface {}", config.interface);
        Ok(Box::new(adapter))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(CanError::Device(science_can::CanDeviceError::new(
            science_can::CanDeviceErrorKind::Backend,
            format!("SocketCAN is not available on this platform ({})", config.interface),
        )))
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let config = args.deployment_config()?;

    let (tx, rx) = unbounded();

    let interrupt_tx = tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(SessionEvent::Interrupt);
    }) {
        warn!("Failed to install signal handler: {}", e);
    }

    let mut session = Session::new(config.clone());
    match calibrate(&rx)? {
        Some(slot) => session.set_calibration(slot),
        None => {
            info!("Calibration cancelled");
            return Ok(ExitCode::SUCCESS);
        },
    }

    let adapter = match open_adapter(args.nocan, &config) {
        Ok(adapter) => adapter,
        Err(e) => {
            error!("Failed to open CAN bus on {}: {}", config.interface, e);
            return Ok(ExitCode::FAILURE);
        },
    };
    let bus = SharedBus::new(adapter, config.send_timeout());

    session.start(bus)?;

    let mut keyboard =
        KeyboardSource::spawn(tx, config.first_repeat_grace(), config.repeat_delay())
            .context("Failed to read keyboard")?;
    info!("Controls: ↑/↓ drill arm, W/S drill, ←/→ carousel, Ctrl+C quit");

    let result = session.run(&rx);

    keyboard.stop();
    let stopped = session.shutdown();
    info!("Stopped {} periodic sender(s)", stopped);

    let reason = result?;
    info!("Exiting ({:?})", reason);
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.debug);

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        },
    }
}
