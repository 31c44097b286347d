//! 诊断适配器
//!
//! 不连接任何硬件，只把“发送”的帧写入日志。用于没有 CAN 接口时的离线调试。

use crate::{CanAdapter, CanError, ScienceFrame};
use tracing::info;

/// 只记录日志的 CAN 适配器
#[derive(Debug, Default)]
pub struct LoggingAdapter {
    sent: u64,
}

impl LoggingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn sent_count(&self) -> u64 {
        self.sent
    }
}

impl CanAdapter for LoggingAdapter {
    fn send(&mut self, frame: ScienceFrame) -> Result<(), CanError> {
        self.sent += 1;
        info!(target: "science_can::nocan", "#{} {}", self.sent, frame);
        Ok(())
    }
}
