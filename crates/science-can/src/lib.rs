//! # Science CAN Adapter Layer
//!
//! CAN 硬件抽象层：
//! - [`CanAdapter`]：单帧发送（SocketCAN / 诊断日志适配器）
//! - [`CanBus`]：在适配器之上提供一次性发送与周期重发
//!
//! 周期重发运行在独立线程上，但任务的启动与停止只由控制线程执行。

use std::time::Duration;
use thiserror::Error;

pub use science_protocol::ScienceFrame;

pub mod bus;
pub mod logging;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(target_os = "linux")]
pub mod socketcan;

pub use bus::{CanBus, CyclicSendTask, CyclicTask, SharedBus};
pub use logging::LoggingAdapter;

#[cfg(target_os = "linux")]
pub use self::socketcan::SocketCanAdapter;

/// CAN 适配层统一错误类型
#[derive(Error, Debug)]
pub enum CanError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] CanDeviceError),
    #[error("Write timeout")]
    Timeout,
    #[error("Bus busy: lock not acquired within {0:?}")]
    Busy(Duration),
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanDeviceErrorKind {
    Unknown,
    NotFound,
    NotUp,
    AccessDenied,
    InvalidFrame,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct CanDeviceError {
    pub kind: CanDeviceErrorKind,
    pub message: String,
}

impl CanDeviceError {
    pub fn new(kind: CanDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// 单帧发送适配器
pub trait CanAdapter {
    fn send(&mut self, frame: ScienceFrame) -> Result<(), CanError>;

    /// 带超时的发送，默认实现忽略超时
    fn send_timeout(&mut self, frame: ScienceFrame, _timeout: Duration) -> Result<(), CanError> {
        self.send(frame)
    }
}

impl<A: CanAdapter + ?Sized> CanAdapter for Box<A> {
    fn send(&mut self, frame: ScienceFrame) -> Result<(), CanError> {
        (**self).send(frame)
    }

    fn send_timeout(&mut self, frame: ScienceFrame, timeout: Duration) -> Result<(), CanError> {
        (**self).send_timeout(frame, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_error_display() {
        let err = CanError::Device(CanDeviceError::new(CanDeviceErrorKind::NotUp, "can0"));
        assert_eq!(err.to_string(), "Device Error: NotUp: can0");

        let err = CanError::Busy(Duration::from_millis(20));
        assert!(err.to_string().contains("20ms"), "{}", err);
    }

    #[test]
    fn test_boxed_adapter_forwards() {
        let mut adapter: Box<dyn CanAdapter> = Box::new(LoggingAdapter::new());
        let frame = ScienceFrame::new_standard(0x50C, &[0x0, 0x0]);
        assert!(adapter.send(frame).is_ok());
        assert!(adapter.send_timeout(frame, Duration::from_millis(5)).is_ok());
    }
}
