//! 驱动层错误类型定义

use crate::config::ConfigError;
use science_can::CanError;
use science_protocol::EncodingError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 协议编码错误（配置已校验时不应出现）
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// CAN 发送失败
    #[error("CAN driver error: {0}")]
    Can(#[from] CanError),

    /// 部署配置错误
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
