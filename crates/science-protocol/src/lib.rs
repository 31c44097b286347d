//! # Science Protocol
//!
//! 科学载荷子系统的 CAN 总线协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: 仲裁 ID 位域与分组常量
//! - `constants`: 协议常量与转盘槽位类型
//! - `control`: 控制帧构建（PWM、转盘移动、模式选择）
//!
//! ## 字节序
//!
//! PWM 功率值使用高位在前（大端字节序）。

pub mod constants;
pub mod control;
pub mod ids;

pub use constants::*;
pub use control::*;
pub use ids::*;

use std::fmt;
use thiserror::Error;

/// CAN 2.0 标准帧的统一抽象
///
/// `ScienceFrame` 是协议层和硬件层之间的中间抽象：协议层只负责构建，
/// 具体的 SocketCAN / 诊断适配器负责把它转换成各自的帧类型。
///
/// - **Copy**：帧很小，周期重发线程直接持有一份拷贝
/// - **固定 8 字节**：避免堆分配
///
/// ```rust
/// use science_protocol::ScienceFrame;
///
/// let frame = ScienceFrame::new_standard(0x50D, &[0x3, 0x7F, 0xFF]);
/// assert_eq!(frame.id(), 0x50D);
/// assert_eq!(frame.data_slice(), &[0x3, 0x7F, 0xFF]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScienceFrame {
    /// CAN ID（标准帧 11 位）
    pub id: u32,

    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],

    /// 有效数据长度 (0-8)
    pub len: u8,

    /// 是否为扩展帧（本协议始终为 false）
    pub is_extended: bool,
}

impl ScienceFrame {
    /// 创建标准帧
    pub fn new_standard(id: u16, data: &[u8]) -> Self {
        let mut fixed_data = [0u8; 8];
        let len = data.len().min(8);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id: id as u32,
            data: fixed_data,
            len: len as u8,
            is_extended: false,
        }
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 获取 CAN ID
    pub fn id(&self) -> u32 {
        self.id
    }

    /// 数据长度码
    pub fn dlc(&self) -> u8 {
        self.len
    }
}

impl fmt::Display for ScienceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id=0x{:03X} dlc={} data={:02X?}",
            self.id,
            self.len,
            self.data_slice()
        )
    }
}

/// 编码错误：协议字段超出其位宽或取值范围
///
/// 在配置经过校验的前提下不应出现；出现时只影响触发它的那条命令。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodingError {
    #[error("Group {0} does not fit in 4 bits")]
    GroupOutOfRange(u8),

    #[error("Serial {0} does not fit in 6 bits")]
    SerialOutOfRange(u8),

    #[error("Power {0} is outside [-1.0, 1.0]")]
    PowerOutOfRange(f64),

    #[error("Slot {0} does not fit in one byte")]
    SlotOutOfRange(u32),
}
