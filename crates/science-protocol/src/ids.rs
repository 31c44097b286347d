//! 仲裁 ID 定义
//!
//! 命令帧使用 11 位标准 ID：
//!
//! ```text
//!  bit 10   | bits 9-6 | bits 5-0
//!  marker=1 | group    | serial
//! ```

use crate::EncodingError;
use bilge::prelude::*;

/// 电机控制分组
pub const MOTOR_GROUP: u8 = 0x4;

/// 科学载荷分组
pub const SCIENCE_GROUP: u8 = 0x7;

/// 分组最大值（4 位）
pub const GROUP_MAX: u8 = 0b1111;

/// 序列号最大值（6 位）
pub const SERIAL_MAX: u8 = 0b11_1111;

/// 标准帧 ID 最大值（11 位）
pub const STANDARD_ID_MAX: u16 = 0x7FF;

/// 命令帧仲裁 ID 位域（11 位）
///
/// bilge 按低位在前排列字段：
/// - Bit 0-5: 执行器序列号
/// - Bit 6-9: 接收子系统分组
/// - Bit 10: 命令帧族标记（固定为 1）
#[bitsize(11)]
#[derive(FromBits, DebugBits, Clone, Copy, PartialEq)]
pub struct ArbitrationId {
    pub serial: u6,
    pub group: u4,
    pub command_frame: bool,
}

impl ArbitrationId {
    /// 原始 11 位 ID
    pub fn raw(self) -> u16 {
        u11::from(self).value()
    }
}

/// 构建命令帧仲裁 ID：`(1 << 10) | (group << 6) | serial`
pub fn build_arbitration_id(group: u8, serial: u8) -> Result<ArbitrationId, EncodingError> {
    if group > GROUP_MAX {
        return Err(EncodingError::GroupOutOfRange(group));
    }
    if serial > SERIAL_MAX {
        return Err(EncodingError::SerialOutOfRange(serial));
    }

    Ok(ArbitrationId::new(u6::new(serial), u4::new(group), true))
}

/// 解析原始 ID，返回 `(group, serial)`
///
/// 超过 11 位或未设置命令帧标记时返回 `None`。
pub fn decode_arbitration_id(raw: u16) -> Option<(u8, u8)> {
    if raw > STANDARD_ID_MAX {
        return None;
    }
    let id = ArbitrationId::from(u11::new(raw));
    if !id.command_frame() {
        return None;
    }
    Some((id.group().value(), id.serial().value()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_ids() {
        // 钻臂 / 钻头 / 转盘（已部署的配置）
        assert_eq!(build_arbitration_id(MOTOR_GROUP, 0xC).unwrap().raw(), 0x50C);
        assert_eq!(build_arbitration_id(MOTOR_GROUP, 0xD).unwrap().raw(), 0x50D);
        assert_eq!(build_arbitration_id(SCIENCE_GROUP, 0x1).unwrap().raw(), 0x5C1);
    }

    #[test]
    fn test_extremes() {
        assert_eq!(build_arbitration_id(0, 0).unwrap().raw(), 0x400);
        assert_eq!(build_arbitration_id(15, 63).unwrap().raw(), STANDARD_ID_MAX);
    }

    #[test]
    fn test_rejects_wide_fields() {
        assert_eq!(
            build_arbitration_id(16, 0),
            Err(EncodingError::GroupOutOfRange(16))
        );
        assert_eq!(
            build_arbitration_id(0, 64),
            Err(EncodingError::SerialOutOfRange(64))
        );
    }

    #[test]
    fn test_decode_rejects_foreign_ids() {
        assert_eq!(decode_arbitration_id(0x0C), None);
        assert_eq!(decode_arbitration_id(0x800), None);
        assert_eq!(decode_arbitration_id(0x5C1), Some((SCIENCE_GROUP, 1)));
    }

    proptest! {
        #[test]
        fn prop_id_layout(group in 0u8..=15, serial in 0u8..=63) {
            let raw = build_arbitration_id(group, serial).unwrap().raw();
            prop_assert!(raw < 2048);
            prop_assert_eq!(raw & (1 << 10), 1 << 10);
            prop_assert_eq!(((raw >> 6) & 0xF) as u8, group);
            prop_assert_eq!((raw & 0x3F) as u8, serial);
            prop_assert_eq!(decode_arbitration_id(raw), Some((group, serial)));
        }
    }
}
