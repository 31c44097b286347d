//! 控制帧构建
//!
//! 所有函数都是纯函数：相同输入总是得到相同的字节序列。

use crate::constants::PWM_FULL_SCALE;
use crate::ids::build_arbitration_id;
use crate::{EncodingError, ScienceFrame};
use num_enum::{IntoPrimitive, TryFromPrimitive};

// ============================================================================
// 命令类型标签
// ============================================================================

/// 负载首字节：命令类型
///
/// 取值与接收端固件约定一致，不要重新编号。
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CommandTag {
    /// 选择电机驱动模式
    SetMode = 0x0,
    /// 设置 PWM 功率
    SetPwm = 0x3,
    /// 转盘移动到指定槽位
    MoveToSlot = 0xC,
}

/// 电机驱动模式（`SetMode` 的第二个字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MotorMode {
    Pwm = 0x0,
}

// ============================================================================
// 负载构建
// ============================================================================

/// 功率量化：`round((2^15 - 1) * power)`，平局取偶
///
/// 非有限值或 `|power| > 1.0` 返回 `EncodingError::PowerOutOfRange`。
pub fn quantize_power(power: f64) -> Result<i16, EncodingError> {
    if !power.is_finite() || power.abs() > 1.0 {
        return Err(EncodingError::PowerOutOfRange(power));
    }
    Ok((PWM_FULL_SCALE * power).round_ties_even() as i16)
}

/// PWM 负载：`[0x3, high, low]`
pub fn build_pwm_payload(power: f64) -> Result<[u8; 3], EncodingError> {
    let [high, low] = quantize_power(power)?.to_be_bytes();
    Ok([CommandTag::SetPwm.into(), high, low])
}

/// 转盘移动负载：`[0xC, slot]`
pub fn build_move_payload(slot: u32) -> Result<[u8; 2], EncodingError> {
    let slot = u8::try_from(slot).map_err(|_| EncodingError::SlotOutOfRange(slot))?;
    Ok([CommandTag::MoveToSlot.into(), slot])
}

/// 模式选择负载：`[0x0, mode]`
pub fn build_mode_payload(mode: MotorMode) -> [u8; 2] {
    [CommandTag::SetMode.into(), mode.into()]
}

/// 从 PWM 负载中还原归一化功率（测试与诊断日志使用）
pub fn decode_pwm_payload(data: &[u8]) -> Option<f64> {
    match data {
        [tag, high, low] if *tag == u8::from(CommandTag::SetPwm) => {
            Some(i16::from_be_bytes([*high, *low]) as f64 / PWM_FULL_SCALE)
        },
        _ => None,
    }
}

// ============================================================================
// 帧构建
// ============================================================================

fn frame(group: u8, serial: u8, data: &[u8]) -> Result<ScienceFrame, EncodingError> {
    let id = build_arbitration_id(group, serial)?;
    Ok(ScienceFrame::new_standard(id.raw(), data))
}

/// PWM 功率帧
pub fn pwm_frame(group: u8, serial: u8, power: f64) -> Result<ScienceFrame, EncodingError> {
    frame(group, serial, &build_pwm_payload(power)?)
}

/// 转盘移动帧
pub fn move_frame(group: u8, serial: u8, slot: u32) -> Result<ScienceFrame, EncodingError> {
    frame(group, serial, &build_move_payload(slot)?)
}

/// 模式选择帧
pub fn mode_frame(group: u8, serial: u8, mode: MotorMode) -> Result<ScienceFrame, EncodingError> {
    frame(group, serial, &build_mode_payload(mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::MOTOR_GROUP;
    use proptest::prelude::*;

    #[test]
    fn test_pwm_payload_known_values() {
        assert_eq!(build_pwm_payload(1.0).unwrap(), [0x3, 0x7F, 0xFF]);
        assert_eq!(build_pwm_payload(-1.0).unwrap(), [0x3, 0x80, 0x01]);
        assert_eq!(build_pwm_payload(0.0).unwrap(), [0x3, 0x00, 0x00]);
        // 32767 * 0.5 = 16383.5，平局取偶 -> 16384
        assert_eq!(build_pwm_payload(0.5).unwrap(), [0x3, 0x40, 0x00]);
        assert_eq!(build_pwm_payload(-0.5).unwrap(), [0x3, 0xC0, 0x00]);
    }

    #[test]
    fn test_pwm_payload_rejects_out_of_range() {
        assert!(matches!(
            build_pwm_payload(1.0001),
            Err(EncodingError::PowerOutOfRange(_))
        ));
        assert!(build_pwm_payload(-2.0).is_err());
        assert!(build_pwm_payload(f64::NAN).is_err());
        assert!(build_pwm_payload(f64::INFINITY).is_err());
    }

    #[test]
    fn test_move_payload() {
        assert_eq!(build_move_payload(0).unwrap(), [0xC, 0]);
        assert_eq!(build_move_payload(11).unwrap(), [0xC, 11]);
        assert_eq!(build_move_payload(255).unwrap(), [0xC, 255]);
        assert_eq!(
            build_move_payload(256),
            Err(EncodingError::SlotOutOfRange(256))
        );
    }

    #[test]
    fn test_mode_payload() {
        assert_eq!(build_mode_payload(MotorMode::Pwm), [0x0, 0x0]);
    }

    #[test]
    fn test_command_tag_roundtrip() {
        assert!(matches!(
            CommandTag::try_from(0xC),
            Ok(CommandTag::MoveToSlot)
        ));
        assert!(CommandTag::try_from(0x7).is_err());
    }

    #[test]
    fn test_pwm_frame() {
        let frame = pwm_frame(MOTOR_GROUP, 0xD, 1.0).unwrap();
        assert_eq!(frame.id(), 0x50D);
        assert!(!frame.is_extended);
        assert_eq!(frame.data_slice(), &[0x3, 0x7F, 0xFF]);
    }

    #[test]
    fn test_frame_rejects_bad_serial() {
        assert_eq!(
            pwm_frame(MOTOR_GROUP, 64, 0.0),
            Err(EncodingError::SerialOutOfRange(64))
        );
        assert_eq!(
            mode_frame(16, 1, MotorMode::Pwm),
            Err(EncodingError::GroupOutOfRange(16))
        );
    }

    #[test]
    fn test_decode_ignores_other_payloads() {
        assert_eq!(decode_pwm_payload(&[0xC, 3]), None);
        assert_eq!(decode_pwm_payload(&[0x3, 0x7F, 0xFF]), Some(1.0));
    }

    proptest! {
        #[test]
        fn prop_pwm_within_one_quantum(power in -1.0f64..=1.0) {
            let payload = build_pwm_payload(power).unwrap();
            prop_assert_eq!(payload[0], 0x3);
            let decoded = decode_pwm_payload(&payload).unwrap();
            prop_assert!((decoded - power).abs() <= 1.0 / PWM_FULL_SCALE);
        }
    }
}
