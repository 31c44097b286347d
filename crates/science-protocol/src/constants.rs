//! 协议常量

use std::fmt;

/// 转盘槽位数量
pub const N_SLOTS: u8 = 12;

/// 功率量化满量程：`2^15 - 1`
pub const PWM_FULL_SCALE: f64 = 32767.0;

/// 转盘槽位 `[0, N_SLOTS)`
///
/// 表示当前对准参考点的“第一个杯子”所在槽位，只能通过
/// [`CupSlot::next`] / [`CupSlot::prev`] 环绕移动。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CupSlot(u8);

impl CupSlot {
    /// 校验并创建槽位
    pub fn new(index: u8) -> Option<Self> {
        (index < N_SLOTS).then_some(Self(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// 顺时针一格（11 -> 0）
    pub fn next(self) -> Self {
        Self((self.0 + 1) % N_SLOTS)
    }

    /// 逆时针一格（0 -> 11）
    pub fn prev(self) -> Self {
        Self((self.0 + N_SLOTS - 1) % N_SLOTS)
    }
}

impl fmt::Display for CupSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
