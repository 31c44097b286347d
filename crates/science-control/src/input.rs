//! 按键 -> 意图
//!
//! 纯状态机：只持有转盘槽位，每个按键事件产生零或一个意图。
//!
//! | 按键 | 按下 | 松开 |
//! |---|---|---|
//! | up / down | 钻臂 ±arm_power | 钻臂 0 |
//! | w / s | 钻头 ±drill_power | 钻头 0 |
//! | right / left | 槽位 ±1（环绕），移动转盘 | 无 |
//!
//! 系统自动重复（按住不放）必须由按键源过滤：转盘每次物理按下只能移动一格。

use science_driver::{AxisRole, DeploymentConfig};
use science_protocol::CupSlot;
use std::fmt;

/// 按键动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Press,
    Release,
}

/// 按键事件，`key` 使用 `up`/`down`/`left`/`right` 或单个字符
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInput {
    pub key: String,
    pub action: KeyAction,
}

impl KeyInput {
    pub fn press(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            action: KeyAction::Press,
        }
    }

    pub fn release(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            action: KeyAction::Release,
        }
    }
}

impl fmt::Display for KeyInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action {
            KeyAction::Press => write!(f, "Pressed: {}", self.key),
            KeyAction::Release => write!(f, "Released: {}", self.key),
        }
    }
}

/// 逻辑意图
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    SetAxisPower { role: AxisRole, power: f64 },
    MoveCarousel(CupSlot),
}

/// 按键状态机
#[derive(Debug, Clone)]
pub struct InputReducer {
    cup: CupSlot,
    arm_power: f64,
    drill_power: f64,
}

impl InputReducer {
    pub fn new(cup: CupSlot, arm_power: f64, drill_power: f64) -> Self {
        Self {
            cup,
            arm_power,
            drill_power,
        }
    }

    pub fn from_config(cup: CupSlot, config: &DeploymentConfig) -> Self {
        Self::new(cup, config.arm_power, config.drill_power)
    }

    /// 当前对准参考点的槽位
    pub fn cup(&self) -> CupSlot {
        self.cup
    }

    pub fn handle(&mut self, input: &KeyInput) -> Option<Intent> {
        let axis = |role, power| Some(Intent::SetAxisPower { role, power });

        match (input.key.as_str(), input.action) {
            ("up", KeyAction::Press) => axis(AxisRole::DrillArm, self.arm_power),
            ("down", KeyAction::Press) => axis(AxisRole::DrillArm, -self.arm_power),
            ("up" | "down", KeyAction::Release) => axis(AxisRole::DrillArm, 0.0),

            ("w", KeyAction::Press) => axis(AxisRole::Drill, self.drill_power),
            ("s", KeyAction::Press) => axis(AxisRole::Drill, -self.drill_power),
            ("w" | "s", KeyAction::Release) => axis(AxisRole::Drill, 0.0),

            ("right", KeyAction::Press) => {
                self.cup = self.cup.next();
                Some(Intent::MoveCarousel(self.cup))
            },
            ("left", KeyAction::Press) => {
                self.cup = self.cup.prev();
                Some(Intent::MoveCarousel(self.cup))
            },

            _ => None,
        }
    }
}
