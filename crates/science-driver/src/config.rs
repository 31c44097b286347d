//! 部署配置
//!
//! 两套已部署的硬件接线只在“角色 -> (分组, 序列号)”映射和电机启动帧上不同，
//! 其余逻辑完全共享。配置可以从内置预设选择，也可以从 TOML 文件加载，
//! 缺省字段回落到预设值。
//!
//! ```toml
//! motor_group = 4
//! science_group = 7
//! science_serial = 1
//! arm_power = 0.5
//! drill_power = 1.0
//!
//! [roles.drill_arm]
//! serial = 12
//! startup = "mode_select"
//!
//! [roles.drill]
//! serial = 13
//! startup = "mode_select"
//! ```

use science_protocol::{GROUP_MAX, MOTOR_GROUP, SCIENCE_GROUP, SERIAL_MAX};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// 配置加载/校验错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 受功率控制的电机轴
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisRole {
    /// 钻臂升降
    DrillArm,
    /// 钻头旋转
    Drill,
}

impl AxisRole {
    pub const ALL: [AxisRole; 2] = [AxisRole::DrillArm, AxisRole::Drill];
}

impl fmt::Display for AxisRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisRole::DrillArm => write!(f, "drill-arm"),
            AxisRole::Drill => write!(f, "drill"),
        }
    }
}

/// 会话开始时发给电机的帧
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupPolicy {
    /// 零功率 PWM 帧 `[0x3, 0, 0]`
    Neutral,
    /// 选择 PWM 驱动模式 `[0x0, 0x0]`
    #[default]
    ModeSelect,
}

/// 单个执行器的接线
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorConfig {
    pub serial: u8,
    #[serde(default)]
    pub startup: StartupPolicy,
}

/// 角色映射表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTable {
    pub drill_arm: ActuatorConfig,
    pub drill: ActuatorConfig,
}

impl RoleTable {
    pub fn get(&self, role: AxisRole) -> ActuatorConfig {
        match role {
            AxisRole::DrillArm => self.drill_arm,
            AxisRole::Drill => self.drill,
        }
    }
}

/// 内置的部署预设
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    /// 钻臂 0xC / 钻头 0xD / 转盘 0x1，启动时发送模式选择帧
    #[default]
    ModeSelect,
    /// 第二套接线，启动时发送零功率帧
    ///
    /// 序列号（钻臂 0x2 / 钻头 0x3 / 转盘 0x2）是占位值，尚未与该套硬件核对；
    /// 实际部署时应通过 `--config` 提供确认过的映射。
    Neutral,
}

/// 完整的部署配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// 电机控制分组（4 位）
    pub motor_group: u8,
    /// 科学载荷分组（4 位）
    pub science_group: u8,
    /// 转盘控制器序列号（6 位）
    pub science_serial: u8,
    /// 钻臂按键功率
    pub arm_power: f64,
    /// 钻头按键功率
    pub drill_power: f64,
    /// 周期重发间隔（毫秒）
    pub resend_period_ms: u64,
    /// 单次发送超时（毫秒）
    pub send_timeout_ms: u64,
    /// CAN 接口名称
    pub interface: String,
    /// 按下后等待第一次系统自动重复的时长（毫秒），超过则视为已松开
    pub first_repeat_grace_ms: u64,
    /// 自动重复之间的最大间隔（毫秒）
    pub repeat_delay_ms: u64,
    pub roles: RoleTable,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self::preset(Variant::default())
    }
}

impl DeploymentConfig {
    /// 内置预设
    pub fn preset(variant: Variant) -> Self {
        let (arm, drill, science, startup) = match variant {
            Variant::ModeSelect => (0xC, 0xD, 0x1, StartupPolicy::ModeSelect),
            Variant::Neutral => (0x2, 0x3, 0x2, StartupPolicy::Neutral),
        };

        Self {
            motor_group: MOTOR_GROUP,
            science_group: SCIENCE_GROUP,
            science_serial: science,
            arm_power: 0.5,
            drill_power: 1.0,
            resend_period_ms: 500,
            send_timeout_ms: 20,
            interface: "can0".to_string(),
            first_repeat_grace_ms: 750,
            repeat_delay_ms: 50,
            roles: RoleTable {
                drill_arm: ActuatorConfig {
                    serial: arm,
                    startup,
                },
                drill: ActuatorConfig {
                    serial: drill,
                    startup,
                },
            },
        }
    }

    /// 解析 TOML 字符串并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载并校验
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 某个角色的 (分组, 序列号)
    pub fn address(&self, role: AxisRole) -> (u8, u8) {
        (self.motor_group, self.roles.get(role).serial)
    }

    /// 某个角色按键时的功率幅值
    pub fn power(&self, role: AxisRole) -> f64 {
        match role {
            AxisRole::DrillArm => self.arm_power,
            AxisRole::Drill => self.drill_power,
        }
    }

    pub fn resend_period(&self) -> Duration {
        Duration::from_millis(self.resend_period_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn first_repeat_grace(&self) -> Duration {
        Duration::from_millis(self.first_repeat_grace_ms)
    }

    pub fn repeat_delay(&self) -> Duration {
        Duration::from_millis(self.repeat_delay_ms)
    }

    /// 校验所有字段，保证运行期编码不会失败
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, group) in [
            ("motor_group", self.motor_group),
            ("science_group", self.science_group),
        ] {
            if group > GROUP_MAX {
                return Err(ConfigError::Invalid(format!(
                    "{} = {} does not fit in 4 bits",
                    name, group
                )));
            }
        }

        if self.science_serial > SERIAL_MAX {
            return Err(ConfigError::Invalid(format!(
                "science_serial = {} does not fit in 6 bits",
                self.science_serial
            )));
        }

        for role in AxisRole::ALL {
            let serial = self.roles.get(role).serial;
            if serial > SERIAL_MAX {
                return Err(ConfigError::Invalid(format!(
                    "{} serial = {} does not fit in 6 bits",
                    role, serial
                )));
            }
            let power = self.power(role);
            if !power.is_finite() || !(0.0..=1.0).contains(&power) || power == 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} power = {} must be in (0.0, 1.0]",
                    role, power
                )));
            }
        }

        if self.roles.drill_arm.serial == self.roles.drill.serial {
            return Err(ConfigError::Invalid(format!(
                "drill-arm and drill share serial {}",
                self.roles.drill.serial
            )));
        }

        if self.resend_period_ms == 0 {
            return Err(ConfigError::Invalid(
                "resend_period_ms must be non-zero".to_string(),
            ));
        }
        if self.send_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "send_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.repeat_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "repeat_delay_ms must be non-zero".to_string(),
            ));
        }
        if self.first_repeat_grace_ms < self.repeat_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "first_repeat_grace_ms = {} must not be shorter than repeat_delay_ms = {}",
                self.first_repeat_grace_ms, self.repeat_delay_ms
            )));
        }

        Ok(())
    }
}
