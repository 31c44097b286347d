//! 命令分发器
//!
//! 把逻辑意图（“设置某轴功率”、“转盘移动到某槽位”）翻译成编码调用和
//! 注册表操作。接线差异全部来自 [`DeploymentConfig`]。

use crate::config::{AxisRole, DeploymentConfig, StartupPolicy};
use crate::registry::PeriodicTaskRegistry;
use crate::DriverError;
use science_can::CanBus;
use science_protocol::{CupSlot, MotorMode, mode_frame, move_frame, pwm_frame};
use tracing::{debug, info, warn};

/// 命令分发器，独占总线句柄与周期任务注册表
///
/// 字段按析构顺序排列：注册表先于总线释放。
pub struct CommandDispatcher<B: CanBus> {
    registry: PeriodicTaskRegistry<B::Task>,
    config: DeploymentConfig,
    bus: B,
}

impl<B: CanBus> CommandDispatcher<B> {
    pub fn new(bus: B, config: DeploymentConfig) -> Self {
        let registry = PeriodicTaskRegistry::new(config.resend_period());
        Self {
            registry,
            config,
            bus,
        }
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn registry(&self) -> &PeriodicTaskRegistry<B::Task> {
        &self.registry
    }

    /// 设置电机轴功率（非零功率持续重发，零功率只发一次）
    pub fn set_axis_power(&mut self, role: AxisRole, power: f64) -> Result<(), DriverError> {
        let (group, serial) = self.config.address(role);
        debug!("{} -> {:+.3}", role, power);
        self.registry.set_power(&self.bus, group, serial, power)
    }

    /// 转盘移动到指定槽位（只发一次，位置命令按边沿触发）
    pub fn move_carousel_to(&mut self, slot: CupSlot) -> Result<(), DriverError> {
        info!("Moving first cup to slot {}", slot);
        let frame = move_frame(
            self.config.science_group,
            self.config.science_serial,
            slot.index() as u32,
        )?;
        self.bus.send(frame)?;
        Ok(())
    }

    /// 会话开始时让每个电机进入已知的静止状态
    ///
    /// 每个角色都会尝试发送；返回遇到的第一个错误。
    pub fn initialize_motors(&mut self) -> Result<(), DriverError> {
        let mut first_error = None;

        for role in AxisRole::ALL {
            let (group, serial) = self.config.address(role);
            let actuator = self.config.roles.get(role);

            // 初始化前不应有残留任务
            self.registry.clear(serial);

            let frame = match actuator.startup {
                StartupPolicy::Neutral => pwm_frame(group, serial, 0.0),
                StartupPolicy::ModeSelect => mode_frame(group, serial, MotorMode::Pwm),
            };

            let result = frame
                .map_err(DriverError::from)
                .and_then(|frame| self.bus.send(frame).map_err(DriverError::from));

            match result {
                Ok(()) => debug!("{} initialized ({:?})", role, actuator.startup),
                Err(e) => {
                    warn!("Failed to initialize {}: {}", role, e);
                    first_error.get_or_insert(e);
                },
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 停止所有周期任务，返回停止的数量
    pub fn stop_all(&mut self) -> usize {
        let stopped = self.registry.clear_all();
        if stopped > 0 {
            info!("Stopped {} periodic task(s)", stopped);
        }
        stopped
    }
}
