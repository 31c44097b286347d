//! 周期任务注册表
//!
//! 每个执行器序列号最多对应一个活跃的周期重发任务。替换或清除任务时，
//! 先 `stop()` 旧任务再丢弃句柄，保证不会有两个后台线程向同一执行器发送，
//! 也不会在松开按键后留下仍在重发旧功率的任务。
//!
//! 注册表只由控制线程修改，不需要加锁。

use crate::DriverError;
use science_can::{CanBus, CyclicTask};
use science_protocol::pwm_frame;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// 序列号 -> 周期任务
pub struct PeriodicTaskRegistry<T: CyclicTask> {
    tasks: HashMap<u8, T>,
    period: Duration,
}

impl<T: CyclicTask> PeriodicTaskRegistry<T> {
    pub fn new(period: Duration) -> Self {
        Self {
            tasks: HashMap::new(),
            period,
        }
    }

    /// 设置电机功率
    ///
    /// 1. 停止并移除该序列号已有的任务
    /// 2. `power == 0.0`：只发送一次零功率帧，不注册任务
    /// 3. 否则：启动周期重发并登记句柄
    ///
    /// 编码或发送失败时返回错误，此时该序列号没有任何活跃任务。
    pub fn set_power<B>(
        &mut self,
        bus: &B,
        group: u8,
        serial: u8,
        power: f64,
    ) -> Result<(), DriverError>
    where
        B: CanBus<Task = T>,
    {
        self.clear(serial);

        let frame = pwm_frame(group, serial, power)?;
        if power == 0.0 {
            bus.send(frame)?;
            debug!("serial 0x{:02X}: stopped", serial);
        } else {
            let task = bus.send_periodic(frame, self.period)?;
            self.tasks.insert(serial, task);
            debug!(
                "serial 0x{:02X}: power {:+.3} every {:?}",
                serial, power, self.period
            );
        }
        Ok(())
    }

    /// 停止并移除任务，返回是否存在过任务
    pub fn clear(&mut self, serial: u8) -> bool {
        match self.tasks.remove(&serial) {
            Some(mut task) => {
                task.stop();
                debug!("serial 0x{:02X}: periodic task stopped", serial);
                true
            },
            None => false,
        }
    }

    /// 停止所有任务（会话结束时调用）
    pub fn clear_all(&mut self) -> usize {
        let serials: Vec<u8> = self.tasks.keys().copied().collect();
        serials.into_iter().filter(|&s| self.clear(s)).count()
    }

    pub fn is_active(&self, serial: u8) -> bool {
        self.tasks.contains_key(&serial)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// 活跃序列号（升序）
    pub fn active_serials(&self) -> Vec<u8> {
        let mut serials: Vec<u8> = self.tasks.keys().copied().collect();
        serials.sort_unstable();
        serials
    }
}

impl<T: CyclicTask> Drop for PeriodicTaskRegistry<T> {
    fn drop(&mut self) {
        self.clear_all();
    }
}
