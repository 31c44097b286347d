//! Mock 总线（无硬件依赖，用于测试）
//!
//! 记录每一次 `send` / `send_periodic` / `stop`，不启动任何线程。

use crate::{CanBus, CanError, CyclicTask, ScienceFrame};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// 一次 `send_periodic` 调用的记录
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicRecord {
    pub task_id: u64,
    pub frame: ScienceFrame,
    pub period: Duration,
}

#[derive(Debug, Default)]
struct MockLog {
    sent: Vec<ScienceFrame>,
    periodic: Vec<PeriodicRecord>,
    stops: HashMap<u64, usize>,
    next_task_id: u64,
    failing: bool,
}

/// 记录型 mock 总线，克隆后共享同一份记录
#[derive(Debug, Clone, Default)]
pub struct MockBus {
    log: Arc<Mutex<MockLog>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的发送全部返回 `CanError::Timeout`
    pub fn set_failing(&self, failing: bool) {
        self.log.lock().failing = failing;
    }

    /// 一次性发送的帧
    pub fn sent_frames(&self) -> Vec<ScienceFrame> {
        self.log.lock().sent.clone()
    }

    /// 周期任务的启动记录
    pub fn periodic_records(&self) -> Vec<PeriodicRecord> {
        self.log.lock().periodic.clone()
    }

    /// 某个任务被 `stop()` 的次数
    pub fn stop_count(&self, task_id: u64) -> usize {
        self.log.lock().stops.get(&task_id).copied().unwrap_or(0)
    }

    /// 仍未停止的任务
    pub fn live_tasks(&self) -> Vec<PeriodicRecord> {
        let log = self.log.lock();
        log.periodic
            .iter()
            .filter(|r| !log.stops.contains_key(&r.task_id))
            .copied()
            .collect()
    }

    pub fn clear_history(&self) {
        let mut log = self.log.lock();
        log.sent.clear();
        log.periodic.clear();
        log.stops.clear();
    }
}

/// [`MockBus`] 的任务句柄
#[derive(Debug)]
pub struct MockTask {
    id: u64,
    log: Arc<Mutex<MockLog>>,
}

impl MockTask {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl CyclicTask for MockTask {
    fn stop(&mut self) {
        *self.log.lock().stops.entry(self.id).or_insert(0) += 1;
    }
}

impl CanBus for MockBus {
    type Task = MockTask;

    fn send(&self, frame: ScienceFrame) -> Result<(), CanError> {
        let mut log = self.log.lock();
        if log.failing {
            return Err(CanError::Timeout);
        }
        log.sent.push(frame);
        Ok(())
    }

    fn send_periodic(&self, frame: ScienceFrame, period: Duration) -> Result<MockTask, CanError> {
        let mut log = self.log.lock();
        if log.failing {
            return Err(CanError::Timeout);
        }
        let task_id = log.next_task_id;
        log.next_task_id += 1;
        log.periodic.push(PeriodicRecord {
            task_id,
            frame,
            period,
        });
        Ok(MockTask {
            id: task_id,
            log: Arc::clone(&self.log),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_lifecycle() {
        let bus = MockBus::new();
        let frame = ScienceFrame::new_standard(0x50C, &[0x3, 0x40, 0x00]);

        let mut task = bus.send_periodic(frame, Duration::from_millis(500)).unwrap();
        assert_eq!(bus.live_tasks().len(), 1);

        task.stop();
        assert_eq!(bus.stop_count(task.id()), 1);
        assert!(bus.live_tasks().is_empty());
    }

    #[test]
    fn test_failing_bus() {
        let bus = MockBus::new();
        bus.set_failing(true);
        let frame = ScienceFrame::new_standard(0x50C, &[0x0, 0x0]);
        assert!(bus.send(frame).is_err());
        assert!(bus.send_periodic(frame, Duration::from_millis(1)).is_err());
        assert!(bus.sent_frames().is_empty());
    }
}
