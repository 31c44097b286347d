//! 总线能力：一次性发送与周期重发
//!
//! 接收端固件带有命令超时保护（dead-man），持续按键期间必须不断重发同一帧。
//! [`SharedBus::send_periodic`] 为每个周期任务启动一个后台线程，线程通过
//! `crossbeam-channel` 接收停止信号；适配器由 `parking_lot::Mutex` 共享，
//! 获取锁与发送都有超时上限，总线无响应时快速失败。

use crate::{CanAdapter, CanDeviceError, CanDeviceErrorKind, CanError, ScienceFrame};
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{trace, warn};

/// 可停止的周期发送任务
pub trait CyclicTask {
    /// 停止重发；重复调用无副作用
    fn stop(&mut self);
}

/// 控制层依赖的总线能力
pub trait CanBus {
    type Task: CyclicTask;

    /// 一次性发送
    fn send(&self, frame: ScienceFrame) -> Result<(), CanError>;

    /// 立即发送一次，之后每隔 `period` 重发，直到任务被停止
    ///
    /// 首帧发送失败时返回错误，不会留下后台任务。
    fn send_periodic(&self, frame: ScienceFrame, period: Duration)
    -> Result<Self::Task, CanError>;
}

/// 线程安全地共享一个适配器
pub struct SharedBus<A> {
    adapter: Arc<Mutex<A>>,
    send_timeout: Duration,
}

impl<A> Clone for SharedBus<A> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            send_timeout: self.send_timeout,
        }
    }
}

impl<A: CanAdapter + Send + 'static> SharedBus<A> {
    pub fn new(adapter: A, send_timeout: Duration) -> Self {
        Self {
            adapter: Arc::new(Mutex::new(adapter)),
            send_timeout,
        }
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// 在持锁状态下访问适配器
    #[cfg(test)]
    fn with_adapter<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        f(&mut self.adapter.lock())
    }

    fn transmit(adapter: &Mutex<A>, frame: ScienceFrame, timeout: Duration) -> Result<(), CanError> {
        let mut guard = adapter.try_lock_for(timeout).ok_or(CanError::Busy(timeout))?;
        guard.send_timeout(frame, timeout)
    }
}

impl<A: CanAdapter + Send + 'static> CanBus for SharedBus<A> {
    type Task = CyclicSendTask;

    fn send(&self, frame: ScienceFrame) -> Result<(), CanError> {
        Self::transmit(&self.adapter, frame, self.send_timeout)
    }

    fn send_periodic(
        &self,
        frame: ScienceFrame,
        period: Duration,
    ) -> Result<CyclicSendTask, CanError> {
        if period.is_zero() {
            return Err(CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::Unknown,
                "Periodic send requires a non-zero period",
            )));
        }

        Self::transmit(&self.adapter, frame, self.send_timeout)?;

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let adapter = Arc::clone(&self.adapter);
        let timeout = self.send_timeout;

        let thread = thread::Builder::new()
            .name(format!("cyclic-0x{:03X}", frame.id))
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {
                            if let Err(e) = Self::transmit(&adapter, frame, timeout) {
                                warn!("Periodic resend of 0x{:03X} failed: {}", frame.id, e);
                            }
                        },
                        // 收到停止信号或发送端已释放
                        _ => break,
                    }
                }
                trace!("Cyclic task 0x{:03X} exited", frame.id);
            })?;

        Ok(CyclicSendTask {
            frame,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

/// [`SharedBus`] 的周期任务句柄
///
/// 析构时自动停止，保证句柄丢失不会留下仍在发送的后台线程。
#[derive(Debug)]
pub struct CyclicSendTask {
    frame: ScienceFrame,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CyclicSendTask {
    pub fn frame(&self) -> ScienceFrame {
        self.frame
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl CyclicTask for CyclicSendTask {
    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Cyclic task 0x{:03X} panicked", self.frame.id);
        }
    }
}

impl Drop for CyclicSendTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 把发送的帧写入共享 Vec 的内存适配器
    #[derive(Clone, Default)]
    struct MemoryAdapter {
        frames: Arc<Mutex<Vec<ScienceFrame>>>,
        fail: bool,
    }

    impl CanAdapter for MemoryAdapter {
        fn send(&mut self, frame: ScienceFrame) -> Result<(), CanError> {
            if self.fail {
                return Err(CanError::Timeout);
            }
            self.frames.lock().push(frame);
            Ok(())
        }
    }

    fn frame() -> ScienceFrame {
        ScienceFrame::new_standard(0x50D, &[0x3, 0x7F, 0xFF])
    }

    #[test]
    fn test_send_once() {
        let adapter = MemoryAdapter::default();
        let frames = adapter.frames.clone();
        let bus = SharedBus::new(adapter, Duration::from_millis(10));

        bus.send(frame()).unwrap();
        assert_eq!(frames.lock().as_slice(), &[frame()]);
    }

    #[test]
    fn test_periodic_resends_until_stopped() {
        let adapter = MemoryAdapter::default();
        let frames = adapter.frames.clone();
        let bus = SharedBus::new(adapter, Duration::from_millis(10));

        let mut task = bus.send_periodic(frame(), Duration::from_millis(10)).unwrap();
        // 首帧同步发送
        assert!(!frames.lock().is_empty());
        assert!(task.is_running());

        thread::sleep(Duration::from_millis(80));
        task.stop();
        assert!(!task.is_running());

        let count = frames.lock().len();
        assert!(count >= 3, "expected several resends, got {}", count);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(frames.lock().len(), count, "task kept sending after stop");
    }

    #[test]
    fn test_stop_is_idempotent() {
        let bus = SharedBus::new(MemoryAdapter::default(), Duration::from_millis(10));
        let mut task = bus.send_periodic(frame(), Duration::from_millis(500)).unwrap();
        task.stop();
        task.stop();
        assert!(!task.is_running());
    }

    #[test]
    fn test_drop_stops_task() {
        let adapter = MemoryAdapter::default();
        let frames = adapter.frames.clone();
        let bus = SharedBus::new(adapter, Duration::from_millis(10));

        drop(bus.send_periodic(frame(), Duration::from_millis(5)).unwrap());
        let count = frames.lock().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(frames.lock().len(), count);
    }

    #[test]
    fn test_failed_first_send_leaves_no_task() {
        let adapter = MemoryAdapter {
            fail: true,
            ..Default::default()
        };
        let bus = SharedBus::new(adapter, Duration::from_millis(10));
        assert!(matches!(
            bus.send_periodic(frame(), Duration::from_millis(10)),
            Err(CanError::Timeout)
        ));
    }

    #[test]
    fn test_zero_period_rejected() {
        let bus = SharedBus::new(MemoryAdapter::default(), Duration::from_millis(10));
        assert!(bus.send_periodic(frame(), Duration::ZERO).is_err());
    }

    #[test]
    fn test_busy_bus_fails_fast() {
        let bus = SharedBus::new(MemoryAdapter::default(), Duration::from_millis(5));
        let other = bus.clone();
        bus.with_adapter(|_| {
            assert!(matches!(other.send(frame()), Err(CanError::Busy(_))));
        });
    }
}
