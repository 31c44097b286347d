//! 遥操作会话状态机
//!
//! ```text
//! AwaitingCalibration --calibrate()--> (已标定)
//!                     --start(bus)---> Running
//! Running --Interrupt / 按键源关闭--> run() 返回
//!         --shutdown()-------------> ShuttingDown -> Terminated
//! ```
//!
//! 所有按键事件在调用 `run()` 的线程上按顺序处理；周期任务的启动与停止
//! 只发生在这个线程上。

use crate::calibration::{CalibrationError, parse_calibration};
use crate::input::{InputReducer, Intent, KeyInput};
use crossbeam_channel::Receiver;
use science_can::CanBus;
use science_driver::{CommandDispatcher, DeploymentConfig, DriverError};
use science_protocol::CupSlot;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingCalibration,
    Running,
    ShuttingDown,
    Terminated,
}

/// 控制线程接收的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Key(KeyInput),
    /// 操作员中断（Ctrl+C / SIGTERM）
    Interrupt,
}

/// `run()` 结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
    SourceClosed,
}

/// 会话错误
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session is not calibrated")]
    NotCalibrated,

    #[error("Operation not allowed in state {0:?}")]
    InvalidState(SessionState),
}

/// 遥操作会话
pub struct Session<B: CanBus> {
    state: SessionState,
    config: DeploymentConfig,
    reducer: Option<InputReducer>,
    dispatcher: Option<CommandDispatcher<B>>,
}

impl<B: CanBus> Session<B> {
    pub fn new(config: DeploymentConfig) -> Self {
        Self {
            state: SessionState::AwaitingCalibration,
            config,
            reducer: None,
            dispatcher: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    /// 当前转盘槽位（未标定时为 `None`）
    pub fn cup(&self) -> Option<CupSlot> {
        self.reducer.as_ref().map(InputReducer::cup)
    }

    pub fn dispatcher(&self) -> Option<&CommandDispatcher<B>> {
        self.dispatcher.as_ref()
    }

    /// 处理一次标定输入；输入无效时保持当前状态，由调用方重新提示
    pub fn calibrate(&mut self, input: &str) -> Result<CupSlot, CalibrationError> {
        let slot = parse_calibration(input)?;
        self.set_calibration(slot);
        Ok(slot)
    }

    pub fn set_calibration(&mut self, slot: CupSlot) {
        if self.state != SessionState::AwaitingCalibration {
            warn!("Ignoring calibration in state {:?}", self.state);
            return;
        }
        info!("First cup is at slot {}", slot);
        self.reducer = Some(InputReducer::from_config(slot, &self.config));
    }

    /// 接管已打开的总线并进入 Running
    ///
    /// 电机初始化失败只记录日志，不阻止会话运行。
    pub fn start(&mut self, bus: B) -> Result<(), SessionError> {
        if self.state != SessionState::AwaitingCalibration {
            return Err(SessionError::InvalidState(self.state));
        }
        if self.reducer.is_none() {
            return Err(SessionError::NotCalibrated);
        }

        let mut dispatcher = CommandDispatcher::new(bus, self.config.clone());
        if let Err(e) = dispatcher.initialize_motors() {
            error!("Motor initialization incomplete: {}", e);
        }

        self.dispatcher = Some(dispatcher);
        self.state = SessionState::Running;
        info!("Session running");
        Ok(())
    }

    /// 处理单个按键事件
    ///
    /// 命令失败时丢弃该命令并记录日志，会话继续运行。
    pub fn handle_key(&mut self, input: &KeyInput) -> Result<Option<Intent>, SessionError> {
        if self.state != SessionState::Running {
            return Err(SessionError::InvalidState(self.state));
        }
        debug!("{}", input);

        let (Some(reducer), Some(dispatcher)) = (self.reducer.as_mut(), self.dispatcher.as_mut())
        else {
            return Err(SessionError::InvalidState(self.state));
        };

        let Some(intent) = reducer.handle(input) else {
            return Ok(None);
        };

        let result: Result<(), DriverError> = match intent {
            Intent::SetAxisPower { role, power } => dispatcher.set_axis_power(role, power),
            Intent::MoveCarousel(slot) => dispatcher.move_carousel_to(slot),
        };
        if let Err(e) = result {
            error!("Command {:?} dropped: {}", intent, e);
        }

        Ok(Some(intent))
    }

    /// 按顺序处理事件，直到收到中断或事件源关闭
    pub fn run(&mut self, events: &Receiver<SessionEvent>) -> Result<StopReason, SessionError> {
        if self.state != SessionState::Running {
            return Err(SessionError::InvalidState(self.state));
        }

        loop {
            match events.recv() {
                Ok(SessionEvent::Key(input)) => {
                    self.handle_key(&input)?;
                },
                Ok(SessionEvent::Interrupt) => {
                    info!("Interrupt received");
                    return Ok(StopReason::Interrupted);
                },
                Err(_) => {
                    info!("Key event source closed");
                    return Ok(StopReason::SourceClosed);
                },
            }
        }
    }

    /// 停止全部周期任务，然后释放总线
    ///
    /// 返回停止的任务数；重复调用无副作用。
    pub fn shutdown(&mut self) -> usize {
        if self.state == SessionState::Terminated {
            return 0;
        }
        self.state = SessionState::ShuttingDown;

        let stopped = match self.dispatcher.take() {
            Some(mut dispatcher) => {
                let stopped = dispatcher.stop_all();
                drop(dispatcher);
                stopped
            },
            None => 0,
        };

        self.state = SessionState::Terminated;
        info!("Session terminated");
        stopped
    }
}

impl<B: CanBus> Drop for Session<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
