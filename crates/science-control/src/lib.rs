//! # Science Control
//!
//! 遥操作控制层：按键状态机、启动标定与会话生命周期。
//!
//! 数据流：按键事件 -> [`InputReducer`]（纯函数） -> [`CommandDispatcher`]
//! -> 总线。除进程退出外没有反向数据流。
//!
//! [`CommandDispatcher`]: science_driver::CommandDispatcher

pub mod calibration;
pub mod input;
pub mod session;

pub use calibration::{
    CALIBRATION_PROMPT, CalibrationError, parse_calibration, prompt_calibration, spawn_line_reader,
};
pub use input::{InputReducer, Intent, KeyAction, KeyInput};
pub use session::{Session, SessionError, SessionEvent, SessionState, StopReason};
