//! SocketCAN CAN 适配器实现
//!
//! 基于 Linux SocketCAN 子系统。接口的波特率等配置由系统工具（`ip link`）完成，
//! 这里只负责检查接口状态、打开 socket 和发送标准帧。

use crate::{CanAdapter, CanDeviceError, CanDeviceErrorKind, CanError, ScienceFrame};
use socketcan::{BlockingCan, CanFrame, CanSocket, EmbeddedFrame, Socket, StandardId};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// 默认发送超时
///
/// 总线无响应时快速失败，而不是阻塞按键事件处理。
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(20);

/// 检查接口是否存在且处于 UP 状态
///
/// 读取 `/sys/class/net/<iface>/flags`，只读操作，不需要特殊权限。
pub fn check_interface_status(interface: &str) -> Result<bool, CanError> {
    let dir = Path::new("/sys/class/net").join(interface);
    if !dir.exists() {
        return Err(CanError::Device(CanDeviceError::new(
            CanDeviceErrorKind::NotFound,
            format!(
                "CAN interface '{}' does not exist. Please create it first:\n  sudo ip link add dev {} type can",
                interface, interface
            ),
        )));
    }

    let flags = fs::read_to_string(dir.join("flags"))?;
    let flags = u32::from_str_radix(flags.trim().trim_start_matches("0x"), 16)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    // IFF_UP = 0x1
    let is_up = flags & 0x1 != 0;
    trace!(
        "Interface '{}' status: {}",
        interface,
        if is_up { "UP" } else { "DOWN" }
    );
    Ok(is_up)
}

/// SocketCAN 适配器
#[derive(Debug)]
pub struct SocketCanAdapter {
    socket: CanSocket,
    interface: String,
    write_timeout: Duration,
}

impl SocketCanAdapter {
    /// 打开 CAN 接口
    ///
    /// # 错误
    /// - `CanError::Device`: 接口不存在、未启动或无法打开
    /// - `CanError::Io`: 系统调用失败
    pub fn new(interface: impl Into<String>) -> Result<Self, CanError> {
        let interface = interface.into();

        if !check_interface_status(&interface)? {
            return Err(CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::NotUp,
                format!(
                    "CAN interface '{}' exists but is not UP. Please start it first:\n  sudo ip link set up {}",
                    interface, interface
                ),
            )));
        }

        let socket = CanSocket::open(&interface).map_err(|e| {
            let kind = if e.kind() == io::ErrorKind::PermissionDenied {
                CanDeviceErrorKind::AccessDenied
            } else {
                CanDeviceErrorKind::Backend
            };
            CanError::Device(CanDeviceError::new(
                kind,
                format!("Failed to open CAN interface '{}': {}", interface, e),
            ))
        })?;

        socket.set_write_timeout(DEFAULT_WRITE_TIMEOUT).map_err(CanError::Io)?;

        debug!("SocketCAN interface '{}' opened", interface);
        Ok(Self {
            socket,
            interface,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn to_can_frame(frame: &ScienceFrame) -> Result<CanFrame, CanError> {
        if frame.is_extended {
            return Err(CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::InvalidFrame,
                format!("Extended ID 0x{:X} is not used by this protocol", frame.id),
            )));
        }

        StandardId::new(frame.id as u16)
            .and_then(|id| CanFrame::new(id, frame.data_slice()))
            .ok_or_else(|| {
                CanError::Device(CanDeviceError::new(
                    CanDeviceErrorKind::InvalidFrame,
                    format!("Failed to create standard frame with ID 0x{:X}", frame.id),
                ))
            })
    }
}

impl CanAdapter for SocketCanAdapter {
    fn send(&mut self, frame: ScienceFrame) -> Result<(), CanError> {
        let can_frame = Self::to_can_frame(&frame)?;

        self.socket.transmit(&can_frame).map_err(|e| {
            CanError::Io(io::Error::other(format!(
                "SocketCAN transmit error on '{}': {}",
                self.interface, e
            )))
        })?;

        trace!("Sent CAN frame: {}", frame);
        Ok(())
    }

    fn send_timeout(&mut self, frame: ScienceFrame, timeout: Duration) -> Result<(), CanError> {
        if timeout == self.write_timeout {
            return self.send(frame);
        }

        self.socket.set_write_timeout(timeout).map_err(CanError::Io)?;
        let result = self.send(frame);

        if let Err(e) = self.socket.set_write_timeout(self.write_timeout) {
            warn!(
                "Failed to restore write timeout on '{}': {}",
                self.interface, e
            );
        }

        result
    }
}
