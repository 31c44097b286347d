//! 驱动层模块
//!
//! - 部署配置（角色 -> 分组/序列号映射，TOML 加载）
//! - 周期任务注册表（每个执行器最多一个重发任务）
//! - 命令分发器（意图 -> 编码 -> 总线）

pub mod config;
pub mod dispatcher;
mod error;
pub mod registry;

pub use config::{
    ActuatorConfig, AxisRole, ConfigError, DeploymentConfig, RoleTable, StartupPolicy, Variant,
};
pub use dispatcher::CommandDispatcher;
pub use error::DriverError;
pub use registry::PeriodicTaskRegistry;
