//! 核心基础设施层
//!
//! - `error`: 请求级错误类型 `ConduitError`
//! - `logger`: 基于 tracing 的日志系统（支持级别热重载）

pub mod error;
pub mod logger;

pub use error::{AppResult, ConduitError};
pub use logger::{init_logger, update_log_level};
