// lib.rs - 暴露网关各层给二进制入口与集成测试使用

pub mod core; // 核心基础设施层
pub mod data; // 数据层：缓存与模板来源
pub mod models;
pub mod services;

pub use models::*;

pub use services::conduit::{ConduitService, DatabaseResolver};
pub use services::queue::{QueryOutcome, QueryQueue, QueryRequest, QueueError, SqliteQueue};
pub use services::{ConduitServer, StaticTokenVerifier, TokenVerifier};

pub use data::cache::QueryCache;
pub use data::managers::{InlineTemplates, SqliteDatabase, SqliteTemplateStore, TemplateSource};

// 重新导出常用类型
pub use anyhow::{Context, Result};

pub use core::{init_logger, update_log_level, AppResult, ConduitError};
