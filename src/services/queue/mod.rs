//! 数据库执行队列
//!
//! `QueryQueue` 是"提交查询、拿回结果"的抽象，每个数据库连接对应一个实现。
//! 内置实现只有 SQLite（见 `sqlite`），其他引擎由外部注册。

pub mod sqlite;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

use crate::models::{Dialect, ErrorKind, TypedParameter};

pub use sqlite::SqliteQueue;

/// 提交给队列的查询
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// 形如 `conduit_{counter}_{unix}`
    pub query_id: String,
    /// 已按方言改写过占位符的 SQL
    pub sql: String,
    pub params: Vec<TypedParameter>,
    pub queue_type: String,
    pub timeout: Duration,
}

/// 查询执行结果
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub execution_time_ms: u64,
    pub queue_used: String,
}

/// 队列失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueErrorCategory {
    Database,
    NotFound,
    Auth,
    Timeout,
    /// 执行槽位已满
    Throttled,
}

impl QueueErrorCategory {
    pub fn error_kind(self) -> ErrorKind {
        match self {
            QueueErrorCategory::Database | QueueErrorCategory::Timeout => ErrorKind::DatabaseError,
            QueueErrorCategory::NotFound => ErrorKind::NotFound,
            QueueErrorCategory::Auth => ErrorKind::AuthError,
            QueueErrorCategory::Throttled => ErrorKind::RateLimit,
        }
    }

    /// 返回给客户端的错误标题
    pub fn error_label(self) -> &'static str {
        match self {
            QueueErrorCategory::Database => "Database error",
            QueueErrorCategory::NotFound => "Not found",
            QueueErrorCategory::Auth => "Database authorization failed",
            QueueErrorCategory::Timeout => "Query execution timeout",
            QueueErrorCategory::Throttled => "Queue capacity exceeded",
        }
    }
}

#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct QueueError {
    pub category: QueueErrorCategory,
    pub message: String,
}

impl QueueError {
    pub fn new(category: QueueErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

/// 引擎执行队列
#[async_trait]
pub trait QueryQueue: Send + Sync {
    fn engine(&self) -> Dialect;

    async fn submit(&self, request: QueryRequest) -> Result<QueryOutcome, QueueError>;
}
