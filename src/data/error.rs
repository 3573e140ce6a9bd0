//! 数据层错误类型
//!
//! 模板加载与 SQLite 访问共用的 `DataError`。

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    /// 文件 I/O 错误
    #[error("文件 I/O 错误: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON 序列化/反序列化错误
    #[error("JSON 序列化错误: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    /// 数据库错误
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),

    /// 资源未找到
    #[error("未找到资源: {0}")]
    NotFound(String),

    /// 锁中毒或阻塞任务异常退出
    #[error("并发错误: {0}")]
    Concurrency(String),

    /// 非法的表名/列名
    #[error("非法的标识符: {0}")]
    InvalidIdentifier(String),
}

pub type Result<T> = std::result::Result<T, DataError>;

impl DataError {
    /// 从 `std::io::Error` 和路径创建 I/O 错误
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<tokio::task::JoinError> for DataError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Concurrency(format!("阻塞任务异常退出: {err}"))
    }
}
