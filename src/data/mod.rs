//! 数据层
//!
//! - `error`: 数据层错误类型
//! - `cache`: LRU 缓存与 SQL 模板缓存
//! - `managers`: 模板来源与 SQLite 访问

pub mod cache;
pub mod error;
pub mod managers;

pub use error::{DataError, Result};
