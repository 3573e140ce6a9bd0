//! 缓存层
//!
//! - `lru`: 通用 LRU 缓存（容量限制 + 可选 TTL）
//! - `template_cache`: 按 (database, query_ref) 缓存 SQL 模板

pub mod lru;
pub mod template_cache;

pub use lru::LruCache;
pub use template_cache::{QueryCache, TemplateKey};
