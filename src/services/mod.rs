// 服务层模块
//
// - auth: 令牌校验
// - queue: 数据库执行队列（QueryQueue 与 SQLite 实现）
// - conduit: 去重、校验、执行、聚合的批次流程
// - server: HTTP 入口

pub mod auth;
pub mod conduit;
pub mod queue;
pub mod server;

pub use auth::{StaticTokenVerifier, TokenVerifier};
pub use conduit::ConduitService;
pub use queue::{QueryQueue, SqliteQueue};
pub use server::ConduitServer;
