//! 批量参数化查询网关
//!
//! 组件（由底向上）：
//! - `params`: 参数校验与方言转换
//! - `dedup`: 批次去重与槽位映射
//! - `resolver`: 数据库名到连接/队列的解析
//! - `executor`: 单条查询执行
//! - `aggregator`: 结果展开与状态码计算
//! - `gateway`: `ConduitService`，串起完整流程

pub mod aggregator;
pub mod dedup;
pub mod executor;
pub mod gateway;
pub mod params;
pub mod resolver;

#[cfg(test)]
mod pipeline_tests;

pub use aggregator::{aggregate, overall_status};
pub use dedup::{canonicalize, deduplicate, CanonicalBatch, Slot};
pub use executor::{execute_single, ExecutionStage};
pub use gateway::ConduitService;
pub use params::{validate_and_convert, ConvertedQuery, ParameterValidationReport};
pub use resolver::{DatabaseResolver, ResolvedDatabase};
