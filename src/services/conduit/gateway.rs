//! 批次查询入口
//!
//! `ConduitService::handle_batch` 串起整个流程：
//! 令牌校验 → 去重 → 解析数据库 → 并发执行唯一查询 → 聚合响应。

use futures_util::future::join_all;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::aggregator::aggregate;
use super::dedup::deduplicate;
use super::executor::execute_single;
use super::resolver::DatabaseResolver;
use crate::core::error::AppResult;
use crate::data::cache::QueryCache;
use crate::models::{BatchResponse, ConduitConfig};
use crate::services::auth::{StaticTokenVerifier, TokenVerifier};

pub struct ConduitService {
    resolver: Arc<DatabaseResolver>,
    cache: Arc<QueryCache>,
    verifier: Arc<dyn TokenVerifier>,
    query_counter: AtomicU64,
}

impl ConduitService {
    pub fn new(
        resolver: Arc<DatabaseResolver>,
        cache: Arc<QueryCache>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self {
            resolver,
            cache,
            verifier,
            query_counter: AtomicU64::new(0),
        }
    }

    /// 按配置构建解析器、模板缓存与令牌校验器
    pub fn from_config(config: &ConduitConfig) -> AppResult<Self> {
        let resolver = DatabaseResolver::from_config(config)?;
        let cache = QueryCache::new(
            config.cache.capacity,
            config.cache.ttl_secs.map(Duration::from_secs),
        );
        let verifier = StaticTokenVerifier::from_config(&config.auth);
        Ok(Self::new(
            Arc::new(resolver),
            Arc::new(cache),
            Arc::new(verifier),
        ))
    }

    pub fn resolver(&self) -> &DatabaseResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// 处理一个批次
    ///
    /// 批次级错误（令牌、数据库、限流、内存）直接返回 `Err`；单条查询的失败记录在结果中。
    pub async fn handle_batch(
        &self,
        token: Option<&str>,
        database: &str,
        raw_queries: &[Value],
    ) -> AppResult<BatchResponse> {
        let started = Instant::now();
        self.verifier.verify(token)?;

        let batch = deduplicate(raw_queries, database, &self.resolver)?;
        if batch.is_empty() {
            return Ok(BatchResponse::empty(database));
        }

        let resolved = self.resolver.resolve(database)?;
        let executions = batch.unique_queries().iter().map(|query| {
            execute_single(&resolved, &self.cache, query, self.next_query_id())
        });
        let results = join_all(executions).await;

        let response = aggregate(Some(results), &batch)?
            .for_database(resolved.name)
            .with_elapsed_ms(started.elapsed().as_millis() as u64);

        tracing::info!(
            database = resolved.name,
            total = batch.len(),
            unique = batch.unique_queries().len(),
            status = response.http_status,
            elapsed_ms = response.total_execution_time_ms,
            "批次处理完成"
        );
        Ok(response)
    }

    /// 单条查询按大小为 1 的批次处理
    pub async fn handle_single(
        &self,
        token: Option<&str>,
        database: &str,
        query_ref: i64,
        params: Option<Value>,
    ) -> AppResult<BatchResponse> {
        let mut entry = serde_json::Map::new();
        entry.insert("query_ref".to_string(), Value::from(query_ref));
        if let Some(params) = params {
            entry.insert("params".to_string(), params);
        }
        self.handle_batch(token, database, &[Value::Object(entry)])
            .await
    }

    /// 形如 `conduit_{counter}_{unix}`
    fn next_query_id(&self) -> String {
        let counter = self.query_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("conduit_{}_{}", counter, chrono::Utc::now().timestamp())
    }
}
