//! 批次去重
//!
//! 把客户端批次规整为唯一执行集合加逐位置的槽位映射。以 `query_ref` 为键，
//! 首次出现的查询进入执行集合，后续重复项指向它；非法元素记为 `Invalid`，不会中断批次。

use serde_json::Value;
use std::collections::HashMap;

use super::resolver::DatabaseResolver;
use crate::core::error::{AppResult, ConduitError};
use crate::models::RawQuery;

/// 原批次中一个位置的归属
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// 首次出现，执行第 k 条唯一查询
    Canonical(usize),
    /// 重复出现，对应第 k 条唯一查询
    DuplicateOf(usize),
    /// 非对象或缺少整数 `query_ref`
    Invalid,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalBatch {
    unique_queries: Vec<RawQuery>,
    slots: Vec<Slot>,
}

impl CanonicalBatch {
    pub fn unique_queries(&self) -> &[RawQuery] {
        &self.unique_queries
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// 原批次长度
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 原位置对应的唯一查询下标，非法位置为 `None`
    pub fn mapping(&self, index: usize) -> Option<usize> {
        match self.slots.get(index)? {
            Slot::Canonical(k) | Slot::DuplicateOf(k) => Some(*k),
            Slot::Invalid => None,
        }
    }

    /// 重复项与非法项都不单独执行
    pub fn is_duplicate(&self, index: usize) -> bool {
        matches!(
            self.slots.get(index),
            Some(Slot::DuplicateOf(_)) | Some(Slot::Invalid)
        )
    }
}

/// 规整批次并检查唯一查询数上限
///
/// 所有逐位置存储一次性预留，预留失败时返回错误，已构建的部分随之释放。
pub fn canonicalize(raw_batch: &[Value], max_queries: usize) -> AppResult<CanonicalBatch> {
    let mut slots: Vec<Slot> = Vec::new();
    slots.try_reserve_exact(raw_batch.len())?;
    let mut unique_queries: Vec<RawQuery> = Vec::new();
    unique_queries.try_reserve_exact(raw_batch.len())?;
    let mut first_seen: HashMap<i64, usize> = HashMap::new();
    first_seen.try_reserve(raw_batch.len())?;

    for (index, entry) in raw_batch.iter().enumerate() {
        let Some(query) = RawQuery::from_value(entry) else {
            tracing::debug!(index, "批次元素非法，已标记");
            slots.push(Slot::Invalid);
            continue;
        };

        match first_seen.get(&query.query_ref) {
            Some(&canonical) => slots.push(Slot::DuplicateOf(canonical)),
            None => {
                let canonical = unique_queries.len();
                first_seen.insert(query.query_ref, canonical);
                unique_queries.push(query);
                slots.push(Slot::Canonical(canonical));
            }
        }
    }

    if unique_queries.len() > max_queries {
        return Err(ConduitError::RateLimit {
            unique: unique_queries.len(),
            max: max_queries,
        });
    }

    Ok(CanonicalBatch {
        unique_queries,
        slots,
    })
}

/// 完整的去重流程：空批次直接返回，数据库必须先解析成功才处理任何查询
pub fn deduplicate(
    raw_batch: &[Value],
    database: &str,
    resolver: &DatabaseResolver,
) -> AppResult<CanonicalBatch> {
    if raw_batch.is_empty() {
        return Ok(CanonicalBatch::default());
    }

    let resolved = resolver.resolve(database)?;
    let batch = canonicalize(raw_batch, resolved.max_queries)?;

    tracing::debug!(
        database = resolved.name,
        total = batch.len(),
        unique = batch.unique_queries().len(),
        "批次去重完成"
    );
    Ok(batch)
}
