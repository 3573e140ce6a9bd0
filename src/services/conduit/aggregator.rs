//! 响应聚合
//!
//! 把唯一查询的结果按槽位展开回原批次顺序，并计算整体状态码：
//! RATE_LIMIT(429) > AUTH_ERROR(401) > VALIDATION_ERROR(400) > NOT_FOUND(404) > DATABASE_ERROR(422) > 200。
//! 重复标记与无效映射标记不影响状态码。

use super::dedup::{CanonicalBatch, Slot};
use crate::core::error::AppResult;
use crate::models::{BatchResponse, PerQueryResult};

/// 没有任何唯一查询结果时的状态码
pub const MISSING_RESULTS_STATUS: u16 = 500;

/// 展开结果并计算状态
///
/// `canonical_results` 为 `None`，或存在唯一查询却没有任何结果时，状态为 500，
/// 每个位置仍会得到一个无效映射标记。全部元素都非法的批次没有唯一查询，
/// 只展开标记，状态为 200。
pub fn aggregate(
    canonical_results: Option<Vec<PerQueryResult>>,
    batch: &CanonicalBatch,
) -> AppResult<BatchResponse> {
    let mut results: Vec<PerQueryResult> = Vec::new();
    results.try_reserve_exact(batch.len())?;

    let missing = match &canonical_results {
        None => true,
        Some(results) => results.is_empty() && !batch.unique_queries().is_empty(),
    };
    if missing {
        tracing::error!(slots = batch.len(), "没有可聚合的查询结果");
        results.extend(std::iter::repeat_with(PerQueryResult::invalid_mapping).take(batch.len()));
        return Ok(BatchResponse::new(results, MISSING_RESULTS_STATUS));
    }

    let mut canonical: Vec<Option<PerQueryResult>> = canonical_results
        .unwrap_or_default()
        .into_iter()
        .map(Some)
        .collect();

    for (index, slot) in batch.slots().iter().enumerate() {
        let result = match *slot {
            Slot::Canonical(k) => canonical.get_mut(k).and_then(Option::take),
            Slot::DuplicateOf(_) => Some(PerQueryResult::duplicate()),
            Slot::Invalid => None,
        };
        results.push(result.unwrap_or_else(|| {
            tracing::warn!(index, ?slot, "查询映射无效");
            PerQueryResult::invalid_mapping()
        }));
    }

    let status = overall_status(&results);
    Ok(BatchResponse::new(results, status))
}

/// 取优先级最高的错误对应的状态码，没有影响状态的错误时为 200
pub fn overall_status(results: &[PerQueryResult]) -> u16 {
    results
        .iter()
        .filter_map(|r| r.error_kind)
        .filter(|kind| kind.http_status().is_some())
        .max_by_key(|kind| kind.priority())
        .and_then(|kind| kind.http_status())
        .unwrap_or(200)
}
