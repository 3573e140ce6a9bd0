//! 单条查询执行
//!
//! 一条唯一查询依次经过 解析 → 校验 → 提交 三个阶段，任一阶段失败都只产生
//! 该查询自己的失败结果，不影响同批次的其他查询。不做重试。

use serde_json::{Map, Value};

use super::params::validate_and_convert;
use super::resolver::ResolvedDatabase;
use crate::data::cache::QueryCache;
use crate::models::{ErrorKind, PerQueryResult, RawQuery};
use crate::services::queue::QueryRequest;

pub const VALIDATION_FAILED: &str = "Parameter validation failed";
pub const QUERY_NOT_FOUND: &str = "Query not found";
pub const TEMPLATE_LOAD_FAILED: &str = "Database error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStage {
    Parsing,
    Validating,
    Submitting,
    Done,
}

impl ExecutionStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStage::Parsing => "parsing",
            ExecutionStage::Validating => "validating",
            ExecutionStage::Submitting => "submitting",
            ExecutionStage::Done => "done",
        }
    }
}

/// 执行一条唯一查询
pub async fn execute_single(
    resolved: &ResolvedDatabase<'_>,
    cache: &QueryCache,
    query: &RawQuery,
    query_id: String,
) -> PerQueryResult {
    let query_ref = query.query_ref;
    let fail = |stage: ExecutionStage, kind: ErrorKind, error: &str, message: Option<String>| {
        tracing::debug!(
            query_id = %query_id,
            query_ref,
            stage = stage.as_str(),
            error_kind = kind.as_str(),
            "查询失败"
        );
        PerQueryResult::failed(kind, error, message).with_field("query_ref", query_ref)
    };

    // 批次规整阶段已保证 query_ref 为整数，参数结构由校验阶段检查
    tracing::trace!(
        query_id = %query_id,
        query_ref,
        stage = ExecutionStage::Parsing.as_str(),
        has_params = query.params.is_some(),
        "开始执行查询"
    );
    let params = query.params.as_ref();

    let template = match cache
        .get_or_load(resolved.name, query_ref, resolved.templates.as_ref())
        .await
    {
        Ok(Some(template)) => template,
        Ok(None) => {
            return fail(
                ExecutionStage::Validating,
                ErrorKind::NotFound,
                QUERY_NOT_FOUND,
                Some(format!(
                    "Query {query_ref} not found in database {}",
                    resolved.name
                )),
            )
        }
        Err(e) => {
            tracing::error!(query_ref, database = resolved.name, error = %e, "加载 SQL 模板失败");
            return fail(
                ExecutionStage::Validating,
                ErrorKind::DatabaseError,
                TEMPLATE_LOAD_FAILED,
                Some(e.to_string()),
            );
        }
    };

    let (report, converted) =
        validate_and_convert(Some(&template.sql_text), params, resolved.dialect);
    let Some(converted) = converted.filter(|_| report.is_empty()) else {
        return fail(
            ExecutionStage::Validating,
            ErrorKind::ValidationError,
            VALIDATION_FAILED,
            Some(report.to_message()),
        );
    };

    let request = QueryRequest {
        query_id: query_id.clone(),
        sql: converted.sql,
        params: converted.params,
        queue_type: template.queue_type.clone(),
        timeout: template.timeout.unwrap_or(resolved.default_timeout),
    };

    tracing::debug!(
        query_id = %query_id,
        query_ref,
        stage = ExecutionStage::Submitting.as_str(),
        queue = %request.queue_type,
        "提交查询"
    );

    match resolved.queue.submit(request).await {
        Ok(outcome) => {
            let mut payload = Map::new();
            payload.insert("query_ref".to_string(), Value::from(query_ref));
            payload.insert(
                "description".to_string(),
                Value::String(template.description.clone()),
            );
            payload.insert("row_count".to_string(), Value::from(outcome.rows.len()));
            payload.insert(
                "column_count".to_string(),
                Value::from(outcome.columns.len()),
            );
            payload.insert(
                "rows".to_string(),
                Value::Array(outcome.rows.into_iter().map(Value::Object).collect()),
            );
            payload.insert(
                "execution_time_ms".to_string(),
                Value::from(outcome.execution_time_ms),
            );
            payload.insert("queue_used".to_string(), Value::String(outcome.queue_used));

            tracing::debug!(
                query_id = %query_id,
                query_ref,
                stage = ExecutionStage::Done.as_str(),
                "查询完成"
            );
            PerQueryResult::succeeded(payload)
        }
        Err(e) => fail(
            ExecutionStage::Submitting,
            e.category.error_kind(),
            e.category.error_label(),
            Some(e.message),
        ),
    }
}
