//! 响应模型
//!
//! 单条查询结果 `PerQueryResult` 与批次响应 `BatchResponse`。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DUPLICATE_QUERY_ERROR: &str = "Duplicate query";
pub const INVALID_MAPPING_ERROR: &str = "Internal error: invalid query mapping";

/// 单条查询的错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    RateLimit,
    DatabaseNotFound,
    ValidationError,
    AuthError,
    NotFound,
    DatabaseError,
    Duplicate,
    InternalMappingError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::DatabaseNotFound => "DATABASE_NOT_FOUND",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::AuthError => "AUTH_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::DatabaseError => "DATABASE_ERROR",
            ErrorKind::Duplicate => "DUPLICATE",
            ErrorKind::InternalMappingError => "INTERNAL_MAPPING_ERROR",
        }
    }

    /// 该错误对应的 HTTP 状态码；不影响批次状态的分类返回 `None`
    pub fn http_status(self) -> Option<u16> {
        match self {
            ErrorKind::RateLimit => Some(429),
            ErrorKind::AuthError => Some(401),
            ErrorKind::ValidationError => Some(400),
            ErrorKind::NotFound | ErrorKind::DatabaseNotFound => Some(404),
            ErrorKind::DatabaseError => Some(422),
            ErrorKind::Duplicate | ErrorKind::InternalMappingError => None,
        }
    }

    /// 批次状态优先级，数值越大越优先
    pub fn priority(self) -> u8 {
        match self {
            ErrorKind::RateLimit => 5,
            ErrorKind::AuthError => 4,
            ErrorKind::ValidationError => 3,
            ErrorKind::NotFound | ErrorKind::DatabaseNotFound => 2,
            ErrorKind::DatabaseError => 1,
            ErrorKind::Duplicate | ErrorKind::InternalMappingError => 0,
        }
    }
}

/// 单条查询结果
///
/// 成功时的查询数据（rows、row_count 等）平铺在 `payload` 中。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerQueryResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl PerQueryResult {
    pub fn succeeded(payload: Map<String, Value>) -> Self {
        Self {
            success: true,
            error: None,
            error_kind: None,
            message: None,
            payload,
        }
    }

    pub fn failed(kind: ErrorKind, error: impl Into<String>, message: Option<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            error_kind: Some(kind),
            message,
            payload: Map::new(),
        }
    }

    /// 重复查询标记
    pub fn duplicate() -> Self {
        Self::failed(ErrorKind::Duplicate, DUPLICATE_QUERY_ERROR, None)
    }

    /// 无效映射标记（批次元素非法，或映射越界）
    pub fn invalid_mapping() -> Self {
        Self::failed(ErrorKind::InternalMappingError, INVALID_MAPPING_ERROR, None)
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }
}

/// 批次响应
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResponse {
    pub success: bool,
    pub results: Vec<PerQueryResult>,
    pub database: String,
    pub total_execution_time_ms: u64,
    #[serde(skip)]
    pub http_status: u16,
}

impl BatchResponse {
    pub fn new(results: Vec<PerQueryResult>, http_status: u16) -> Self {
        Self {
            success: http_status == 200,
            results,
            database: String::new(),
            total_execution_time_ms: 0,
            http_status,
        }
    }

    /// 空批次：无结果，200
    pub fn empty(database: &str) -> Self {
        Self::new(Vec::new(), 200).for_database(database)
    }

    pub fn for_database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.total_execution_time_ms = elapsed_ms;
        self
    }
}
