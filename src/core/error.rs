//! 请求级错误类型
//!
//! `ConduitError` 表示会让整个批次短路的失败（不产生逐条查询结果）。
//! 单条查询的失败不走这里，而是记录在 `PerQueryResult` 中，不影响同批次的其他查询。

use std::collections::TryReserveError;

use hyper::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;

use crate::data::DataError;

#[derive(Error, Debug)]
pub enum ConduitError {
    /// 数据库名无法解析到已启用的连接
    #[error("Database '{0}' not found or disabled")]
    DatabaseNotFound(String),

    /// 去重后的唯一查询数超过数据库上限
    #[error("Query limit of {max} unique queries per request exceeded")]
    RateLimit { unique: usize, max: usize },

    /// 请求格式错误
    #[error("{0}")]
    InvalidRequest(String),

    /// 令牌缺失或校验失败
    #[error("{0}")]
    Unauthorized(String),

    /// 请求体超过上限
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// 预留内存失败
    #[error("内存分配失败: {0}")]
    Allocation(#[from] TryReserveError),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 配置文件解析错误
    #[error("TOML 反序列化错误: {0}")]
    Toml(#[from] toml::de::Error),

    /// 数据层错误
    #[error(transparent)]
    Data(#[from] DataError),
}

pub type AppResult<T> = std::result::Result<T, ConduitError>;

impl ConduitError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseNotFound(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Allocation(_) | Self::Config(_) | Self::Toml(_) | Self::Data(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 返回给客户端的错误标题
    pub fn error_label(&self) -> &'static str {
        match self {
            Self::DatabaseNotFound(_) => "Invalid database",
            Self::RateLimit { .. } => "Rate limit exceeded",
            Self::InvalidRequest(_) => "Invalid request",
            Self::Unauthorized(_) => "Authentication failed",
            Self::PayloadTooLarge { .. } => "Payload too large",
            Self::Allocation(_) | Self::Config(_) | Self::Toml(_) | Self::Data(_) => {
                "Internal server error"
            }
        }
    }

    /// 错误响应体 `{ success: false, error, message }`
    ///
    /// 内部错误不向客户端暴露细节。
    pub fn to_json(&self) -> Value {
        let message = match self {
            Self::Allocation(_) | Self::Config(_) | Self::Toml(_) | Self::Data(_) => {
                "Internal error while processing request".to_string()
            }
            other => other.to_string(),
        };
        json!({
            "success": false,
            "error": self.error_label(),
            "message": message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_response() {
        let err = ConduitError::RateLimit { unique: 4, max: 3 };
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let body = err.to_json();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Rate limit exceeded");
        assert_eq!(
            body["message"],
            "Query limit of 3 unique queries per request exceeded"
        );
    }

    #[test]
    fn test_database_not_found_is_bad_request() {
        let err = ConduitError::DatabaseNotFound("missing".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_json()["error"], "Invalid database");
    }

    #[test]
    fn test_allocation_error_hides_details() {
        let reserve_err = Vec::<u8>::new().try_reserve(usize::MAX).unwrap_err();
        let err: ConduitError = reserve_err.into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_json()["message"],
            "Internal error while processing request"
        );
    }

    #[test]
    fn test_data_error_conversion() {
        let err: ConduitError = DataError::NotFound("queries".to_string()).into();
        assert!(matches!(err, ConduitError::Data(_)));
        assert!(err.to_string().contains("queries"));
    }

    #[test]
    fn test_anyhow_conversion() {
        let err = ConduitError::config("端口不能为空");
        let anyhow_err: anyhow::Error = err.into();
        assert!(anyhow_err.to_string().contains("配置错误"));
    }
}
