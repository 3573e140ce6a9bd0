//! JSON 响应构建

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::json;

use super::body::{full_body, BoxBody};
use crate::core::error::ConduitError;
use crate::models::BatchResponse;

pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<BoxBody> {
    let body = match serde_json::to_vec(value) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "序列化响应失败");
            return internal_error();
        }
    };

    let mut response = Response::new(full_body(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// 批次响应，状态码取聚合结果
pub fn batch_response(batch: &BatchResponse) -> Response<BoxBody> {
    let status =
        StatusCode::from_u16(batch.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_response(status, batch)
}

pub fn error_response(err: &ConduitError) -> Response<BoxBody> {
    json_response(err.status_code(), &err.to_json())
}

pub fn not_found() -> Response<BoxBody> {
    json_response(
        StatusCode::NOT_FOUND,
        &json!({"success": false, "error": "Not found"}),
    )
}

pub fn method_not_allowed() -> Response<BoxBody> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &json!({"success": false, "error": "Method not allowed"}),
    )
}

pub fn internal_error() -> Response<BoxBody> {
    let mut response = Response::new(full_body(
        r#"{"success":false,"error":"Internal server error"}"#,
    ));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_status() {
        let response = error_response(&ConduitError::RateLimit { unique: 11, max: 10 });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_batch_response_uses_aggregated_status() {
        let batch = BatchResponse::new(Vec::new(), 422);
        assert_eq!(
            batch_response(&batch).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_static_responses() {
        assert_eq!(not_found().status(), StatusCode::NOT_FOUND);
        assert_eq!(method_not_allowed().status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(internal_error().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
