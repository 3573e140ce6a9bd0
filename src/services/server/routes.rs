//! 路由与请求解析
//!
//! - `POST /api/conduit/queries`: 批次查询 `{ token?, database, queries: [...] }`
//! - `GET  /api/conduit/query`: 单条查询，参数来自查询串
//! - `POST /api/conduit/query`: 单条查询 `{ token?, database, query_ref, params? }`
//! - `GET  /api/conduit/health`: 健康检查
//!
//! 令牌优先取请求体中的 `token`，其次是 `Authorization: Bearer`，最后是查询串 `token`。

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::AUTHORIZATION;
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};
use std::convert::Infallible;
use std::sync::Arc;

use super::utils::responses::{
    batch_response, error_response, json_response, method_not_allowed, not_found,
};
use super::utils::BoxBody;
use crate::core::error::{AppResult, ConduitError};
use crate::models::ParamType;
use crate::services::conduit::ConduitService;

pub const BATCH_PATH: &str = "/api/conduit/queries";
pub const SINGLE_PATH: &str = "/api/conduit/query";
pub const HEALTH_PATH: &str = "/api/conduit/health";

#[derive(Debug, Deserialize)]
struct BatchRequestBody {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    queries: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct SingleRequestBody {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    query_ref: Option<Value>,
    #[serde(default)]
    params: Option<Value>,
}

/// 处理单个请求，错误统一转成 JSON 错误响应
pub async fn handle_request<B>(
    req: Request<B>,
    service: Arc<ConduitService>,
    max_body_bytes: usize,
) -> Result<Response<BoxBody>, Infallible>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match handle_request_inner(req, &service, max_body_bytes).await {
        Ok(response) => {
            tracing::debug!(%method, %path, status = response.status().as_u16(), "请求完成");
            Ok(response)
        }
        Err(e) => {
            if e.status_code().is_server_error() {
                tracing::error!(%method, %path, error = %e, "请求处理失败");
            } else {
                tracing::info!(%method, %path, error = %e, "请求被拒绝");
            }
            Ok(error_response(&e))
        }
    }
}

async fn handle_request_inner<B>(
    req: Request<B>,
    service: &ConduitService,
    max_body_bytes: usize,
) -> AppResult<Response<BoxBody>>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let path = req.uri().path().to_string();
    match (req.method(), path.as_str()) {
        (&Method::POST, BATCH_PATH) => handle_batch_post(req, service, max_body_bytes).await,
        (&Method::GET, SINGLE_PATH) => handle_single_get(req, service).await,
        (&Method::POST, SINGLE_PATH) => handle_single_post(req, service, max_body_bytes).await,
        (&Method::GET, HEALTH_PATH) => Ok(json_response(
            StatusCode::OK,
            &json!({"status": "ok", "databases": service.resolver().names()}),
        )),
        (_, BATCH_PATH | SINGLE_PATH | HEALTH_PATH) => Ok(method_not_allowed()),
        _ => Ok(not_found()),
    }
}

async fn handle_batch_post<B>(
    req: Request<B>,
    service: &ConduitService,
    max_body_bytes: usize,
) -> AppResult<Response<BoxBody>>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let header_token = bearer_token(&req);
    let body: BatchRequestBody = read_json(req.into_body(), max_body_bytes).await?;

    let database = require_database(body.database)?;
    let queries = match body.queries {
        Some(Value::Array(queries)) => queries,
        _ => return Err(ConduitError::invalid_request("queries must be an array")),
    };
    let token = body.token.or(header_token);

    let response = service
        .handle_batch(token.as_deref(), &database, &queries)
        .await?;
    Ok(batch_response(&response))
}

async fn handle_single_post<B>(
    req: Request<B>,
    service: &ConduitService,
    max_body_bytes: usize,
) -> AppResult<Response<BoxBody>>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let header_token = bearer_token(&req);
    let body: SingleRequestBody = read_json(req.into_body(), max_body_bytes).await?;

    let database = require_database(body.database)?;
    let query_ref = body
        .query_ref
        .as_ref()
        .and_then(Value::as_i64)
        .ok_or_else(|| ConduitError::invalid_request("query_ref must be an integer"))?;
    let token = body.token.or(header_token);

    let response = service
        .handle_single(token.as_deref(), &database, query_ref, body.params)
        .await?;
    Ok(batch_response(&response))
}

async fn handle_single_get<B>(
    req: Request<B>,
    service: &ConduitService,
) -> AppResult<Response<BoxBody>> {
    let header_token = bearer_token(&req);
    let query = parse_single_query(req.uri().query().unwrap_or(""))?;

    let database = require_database(query.database)?;
    let query_ref = query
        .query_ref
        .as_ref()
        .and_then(Value::as_i64)
        .ok_or_else(|| ConduitError::invalid_request("query_ref must be an integer"))?;
    let token = header_token.or(query.token);

    let response = service
        .handle_single(token.as_deref(), &database, query_ref, query.params)
        .await?;
    Ok(batch_response(&response))
}

fn require_database(database: Option<String>) -> AppResult<String> {
    database
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| ConduitError::invalid_request("database is required"))
}

fn bearer_token<B>(req: &Request<B>) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

/// 读取并解析 JSON 请求体，超过上限返回 413
async fn read_json<B, T>(body: B, limit: usize) -> AppResult<T>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    T: serde::de::DeserializeOwned,
{
    let bytes = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(ConduitError::PayloadTooLarge { limit })
        }
        Err(e) => {
            return Err(ConduitError::invalid_request(format!(
                "Failed to read request body: {e}"
            )))
        }
    };

    serde_json::from_slice(&bytes)
        .map_err(|e| ConduitError::invalid_request(format!("Invalid JSON body: {e}")))
}

/// GET 查询串
///
/// 参数既可以是 `params=<json>`，也可以平铺为 `TYPE.name=value`（如 `INTEGER.userId=5`），
/// 两者同时出现时平铺的值覆盖 JSON 中的同名参数。
fn parse_single_query(query: &str) -> AppResult<SingleRequestBody> {
    let mut parsed = SingleRequestBody::default();
    let mut flattened: Map<String, Value> = Map::new();

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "database" => parsed.database = Some(value.into_owned()),
            "token" => parsed.token = Some(value.into_owned()),
            "query_ref" => {
                parsed.query_ref = Some(
                    value
                        .trim()
                        .parse::<i64>()
                        .map(Value::from)
                        .unwrap_or_else(|_| Value::String(value.into_owned())),
                )
            }
            "params" => {
                let params: Value = serde_json::from_str(&value).map_err(|e| {
                    ConduitError::invalid_request(format!("params must be valid JSON: {e}"))
                })?;
                parsed.params = Some(params);
            }
            other => {
                let Some((bucket, name)) = other.split_once('.') else {
                    continue;
                };
                if bucket.is_empty() || name.is_empty() {
                    continue;
                }
                let entry = flattened
                    .entry(bucket.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(entry) = entry {
                    entry.insert(name.to_string(), typed_query_value(bucket, &value));
                }
            }
        }
    }

    if !flattened.is_empty() {
        let mut params = match parsed.params.take() {
            Some(Value::Object(params)) => params,
            Some(other) => {
                // 非对象的 params 交给参数校验报错
                parsed.params = Some(other);
                return Ok(parsed);
            }
            None => Map::new(),
        };
        for (bucket, entries) in flattened {
            let Value::Object(entries) = entries else {
                continue;
            };
            match params.get_mut(&bucket) {
                Some(Value::Object(existing)) => existing.extend(entries),
                _ => {
                    params.insert(bucket, Value::Object(entries));
                }
            }
        }
        parsed.params = Some(Value::Object(params));
    }

    Ok(parsed)
}

/// 按桶类型把查询串中的字符串转换为 JSON 值，转换失败时保留字符串，由参数校验报告类型错误
fn typed_query_value(bucket: &str, raw: &str) -> Value {
    let as_string = || Value::String(raw.to_string());
    match ParamType::from_bucket(bucket) {
        Some(ParamType::Integer) => raw.parse::<i64>().map(Value::from).unwrap_or_else(|_| as_string()),
        Some(ParamType::Float) => raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(as_string),
        Some(ParamType::Boolean) => match raw {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => as_string(),
        },
        _ => as_string(),
    }
}
