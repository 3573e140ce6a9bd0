//! 完整流程测试
//!
//! SQLite 数据库放在 tempfile::TempDir 中，模板来自模板表；
//! PostgreSQL 方言使用记录 SQL 的内存队列。

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use super::gateway::ConduitService;
use super::resolver::DatabaseResolver;
use crate::core::error::ConduitError;
use crate::data::cache::QueryCache;
use crate::data::managers::{InlineTemplates, SqliteDatabase, SqliteTemplateStore};
use crate::models::{DatabaseConfig, Dialect, ErrorKind, SqlTemplate};
use crate::services::auth::StaticTokenVerifier;
use crate::services::queue::{
    QueryOutcome, QueryQueue, QueryRequest, QueueError, QueueErrorCategory, SqliteQueue,
};

const TOKEN: &str = "test-token";

/// 记录收到的 SQL，按 SQL 内容决定返回值
#[derive(Default)]
struct RecordingQueue {
    submitted: Mutex<Vec<QueryRequest>>,
}

#[async_trait]
impl QueryQueue for RecordingQueue {
    fn engine(&self) -> Dialect {
        Dialect::Postgresql
    }

    async fn submit(&self, request: QueryRequest) -> Result<QueryOutcome, QueueError> {
        self.submitted.lock().unwrap().push(request.clone());
        if request.sql.contains("throttle") {
            return Err(QueueError::new(QueueErrorCategory::Throttled, "busy"));
        }
        if request.sql.contains("forbidden") {
            return Err(QueueError::new(QueueErrorCategory::Auth, "permission denied"));
        }
        Ok(QueryOutcome {
            columns: vec!["ok".to_string()],
            rows: vec![json!({"ok": true}).as_object().cloned().unwrap()],
            execution_time_ms: 1,
            queue_used: request.queue_type,
        })
    }
}

struct Fixture {
    _dir: TempDir,
    service: ConduitService,
    recorder: Arc<RecordingQueue>,
}

fn pg_template(query_ref: i64, sql: &str) -> SqlTemplate {
    SqlTemplate {
        query_ref,
        database: "warehouse".to_string(),
        dialect: Dialect::Postgresql,
        sql_text: sql.to_string(),
        description: format!("pg {query_ref}"),
        queue_type: "slow".to_string(),
        timeout: None,
    }
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let db = SqliteDatabase::open(&dir.path().join("app.db")).unwrap();
    db.execute_raw(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, active INTEGER);
         INSERT INTO users VALUES (1, 'alice', 1), (2, 'bob', 0), (3, 'carol', 1);
         CREATE TABLE queries (
             query_ref INTEGER PRIMARY KEY,
             sql_template TEXT NOT NULL,
             description TEXT,
             queue_type TEXT,
             timeout_seconds INTEGER
         );
         INSERT INTO queries VALUES
             (1, 'SELECT id, name FROM users WHERE id = :userId', '用户详情', 'fast', NULL),
             (2, 'SELECT COUNT(*) AS total FROM users WHERE active = :active', '活跃用户数', 'medium', NULL),
             (3, 'SELECT name FROM users ORDER BY id', '全部用户', 'slow', NULL);",
    )
    .unwrap();

    let mut app = DatabaseConfig::new("app", Dialect::Sqlite);
    app.connection_name = Some("Application".to_string());
    app.max_queries_per_request = 3;
    let store = SqliteTemplateStore::new(db.clone(), "queries", "app", Dialect::Sqlite).unwrap();
    let queue = SqliteQueue::new(db, 4, Duration::from_secs(1));

    let mut pg_templates = InlineTemplates::new();
    pg_templates.insert(pg_template(10, "SELECT * FROM t WHERE a = :a AND b = :b OR a = :a"));
    pg_templates.insert(pg_template(11, "SELECT throttle"));
    pg_templates.insert(pg_template(12, "SELECT :x"));
    pg_templates.insert(pg_template(13, "SELECT forbidden"));
    let recorder = Arc::new(RecordingQueue::default());

    let mut resolver = DatabaseResolver::new();
    resolver
        .register(app, Arc::new(queue), Arc::new(store))
        .unwrap();
    resolver
        .register(
            DatabaseConfig::new("warehouse", Dialect::Postgresql),
            recorder.clone(),
            Arc::new(pg_templates),
        )
        .unwrap();

    let service = ConduitService::new(
        Arc::new(resolver),
        Arc::new(QueryCache::default()),
        Arc::new(StaticTokenVerifier::new([TOKEN])),
    );

    Fixture {
        _dir: dir,
        service,
        recorder,
    }
}

#[tokio::test]
async fn test_batch_with_duplicates_and_invalid_entries() {
    let f = fixture();
    let queries = vec![
        json!({"query_ref": 1, "params": {"INTEGER": {"userId": 2}}}),
        json!({"query_ref": 2, "params": {"BOOLEAN": {"active": true}}}),
        json!({"query_ref": 1, "params": {"INTEGER": {"userId": 3}}}),
        json!({"not": "a query"}),
    ];

    let response = f
        .service
        .handle_batch(Some(TOKEN), "app", &queries)
        .await
        .unwrap();

    assert_eq!(response.http_status, 200);
    assert_eq!(response.database, "app");
    assert_eq!(response.results.len(), 4);
    assert_eq!(response.results[0].payload["rows"], json!([{"id": 2, "name": "bob"}]));
    assert_eq!(response.results[1].payload["rows"], json!([{"total": 2}]));
    assert_eq!(response.results[2].error_kind, Some(ErrorKind::Duplicate));
    assert_eq!(
        response.results[3].error_kind,
        Some(ErrorKind::InternalMappingError)
    );
    assert_eq!(f.service.cache().len(), 2);
}

#[tokio::test]
async fn test_alias_resolves_to_canonical_name() {
    let f = fixture();
    let response = f
        .service
        .handle_batch(Some(TOKEN), "Application", &[json!({"query_ref": 3})])
        .await
        .unwrap();
    assert_eq!(response.database, "app");
    assert_eq!(response.results[0].payload["row_count"], 3);
    assert_eq!(response.results[0].payload["queue_used"], "slow");
}

#[tokio::test]
async fn test_empty_batch() {
    let f = fixture();
    let response = f
        .service
        .handle_batch(Some(TOKEN), "does-not-matter", &[])
        .await
        .unwrap();
    assert_eq!(response.http_status, 200);
    assert!(response.results.is_empty());
    assert!(response.success);
}

#[tokio::test]
async fn test_all_invalid_entries_keep_status_ok() {
    let f = fixture();
    let response = f
        .service
        .handle_batch(Some(TOKEN), "app", &[json!({"query_ref": "x"}), json!(5)])
        .await
        .unwrap();

    assert_eq!(response.http_status, 200);
    assert!(response.success);
    assert_eq!(response.database, "app");
    assert_eq!(response.results.len(), 2);
    for result in &response.results {
        assert_eq!(result.error_kind, Some(ErrorKind::InternalMappingError));
    }
    assert!(f.service.cache().is_empty());
}

#[tokio::test]
async fn test_rate_limit_counts_unique_queries() {
    let f = fixture();
    let within: Vec<Value> = [1, 2, 3, 1, 2, 3]
        .iter()
        .map(|r| json!({"query_ref": r, "params": null}))
        .collect();
    let response = f
        .service
        .handle_batch(Some(TOKEN), "app", &within)
        .await
        .unwrap();
    assert_eq!(response.results.len(), 6);

    let over: Vec<Value> = (1..=4).map(|r| json!({"query_ref": r})).collect();
    let err = f
        .service
        .handle_batch(Some(TOKEN), "app", &over)
        .await
        .unwrap_err();
    assert!(matches!(err, ConduitError::RateLimit { unique: 4, max: 3 }));
}

#[tokio::test]
async fn test_unknown_database() {
    let f = fixture();
    let err = f
        .service
        .handle_batch(Some(TOKEN), "nope", &[json!({"query_ref": 1})])
        .await
        .unwrap_err();
    assert!(matches!(err, ConduitError::DatabaseNotFound(_)));
}

#[tokio::test]
async fn test_token_required() {
    let f = fixture();
    let err = f
        .service
        .handle_batch(None, "app", &[json!({"query_ref": 1})])
        .await
        .unwrap_err();
    assert!(matches!(err, ConduitError::Unauthorized(_)));
}

#[tokio::test]
async fn test_validation_error_does_not_abort_siblings() {
    let f = fixture();
    let response = f
        .service
        .handle_batch(
            Some(TOKEN),
            "app",
            &[
                json!({"query_ref": 1, "params": {"INTEGER": {"userId": "2"}}}),
                json!({"query_ref": 3}),
            ],
        )
        .await
        .unwrap();

    assert_eq!(response.http_status, 400);
    assert_eq!(
        response.results[0].message.as_deref(),
        Some("userId(string) is not userId(INTEGER)")
    );
    assert!(response.results[1].success);
}

#[tokio::test]
async fn test_boolean_in_integer_bucket_is_rejected() {
    let f = fixture();
    let response = f
        .service
        .handle_batch(
            Some(TOKEN),
            "app",
            &[json!({"query_ref": 1, "params": {"INTEGER": {"userId": true}}})],
        )
        .await
        .unwrap();

    assert_eq!(response.http_status, 400);
    assert_eq!(
        response.results[0].message.as_deref(),
        Some("userId(boolean) is not userId(INTEGER)")
    );
}

#[tokio::test]
async fn test_postgres_conversion_reaches_queue() {
    let f = fixture();
    let response = f
        .service
        .handle_batch(
            Some(TOKEN),
            "warehouse",
            &[json!({"query_ref": 10, "params": {"INTEGER": {"a": 1}, "FLOAT": {"b": 2.5}}})],
        )
        .await
        .unwrap();
    assert_eq!(response.http_status, 200);

    let submitted = f.recorder.submitted.lock().unwrap();
    assert_eq!(submitted.len(), 1);
    assert_eq!(
        submitted[0].sql,
        "SELECT * FROM t WHERE a = $1 AND b = $2 OR a = $1"
    );
    assert_eq!(submitted[0].params.len(), 2);
    assert!(submitted[0].query_id.starts_with("conduit_"));
    assert_eq!(submitted[0].timeout, Duration::from_secs(30));
}

#[tokio::test]
async fn test_status_priority_across_queries() {
    let f = fixture();
    let response = f
        .service
        .handle_batch(
            Some(TOKEN),
            "warehouse",
            &[
                json!({"query_ref": 12}),
                json!({"query_ref": 13}),
                json!({"query_ref": 11}),
                json!({"query_ref": 99}),
            ],
        )
        .await
        .unwrap();

    assert_eq!(response.results[0].error_kind, Some(ErrorKind::ValidationError));
    assert_eq!(response.results[1].error_kind, Some(ErrorKind::AuthError));
    assert_eq!(response.results[2].error_kind, Some(ErrorKind::RateLimit));
    assert_eq!(response.results[3].error_kind, Some(ErrorKind::NotFound));
    assert_eq!(response.http_status, 429);

    let response = f
        .service
        .handle_batch(
            Some(TOKEN),
            "warehouse",
            &[json!({"query_ref": 12}), json!({"query_ref": 13})],
        )
        .await
        .unwrap();
    assert_eq!(response.http_status, 401);
}

#[tokio::test]
async fn test_handle_single() {
    let f = fixture();
    let response = f
        .service
        .handle_single(
            Some(TOKEN),
            "app",
            1,
            Some(json!({"INTEGER": {"userId": 1}})),
        )
        .await
        .unwrap();
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].payload["rows"][0]["name"], "alice");
}

#[tokio::test]
async fn test_query_ids_are_unique() {
    let f = fixture();
    f.service
        .handle_batch(
            Some(TOKEN),
            "warehouse",
            &[json!({"query_ref": 11}), json!({"query_ref": 13})],
        )
        .await
        .unwrap();

    let submitted = f.recorder.submitted.lock().unwrap();
    assert_eq!(submitted.len(), 2);
    assert_ne!(submitted[0].query_id, submitted[1].query_id);
}
