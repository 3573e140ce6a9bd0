//! SQLite 执行队列
//!
//! 每次提交先在信号量上等待执行槽位（超过 `queue_wait` 视为限流），
//! 然后在 `spawn_blocking` 中执行，整体受请求超时约束。
//! 超时后阻塞任务不会被强制取消，只是不再等待其结果。

use async_trait::async_trait;
use rusqlite::ErrorCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use super::{QueryOutcome, QueryQueue, QueryRequest, QueueError, QueueErrorCategory};
use crate::data::managers::SqliteDatabase;
use crate::data::DataError;
use crate::models::Dialect;

pub struct SqliteQueue {
    db: SqliteDatabase,
    slots: Arc<Semaphore>,
    queue_wait: Duration,
}

impl SqliteQueue {
    pub fn new(db: SqliteDatabase, max_in_flight: usize, queue_wait: Duration) -> Self {
        Self {
            db,
            slots: Arc::new(Semaphore::new(max_in_flight.max(1))),
            queue_wait,
        }
    }

    pub fn database(&self) -> &SqliteDatabase {
        &self.db
    }
}

#[async_trait]
impl QueryQueue for SqliteQueue {
    fn engine(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn submit(&self, request: QueryRequest) -> Result<QueryOutcome, QueueError> {
        let started = Instant::now();

        let permit = match tokio::time::timeout(
            self.queue_wait,
            Arc::clone(&self.slots).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(QueueError::new(
                    QueueErrorCategory::Database,
                    "Execution queue is closed",
                ))
            }
            Err(_) => {
                tracing::warn!(query_id = %request.query_id, "等待执行槽位超时");
                return Err(QueueError::new(
                    QueueErrorCategory::Throttled,
                    format!(
                        "No execution slot available within {} ms",
                        self.queue_wait.as_millis()
                    ),
                ));
            }
        };

        let db = self.db.clone();
        let sql = request.sql.clone();
        let params = request.params.clone();
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            db.query(&sql, &params)
        });

        let rows = match tokio::time::timeout(request.timeout, task).await {
            Err(_) => {
                tracing::warn!(
                    query_id = %request.query_id,
                    timeout_secs = request.timeout.as_secs(),
                    "查询执行超时"
                );
                return Err(QueueError::new(
                    QueueErrorCategory::Timeout,
                    format!(
                        "Query exceeded the {} second timeout",
                        request.timeout.as_secs()
                    ),
                ));
            }
            Ok(Err(join_err)) => {
                return Err(QueueError::new(
                    QueueErrorCategory::Database,
                    format!("Query task failed: {join_err}"),
                ))
            }
            Ok(Ok(result)) => result.map_err(classify_error)?,
        };

        Ok(QueryOutcome {
            columns: rows.columns,
            rows: rows.rows,
            execution_time_ms: started.elapsed().as_millis() as u64,
            queue_used: request.queue_type,
        })
    }
}

/// 将数据层错误归入队列失败分类
pub fn classify_error(err: DataError) -> QueueError {
    let category = match &err {
        DataError::Database(rusqlite::Error::SqliteFailure(failure, message)) => {
            match failure.code {
                ErrorCode::PermissionDenied | ErrorCode::AuthorizationForStatementDenied => {
                    QueueErrorCategory::Auth
                }
                ErrorCode::CannotOpen | ErrorCode::NotFound => QueueErrorCategory::NotFound,
                _ if message
                    .as_deref()
                    .is_some_and(|m| m.starts_with("no such table")) =>
                {
                    QueueErrorCategory::NotFound
                }
                _ => QueueErrorCategory::Database,
            }
        }
        DataError::Database(rusqlite::Error::QueryReturnedNoRows) | DataError::NotFound(_) => {
            QueueErrorCategory::NotFound
        }
        _ => QueueErrorCategory::Database,
    };

    let message = match err {
        DataError::Database(rusqlite::Error::SqliteFailure(_, Some(message))) => message,
        DataError::Database(inner) => inner.to_string(),
        other => other.to_string(),
    };

    QueueError::new(category, message)
}
