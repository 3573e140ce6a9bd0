// HTTP 服务实例
//
// ConduitServer 负责监听端口、接收连接，并把请求交给路由处理。

use anyhow::{Context, Result};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::routes::handle_request;
use crate::models::ServerConfig;
use crate::services::conduit::ConduitService;

pub struct ConduitServer {
    config: ServerConfig,
    service: Arc<ConduitService>,
    server_handle: RwLock<Option<JoinHandle<()>>>,
}

impl ConduitServer {
    pub fn new(config: ServerConfig, service: Arc<ConduitService>) -> Self {
        Self {
            config,
            service,
            server_handle: RwLock::new(None),
        }
    }

    /// 启动服务，返回实际监听地址（端口为 0 时由系统分配）
    pub async fn start(&self) -> Result<SocketAddr> {
        if self.is_running().await {
            anyhow::bail!("服务已在运行");
        }

        let addr = format!("{}:{}", self.config.bind, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("绑定地址 {addr} 失败"))?;
        let local_addr = listener.local_addr().context("读取监听地址失败")?;

        tracing::info!(
            addr = %local_addr,
            databases = ?self.service.resolver().names(),
            "Conduit 服务启动"
        );

        let service = Arc::clone(&self.service);
        let max_body_bytes = self.config.max_body_bytes;

        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let service = Arc::clone(&service);
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let svc = service_fn(move |req| {
                                handle_request(req, Arc::clone(&service), max_body_bytes)
                            });

                            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await
                            {
                                tracing::debug!(peer = %peer, error = ?err, "处理连接失败");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = ?e, "接受连接失败");
                    }
                }
            }
        });

        *self.server_handle.write().await = Some(handle);
        Ok(local_addr)
    }

    pub async fn stop(&self) {
        let handle = self.server_handle.write().await.take();
        if let Some(handle) = handle {
            handle.abort();
            tracing::info!("Conduit 服务已停止");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.server_handle.read().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cache::QueryCache;
    use crate::data::managers::{InlineTemplates, SqliteDatabase};
    use crate::models::{DatabaseConfig, Dialect, TemplateConfig};
    use crate::services::auth::StaticTokenVerifier;
    use crate::services::conduit::DatabaseResolver;
    use crate::services::queue::SqliteQueue;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn service() -> Arc<ConduitService> {
        let db = SqliteDatabase::in_memory().unwrap();
        db.execute_raw("CREATE TABLE items (id INTEGER, label TEXT); INSERT INTO items VALUES (1, 'one');")
            .unwrap();

        let mut config = DatabaseConfig::new("inventory", Dialect::Sqlite);
        config.templates.push(TemplateConfig {
            query_ref: 5,
            sql: "SELECT label FROM items WHERE id = :id".to_string(),
            description: "按编号查询".to_string(),
            queue: "fast".to_string(),
            timeout_secs: Some(5),
        });
        let templates = InlineTemplates::from_config(&config);

        let mut resolver = DatabaseResolver::new();
        resolver
            .register(
                config,
                Arc::new(SqliteQueue::new(db, 4, Duration::from_secs(1))),
                Arc::new(templates),
            )
            .unwrap();

        Arc::new(ConduitService::new(
            Arc::new(resolver),
            Arc::new(QueryCache::default()),
            Arc::new(StaticTokenVerifier::new(["abc"])),
        ))
    }

    fn server() -> ConduitServer {
        let config = ServerConfig {
            bind: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        };
        ConduitServer::new(config, service())
    }

    #[tokio::test]
    async fn test_serves_batch_over_http() {
        let server = server();
        let addr = server.start().await.unwrap();
        assert!(server.is_running().await);

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{addr}/api/conduit/queries"))
            .bearer_auth("abc")
            .json(&json!({
                "database": "inventory",
                "queries": [
                    {"query_ref": 5, "params": {"INTEGER": {"id": 1}}},
                    {"query_ref": 5, "params": {"INTEGER": {"id": 1}}}
                ]
            }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["results"][0]["rows"][0]["label"], "one");
        assert_eq!(body["results"][0]["queue_used"], "fast");
        assert_eq!(body["results"][1]["error"], "Duplicate query");

        let response = client
            .get(format!(
                "http://{addr}/api/conduit/query?database=inventory&query_ref=5&INTEGER.id=1&token=abc"
            ))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        server.stop().await;
        assert!(!server.is_running().await);
    }

    #[tokio::test]
    async fn test_rejects_unauthenticated_requests() {
        let server = server();
        let addr = server.start().await.unwrap();

        let response = reqwest::Client::new()
            .post(format!("http://{addr}/api/conduit/queries"))
            .json(&json!({"database": "inventory", "queries": [{"query_ref": 5}]}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 401);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Authentication failed");

        server.stop().await;
    }

    #[tokio::test]
    async fn test_double_start_fails() {
        let server = server();
        server.start().await.unwrap();
        assert!(server.start().await.is_err());
        server.stop().await;
    }
}
