//! 数据库/队列解析
//!
//! 把请求中的数据库名映射到已启用的连接，先按 `name` 精确匹配，
//! 再按连接别名 `connection_name` 匹配。启动后只读。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::{AppResult, ConduitError};
use crate::data::managers::{
    engine_label, InlineTemplates, SqliteDatabase, SqliteTemplateStore, TemplateCatalog,
    TemplateSource,
};
use crate::models::{ConduitConfig, DatabaseConfig, Dialect};
use crate::services::queue::{QueryQueue, SqliteQueue};

/// 一个已注册的数据库连接
pub struct DatabaseConnection {
    config: DatabaseConfig,
    queue: Arc<dyn QueryQueue>,
    templates: Arc<dyn TemplateSource>,
}

/// 解析结果，借用解析器中的队列与模板来源
#[derive(Clone, Copy)]
pub struct ResolvedDatabase<'a> {
    pub name: &'a str,
    pub dialect: Dialect,
    pub max_queries: usize,
    pub default_timeout: Duration,
    pub queue: &'a Arc<dyn QueryQueue>,
    pub templates: &'a Arc<dyn TemplateSource>,
}

#[derive(Default)]
pub struct DatabaseResolver {
    connections: Vec<DatabaseConnection>,
}

impl DatabaseResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置构建：SQLite 连接自动创建执行队列，其他引擎需要调用 `register` 提供队列
    pub fn from_config(config: &ConduitConfig) -> AppResult<Self> {
        let mut resolver = Self::new();

        for db in &config.databases {
            if db.engine != Dialect::Sqlite {
                tracing::warn!(
                    database = %db.name,
                    engine = engine_label(db.engine),
                    "该引擎没有内置执行队列，需要外部注册"
                );
                continue;
            }

            let path = db.path.as_deref().ok_or_else(|| {
                ConduitError::config(format!("SQLite 数据库 {} 缺少 path", db.name))
            })?;
            let (queue, templates) = build_sqlite(db, path)?;
            resolver.register(db.clone(), queue, templates)?;
        }

        Ok(resolver)
    }

    /// 注册一个连接，名称重复时报错
    pub fn register(
        &mut self,
        config: DatabaseConfig,
        queue: Arc<dyn QueryQueue>,
        templates: Arc<dyn TemplateSource>,
    ) -> AppResult<()> {
        if self.connections.iter().any(|c| c.config.name == config.name) {
            return Err(ConduitError::config(format!(
                "数据库名重复: {}",
                config.name
            )));
        }
        if queue.engine() != config.engine {
            tracing::warn!(
                database = %config.name,
                configured = engine_label(config.engine),
                queue = engine_label(queue.engine()),
                "执行队列引擎与配置不一致，按配置的方言转换参数"
            );
        }

        tracing::info!(
            database = %config.name,
            engine = engine_label(config.engine),
            enabled = config.enabled,
            max_queries = config.max_queries_per_request,
            "数据库连接已注册"
        );
        self.connections.push(DatabaseConnection {
            config,
            queue,
            templates,
        });
        Ok(())
    }

    pub fn resolve(&self, database: &str) -> AppResult<ResolvedDatabase<'_>> {
        let enabled = || self.connections.iter().filter(|c| c.config.enabled);

        let connection = enabled()
            .find(|c| c.config.name == database)
            .or_else(|| {
                enabled().find(|c| c.config.connection_name.as_deref() == Some(database))
            })
            .ok_or_else(|| ConduitError::DatabaseNotFound(database.to_string()))?;

        Ok(ResolvedDatabase {
            name: &connection.config.name,
            dialect: connection.config.engine,
            max_queries: connection.config.max_queries_per_request,
            default_timeout: Duration::from_secs(connection.config.query_timeout_secs),
            queue: &connection.queue,
            templates: &connection.templates,
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.connections
            .iter()
            .map(|c| c.config.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

fn build_sqlite(
    db: &DatabaseConfig,
    path: &Path,
) -> AppResult<(Arc<dyn QueryQueue>, Arc<dyn TemplateSource>)> {
    let database = SqliteDatabase::open(path)?;

    let mut catalog = TemplateCatalog::new();
    if !db.templates.is_empty() {
        catalog = catalog.with_source(Arc::new(InlineTemplates::from_config(db)));
    }
    if let Some(table) = &db.template_table {
        let store = SqliteTemplateStore::new(database.clone(), table, db.name.clone(), db.engine)?;
        catalog = catalog.with_source(Arc::new(store));
    }
    if catalog.is_empty() {
        tracing::warn!(database = %db.name, "未配置任何 SQL 模板来源");
    }

    let queue = SqliteQueue::new(
        database,
        db.max_in_flight,
        Duration::from_millis(db.queue_wait_ms),
    );
    Ok((Arc::new(queue), Arc::new(catalog)))
}
