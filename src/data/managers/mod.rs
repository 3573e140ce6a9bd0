//! SQL 模板来源与数据库访问
//!
//! - `TemplateSource`: 按 (database, query_ref) 加载模板的抽象
//! - `InlineTemplates`: 配置文件中内联的模板
//! - `TemplateCatalog`: 按顺序依次查询多个来源
//! - `sqlite`: SQLite 连接与模板表

pub mod sqlite;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::data::Result;
use crate::models::{DatabaseConfig, Dialect, SqlTemplate};

pub use sqlite::{QueryRows, SqliteDatabase, SqliteTemplateStore};

/// 模板加载器
///
/// 找不到模板时返回 `Ok(None)`，只有加载过程本身出错才返回 `Err`。
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn load_template(&self, database: &str, query_ref: i64) -> Result<Option<SqlTemplate>>;
}

/// 配置文件中内联的模板
#[derive(Debug, Default)]
pub struct InlineTemplates {
    templates: HashMap<(String, i64), SqlTemplate>,
}

impl InlineTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        let mut inline = Self::new();
        for template in &config.templates {
            inline.insert(SqlTemplate {
                query_ref: template.query_ref,
                database: config.name.clone(),
                dialect: config.engine,
                sql_text: template.sql.clone(),
                description: template.description.clone(),
                queue_type: template.queue.clone(),
                timeout: template.timeout_secs.map(Duration::from_secs),
            });
        }
        inline
    }

    pub fn insert(&mut self, template: SqlTemplate) {
        self.templates
            .insert((template.database.clone(), template.query_ref), template);
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[async_trait]
impl TemplateSource for InlineTemplates {
    async fn load_template(&self, database: &str, query_ref: i64) -> Result<Option<SqlTemplate>> {
        Ok(self
            .templates
            .get(&(database.to_string(), query_ref))
            .cloned())
    }
}

/// 按注册顺序依次查询，返回第一个命中的模板
#[derive(Default)]
pub struct TemplateCatalog {
    sources: Vec<Arc<dyn TemplateSource>>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: Arc<dyn TemplateSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl TemplateSource for TemplateCatalog {
    async fn load_template(&self, database: &str, query_ref: i64) -> Result<Option<SqlTemplate>> {
        for source in &self.sources {
            if let Some(template) = source.load_template(database, query_ref).await? {
                return Ok(Some(template));
            }
        }
        Ok(None)
    }
}

/// 方言对应的默认展示名
pub fn engine_label(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Sqlite => "SQLite",
        Dialect::Postgresql => "PostgreSQL",
        Dialect::Mysql => "MySQL",
        Dialect::Db2 => "DB2",
    }
}
