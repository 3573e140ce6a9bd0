//! Conduit 配置模型
//!
//! 配置文件为 TOML，所有段落均可省略并回退到默认值：
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1"
//! port = 8080
//!
//! [logging]
//! level = "info"
//! format = "text"
//! output = "console"
//!
//! [auth]
//! tokens = ["secret"]
//!
//! [[databases]]
//! name = "demo"
//! engine = "sqlite"
//! path = "/var/lib/conduit/demo.db"
//! template_table = "queries"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::query::Dialect;
use crate::core::error::{AppResult, ConduitError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConduitConfig {
    pub server: ServerConfig,
    pub logging: LogConfig,
    pub cache: CacheConfig,
    pub auth: AuthConfig,
    pub databases: Vec<DatabaseConfig>,
}

impl ConduitConfig {
    /// 从文件加载并校验配置
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConduitError::config(format!("读取配置文件失败 {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.server.max_body_bytes == 0 {
            return Err(ConduitError::config("server.max_body_bytes 必须大于 0"));
        }
        if self.cache.capacity == 0 {
            return Err(ConduitError::config("cache.capacity 必须大于 0"));
        }

        let mut names = HashSet::new();
        for db in &self.databases {
            if db.name.trim().is_empty() {
                return Err(ConduitError::config("数据库名不能为空"));
            }
            if !names.insert(db.name.as_str()) {
                return Err(ConduitError::config(format!("数据库名重复: {}", db.name)));
            }
            if db.max_queries_per_request == 0 {
                return Err(ConduitError::config(format!(
                    "数据库 {} 的 max_queries_per_request 必须大于 0",
                    db.name
                )));
            }
            if db.max_in_flight == 0 {
                return Err(ConduitError::config(format!(
                    "数据库 {} 的 max_in_flight 必须大于 0",
                    db.name
                )));
            }

            let mut refs = HashSet::new();
            for template in &db.templates {
                if !refs.insert(template.query_ref) {
                    return Err(ConduitError::config(format!(
                        "数据库 {} 的 query_ref {} 重复",
                        db.name, template.query_ref
                    )));
                }
            }
        }

        Ok(())
    }
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// 0 表示由系统分配端口
    pub port: u16,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

/// 日志配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    /// 日志目录，`None` 时使用 `~/.conduit/logs`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

/// 查询模板缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    /// 模板过期时间（秒），`None` 表示常驻直到被显式失效
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            ttl_secs: None,
        }
    }
}

/// 令牌校验配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// 为 false 时不校验令牌
    pub required: bool,
    pub tokens: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            required: true,
            tokens: Vec::new(),
        }
    }
}

/// 单个数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    /// 连接别名，按名称查找失败时使用
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_name: Option<String>,
    #[serde(default)]
    pub engine: Dialect,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// SQLite 数据库文件
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default = "default_max_queries")]
    pub max_queries_per_request: usize,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    /// 同时执行的查询上限
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// 等待执行槽位的最长时间（毫秒），超时视为限流
    #[serde(default = "default_queue_wait_ms")]
    pub queue_wait_ms: u64,
    /// 存放 SQL 模板的表
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_table: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<TemplateConfig>,
}

fn default_enabled() -> bool {
    true
}

fn default_max_queries() -> usize {
    10
}

fn default_query_timeout() -> u64 {
    30
}

fn default_max_in_flight() -> usize {
    8
}

fn default_queue_wait_ms() -> u64 {
    5_000
}

impl DatabaseConfig {
    pub fn new(name: impl Into<String>, engine: Dialect) -> Self {
        Self {
            name: name.into(),
            connection_name: None,
            engine,
            enabled: true,
            path: None,
            max_queries_per_request: default_max_queries(),
            query_timeout_secs: default_query_timeout(),
            max_in_flight: default_max_in_flight(),
            queue_wait_ms: default_queue_wait_ms(),
            template_table: None,
            templates: Vec::new(),
        }
    }
}

/// 配置文件内联的 SQL 模板
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub query_ref: i64,
    pub sql: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_queue")]
    pub queue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

pub fn default_queue() -> String {
    "medium".to_string()
}
