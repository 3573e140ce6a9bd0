//! 查询相关的数据模型
//!
//! - `RawQuery`: 客户端批次中的一条查询
//! - `ParamType` / `ParamValue`: 带类型的参数桶与参数值
//! - `TypedParameter`: 校验通过后按方言排好序的绑定参数
//! - `SqlTemplate`: 查询缓存中的 SQL 模板

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// SQL 方言（决定占位符的改写方式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
    #[serde(alias = "postgres")]
    Postgresql,
    Mysql,
    Db2,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgresql => "postgresql",
            Dialect::Mysql => "mysql",
            Dialect::Db2 => "db2",
        }
    }
}

/// 参数类型桶
///
/// `TEXT`/`DATE`/`TIME`/`DATETIME`/`TIMESTAMP` 都以字符串传输，由数据库自行解释。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Integer,
    String,
    Boolean,
    Float,
    Text,
    Date,
    Time,
    DateTime,
    Timestamp,
}

impl ParamType {
    pub const ALL: [ParamType; 9] = [
        ParamType::Integer,
        ParamType::String,
        ParamType::Boolean,
        ParamType::Float,
        ParamType::Text,
        ParamType::Date,
        ParamType::Time,
        ParamType::DateTime,
        ParamType::Timestamp,
    ];

    /// 请求中使用的桶名
    pub fn bucket_name(self) -> &'static str {
        match self {
            ParamType::Integer => "INTEGER",
            ParamType::String => "STRING",
            ParamType::Boolean => "BOOLEAN",
            ParamType::Float => "FLOAT",
            ParamType::Text => "TEXT",
            ParamType::Date => "DATE",
            ParamType::Time => "TIME",
            ParamType::DateTime => "DATETIME",
            ParamType::Timestamp => "TIMESTAMP",
        }
    }

    pub fn from_bucket(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.bucket_name() == name)
    }

    /// 运行时值是否符合该桶的声明类型（FLOAT 同时接受整数）
    pub fn accepts(self, value: &Value) -> bool {
        ParamValue::from_json(self, value).is_some()
    }
}

/// JSON 值的运行时类型名，用于类型错误消息
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() => "integer",
        // 超出 i64 的无符号整数无法绑定为 INTEGER
        Value::Number(n) if n.is_u64() => "integer out of range",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 带类型的参数值
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
}

impl ParamValue {
    /// 按声明类型从 JSON 值转换，类型不匹配时返回 `None`
    pub fn from_json(declared: ParamType, value: &Value) -> Option<Self> {
        match declared {
            ParamType::Integer => value.as_i64().map(ParamValue::Integer),
            ParamType::Float => value.as_f64().map(ParamValue::Float),
            ParamType::Boolean => value.as_bool().map(ParamValue::Boolean),
            ParamType::String
            | ParamType::Text
            | ParamType::Date
            | ParamType::Time
            | ParamType::DateTime
            | ParamType::Timestamp => value.as_str().map(|s| ParamValue::String(s.to_string())),
        }
    }
}

/// 校验通过后的绑定参数
///
/// `dialect_position` 从 1 开始，含义取决于方言：PostgreSQL 为 `$n` 编号，
/// MySQL/DB2 为第 n 个 `?`，SQLite 为参数名首次出现的序号。
#[derive(Debug, Clone, PartialEq)]
pub struct TypedParameter {
    pub name: String,
    pub declared_type: ParamType,
    pub value: ParamValue,
    pub dialect_position: usize,
}

/// 客户端批次中的一条合法查询
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuery {
    pub query_ref: i64,
    /// `None` 表示未提供参数
    pub params: Option<Value>,
}

impl RawQuery {
    /// 从批次元素解析；非对象或缺少整数 `query_ref` 时返回 `None`
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let query_ref = object.get("query_ref")?.as_i64()?;
        let params = object.get("params").filter(|p| !p.is_null()).cloned();
        Some(Self { query_ref, params })
    }
}

/// SQL 模板（查询缓存条目）
#[derive(Debug, Clone, PartialEq)]
pub struct SqlTemplate {
    pub query_ref: i64,
    pub database: String,
    pub dialect: Dialect,
    /// 含 `:name` 命名占位符的 SQL
    pub sql_text: String,
    pub description: String,
    pub queue_type: String,
    /// 模板自带的超时，`None` 时使用数据库默认值
    pub timeout: Option<Duration>,
}
