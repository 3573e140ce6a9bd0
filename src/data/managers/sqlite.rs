//! SQLite 访问层
//!
//! - `SqliteDatabase`: 单连接 + `Arc<Mutex>`，按类型绑定参数执行模板 SQL，行转为 JSON 对象
//! - `SqliteTemplateStore`: 从模板表加载 `SqlTemplate`
//!
//! 这里的方法都是阻塞调用，异步代码需要放到 `spawn_blocking` 中执行。

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, Statement, ToSql};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::TemplateSource;
use crate::data::{DataError, Result};
use crate::models::{Dialect, ParamValue, SqlTemplate, TypedParameter};

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("invalid identifier regex")
});

impl ToSql for ParamValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            ParamValue::Integer(i) => ToSqlOutput::from(*i),
            ParamValue::Float(f) => ToSqlOutput::from(*f),
            ParamValue::Boolean(b) => ToSqlOutput::from(*b),
            ParamValue::String(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

/// 查询结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    pub columns: Vec<String>,
    /// 每行一个以列名为键的 JSON 对象
    pub rows: Vec<Map<String, Value>>,
    /// 写语句影响的行数
    pub affected: usize,
}

/// SQLite 数据库
#[derive(Clone)]
pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SqliteDatabase {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DataError::io(parent.to_path_buf(), e))?;
        }

        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
            db_path: PathBuf::from(":memory:"),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 执行一条语句
    ///
    /// 参数优先按 `:name` 绑定，语句中没有该命名参数时按 `dialect_position` 绑定。
    pub fn query(&self, sql: &str, params: &[TypedParameter]) -> Result<QueryRows> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DataError::Concurrency(e.to_string()))?;

        let mut stmt = conn.prepare(sql)?;
        bind_parameters(&mut stmt, params)?;

        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        if columns.is_empty() {
            let affected = stmt.raw_execute()?;
            return Ok(QueryRows {
                columns,
                rows: Vec::new(),
                affected,
            });
        }

        let mut rows = Vec::new();
        let mut cursor = stmt.raw_query();
        while let Some(row) = cursor.next()? {
            rows.push(row_to_object(row, &columns)?);
        }

        Ok(QueryRows {
            columns,
            rows,
            affected: 0,
        })
    }

    /// 执行原始 SQL（DDL、初始化脚本）
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DataError::Concurrency(e.to_string()))?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DataError::Concurrency(e.to_string()))?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table_name],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }
}

fn bind_parameters(stmt: &mut Statement<'_>, params: &[TypedParameter]) -> Result<()> {
    for param in params {
        let index = stmt
            .parameter_index(&format!(":{}", param.name))?
            .unwrap_or(param.dialect_position);
        stmt.raw_bind_parameter(index, &param.value)?;
    }
    Ok(())
}

fn row_to_object(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<Map<String, Value>> {
    let mut object = Map::new();
    for (idx, column) in columns.iter().enumerate() {
        object.insert(column.clone(), value_as_json(row, idx)?);
    }
    Ok(object)
}

fn value_as_json(row: &Row<'_>, idx: usize) -> rusqlite::Result<Value> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    })
}

/// 模板表
///
/// 表结构：
///
/// ```sql
/// CREATE TABLE queries (
///     query_ref       INTEGER PRIMARY KEY,
///     sql_template    TEXT NOT NULL,
///     description     TEXT NOT NULL DEFAULT '',
///     queue_type      TEXT NOT NULL DEFAULT 'medium',
///     timeout_seconds INTEGER
/// );
/// ```
#[derive(Clone)]
pub struct SqliteTemplateStore {
    db: SqliteDatabase,
    table: String,
    database: String,
    dialect: Dialect,
}

impl SqliteTemplateStore {
    /// `database` 与 `dialect` 写入加载出的模板，模板表本身总在 SQLite 中
    pub fn new(
        db: SqliteDatabase,
        table: &str,
        database: impl Into<String>,
        dialect: Dialect,
    ) -> Result<Self> {
        if !IDENTIFIER_RE.is_match(table) {
            return Err(DataError::InvalidIdentifier(table.to_string()));
        }
        Ok(Self {
            db,
            table: table.to_string(),
            database: database.into(),
            dialect,
        })
    }

    fn load_blocking(&self, query_ref: i64) -> Result<Option<SqlTemplate>> {
        let conn = self
            .db
            .conn
            .lock()
            .map_err(|e| DataError::Concurrency(e.to_string()))?;

        let sql = format!(
            "SELECT sql_template, description, queue_type, timeout_seconds FROM {} WHERE query_ref = ?1",
            self.table
        );
        let row = conn
            .query_row(&sql, [query_ref], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            })
            .optional()?;

        Ok(row.map(|(sql_text, description, queue_type, timeout)| SqlTemplate {
            query_ref,
            database: self.database.clone(),
            dialect: self.dialect,
            sql_text,
            description: description.unwrap_or_default(),
            queue_type: queue_type.unwrap_or_else(crate::models::default_queue),
            timeout: timeout
                .filter(|secs| *secs > 0)
                .map(|secs| Duration::from_secs(secs.unsigned_abs())),
        }))
    }
}

#[async_trait]
impl TemplateSource for SqliteTemplateStore {
    async fn load_template(&self, database: &str, query_ref: i64) -> Result<Option<SqlTemplate>> {
        if database != self.database {
            return Ok(None);
        }
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load_blocking(query_ref)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParamType;
    use tempfile::TempDir;

    fn create_test_db() -> (TempDir, SqliteDatabase) {
        let temp_dir = TempDir::new().unwrap();
        let db = SqliteDatabase::open(&temp_dir.path().join("data").join("test.db")).unwrap();
        db.execute_raw(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, score REAL, active INTEGER);
             INSERT INTO users VALUES (1, 'alice', 9.5, 1), (2, 'bob', NULL, 0);
             CREATE TABLE queries (
                 query_ref INTEGER PRIMARY KEY,
                 sql_template TEXT NOT NULL,
                 description TEXT,
                 queue_type TEXT,
                 timeout_seconds INTEGER
             );
             INSERT INTO queries VALUES (1, 'SELECT name FROM users WHERE id = :id', '按 id 查询', 'fast', 3);
             INSERT INTO queries VALUES (2, 'SELECT COUNT(*) AS n FROM users', NULL, NULL, NULL);",
        )
        .unwrap();
        (temp_dir, db)
    }

    fn param(name: &str, value: ParamValue, position: usize) -> TypedParameter {
        TypedParameter {
            name: name.to_string(),
            declared_type: ParamType::Integer,
            value,
            dialect_position: position,
        }
    }

    #[test]
    fn test_open_creates_parent_dir() {
        let (temp_dir, db) = create_test_db();
        assert!(temp_dir.path().join("data").is_dir());
        assert!(db.db_path().ends_with("test.db"));
        assert!(db.table_exists("users").unwrap());
        assert!(!db.table_exists("missing").unwrap());
    }

    #[test]
    fn test_query_binds_named_parameter() {
        let (_dir, db) = create_test_db();
        let rows = db
            .query(
                "SELECT id, name, score FROM users WHERE id = :id",
                &[param("id", ParamValue::Integer(1), 1)],
            )
            .unwrap();

        assert_eq!(rows.columns, vec!["id", "name", "score"]);
        assert_eq!(rows.rows.len(), 1);
        assert_eq!(rows.rows[0]["name"], Value::String("alice".to_string()));
        assert_eq!(rows.rows[0]["score"], serde_json::json!(9.5));
    }

    #[test]
    fn test_query_binds_positional_parameters() {
        let (_dir, db) = create_test_db();
        let rows = db
            .query(
                "SELECT id FROM users WHERE active = ? OR name = ? ORDER BY id",
                &[
                    param("active", ParamValue::Boolean(false), 1),
                    param("name", ParamValue::String("alice".to_string()), 2),
                ],
            )
            .unwrap();
        assert_eq!(rows.rows.len(), 2);
    }

    #[test]
    fn test_null_values() {
        let (_dir, db) = create_test_db();
        let rows = db.query("SELECT score FROM users WHERE id = 2", &[]).unwrap();
        assert_eq!(rows.rows[0]["score"], Value::Null);
    }

    #[test]
    fn test_write_statement_reports_affected() {
        let (_dir, db) = create_test_db();
        let result = db
            .query(
                "UPDATE users SET score = :score WHERE id = :id",
                &[
                    param("score", ParamValue::Float(1.5), 1),
                    param("id", ParamValue::Integer(2), 2),
                ],
            )
            .unwrap();
        assert!(result.columns.is_empty());
        assert_eq!(result.affected, 1);
    }

    #[test]
    fn test_invalid_sql_is_database_error() {
        let (_dir, db) = create_test_db();
        let err = db.query("SELECT * FROM nowhere", &[]).unwrap_err();
        assert!(matches!(err, DataError::Database(_)));
    }

    #[test]
    fn test_template_store_rejects_bad_table_name() {
        let db = SqliteDatabase::in_memory().unwrap();
        let result = SqliteTemplateStore::new(db, "queries; DROP TABLE x", "demo", Dialect::Sqlite);
        assert!(matches!(result, Err(DataError::InvalidIdentifier(_))));
    }

    #[tokio::test]
    async fn test_template_store_loads() {
        let (_dir, db) = create_test_db();
        let store = SqliteTemplateStore::new(db, "queries", "demo", Dialect::Sqlite).unwrap();

        let template = store.load_template("demo", 1).await.unwrap().unwrap();
        assert_eq!(template.sql_text, "SELECT name FROM users WHERE id = :id");
        assert_eq!(template.queue_type, "fast");
        assert_eq!(template.timeout, Some(Duration::from_secs(3)));

        let defaults = store.load_template("demo", 2).await.unwrap().unwrap();
        assert_eq!(defaults.description, "");
        assert_eq!(defaults.queue_type, "medium");
        assert_eq!(defaults.timeout, None);

        assert!(store.load_template("demo", 99).await.unwrap().is_none());
        assert!(store.load_template("other", 1).await.unwrap().is_none());
    }
}
