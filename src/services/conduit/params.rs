//! 参数校验与方言转换
//!
//! 模板 SQL 使用 `:name` 命名占位符，请求参数按类型分桶：
//!
//! ```json
//! { "INTEGER": { "userId": 5 }, "STRING": { "status": "active" } }
//! ```
//!
//! 校验产生 `ParameterValidationReport`，报告为空时才会生成按方言改写的 SQL
//! 与有序的绑定参数列表。单引号字符串中的内容和 `::` 类型转换不视为占位符。

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::models::{json_type_name, Dialect, ParamType, ParamValue, TypedParameter};

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"'(?:[^']|'')*'|::|:([A-Za-z_][A-Za-z0-9_]*)").expect("invalid placeholder regex")
});

/// SQL 中的一处占位符
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    /// 在 SQL 中的字节范围（含冒号）
    pub start: usize,
    pub end: usize,
}

/// 按出现顺序提取全部占位符（同名占位符每次出现都会返回）
pub fn extract_placeholders(sql: &str) -> Vec<Placeholder> {
    PLACEHOLDER_RE
        .captures_iter(sql)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?;
            Some(Placeholder {
                name: name.as_str().to_string(),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// 参数校验报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterValidationReport {
    /// SQL 需要但未提供的参数，按占位符出现顺序
    pub missing: Vec<String>,
    /// 提供了但 SQL 未使用的参数
    pub unused: Vec<String>,
    pub type_errors: Vec<String>,
}

impl ParameterValidationReport {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unused.is_empty() && self.type_errors.is_empty()
    }

    /// `Missing parameters: a, b | Parameters unused: x | <类型错误>`，只包含非空部分
    pub fn to_message(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if !self.missing.is_empty() {
            parts.push(format!("Missing parameters: {}", self.missing.join(", ")));
        }
        if !self.unused.is_empty() {
            parts.push(format!("Parameters unused: {}", self.unused.join(", ")));
        }
        if !self.type_errors.is_empty() {
            parts.push(self.type_errors.join(", "));
        }
        parts.join(" | ")
    }
}

/// 转换后的 SQL 与绑定参数
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedQuery {
    pub sql: String,
    pub params: Vec<TypedParameter>,
}

/// 请求中提供的一个参数
struct SuppliedParam<'a> {
    name: &'a str,
    declared_type: ParamType,
    value: &'a Value,
}

/// 校验参数并在通过时按方言转换
///
/// `sql_text` 为 `None` 时返回空报告且不做转换；`params` 为 `None` 或 `null` 视为未提供参数。
pub fn validate_and_convert(
    sql_text: Option<&str>,
    params: Option<&Value>,
    dialect: Dialect,
) -> (ParameterValidationReport, Option<ConvertedQuery>) {
    let mut report = ParameterValidationReport::default();
    let Some(sql) = sql_text else {
        return (report, None);
    };

    let placeholders = extract_placeholders(sql);
    let mut required: Vec<&str> = Vec::new();
    for placeholder in &placeholders {
        if !required.contains(&placeholder.name.as_str()) {
            required.push(&placeholder.name);
        }
    }

    let supplied = collect_supplied(params, &mut report.type_errors);

    for name in &required {
        if !supplied.iter().any(|p| p.name == *name) {
            report.missing.push(name.to_string());
        }
    }

    for param in &supplied {
        if !required.contains(&param.name) {
            if !report.unused.iter().any(|u| u == param.name) {
                report.unused.push(param.name.to_string());
            }
            continue;
        }
        if !param.declared_type.accepts(param.value) {
            report.type_errors.push(format!(
                "{name}({actual}) is not {name}({declared})",
                name = param.name,
                actual = json_type_name(param.value),
                declared = param.declared_type.bucket_name(),
            ));
        }
    }

    if !report.is_empty() {
        return (report, None);
    }

    let converted = convert(sql, &placeholders, &supplied, dialect);
    (report, converted)
}

/// 展开类型桶，桶级别的错误写入 `type_errors`
fn collect_supplied<'a>(
    params: Option<&'a Value>,
    type_errors: &mut Vec<String>,
) -> Vec<SuppliedParam<'a>> {
    let mut supplied: Vec<SuppliedParam<'a>> = Vec::new();

    let buckets: &Map<String, Value> = match params {
        None | Some(Value::Null) => return supplied,
        Some(Value::Object(buckets)) => buckets,
        Some(_) => {
            type_errors.push("params must be an object".to_string());
            return supplied;
        }
    };

    for (bucket, entries) in buckets {
        let Some(declared_type) = ParamType::from_bucket(bucket) else {
            type_errors.push(format!("{bucket} is not a supported parameter type"));
            continue;
        };
        let entries = match entries {
            Value::Object(entries) => entries,
            Value::Null => continue,
            _ => {
                type_errors.push(format!("{bucket} must be an object"));
                continue;
            }
        };

        for (name, value) in entries {
            if supplied.iter().any(|p| p.name == name.as_str()) {
                type_errors.push(format!("{name} is declared in multiple type buckets"));
                continue;
            }
            supplied.push(SuppliedParam {
                name,
                declared_type,
                value,
            });
        }
    }

    supplied
}

fn convert(
    sql: &str,
    placeholders: &[Placeholder],
    supplied: &[SuppliedParam<'_>],
    dialect: Dialect,
) -> Option<ConvertedQuery> {
    let typed = |name: &str, position: usize| -> Option<TypedParameter> {
        let param = supplied.iter().find(|p| p.name == name)?;
        Some(TypedParameter {
            name: name.to_string(),
            declared_type: param.declared_type,
            value: ParamValue::from_json(param.declared_type, param.value)?,
            dialect_position: position,
        })
    };

    let mut params: Vec<TypedParameter> = Vec::new();
    let mut out = String::with_capacity(sql.len());
    let mut cursor = 0;

    for placeholder in placeholders {
        out.push_str(&sql[cursor..placeholder.start]);
        cursor = placeholder.end;

        match dialect {
            Dialect::Postgresql => {
                let existing = params
                    .iter()
                    .find(|p| p.name == placeholder.name)
                    .map(|p| p.dialect_position);
                let position = match existing {
                    Some(position) => position,
                    None => {
                        let position = params.len() + 1;
                        params.push(typed(&placeholder.name, position)?);
                        position
                    }
                };
                out.push('$');
                out.push_str(&position.to_string());
            }
            Dialect::Mysql | Dialect::Db2 => {
                params.push(typed(&placeholder.name, params.len() + 1)?);
                out.push('?');
            }
            Dialect::Sqlite => {
                if !params.iter().any(|p| p.name == placeholder.name) {
                    params.push(typed(&placeholder.name, params.len() + 1)?);
                }
                out.push_str(&sql[placeholder.start..placeholder.end]);
            }
        }
    }
    out.push_str(&sql[cursor..]);

    Some(ConvertedQuery { sql: out, params })
}
