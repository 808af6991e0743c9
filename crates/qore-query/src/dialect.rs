// SPDX-License-Identifier: Apache-2.0

//! SQL dialects
//!
//! Identifier quoting, literal formatting and placeholder syntax for the
//! engines the drivers talk to.

use serde::{Deserialize, Serialize};

use qore_core::Value;

/// SQL dialect for different database drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqlDialect {
    Postgres,
    MySql,
    #[default]
    Sqlite,
}

impl SqlDialect {
    pub fn from_driver_id(driver_id: &str) -> Option<Self> {
        match driver_id.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(SqlDialect::Postgres),
            "mysql" | "mariadb" => Some(SqlDialect::MySql),
            "sqlite" => Some(SqlDialect::Sqlite),
            _ => None,
        }
    }

    /// Quote an identifier according to the dialect
    pub fn quote_ident(&self, name: &str) -> String {
        match self {
            SqlDialect::Postgres | SqlDialect::Sqlite => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
            SqlDialect::MySql => format!("`{}`", name.replace('`', "``")),
        }
    }

    /// Positional placeholder for the `n`-th bound value (1-based).
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            SqlDialect::Postgres => format!("${n}"),
            SqlDialect::MySql | SqlDialect::Sqlite => "?".to_string(),
        }
    }

    /// `OFFSET` without `LIMIT` is not valid everywhere.
    pub(crate) fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(l), Some(o)) => format!(" LIMIT {l} OFFSET {o}"),
            (Some(l), None) => format!(" LIMIT {l}"),
            (None, Some(o)) => match self {
                SqlDialect::Postgres => format!(" OFFSET {o}"),
                SqlDialect::Sqlite => format!(" LIMIT -1 OFFSET {o}"),
                SqlDialect::MySql => format!(" LIMIT 18446744073709551615 OFFSET {o}"),
            },
            (None, None) => String::new(),
        }
    }

    /// Format a value as a SQL literal
    pub fn format_value(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => match self {
                SqlDialect::Postgres => if *b { "TRUE" } else { "FALSE" }.to_string(),
                SqlDialect::MySql | SqlDialect::Sqlite => if *b { "1" } else { "0" }.to_string(),
            },
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.is_nan() {
                    "'NaN'".to_string()
                } else if f.is_infinite() {
                    if *f > 0.0 { "'Infinity'" } else { "'-Infinity'" }.to_string()
                } else {
                    format!("{f}")
                }
            }
            Value::Text(s) => self.escape_string(s),
            Value::Bytes(b) => self.format_bytes(b),
            Value::Json(j) => self.escape_string(&j.to_string()),
            Value::Array(items) => items
                .iter()
                .map(|v| self.format_value(v))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    fn escape_string(&self, s: &str) -> String {
        match self {
            SqlDialect::Postgres | SqlDialect::Sqlite => format!("'{}'", s.replace('\'', "''")),
            SqlDialect::MySql => {
                let escaped = s
                    .replace('\\', "\\\\")
                    .replace('\'', "''")
                    .replace('\0', "\\0");
                format!("'{escaped}'")
            }
        }
    }

    fn format_bytes(&self, bytes: &[u8]) -> String {
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        match self {
            SqlDialect::Postgres => format!("'\\x{hex}'"),
            SqlDialect::MySql | SqlDialect::Sqlite => format!("X'{hex}'"),
        }
    }
}
