// SPDX-License-Identifier: Apache-2.0

//! SQLite Executor
//!
//! ## SQLite Specifics
//!
//! - `sqlite::memory:` databases live inside one connection, so their pool
//!   is pinned to a single connection that is never recycled
//! - File databases use WAL mode
//! - Dynamic typing: values are decoded by trying types in order of
//!   likelihood

use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Row, TypeInfo};

use qore_core::{ColumnInfo, EngineError, EngineResult, QueryResult, Row as QRow, Value};
use qore_query::{CompiledQuery, SqlDialect};

use crate::error::{elapsed_ms, map_query_error};
use crate::traits::QueryExecutor;

pub struct SqliteExecutor {
    pool: SqlitePool,
}

impl SqliteExecutor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a pool for `url` (`sqlite:path` or `sqlite::memory:`).
    pub async fn connect(url: &str, max_connections: u32) -> EngineResult<Self> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let mut opts = SqliteConnectOptions::from_str(url)
            .map_err(|e| EngineError::configuration(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(30));
        if !in_memory {
            opts = opts.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_opts = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_opts
            .connect_with(opts)
            .await
            .map_err(|e| EngineError::connection_failed(e.to_string()))?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
        value: &'q Value,
    ) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
        match value {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(b),
            Value::Int(i) => query.bind(i),
            Value::Float(f) => query.bind(f),
            Value::Text(s) => query.bind(s.as_str()),
            Value::Bytes(b) => query.bind(b.as_slice()),
            Value::Json(j) => query.bind(j.to_string()),
            // expanded by the builder before reaching a driver
            Value::Array(_) => query.bind(Option::<String>::None),
        }
    }

    fn prepare<'q>(
        query: &'q CompiledQuery,
    ) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
        query
            .params
            .iter()
            .fold(sqlx::query(&query.sql), Self::bind_param)
    }

    fn convert_row(sqlite_row: &SqliteRow) -> QRow {
        let values: Vec<Value> = sqlite_row
            .columns()
            .iter()
            .map(|col| Self::extract_value(sqlite_row, col.ordinal()))
            .collect();

        QRow { values }
    }

    fn extract_value(row: &SqliteRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(Value::Int).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.map(Value::Float).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
            return v.map(Value::Bool).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::Text).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return v.map(Value::Bytes).unwrap_or(Value::Null);
        }

        Value::Null
    }

    fn get_column_info(row: &SqliteRow) -> Vec<ColumnInfo> {
        row.columns()
            .iter()
            .map(|col| ColumnInfo {
                name: col.name().to_string(),
                data_type: col.type_info().name().to_string(),
                nullable: true,
            })
            .collect()
    }
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    fn driver_id(&self) -> &'static str {
        "sqlite"
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    async fn fetch(&self, query: &CompiledQuery) -> EngineResult<QueryResult> {
        let start = Instant::now();
        let sqlite_rows: Vec<SqliteRow> = Self::prepare(query)
            .fetch_all(&self.pool)
            .await
            .map_err(map_query_error)?;
        let execution_time_ms = elapsed_ms(start);

        tracing::debug!(
            sql = %query.sql,
            rows = sqlite_rows.len(),
            execution_time_ms,
            "SQLite: fetched"
        );

        let columns = sqlite_rows
            .first()
            .map(Self::get_column_info)
            .unwrap_or_default();
        let rows = sqlite_rows.iter().map(Self::convert_row).collect();

        Ok(QueryResult {
            columns,
            rows,
            affected_rows: None,
            execution_time_ms,
        })
    }

    async fn execute(&self, query: &CompiledQuery) -> EngineResult<u64> {
        let result = Self::prepare(query)
            .execute(&self.pool)
            .await
            .map_err(map_query_error)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qore_query::{col, Expr, QueryBuilder};

    async fn seeded() -> SqliteExecutor {
        let executor = SqliteExecutor::connect("sqlite::memory:", 4).await.unwrap();
        for sql in [
            "CREATE TABLE filecache (fileid INTEGER PRIMARY KEY, path TEXT, size REAL)",
            "INSERT INTO filecache VALUES (1, 'a', 1.5), (2, 'b', NULL), (3, 'c', 3.0)",
        ] {
            executor
                .execute(&CompiledQuery {
                    sql: sql.to_string(),
                    params: Vec::new(),
                })
                .await
                .unwrap();
        }
        executor
    }

    #[tokio::test]
    async fn memory_database_survives_across_queries() {
        let executor = seeded().await;
        let mut qb = QueryBuilder::new(SqlDialect::Sqlite);
        qb.select(["fileid", "path", "size"]).from("filecache", None);

        let result = executor.fetch_builder(&qb).await.unwrap();
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.column_names(), vec!["fileid", "path", "size"]);
        assert_eq!(result.rows[0].values[0], Value::Int(1));
        assert_eq!(result.rows[1].values[2], Value::Null);
    }

    #[tokio::test]
    async fn binds_expanded_arrays() {
        let executor = seeded().await;
        let mut qb = QueryBuilder::new(SqlDialect::Sqlite);
        let ids = qb.create_named_parameter(vec![1_i64, 3]);
        qb.select(["path"])
            .from("filecache", None)
            .where_(Expr::in_list(col("fileid"), [ids]));

        let result = executor.fetch_builder(&qb).await.unwrap();
        let paths: Vec<&Value> = result.rows.iter().map(|r| &r.values[0]).collect();
        assert_eq!(paths, vec![&Value::Text("a".into()), &Value::Text("c".into())]);
    }

    #[tokio::test]
    async fn reports_affected_rows_and_errors() {
        let executor = seeded().await;
        let mut delete = QueryBuilder::new(SqlDialect::Sqlite);
        delete
            .delete("filecache")
            .where_(Expr::gt(col("fileid"), qore_query::lit(1)));
        assert_eq!(executor.execute_builder(&delete).await.unwrap(), 2);

        let err = executor
            .fetch(&CompiledQuery {
                sql: "SELECT * FROM missing_table".to_string(),
                params: Vec::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ExecutionError { .. }));
    }

    #[tokio::test]
    async fn file_databases_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("shard.db").display());
        let executor = SqliteExecutor::connect(&url, 2).await.unwrap();
        let result = executor
            .fetch(&CompiledQuery {
                sql: "SELECT 1 AS one".to_string(),
                params: Vec::new(),
            })
            .await
            .unwrap();
        assert_eq!(result.rows[0].values[0], Value::Int(1));
    }
}
