// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL Executor

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::{Column, Row, TypeInfo};
use uuid::Uuid;

use qore_core::{ColumnInfo, EngineError, EngineResult, QueryResult, Row as QRow, Value};
use qore_query::{CompiledQuery, SqlDialect};

use crate::error::{elapsed_ms, map_query_error};
use crate::traits::QueryExecutor;

pub struct PostgresExecutor {
    pool: PgPool,
}

impl PostgresExecutor {
    const ACQUIRE_TIMEOUT_SECS: u64 = 30;

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> EngineResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(Self::ACQUIRE_TIMEOUT_SECS))
            .connect(url)
            .await
            .map_err(|e| EngineError::connection_failed(e.to_string()))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, Postgres, PgArguments>,
        value: &'q Value,
    ) -> sqlx::query::Query<'q, Postgres, PgArguments> {
        match value {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(b),
            Value::Int(i) => query.bind(i),
            Value::Float(f) => query.bind(f),
            Value::Text(s) => query.bind(s),
            Value::Bytes(b) => query.bind(b),
            Value::Json(j) => query.bind(j),
            Value::Array(_) => query.bind(Option::<String>::None),
        }
    }

    fn prepare<'q>(query: &'q CompiledQuery) -> sqlx::query::Query<'q, Postgres, PgArguments> {
        query
            .params
            .iter()
            .fold(sqlx::query(&query.sql), Self::bind_param)
    }

    fn convert_row(pg_row: &PgRow) -> QRow {
        let values: Vec<Value> = pg_row
            .columns()
            .iter()
            .map(|col| Self::extract_value(pg_row, col.ordinal()))
            .collect();

        QRow { values }
    }

    fn extract_value(row: &PgRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(Value::Int).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
            return v.map(Value::Bool).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v
                .map(|f| {
                    if f.is_finite() {
                        Value::Float(f)
                    } else {
                        Value::Text(f.to_string())
                    }
                })
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
            return v
                .map(|f| Value::Float(f as f64))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Decimal>, _>(idx) {
            return v
                .map(|d| match d.to_f64() {
                    Some(f) if f.is_finite() => Value::Float(f),
                    _ => Value::Text(d.to_string()),
                })
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Uuid>, _>(idx) {
            return v.map(|u| Value::Text(u.to_string())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::Text).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return v.map(Value::Bytes).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
            return v.map(Value::Json).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
            return v.map(|dt| Value::Text(dt.to_rfc3339())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            return v
                .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
            return v
                .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null);
        }

        Value::Null
    }

    fn get_column_info(row: &PgRow) -> Vec<ColumnInfo> {
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
impl QueryExecutor for PostgresExecutor {
    fn driver_id(&self) -> &'static str {
        "postgres"
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Postgres
    }

    async fn fetch(&self, query: &CompiledQuery) -> EngineResult<QueryResult> {
        let start = Instant::now();
        let pg_rows: Vec<PgRow> = Self::prepare(query)
            .fetch_all(&self.pool)
            .await
            .map_err(map_query_error)?;
        let execution_time_ms = elapsed_ms(start);

        tracing::debug!(
            sql = %query.sql,
            rows = pg_rows.len(),
            execution_time_ms,
            "PostgreSQL: fetched"
        );

        Ok(QueryResult {
            columns: pg_rows.first().map(Self::get_column_info).unwrap_or_default(),
            rows: pg_rows.iter().map(Self::convert_row).collect(),
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
    use qore_query::{col, Expr, OrderDirection, QueryBuilder};

    fn raw(sql: &str) -> CompiledQuery {
        CompiledQuery {
            sql: sql.to_string(),
            params: Vec::new(),
        }
    }

    #[tokio::test]
    async fn binds_numbered_placeholders() {
        let Ok(url) = std::env::var("QOREDB_TEST_PG_URL") else {
            eprintln!("QOREDB_TEST_PG_URL not set; skipping");
            return;
        };
        // temporary tables are per connection
        let executor = PostgresExecutor::connect(&url, 1).await.unwrap();
        executor
            .execute(&raw("CREATE TEMP TABLE shard_items (id BIGINT PRIMARY KEY, label TEXT)"))
            .await
            .unwrap();
        executor
            .execute(&raw("INSERT INTO shard_items VALUES (1, 'a'), (2, 'b'), (3, 'c')"))
            .await
            .unwrap();

        let mut qb = QueryBuilder::new(SqlDialect::Postgres);
        let ids = qb.create_named_parameter(vec![1_i64, 3]);
        qb.select(["id", "label"])
            .from("shard_items", None)
            .where_(Expr::in_list(col("id"), [ids]))
            .order_by(col("id"), OrderDirection::Asc);

        let result = executor.fetch_builder(&qb).await.unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.columns[0].data_type, "INT8");
        assert_eq!(result.rows[1].values[1], Value::Text("c".into()));
    }
}
