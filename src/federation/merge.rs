// SPDX-License-Identifier: Apache-2.0

//! Result merging
//!
//! Each split query is restricted to the join keys present in the rows
//! accumulated so far, executed on its own connection and stitched back
//! onto those rows in memory. Keys are sent in batches of
//! [`SPLIT_KEY_BATCH`] so large key sets stay under driver bind limits.

use std::collections::{HashMap, HashSet};

use qore_core::{ColumnInfo, EngineError, EngineResult, QueryResult, Row, Value};
use qore_query::{Expr, Param};

use crate::engine::PartitionConnections;
use crate::metrics;

use super::split::{SplitJoinMode, SplitQuery};

const SPLIT_KEYS_PARAMETER: &str = "__split_keys";
/// Keys bound per split query execution
pub(crate) const SPLIT_KEY_BATCH: usize = 1000;

/// Join key as compared by the merger.
///
/// Numeric values share one form so that an `INTEGER` from SQLite matches a
/// `BIGINT`, `BOOLEAN` or integral `NUMERIC` from Postgres. Text is compared
/// exactly: `'07'` and `'7'` are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum JoinKey {
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
    Float(u64),
}

impl JoinKey {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(JoinKey::Int(*i)),
            Value::Bool(b) => Some(JoinKey::Int(i64::from(*b))),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Some(JoinKey::Int(*f as i64))
            }
            Value::Float(f) => Some(JoinKey::Float(f.to_bits())),
            Value::Text(s) => Some(JoinKey::Text(s.clone())),
            Value::Bytes(b) => Some(JoinKey::Bytes(b.clone())),
            Value::Json(j) => Some(JoinKey::Text(j.to_string())),
            // NULL never equals anything in SQL
            Value::Null | Value::Array(_) => None,
        }
    }
}

/// Merges every split into `accumulated`, in order.
pub(crate) async fn merge_splits(
    mut accumulated: QueryResult,
    splits: &[SplitQuery],
    connections: &dyn PartitionConnections,
) -> EngineResult<QueryResult> {
    for (index, split) in splits.iter().enumerate() {
        if accumulated.rows.is_empty() {
            // nothing left to join against; keep the column list complete
            if split.mode != SplitJoinMode::LeftNull {
                for name in split.query.output_columns() {
                    if accumulated.column_index(&name).is_none() {
                        accumulated.columns.push(ColumnInfo::untyped(name));
                    }
                }
            }
            metrics::record_split_skipped();
            continue;
        }

        let split_result = fetch_split(&accumulated, index, split, connections).await?;
        accumulated = merge_one(accumulated, split_result, split)?;
    }
    Ok(accumulated)
}

async fn fetch_split(
    accumulated: &QueryResult,
    index: usize,
    split: &SplitQuery,
    connections: &dyn PartitionConnections,
) -> EngineResult<QueryResult> {
    let from_index = accumulated
        .column_index(&split.join_from.name)
        .ok_or_else(|| {
            EngineError::internal(format!(
                "Join column '{}' missing from the rows joined into partition '{}'",
                split.join_from, split.name
            ))
        })?;

    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for row in &accumulated.rows {
        let value = &row.values[from_index];
        if let Some(key) = JoinKey::from_value(value) {
            if seen.insert(key) {
                keys.push(value.clone());
            }
        }
    }

    let mut result = QueryResult::empty();
    if keys.is_empty() {
        metrics::record_split_skipped();
    } else {
        let executor = connections.executor(&split.target)?;
        let parameter = format!("{SPLIT_KEYS_PARAMETER}_{index}");
        let mut query = split.query.clone();
        query.and_where(Expr::in_list(
            Expr::Column(split.join_to.clone()),
            [Expr::Param(Param::Named(parameter.clone()))],
        ));

        tracing::debug!(
            partition = %split.name,
            target = %split.target,
            keys = keys.len(),
            batches = keys.len().div_ceil(SPLIT_KEY_BATCH),
            "Executing split query"
        );
        for batch in keys.chunks(SPLIT_KEY_BATCH) {
            query.set_parameter(&parameter, Value::Array(batch.to_vec()));
            let batch_result = executor.fetch_builder(&query).await?;
            if result.columns.is_empty() {
                result.columns = batch_result.columns;
            }
            result.rows.extend(batch_result.rows);
            result.execution_time_ms += batch_result.execution_time_ms;
        }
        metrics::record_split_executed();
    }

    if result.columns.is_empty() {
        result.columns = split
            .query
            .output_columns()
            .into_iter()
            .map(ColumnInfo::untyped)
            .collect();
    }
    Ok(result)
}

fn merge_one(
    mut accumulated: QueryResult,
    split_result: QueryResult,
    split: &SplitQuery,
) -> EngineResult<QueryResult> {
    let from_index = accumulated
        .column_index(&split.join_from.name)
        .ok_or_else(|| EngineError::internal("Join column vanished during merge"))?;

    let mut matches: HashMap<JoinKey, Vec<&Row>> = HashMap::new();
    if !split_result.rows.is_empty() {
        let to_index = split_result
            .column_index(&split.join_to.name)
            .ok_or_else(|| {
                EngineError::internal(format!(
                    "Partition '{}' did not return join column '{}'",
                    split.name, split.join_to
                ))
            })?;
        for row in &split_result.rows {
            if let Some(key) = JoinKey::from_value(&row.values[to_index]) {
                matches.entry(key).or_default().push(row);
            }
        }
    }

    let rows = std::mem::take(&mut accumulated.rows);
    let lookup = |row: &Row| {
        JoinKey::from_value(&row.values[from_index]).and_then(|key| matches.get(&key))
    };

    if split.mode == SplitJoinMode::LeftNull {
        accumulated.rows = rows.into_iter().filter(|row| lookup(row).is_none()).collect();
        accumulated.execution_time_ms += split_result.execution_time_ms;
        return Ok(accumulated);
    }

    // split columns overwrite same-named columns, the rest are appended
    let mut slots = Vec::with_capacity(split_result.columns.len());
    for column in &split_result.columns {
        match accumulated.column_index(&column.name) {
            Some(existing) => slots.push(existing),
            None => {
                slots.push(accumulated.columns.len());
                accumulated.columns.push(column.clone());
            }
        }
    }
    let merged_width = accumulated.columns.len();

    let mut merged = Vec::with_capacity(rows.len());
    for row in rows {
        match lookup(&row) {
            Some(split_rows) => {
                for split_row in split_rows {
                    let mut values = row.values.clone();
                    values.resize(merged_width, Value::Null);
                    for (&slot, value) in slots.iter().zip(&split_row.values) {
                        values[slot] = value.clone();
                    }
                    merged.push(Row { values });
                }
            }
            None if split.mode == SplitJoinMode::Left => {
                let mut values = row.values;
                values.resize(merged_width, Value::Null);
                merged.push(Row { values });
            }
            None => {}
        }
    }
    accumulated.rows = merged;
    accumulated.execution_time_ms += split_result.execution_time_ms;
    Ok(accumulated)
}
