// SPDX-License-Identifier: Apache-2.0

//! Test doubles for federation unit tests

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use qore_core::{ColumnInfo, EngineResult, QueryResult, Row, Value};
use qore_drivers::QueryExecutor;
use qore_query::{CompiledQuery, SqlDialect};

/// Executor replaying canned results and recording what it was asked.
#[derive(Default)]
pub(crate) struct CannedExecutor {
    responses: Mutex<VecDeque<QueryResult>>,
    calls: Mutex<Vec<CompiledQuery>>,
}

impl CannedExecutor {
    pub(crate) fn with_responses(responses: impl IntoIterator<Item = QueryResult>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<CompiledQuery> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl QueryExecutor for CannedExecutor {
    fn driver_id(&self) -> &'static str {
        "canned"
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    async fn fetch(&self, query: &CompiledQuery) -> EngineResult<QueryResult> {
        self.calls.lock().push(query.clone());
        Ok(self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(QueryResult::empty))
    }

    async fn execute(&self, query: &CompiledQuery) -> EngineResult<u64> {
        self.calls.lock().push(query.clone());
        Ok(0)
    }
}

pub(crate) fn result(columns: &[&str], rows: Vec<Vec<Value>>) -> QueryResult {
    QueryResult {
        columns: columns.iter().map(|c| ColumnInfo::untyped(*c)).collect(),
        rows: rows.into_iter().map(|values| Row { values }).collect(),
        affected_rows: None,
        execution_time_ms: 1.0,
    }
}
