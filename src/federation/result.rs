// SPDX-License-Identifier: Apache-2.0

//! Result access
//!
//! [`ResultCursor`] gives plain and federated results the same row-by-row
//! and fetch-all surface.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use qore_core::{ColumnInfo, EngineError, EngineResult, QueryResult, Row, RowData, Value};

use crate::engine::PartitionConnections;
use crate::metrics;

use super::merge::merge_splits;
use super::plan::FederatedPlan;

#[async_trait]
pub trait ResultCursor: Send {
    /// Next row, or `None` when exhausted
    async fn fetch(&mut self) -> EngineResult<Option<Row>>;

    async fn fetch_associative(&mut self) -> EngineResult<Option<RowData>>;

    /// First column of the next row
    async fn fetch_one(&mut self) -> EngineResult<Option<Value>>;

    /// Every remaining row
    async fn fetch_all(&mut self) -> EngineResult<Vec<Row>>;

    async fn fetch_all_associative(&mut self) -> EngineResult<Vec<RowData>>;

    /// Total number of rows in the result, fetched or not
    async fn row_count(&mut self) -> EngineResult<usize>;

    async fn columns(&mut self) -> EngineResult<Vec<ColumnInfo>>;
}

/// A fully materialized result read through a cursor position.
#[derive(Debug, Clone)]
pub struct BufferedResult {
    result: QueryResult,
    position: usize,
}

impl BufferedResult {
    pub fn new(result: QueryResult) -> Self {
        Self {
            result,
            position: 0,
        }
    }

    pub fn into_inner(self) -> QueryResult {
        self.result
    }

    pub fn execution_time_ms(&self) -> f64 {
        self.result.execution_time_ms
    }

    fn next_row(&mut self) -> Option<Row> {
        let row = self.result.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        row
    }

    fn remaining(&mut self) -> Vec<Row> {
        let start = self.position.min(self.result.rows.len());
        self.position = self.result.rows.len();
        self.result.rows[start..].to_vec()
    }
}

#[async_trait]
impl ResultCursor for BufferedResult {
    async fn fetch(&mut self) -> EngineResult<Option<Row>> {
        Ok(self.next_row())
    }

    async fn fetch_associative(&mut self) -> EngineResult<Option<RowData>> {
        Ok(self.next_row().map(|row| self.result.associative(&row)))
    }

    async fn fetch_one(&mut self) -> EngineResult<Option<Value>> {
        Ok(self
            .next_row()
            .and_then(|row| row.values.into_iter().next()))
    }

    async fn fetch_all(&mut self) -> EngineResult<Vec<Row>> {
        Ok(self.remaining())
    }

    async fn fetch_all_associative(&mut self) -> EngineResult<Vec<RowData>> {
        let rows = self.remaining();
        Ok(rows.iter().map(|row| self.result.associative(row)).collect())
    }

    async fn row_count(&mut self) -> EngineResult<usize> {
        Ok(self.result.rows.len())
    }

    async fn columns(&mut self) -> EngineResult<Vec<ColumnInfo>> {
        Ok(self.result.columns.clone())
    }
}

enum State {
    Pending {
        plan: FederatedPlan,
        connections: Arc<dyn PartitionConnections>,
    },
    Loaded(BufferedResult),
}

/// Result of a possibly federated query. Nothing runs until the first
/// access.
pub struct FederatedResult {
    state: State,
}

impl FederatedResult {
    pub(crate) fn new(plan: FederatedPlan, connections: Arc<dyn PartitionConnections>) -> Self {
        Self {
            state: State::Pending { plan, connections },
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, State::Loaded(_))
    }

    /// The plan, while it hasn't been executed yet.
    pub fn plan(&self) -> Option<&FederatedPlan> {
        match &self.state {
            State::Pending { plan, .. } => Some(plan),
            State::Loaded(_) => None,
        }
    }

    async fn loaded(&mut self) -> EngineResult<&mut BufferedResult> {
        if let State::Pending { plan, connections } = &self.state {
            let result = execute_plan(plan, connections.as_ref()).await?;
            self.state = State::Loaded(BufferedResult::new(result));
        }
        match &mut self.state {
            State::Loaded(buffered) => Ok(buffered),
            State::Pending { .. } => Err(EngineError::internal("Federated result failed to load")),
        }
    }

    /// Loads (if needed) and returns the whole merged result.
    pub async fn into_result(mut self) -> EngineResult<QueryResult> {
        self.loaded().await?;
        match self.state {
            State::Loaded(buffered) => Ok(buffered.into_inner()),
            State::Pending { .. } => Err(EngineError::internal("Federated result failed to load")),
        }
    }
}

#[async_trait]
impl ResultCursor for FederatedResult {
    async fn fetch(&mut self) -> EngineResult<Option<Row>> {
        self.loaded().await?.fetch().await
    }

    async fn fetch_associative(&mut self) -> EngineResult<Option<RowData>> {
        self.loaded().await?.fetch_associative().await
    }

    async fn fetch_one(&mut self) -> EngineResult<Option<Value>> {
        self.loaded().await?.fetch_one().await
    }

    async fn fetch_all(&mut self) -> EngineResult<Vec<Row>> {
        self.loaded().await?.fetch_all().await
    }

    async fn fetch_all_associative(&mut self) -> EngineResult<Vec<RowData>> {
        self.loaded().await?.fetch_all_associative().await
    }

    async fn row_count(&mut self) -> EngineResult<usize> {
        self.loaded().await?.row_count().await
    }

    async fn columns(&mut self) -> EngineResult<Vec<ColumnInfo>> {
        self.loaded().await?.columns().await
    }
}

/// Runs the main query, then every split in order.
#[instrument(
    skip(plan, connections),
    fields(target = %plan.main_target(), partitions = plan.partition_count())
)]
pub(crate) async fn execute_plan(
    plan: &FederatedPlan,
    connections: &dyn PartitionConnections,
) -> EngineResult<QueryResult> {
    let executor = connections.executor(plan.main_target())?;
    let mut main = executor.fetch_builder(plan.main()).await?;
    metrics::record_federated_query(plan.splits().len());

    if !plan.is_split() {
        return Ok(main);
    }

    if main.columns.is_empty() {
        // drivers report no columns for an empty result set
        main.columns = plan
            .main()
            .output_columns()
            .into_iter()
            .map(ColumnInfo::untyped)
            .collect();
    }

    let merged = merge_splits(main, plan.splits(), connections).await?;
    tracing::debug!(
        rows = merged.rows.len(),
        time_ms = merged.execution_time_ms,
        "Merged federated result"
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::testing::result;

    fn buffered() -> BufferedResult {
        BufferedResult::new(result(
            &["id", "name"],
            vec![
                vec![Value::Int(1), "a".into()],
                vec![Value::Int(2), "b".into()],
                vec![Value::Int(3), "c".into()],
            ],
        ))
    }

    #[tokio::test]
    async fn fetch_then_fetch_all_returns_the_rest() {
        let mut cursor = buffered();
        assert_eq!(cursor.fetch_one().await.unwrap(), Some(Value::Int(1)));
        let row = cursor.fetch_associative().await.unwrap().unwrap();
        assert_eq!(row.get("name"), Some(&Value::from("b")));
        assert_eq!(cursor.fetch_all().await.unwrap().len(), 1);
        assert!(cursor.fetch().await.unwrap().is_none());
        assert!(cursor.fetch_all().await.unwrap().is_empty());
        assert_eq!(cursor.row_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn empty_main_result_still_names_every_column() {
        use crate::engine::StaticConnections;
        use crate::federation::testing::CannedExecutor;
        use crate::federation::{PartitionSplit, PartitionedQueryBuilder};
        use qore_query::{col, Expr};

        let metadata = Arc::new(CannedExecutor::default());
        let connections = StaticConnections::new(Arc::new(CannedExecutor::default()))
            .with_partition("metadata", metadata.clone());
        let mut qb = PartitionedQueryBuilder::new(Arc::new(connections));
        qb.add_partition(PartitionSplit::new("metadata", ["file_metadata"]))
            .unwrap();
        qb.select(["f.fileid", "f.path", "m.value"])
            .from("filecache", Some("f"));
        qb.left_join(
            "f",
            "file_metadata",
            Some("m"),
            Some(Expr::eq(col("f.fileid"), col("m.fileid"))),
        )
        .unwrap();

        let mut result = qb.execute_query().unwrap();
        let names: Vec<String> = result
            .columns()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["fileid", "path", "value"]);
        assert_eq!(result.row_count().await.unwrap(), 0);
        assert!(metadata.calls().is_empty());
    }

    #[tokio::test]
    async fn fetch_one_on_empty_result() {
        let mut cursor = BufferedResult::new(QueryResult::empty());
        assert_eq!(cursor.fetch_one().await.unwrap(), None);
        assert!(cursor.columns().await.unwrap().is_empty());
    }
}
