// SPDX-License-Identifier: Apache-2.0

//! Executor trait

use async_trait::async_trait;

use qore_core::{EngineResult, QueryResult};
use qore_query::{CompiledQuery, QueryBuilder, SqlDialect};

/// Runs compiled statements against one database.
///
/// Implementations must be cheap to share: the connection layer hands out
/// `Arc<dyn QueryExecutor>` to every query that targets the same database.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Returns the driver identifier (e.g. "sqlite")
    fn driver_id(&self) -> &'static str;

    /// Dialect queries must be compiled for before reaching this executor
    fn dialect(&self) -> SqlDialect;

    /// Runs a row-returning statement
    async fn fetch(&self, query: &CompiledQuery) -> EngineResult<QueryResult>;

    /// Runs a statement and returns the number of affected rows
    async fn execute(&self, query: &CompiledQuery) -> EngineResult<u64>;

    /// Compiles `builder` for this executor's dialect and fetches it
    async fn fetch_builder(&self, builder: &QueryBuilder) -> EngineResult<QueryResult> {
        let compiled = builder.compile(self.dialect())?;
        self.fetch(&compiled).await
    }

    async fn execute_builder(&self, builder: &QueryBuilder) -> EngineResult<u64> {
        let compiled = builder.compile(self.dialect())?;
        self.execute(&compiled).await
    }
}
