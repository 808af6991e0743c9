// SPDX-License-Identifier: Apache-2.0

//! Partition connections

use std::collections::HashMap;
use std::sync::Arc;

use qore_core::{EngineError, EngineResult};
use qore_drivers::{PostgresExecutor, QueryExecutor, SqliteExecutor};

use crate::federation::QueryTarget;

/// Resolves the database a (sub-)query runs on.
pub trait PartitionConnections: Send + Sync {
    fn executor(&self, target: &QueryTarget) -> EngineResult<Arc<dyn QueryExecutor>>;
}

/// Fixed set of executors: the default database plus one per partition.
#[derive(Clone)]
pub struct StaticConnections {
    default: Arc<dyn QueryExecutor>,
    partitions: HashMap<String, Arc<dyn QueryExecutor>>,
}

impl StaticConnections {
    pub fn new(default: Arc<dyn QueryExecutor>) -> Self {
        Self {
            default,
            partitions: HashMap::new(),
        }
    }

    pub fn with_partition(
        mut self,
        name: impl Into<String>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        self.add_partition(name, executor);
        self
    }

    pub fn add_partition(&mut self, name: impl Into<String>, executor: Arc<dyn QueryExecutor>) {
        self.partitions.insert(name.into(), executor);
    }

    pub fn partition_names(&self) -> impl Iterator<Item = &str> {
        self.partitions.keys().map(String::as_str)
    }
}

impl PartitionConnections for StaticConnections {
    fn executor(&self, target: &QueryTarget) -> EngineResult<Arc<dyn QueryExecutor>> {
        match target {
            QueryTarget::Default => Ok(Arc::clone(&self.default)),
            QueryTarget::Partition(name) => self
                .partitions
                .get(name)
                .cloned()
                .ok_or_else(|| {
                    EngineError::configuration(format!(
                        "No connection configured for partition '{name}'"
                    ))
                }),
        }
    }
}

/// Opens an executor for a connection URL, picking the driver from its
/// scheme.
pub async fn connect_url(url: &str, max_connections: u32) -> EngineResult<Arc<dyn QueryExecutor>> {
    if url.starts_with("sqlite:") {
        let executor = SqliteExecutor::connect(url, max_connections).await?;
        return Ok(Arc::new(executor));
    }
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        let executor = PostgresExecutor::connect(url, max_connections).await?;
        return Ok(Arc::new(executor));
    }

    let scheme = url.split(':').next().unwrap_or_default();
    Err(EngineError::configuration(format!(
        "Unsupported database URL scheme '{scheme}'"
    )))
}
