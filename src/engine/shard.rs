// SPDX-License-Identifier: Apache-2.0

//! Sharded tables
//!
//! A [`ShardDefinition`] describes one table spread over up to 255 shard
//! databases. Primary keys carry their origin shard in the low 8 bits, so
//! the counter part of a key is `primary_key >> 8`.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::instrument;

use qore_core::{EngineError, EngineResult};
use qore_drivers::QueryExecutor;

use super::connections::connect_url;
use crate::observability::Sensitive;

pub const MAX_SHARDS: usize = 255;
/// Low bits of a primary key reserved for the origin shard
pub const SHARD_BITS: u32 = 8;
const SHARD_MASK: i64 = (1 << SHARD_BITS) - 1;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    pub url: Sensitive<String>,
    #[serde(default)]
    pub max_connections: Option<u32>,
}

impl ShardConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Sensitive::new(url.into()),
            max_connections: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardDefinition {
    pub table: String,
    pub primary_key: String,
    /// Column rows are distributed by
    pub shard_key: String,
    pub shards: Vec<ShardConfig>,
    /// Lower bound for the primary key scan on cold start
    #[serde(default)]
    pub key_floor: i64,
}

impl ShardDefinition {
    pub fn validate(&self) -> EngineResult<()> {
        if self.table.is_empty() || self.primary_key.is_empty() {
            return Err(EngineError::configuration(
                "Sharded tables need a table name and a primary key column",
            ));
        }
        if self.shards.is_empty() {
            return Err(EngineError::configuration(format!(
                "Sharded table '{}' has no shards",
                self.table
            )));
        }
        if self.shards.len() > MAX_SHARDS {
            return Err(EngineError::configuration(format!(
                "Sharded table '{}' has {} shards, at most {MAX_SHARDS} are supported",
                self.table,
                self.shards.len()
            )));
        }
        Ok(())
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard a row with this shard key value lives on.
    pub fn shard_for_key(&self, key: u64) -> usize {
        match self.shard_count() {
            0 => 0,
            count => (key % count as u64) as usize,
        }
    }

    pub fn all_shards(&self) -> Range<usize> {
        0..self.shard_count()
    }

    /// Shard that allocated `primary_key`.
    pub fn origin_shard(primary_key: i64) -> usize {
        (primary_key & SHARD_MASK) as usize
    }

    /// Largest counter value that still fits a primary key.
    pub fn max_key() -> u64 {
        (i64::MAX >> SHARD_BITS) as u64
    }
}

/// Resolves the executor of one shard of a sharded table.
#[async_trait]
pub trait ShardConnections: Send + Sync {
    async fn shard_executor(
        &self,
        definition: &ShardDefinition,
        shard: usize,
    ) -> EngineResult<Arc<dyn QueryExecutor>>;
}

/// Lazily opened pools, one per distinct shard URL.
pub struct ShardConnectionManager {
    pools: RwLock<HashMap<String, Arc<dyn QueryExecutor>>>,
    max_connections: u32,
}

impl ShardConnectionManager {
    const CONNECT_TIMEOUT_MS: u64 = 15000;

    pub fn new(max_connections: u32) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    /// Registers an already open executor for `url`.
    pub async fn insert(&self, url: impl Into<String>, executor: Arc<dyn QueryExecutor>) {
        self.pools.write().await.insert(url.into(), executor);
    }

    pub async fn pool_count(&self) -> usize {
        self.pools.read().await.len()
    }

    #[instrument(skip(self, config))]
    async fn pool_for(&self, config: &ShardConfig) -> EngineResult<Arc<dyn QueryExecutor>> {
        let url = config.url.expose();
        if let Some(executor) = self.pools.read().await.get(url) {
            return Ok(Arc::clone(executor));
        }

        let mut pools = self.pools.write().await;
        // another task may have connected while we waited for the lock
        if let Some(executor) = pools.get(url) {
            return Ok(Arc::clone(executor));
        }

        let max_connections = config.max_connections.unwrap_or(self.max_connections);
        let executor = match timeout(
            Duration::from_millis(Self::CONNECT_TIMEOUT_MS),
            connect_url(url, max_connections),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(EngineError::Timeout {
                    timeout_ms: Self::CONNECT_TIMEOUT_MS,
                })
            }
        };

        tracing::info!(
            url = %config.url.redacted_url(),
            driver = executor.driver_id(),
            "Opened shard pool"
        );
        pools.insert(url.clone(), Arc::clone(&executor));
        Ok(executor)
    }
}

impl Default for ShardConnectionManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONNECTIONS)
    }
}

#[async_trait]
impl ShardConnections for ShardConnectionManager {
    async fn shard_executor(
        &self,
        definition: &ShardDefinition,
        shard: usize,
    ) -> EngineResult<Arc<dyn QueryExecutor>> {
        let config = definition.shards.get(shard).ok_or_else(|| {
            EngineError::validation(format!(
                "Shard {shard} out of range for '{}' ({} shards)",
                definition.table,
                definition.shard_count()
            ))
        })?;
        self.pool_for(config).await
    }
}
