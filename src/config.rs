// SPDX-License-Identifier: Apache-2.0

//! Sharding configuration
//!
//! Loaded from a JSON file. Connection URLs can be overridden through
//! `QOREDB_SHARD_*` environment variables so credentials don't have to
//! live in the file.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use qore_core::{EngineError, EngineResult};

use crate::engine::{connect_url, ShardConnectionManager, ShardDefinition, StaticConnections};
use crate::federation::PartitionSplit;
use crate::keygen::{DistributedCache, MemoryCache, RedisCache};
use crate::observability::{LoggingConfig, Sensitive};

pub const ENV_CACHE_URL: &str = "QOREDB_SHARD_CACHE_URL";
pub const ENV_DEFAULT_URL: &str = "QOREDB_SHARD_DEFAULT_URL";
pub const ENV_POOL_MAX: &str = "QOREDB_SHARD_POOL_MAX";

const DEFAULT_POOL_MAX: u32 = 5;
const DEFAULT_CACHE_PREFIX: &str = "qoredb:";

/// A group of tables living in their own database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub name: String,
    pub tables: Vec<String>,
    pub url: Sensitive<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardingConfig {
    /// Main database every unpartitioned table lives in
    pub default_url: Sensitive<String>,
    /// Redis URL for key allocation; an in-process cache is used without it
    #[serde(default)]
    pub cache_url: Option<Sensitive<String>>,
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,
    #[serde(default = "default_pool_max")]
    pub pool_max_connections: u32,
    #[serde(default)]
    pub partitions: Vec<PartitionConfig>,
    /// Sharded tables
    #[serde(default)]
    pub tables: Vec<ShardDefinition>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_cache_prefix() -> String {
    DEFAULT_CACHE_PREFIX.to_string()
}

fn default_pool_max() -> u32 {
    DEFAULT_POOL_MAX
}

impl ShardingConfig {
    /// Reads, applies environment overrides and validates.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::parse(&content)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            partitions = config.partitions.len(),
            tables = config.tables.len(),
            "Loaded sharding configuration"
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> EngineResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| EngineError::configuration(format!("Invalid sharding config: {e}")))
    }

    /// Applies `QOREDB_SHARD_*` overrides read through `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> EngineResult<()> {
        if let Some(url) = lookup(ENV_DEFAULT_URL) {
            self.default_url = Sensitive::new(url);
        }
        if let Some(url) = lookup(ENV_CACHE_URL) {
            self.cache_url = (!url.is_empty()).then(|| Sensitive::new(url));
        }
        if let Some(max) = lookup(ENV_POOL_MAX) {
            self.pool_max_connections = max.trim().parse().map_err(|_| {
                EngineError::configuration(format!("{ENV_POOL_MAX} must be a number, got '{max}'"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.pool_max_connections == 0 {
            return Err(EngineError::configuration(
                "pool_max_connections must be at least 1",
            ));
        }

        let mut names = HashSet::new();
        let mut owners: Vec<(&str, &str)> = Vec::new();
        for partition in &self.partitions {
            if !names.insert(partition.name.as_str()) {
                return Err(EngineError::configuration(format!(
                    "Partition '{}' is defined twice",
                    partition.name
                )));
            }
            for table in &partition.tables {
                if let Some((_, owner)) = owners.iter().find(|(t, _)| *t == table.as_str()) {
                    return Err(EngineError::configuration(format!(
                        "Table '{table}' is in partitions '{owner}' and '{}'",
                        partition.name
                    )));
                }
                owners.push((table.as_str(), partition.name.as_str()));
            }
        }

        let mut tables = HashSet::new();
        for definition in &self.tables {
            definition.validate()?;
            if !tables.insert(definition.table.as_str()) {
                return Err(EngineError::configuration(format!(
                    "Sharded table '{}' is defined twice",
                    definition.table
                )));
            }
        }
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&ShardDefinition> {
        self.tables.iter().find(|t| t.table == name)
    }

    /// Partition descriptors to register on a partitioned query builder.
    pub fn partition_splits(&self) -> Vec<PartitionSplit> {
        self.partitions
            .iter()
            .map(|p| PartitionSplit::new(p.name.clone(), p.tables.iter().cloned()))
            .collect()
    }

    /// Opens the default database and every partition.
    pub async fn connect_partitions(&self) -> EngineResult<StaticConnections> {
        let max = self.pool_max_connections;
        let mut connections = StaticConnections::new(connect_url(self.default_url.expose(), max).await?);
        for partition in &self.partitions {
            let executor = connect_url(partition.url.expose(), max).await?;
            tracing::info!(
                partition = %partition.name,
                url = %partition.url.redacted_url(),
                driver = executor.driver_id(),
                "Connected partition"
            );
            connections.add_partition(partition.name.clone(), executor);
        }
        Ok(connections)
    }

    pub fn shard_connections(&self) -> ShardConnectionManager {
        ShardConnectionManager::new(self.pool_max_connections)
    }

    pub async fn build_cache(&self) -> EngineResult<Arc<dyn DistributedCache>> {
        match &self.cache_url {
            Some(url) => Ok(Arc::new(RedisCache::connect(url, self.cache_prefix.clone()).await?)),
            None => {
                tracing::warn!("No cache_url configured, using an in-process key cache");
                Ok(Arc::new(MemoryCache::new()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    use crate::federation::QueryTarget;
    use crate::engine::PartitionConnections;

    const CONFIG: &str = r#"{
        "default_url": "sqlite::memory:",
        "partitions": [
            { "name": "metadata", "tables": ["file_metadata"], "url": "sqlite::memory:" }
        ],
        "tables": [
            {
                "table": "filecache",
                "primary_key": "fileid",
                "shard_key": "storage",
                "shards": [{ "url": "sqlite::memory:" }, { "url": "sqlite::memory:", "max_connections": 2 }]
            }
        ]
    }"#;

    #[test]
    fn loads_from_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = ShardingConfig::load(file.path()).unwrap();
        assert_eq!(config.cache_prefix, DEFAULT_CACHE_PREFIX);
        assert_eq!(config.partitions[0].tables, vec!["file_metadata"]);
        let table = config.table("filecache").unwrap();
        assert_eq!(table.shard_count(), 2);
        assert_eq!(table.key_floor, 0);
        assert_eq!(table.shards[1].max_connections, Some(2));
        assert!(config.partition_splits()[0].contains_table("file_metadata"));
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ShardingConfig::load(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[test]
    fn environment_overrides_win() {
        let mut config = ShardingConfig::parse(CONFIG).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_CACHE_URL, "redis://127.0.0.1:6379"),
            (ENV_POOL_MAX, "12"),
        ]);
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.pool_max_connections, 12);
        assert_eq!(
            config.cache_url.as_ref().map(|u| u.expose().as_str()),
            Some("redis://127.0.0.1:6379")
        );
        assert_eq!(config.default_url.expose(), "sqlite::memory:");

        let err = config
            .apply_overrides(|name| (name == ENV_POOL_MAX).then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_POOL_MAX));
    }

    #[test]
    fn rejects_tables_in_two_partitions() {
        let mut config = ShardingConfig::parse(CONFIG).unwrap();
        config.partitions.push(PartitionConfig {
            name: "other".into(),
            tables: vec!["file_metadata".into()],
            url: Sensitive::new("sqlite::memory:".into()),
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'metadata' and 'other'"));
    }

    #[test]
    fn rejects_duplicate_partitions_and_oversized_tables() {
        let mut config = ShardingConfig::parse(CONFIG).unwrap();
        config.partitions.push(config.partitions[0].clone());
        config.partitions[1].tables.clear();
        assert!(config.validate().unwrap_err().to_string().contains("defined twice"));

        let mut config = ShardingConfig::parse(CONFIG).unwrap();
        let shard = config.tables[0].shards[0].clone();
        config.tables[0].shards = vec![shard; 256];
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn connects_every_partition() {
        let config = ShardingConfig::parse(CONFIG).unwrap();
        let connections = config.connect_partitions().await.unwrap();
        assert!(connections
            .executor(&QueryTarget::Partition("metadata".into()))
            .is_ok());

        let cache = config.build_cache().await.unwrap();
        assert!(!cache.capabilities().distributed);
    }
}
