// SPDX-License-Identifier: Apache-2.0

//! Sharded primary key allocator
//!
//! Keys come from a counter in the distributed cache. When the counter is
//! missing (first use, eviction, expiry) it is rebuilt from the largest
//! primary key found on any shard. See [`protocol`](super::protocol) for
//! the retry rules.

use std::sync::Arc;

use tracing::instrument;

use qore_core::{EngineError, EngineResult, Value};
use qore_query::{col, OrderDirection, QueryBuilder};

use super::cache::DistributedCache;
use super::protocol::{
    Action, AllocationStep, Observation, Transition, COUNTER_TTL, MAX_ATTEMPTS, PLACEHOLDER,
};
use crate::engine::shard::SHARD_BITS;
use crate::engine::{ShardConnections, ShardDefinition};
use crate::metrics;

const COUNTER_PREFIX: &str = "shard_keys";

pub struct KeyAllocator {
    cache: Arc<dyn DistributedCache>,
    shards: Arc<dyn ShardConnections>,
    ttl_supported: bool,
}

impl KeyAllocator {
    pub fn new(
        cache: Arc<dyn DistributedCache>,
        shards: Arc<dyn ShardConnections>,
    ) -> EngineResult<Self> {
        if usize::BITS < 64 {
            return Err(EngineError::configuration(
                "Sharded key allocation requires 64-bit integers",
            ));
        }
        let capabilities = cache.capabilities();
        if !capabilities.atomic {
            return Err(EngineError::configuration(
                "Sharded key allocation requires a cache with atomic operations",
            ));
        }
        if !capabilities.distributed {
            tracing::warn!("Key allocation cache is local to this process");
        }

        Ok(Self {
            cache,
            shards,
            ttl_supported: capabilities.ttl,
        })
    }

    /// Cache key holding the counter of a sharded table.
    pub fn counter_key(definition: &ShardDefinition) -> String {
        format!(
            "{COUNTER_PREFIX}:{}:{}",
            definition.table, definition.primary_key
        )
    }

    /// Allocates the next counter value for `definition`.
    #[instrument(skip(self, definition), fields(table = %definition.table))]
    pub async fn next_key(&self, definition: &ShardDefinition) -> EngineResult<u64> {
        let key = Self::counter_key(definition);

        for attempt in 1..=MAX_ATTEMPTS {
            if let Some(value) = self.attempt(definition, &key).await? {
                let value = u64::try_from(value).map_err(|_| {
                    EngineError::internal(format!("Counter for '{}' went negative", definition.table))
                })?;
                if value > ShardDefinition::max_key() {
                    return Err(EngineError::KeySpaceExhausted {
                        table: definition.table.clone(),
                        max: ShardDefinition::max_key(),
                    });
                }
                metrics::record_key_allocated(attempt);
                return Ok(value);
            }

            metrics::record_allocation_retry();
            tracing::debug!(attempt, "Key allocation raced with another writer, retrying");
        }

        metrics::record_contention_failure();
        tracing::warn!(attempts = MAX_ATTEMPTS, "Giving up on key allocation");
        Err(EngineError::ContentionExhausted {
            table: definition.table.clone(),
            attempts: MAX_ATTEMPTS,
        })
    }

    /// Allocates a primary key for a row created on `shard`: the counter
    /// value with the shard index in the low 8 bits.
    pub async fn next_primary_key(
        &self,
        definition: &ShardDefinition,
        shard: usize,
    ) -> EngineResult<i64> {
        if shard >= definition.shard_count() {
            return Err(EngineError::validation(format!(
                "Shard {shard} out of range for '{}' ({} shards)",
                definition.table,
                definition.shard_count()
            )));
        }
        let next = self.next_key(definition).await?;
        // next <= max_key, so the shift can't overflow
        Ok(((next as i64) << SHARD_BITS) | shard as i64)
    }

    /// Largest counter value in use on any shard, without the origin bits.
    pub async fn max_key_from_shards(&self, definition: &ShardDefinition) -> EngineResult<i64> {
        let mut max = definition.key_floor;
        for shard in definition.all_shards() {
            let executor = self.shards.shard_executor(definition, shard).await?;
            let mut query = QueryBuilder::new(executor.dialect());
            query
                .select([definition.primary_key.as_str()])
                .from(&definition.table, None)
                .order_by(col(&definition.primary_key), OrderDirection::Desc)
                .set_max_results(Some(1));

            let result = executor.fetch_builder(&query).await?;
            let shard_max = result
                .rows
                .first()
                .and_then(|row| row.values.first())
                .and_then(Value::as_i64);
            tracing::debug!(shard, ?shard_max, "Scanned shard for largest key");
            if let Some(value) = shard_max {
                max = max.max(value);
            }
        }
        Ok(max >> SHARD_BITS)
    }

    /// Runs one attempt; `None` means it has to be retried.
    async fn attempt(&self, definition: &ShardDefinition, key: &str) -> EngineResult<Option<i64>> {
        let mut step = AllocationStep::new(self.ttl_supported);
        let mut action = step.first_action();
        loop {
            let observation = self.perform(definition, key, action).await?;
            match step.advance(observation) {
                Transition::Run(next) => action = next,
                Transition::Allocated(value) => {
                    if step.is_cold_start() {
                        metrics::record_cold_start();
                        tracing::info!(value, "Initialized key counter from shard data");
                    }
                    return Ok(Some(value));
                }
                Transition::Retry => return Ok(None),
            }
        }
    }

    async fn perform(
        &self,
        definition: &ShardDefinition,
        key: &str,
        action: Action,
    ) -> EngineResult<Observation> {
        let cache = &self.cache;
        Ok(match action {
            Action::AddPlaceholder => {
                let ttl = self.ttl_supported.then_some(COUNTER_TTL);
                cache.add(key, PLACEHOLDER, ttl).await?;
                Observation::Done
            }
            Action::Increment => Observation::Counter(cache.inc(key, 1).await?),
            Action::RefreshTtl => {
                cache.set_ttl(key, COUNTER_TTL).await?;
                Observation::Done
            }
            Action::ResetToPlaceholder(value) => {
                Observation::Swapped(cache.cas(key, &value.to_string(), PLACEHOLDER).await?)
            }
            Action::LoadMaxKey => Observation::MaxKey(self.max_key_from_shards(definition).await?),
            Action::Initialize(candidate) => {
                Observation::Swapped(cache.cas(key, PLACEHOLDER, &candidate.to_string()).await?)
            }
            // only ever removes our own placeholder, never a live counter
            Action::ClearStray => Observation::Swapped(cache.cad(key, PLACEHOLDER).await?),
        })
    }
}
