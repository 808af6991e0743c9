// SPDX-License-Identifier: Apache-2.0

//! Distributed cache primitives used by the key allocator

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use qore_core::EngineResult;

/// What a cache backend can guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheCapabilities {
    /// add/inc/cas/cad are atomic across every client of the cache
    pub atomic: bool,
    pub ttl: bool,
    /// Shared between processes
    pub distributed: bool,
}

#[async_trait]
pub trait DistributedCache: Send + Sync {
    fn capabilities(&self) -> CacheCapabilities;

    /// Stores `value` unless `key` exists. Returns whether it was stored.
    async fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> EngineResult<bool>;

    /// Atomically adds `step` and returns the new value; a missing key
    /// starts from zero. `None` when the stored value isn't an integer.
    async fn inc(&self, key: &str, step: i64) -> EngineResult<Option<i64>>;

    /// Compare and swap: replaces `old` with `new`, keeping the TTL.
    async fn cas(&self, key: &str, old: &str, new: &str) -> EngineResult<bool>;

    /// Compare and delete: deletes `key` if it holds `old`.
    async fn cad(&self, key: &str, old: &str) -> EngineResult<bool>;

    /// Deletes `key` unless it holds `old`.
    async fn ncad(&self, key: &str, old: &str) -> EngineResult<bool>;

    async fn set_ttl(&self, key: &str, ttl: Duration) -> EngineResult<()>;

    async fn get(&self, key: &str) -> EngineResult<Option<String>>;
}
