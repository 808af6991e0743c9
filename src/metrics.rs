//! Lightweight in-process counters for federation and key allocation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

#[derive(Default)]
struct ShardMetrics {
    federated_queries: AtomicU64,
    split_queries: AtomicU64,
    splits_executed: AtomicU64,
    splits_skipped: AtomicU64,
    keys_allocated: AtomicU64,
    allocation_retries: AtomicU64,
    cold_starts: AtomicU64,
    contention_failures: AtomicU64,
    max_attempts: AtomicU64,
}

static SHARD_METRICS: OnceLock<ShardMetrics> = OnceLock::new();

fn metrics() -> &'static ShardMetrics {
    SHARD_METRICS.get_or_init(ShardMetrics::default)
}

/// A query was executed; `splits` is the number of split queries it planned.
pub fn record_federated_query(splits: usize) {
    let metrics = metrics();
    metrics.federated_queries.fetch_add(1, Ordering::Relaxed);
    metrics
        .split_queries
        .fetch_add(splits as u64, Ordering::Relaxed);
}

pub fn record_split_executed() {
    metrics().splits_executed.fetch_add(1, Ordering::Relaxed);
}

/// A split query was not sent because there was nothing to join against.
pub fn record_split_skipped() {
    metrics().splits_skipped.fetch_add(1, Ordering::Relaxed);
}

pub fn record_key_allocated(attempts: u32) {
    let metrics = metrics();
    let attempts = u64::from(attempts);
    metrics.keys_allocated.fetch_add(1, Ordering::Relaxed);

    let mut current = metrics.max_attempts.load(Ordering::Relaxed);
    while attempts > current {
        match metrics.max_attempts.compare_exchange(
            current,
            attempts,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(next) => current = next,
        }
    }
}

pub fn record_allocation_retry() {
    metrics().allocation_retries.fetch_add(1, Ordering::Relaxed);
}

pub fn record_cold_start() {
    metrics().cold_starts.fetch_add(1, Ordering::Relaxed);
}

pub fn record_contention_failure() {
    metrics().contention_failures.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Serialize)]
pub struct ShardMetricsSnapshot {
    pub federated_queries: u64,
    pub split_queries: u64,
    pub splits_executed: u64,
    pub splits_skipped: u64,
    pub keys_allocated: u64,
    pub allocation_retries: u64,
    pub cold_starts: u64,
    pub contention_failures: u64,
    pub max_attempts: Option<u64>,
}

pub fn snapshot() -> ShardMetricsSnapshot {
    let metrics = metrics();
    let max_attempts = metrics.max_attempts.load(Ordering::Relaxed);

    ShardMetricsSnapshot {
        federated_queries: metrics.federated_queries.load(Ordering::Relaxed),
        split_queries: metrics.split_queries.load(Ordering::Relaxed),
        splits_executed: metrics.splits_executed.load(Ordering::Relaxed),
        splits_skipped: metrics.splits_skipped.load(Ordering::Relaxed),
        keys_allocated: metrics.keys_allocated.load(Ordering::Relaxed),
        allocation_retries: metrics.allocation_retries.load(Ordering::Relaxed),
        cold_starts: metrics.cold_starts.load(Ordering::Relaxed),
        contention_failures: metrics.contention_failures.load(Ordering::Relaxed),
        max_attempts: (max_attempts > 0).then_some(max_attempts),
    }
}
