// SPDX-License-Identifier: Apache-2.0

//! Connection layer
//!
//! Resolves where queries run: [`PartitionConnections`] maps a federated
//! query's targets to executors, [`ShardConnections`] maps a sharded
//! table's shards to executors.

pub mod connections;
pub mod shard;

pub use connections::{connect_url, PartitionConnections, StaticConnections};
pub use shard::{ShardConfig, ShardConnectionManager, ShardConnections, ShardDefinition};
