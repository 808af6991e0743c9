// SPDX-License-Identifier: Apache-2.0

//! Cross-partition query federation
//!
//! [`PartitionedQueryBuilder`] accepts the same calls as a plain
//! [`QueryBuilder`](qore_query::QueryBuilder). Joins that cross a partition
//! boundary are split into one [`SplitQuery`] per partition; after the main
//! query runs, each split is restricted to the join keys found so far and
//! merged back in memory.

pub mod builder;
pub mod join_condition;
mod merge;
pub mod partition;
pub mod plan;
mod predicate;
pub mod result;
pub mod split;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::PartitionedQueryBuilder;
pub use join_condition::JoinCondition;
pub use partition::PartitionSplit;
pub use plan::FederatedPlan;
pub use result::{BufferedResult, FederatedResult, ResultCursor};
pub use split::{QueryTarget, SplitJoinMode, SplitQuery};
