// SPDX-License-Identifier: Apache-2.0

//! Resolved federated plan

use qore_query::QueryBuilder;

use super::split::{QueryTarget, SplitQuery};

/// Immutable result of resolving a [`PartitionedQueryBuilder`].
///
/// [`PartitionedQueryBuilder`]: super::PartitionedQueryBuilder
#[derive(Debug, Clone)]
pub struct FederatedPlan {
    pub(crate) main: QueryBuilder,
    pub(crate) main_target: QueryTarget,
    pub(crate) splits: Vec<SplitQuery>,
}

impl FederatedPlan {
    pub fn main(&self) -> &QueryBuilder {
        &self.main
    }

    pub fn main_target(&self) -> &QueryTarget {
        &self.main_target
    }

    /// Split queries in merge order
    pub fn splits(&self) -> &[SplitQuery] {
        &self.splits
    }

    pub fn partition_count(&self) -> usize {
        self.splits.len() + 1
    }

    pub fn is_split(&self) -> bool {
        !self.splits.is_empty()
    }

    pub fn main_sql(&self) -> String {
        self.main.to_sql()
    }

    /// `(split name, SQL)` for every split query.
    pub fn split_sql(&self) -> Vec<(&str, String)> {
        self.splits
            .iter()
            .map(|s| (s.name(), s.query().to_sql()))
            .collect()
    }
}
