// SPDX-License-Identifier: Apache-2.0

//! Per-partition sub-queries

use std::fmt;

use serde::{Deserialize, Serialize};

use qore_query::{ColumnRef, QueryBuilder, SelectItem};

/// Database a (sub-)query runs on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryTarget {
    /// The main, unpartitioned database
    Default,
    Partition(String),
}

impl fmt::Display for QueryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryTarget::Default => f.write_str("default"),
            QueryTarget::Partition(name) => write!(f, "partition:{name}"),
        }
    }
}

/// How rows of a sub-query attach to the accumulated rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitJoinMode {
    Inner,
    Left,
    /// Anti-join: keep only rows without a match, attach nothing
    LeftNull,
}

/// Query against one partition, joined back by a single column pair.
#[derive(Debug, Clone)]
pub struct SplitQuery {
    pub(crate) name: String,
    pub(crate) query: QueryBuilder,
    pub(crate) join_from: ColumnRef,
    pub(crate) join_to: ColumnRef,
    pub(crate) mode: SplitJoinMode,
    pub(crate) target: QueryTarget,
}

impl SplitQuery {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn query(&self) -> &QueryBuilder {
        &self.query
    }

    pub fn join_from(&self) -> &ColumnRef {
        &self.join_from
    }

    pub fn join_to(&self) -> &ColumnRef {
        &self.join_to
    }

    pub fn mode(&self) -> SplitJoinMode {
        self.mode
    }

    pub fn target(&self) -> &QueryTarget {
        &self.target
    }
}

/// A select buffered until every join is known.
#[derive(Debug, Clone)]
pub(crate) struct PendingSelect {
    pub(crate) item: SelectItem,
}

impl PendingSelect {
    pub(crate) fn new(item: SelectItem) -> Self {
        Self { item }
    }

    /// Whether this select already yields `column` under its own name.
    pub(crate) fn covers(&self, column: &ColumnRef) -> bool {
        use qore_query::Expr;

        match &self.item.expr {
            Expr::Wildcard(None) => true,
            Expr::Wildcard(Some(q)) => column.qualifier.as_deref() == Some(q.as_str()),
            Expr::Column(c) => {
                c == column && self.item.alias.as_deref().map_or(true, |a| a == column.name)
            }
            _ => false,
        }
    }
}
