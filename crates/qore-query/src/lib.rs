// SPDX-License-Identifier: Apache-2.0

//! Type-safe SQL query builder.
//!
//! Predicates are kept as an [`Expr`] tree rather than strings so that
//! callers (notably the partitioned builder) can reason about which tables
//! a condition touches before anything is rendered.

pub mod builder;
pub mod dialect;
pub mod expr;

pub use builder::{
    AsInnerBuilder, CompiledQuery, JoinKind, OrderDirection, Parameters, QueryBuilder,
    QueryKind, SelectItem,
};
pub use dialect::SqlDialect;
pub use expr::{col, lit, BinaryOperator, ColumnRef, Expr, Param};
