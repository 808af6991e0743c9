// SPDX-License-Identifier: Apache-2.0

//! Database executors
//!
//! Each executor owns a sqlx pool and runs [`CompiledQuery`] values
//! produced by `qore-query`, returning the normalized `qore-core` result
//! types.
//!
//! [`CompiledQuery`]: qore_query::CompiledQuery

mod error;
pub mod postgres;
pub mod sqlite;
pub mod traits;

pub use postgres::PostgresExecutor;
pub use sqlite::SqliteExecutor;
pub use traits::QueryExecutor;
