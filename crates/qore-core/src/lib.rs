// SPDX-License-Identifier: Apache-2.0

//! Core types shared by the query builder, the drivers and the federation
//! engine: the universal [`Value`], result rows and the unified
//! [`EngineError`] taxonomy.

pub mod error;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use types::*;
