// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for query federation and key allocation
//!
//! Driver, cache and builder failures are all mapped to these variants so
//! callers can tell a malformed query apart from a transient
//! infrastructure problem.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all engine operations
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum EngineError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Query syntax error: {message}")]
    SyntaxError { message: String },

    #[error("Query execution error: {message}")]
    ExecutionError { message: String },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A query shape the partitioned builder refuses to federate.
    #[error("Invalid partitioned query: {message}")]
    InvalidQueryShape { message: String },

    #[error("Failed to allocate a key for '{table}' after {attempts} attempts")]
    ContentionExhausted { table: String, attempts: u32 },

    #[error("Primary key space of '{table}' exhausted (max {max})")]
    KeySpaceExhausted { table: String, max: u64 },

    #[error("Cache error: {message}")]
    CacheError { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Feature not supported: {message}")]
    NotSupported { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

impl EngineError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: msg.into() }
    }

    pub fn syntax_error(msg: impl Into<String>) -> Self {
        Self::SyntaxError { message: msg.into() }
    }

    pub fn execution_error(msg: impl Into<String>) -> Self {
        Self::ExecutionError { message: msg.into() }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration { message: msg.into() }
    }

    pub fn invalid_shape(msg: impl Into<String>) -> Self {
        Self::InvalidQueryShape { message: msg.into() }
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Self::CacheError { message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported { message: msg.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError { message: msg.into() }
    }

    /// Whether the caller may retry the whole operation later.
    ///
    /// Shape and configuration errors never become valid on retry; running
    /// out of key space is a capacity problem, not a transient one.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ContentionExhausted { .. }
                | Self::Timeout { .. }
                | Self::ConnectionFailed { .. }
                | Self::CacheError { .. }
        )
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contention_is_retryable_but_key_space_is_not() {
        let contention = EngineError::ContentionExhausted {
            table: "filecache".to_string(),
            attempts: 5,
        };
        let exhausted = EngineError::KeySpaceExhausted {
            table: "filecache".to_string(),
            max: 10,
        };
        assert!(contention.is_retryable());
        assert!(!exhausted.is_retryable());
        assert!(!EngineError::invalid_shape("right join").is_retryable());
    }

    #[test]
    fn messages_name_the_table() {
        let err = EngineError::ContentionExhausted {
            table: "filecache".to_string(),
            attempts: 5,
        };
        assert_eq!(
            err.to_string(),
            "Failed to allocate a key for 'filecache' after 5 attempts"
        );
    }

    #[test]
    fn errors_serialize_with_variant_tag() {
        let json = serde_json::to_string(&EngineError::configuration("narrow ints")).unwrap();
        assert_eq!(json, r#"{"Configuration":{"message":"narrow ints"}}"#);
    }
}
