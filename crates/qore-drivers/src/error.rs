// SPDX-License-Identifier: Apache-2.0

use qore_core::EngineError;

pub(crate) fn map_query_error(e: sqlx::Error) -> EngineError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            EngineError::connection_failed(e.to_string())
        }
        other => {
            let msg = other.to_string();
            if msg.contains("syntax") {
                EngineError::syntax_error(msg)
            } else {
                EngineError::execution_error(msg)
            }
        }
    }
}

pub(crate) fn elapsed_ms(start: std::time::Instant) -> f64 {
    start.elapsed().as_micros() as f64 / 1000.0
}
