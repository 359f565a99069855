//! Error types for dispatchq.
//!
//! Duplicate submissions and lock contention are not errors — they are
//! reported as [`crate::engine::SubmitOutcome`] variants, and unknown job
//! ids as a not-found status payload. Everything here is a genuine
//! failure surfaced to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or empty submission, rejected before any store interaction.
    #[error("invalid submission: {0}")]
    Validation(String),

    /// Illegal job state transition (e.g. mutating a terminal job).
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: crate::model::JobState,
        to: crate::model::JobState,
    },

    /// Shared store unreachable. Safe to retry — no partial state committed.
    #[error("backend unavailable: {0}")]
    Backend(String),

    #[error("config error: {0}")]
    Config(String),
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Backend(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
