//! Error types for task execution
//!
//! [`EngineError`] is the one failure reason that travels from a generation
//! backend or solver, through a [`Chain`](crate::solver::Chain), up to the
//! scheduler's retry engine. The scheduler never inspects messages; it
//! classifies failures by [`ErrorKind`].
//!
//! ```text
//! EngineError
//! ├── Http            - backend returned an HTTP status
//! ├── Code            - symbolic failure (timeout, rate_limited, ...)
//! ├── Timeout         - enforced per-task deadline passed
//! ├── Panicked        - task code panicked
//! ├── Lookup          - missing value in the task state
//! ├── Configuration   - structural problem found at construction time
//! ├── Serialization   - JSON conversion failed
//! └── Failed          - free-form failure from a solver
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure reason for a solver, chain or generation call
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EngineError {
    /// Backend responded with an HTTP error status
    #[error("HTTP error {0}")]
    Http(u16),

    /// Symbolic error such as `timeout` or `authentication_failed`
    #[error("{0}")]
    Code(String),

    /// The per-task deadline passed before the call finished
    #[error("Timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// Task code panicked
    #[error("Task panicked: {0}")]
    Panicked(String),

    /// A value the step needed was not in the state
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// Invalid tools, steps or task definitions
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// JSON conversion failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Free-form failure
    #[error("{0}")]
    Failed(String),
}

/// What the classifier sees of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind<'a> {
    /// HTTP status code
    Status(u16),
    /// Symbolic name
    Symbol(&'a str),
}

impl EngineError {
    pub fn code(code: impl Into<String>) -> Self {
        Self::Code(code.into())
    }

    pub fn http(status: u16) -> Self {
        Self::Http(status)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::Timeout {
            after_ms: after.as_millis() as u64,
        }
    }

    /// Classification key for this error.
    ///
    /// Variants that are not a status or explicit code map to a fixed
    /// symbol; an enforced timeout is the `timeout` symbol.
    pub fn kind(&self) -> ErrorKind<'_> {
        match self {
            EngineError::Http(status) => ErrorKind::Status(*status),
            EngineError::Code(code) => ErrorKind::Symbol(code),
            EngineError::Timeout { .. } => ErrorKind::Symbol("timeout"),
            EngineError::Panicked(_) => ErrorKind::Symbol("panicked"),
            EngineError::Lookup(_) => ErrorKind::Symbol("lookup_error"),
            EngineError::Configuration(_) => ErrorKind::Symbol("configuration_error"),
            EngineError::Serialization(_) => ErrorKind::Symbol("serialization_error"),
            EngineError::Failed(_) => ErrorKind::Symbol("failed"),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
