//! Tooling utilities shared across the task-execution workspace
//!
//! # Modules
//!
//! - `async_utils` - Timeout and panic-guarded execution of futures
//! - `config` - Configuration layering and prefixed environment variables
//! - `logging` - Subscriber setup and duration formatting
//! - `rate_limit` - Token bucket admission with FIFO waiters

pub mod async_utils;
pub mod config;
pub mod logging;
pub mod rate_limit;

use thiserror::Error;

/// Errors that can occur in the tooling crate
#[derive(Debug, Error)]
pub enum ToolingError {
    /// General error with message
    #[error("Tooling error: {0}")]
    General(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tooling operations
pub type Result<T> = std::result::Result<T, ToolingError>;

/// Get version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
