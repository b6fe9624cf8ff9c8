//! # scheduler
//!
//! Runs many tasks at once against a generation backend with bounded
//! concurrency, admission control and failure recovery.
//!
//! - [`classifier`]: decides whether a failure is worth retrying
//! - [`retry`]: backoff delays and the retry loop
//! - [`circuit_breaker`]: stops a run whose failure rate is too high
//! - [`dlq`]: durable log of permanently failed tasks
//! - [`scheduler`]: task expansion and the worker pool
//!
//! ## Example
//!
//! ```rust,ignore
//! use scheduler::{generate_tasks, Condition, RunConfig, Scheduler};
//!
//! let config = RunConfig::default().with_max_parallel(8).with_rate_limit(5.0);
//! let scheduler = Scheduler::new(config)?;
//!
//! let tasks = generate_tasks("exp-1", &conditions, 3, &samples, scheduler.config().timeout());
//! let report = scheduler.run(tasks).await;
//! println!("{}", report.summary());
//! ```

pub mod circuit_breaker;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod dlq;
pub mod retry;
pub mod scheduler;
pub mod task;

pub use circuit_breaker::CircuitBreaker;
pub use classifier::ErrorPolicy;
pub use config::{ErrorHandlingConfig, RunConfig, ENV_PREFIX};
pub use dataset::{load_samples, parse_samples};
pub use dlq::{read_dead_letters, DeadLetter, DeadLetterQueue};
pub use retry::{
    calculate_delay, execute_with_retry, BackoffStrategy, ErrorRecord, FinalStatus, RetryConfig,
    RetryOutcome,
};
pub use scheduler::{generate_tasks, RunReport, Scheduler};
pub use task::{Condition, ConditionFn, ConditionFuture, Outcome, Task, TaskResult};

use thiserror::Error;

/// Scheduler errors
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Invalid run configuration or input
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Tooling(#[from] tooling::ToolingError),

    #[error(transparent)]
    Engine(#[from] engine_core::EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;
