//! Async utilities for common async patterns
//!
//! [`timeout::run_guarded`] runs a future on its own task under a deadline,
//! so that expiry and panics both surface as values the caller can inspect.
//!
//! # Example
//!
//! ```rust,ignore
//! use tooling::async_utils::timeout::{run_guarded, Guarded};
//! use std::time::Duration;
//!
//! let outcome = run_guarded(Duration::from_secs(30), async { call_backend().await }).await;
//! match outcome.result {
//!     Guarded::Finished(value) => println!("done in {:?}", outcome.elapsed),
//!     Guarded::TimedOut(limit) => println!("gave up after {:?}", limit),
//!     Guarded::Panicked(reason) => println!("task panicked: {}", reason),
//! }
//! ```

pub mod timeout;
