//! Configuration management utilities
//!
//! - [`ConfigBuilder`] gives configuration structs one shape for validation,
//!   environment loading and layering.
//! - [`EnvReader`] reads prefixed environment variables with typed parsing.
//!
//! # Example
//!
//! ```rust,ignore
//! use tooling::config::{ConfigBuilder, EnvReader};
//!
//! #[derive(Clone, Default)]
//! struct PoolConfig {
//!     workers: Option<usize>,
//! }
//!
//! impl ConfigBuilder for PoolConfig {
//!     fn from_env(prefix: &str) -> tooling::Result<Self> {
//!         let env = EnvReader::new(prefix);
//!         Ok(Self { workers: env.parse("WORKERS")? })
//!     }
//!
//!     fn merge(&mut self, other: Self) -> &mut Self {
//!         if other.workers.is_some() {
//!             self.workers = other.workers;
//!         }
//!         self
//!     }
//! }
//! ```

mod builder;
mod env;

pub use builder::ConfigBuilder;
pub use env::EnvReader;
