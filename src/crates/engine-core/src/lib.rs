//! # engine-core
//!
//! State threading and step composition for running one task against a
//! generation backend.
//!
//! - [`state`]: immutable [`TaskState`] snapshots built from a [`Sample`]
//! - [`solver`]: the [`Solver`] contract and short-circuiting [`Chain`]
//! - [`generate`]: the built-in [`Generate`] step with its tool-call loop
//! - [`tool`]: canonical [`Tool`] and descriptor normalization
//! - [`llm`]: the [`Generator`] backend contract
//!
//! ## Example
//!
//! ```rust,ignore
//! use engine_core::prelude::*;
//!
//! let backend = generator_fn(|_messages, _config| async {
//!     Ok(GenerateResponse::new("Paris"))
//! });
//!
//! let chain = Chain::new([
//!     Step::solver(AppendMessage::system("Answer in one word.")),
//!     Step::solver(Generate::new()),
//! ]);
//!
//! let state = TaskState::new(Sample::new("q1", "Capital of France?"), TaskStateOptions::new())?;
//! let state = chain.solve(state, &backend).await?;
//! assert_eq!(state.output().map(|o| o.content.as_str()), Some("Paris"));
//! ```

pub mod choices;
pub mod error;
pub mod generate;
pub mod llm;
pub mod messages;
pub mod solver;
pub mod state;
pub mod tool;

pub use choices::{Choice, Choices};
pub use error::{EngineError, ErrorKind, Result};
pub use generate::Generate;
pub use llm::{
    generator_fn, FnGenerator, GenerateConfig, GenerateResponse, Generator, ToolCallMode, Usage,
};
pub use messages::{ChatMessage, MessageRole, ToolCall};
pub use solver::{
    solver_fn, AppendMessage, Chain, FnSolver, MarkComplete, Solver, SolverRegistry, Step,
};
pub use state::{Input, Sample, TaskState, TaskStateOptions};
pub use tool::{
    normalize_tools, Tool, ToolDefinition, ToolDescriptor, ToolFuture, ToolHandler, ToolReturn,
};

/// Commonly used types
pub mod prelude {
    pub use crate::choices::Choices;
    pub use crate::error::{EngineError, Result};
    pub use crate::generate::Generate;
    pub use crate::llm::{generator_fn, GenerateConfig, GenerateResponse, Generator, ToolCallMode};
    pub use crate::messages::{ChatMessage, MessageRole, ToolCall};
    pub use crate::solver::{solver_fn, AppendMessage, Chain, MarkComplete, Solver, Step};
    pub use crate::state::{Sample, TaskState, TaskStateOptions};
    pub use crate::tool::{Tool, ToolDescriptor};
}
