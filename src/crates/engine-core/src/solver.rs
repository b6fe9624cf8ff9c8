//! Pipeline steps and their sequential composition
//!
//! A [`Solver`] turns one [`TaskState`] into the next. A [`Chain`] runs
//! solvers in order and stops early on the first failure or on the first
//! state marked completed. Chains are solvers themselves and flatten when
//! nested.
//!
//! ```text
//!            ok, not completed
//!           ┌─────────────────┐
//!           ▼                 │
//!      [running] ── step ─────┘
//!        │    │
//!   Err  │    │ completed
//!        ▼    ▼
//!   [failed] [completed]
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::llm::Generator;
use crate::messages::ChatMessage;
use crate::state::TaskState;

/// One pipeline step
#[async_trait]
pub trait Solver: Send + Sync {
    /// Transform the state, using `generate` for any backend calls.
    async fn solve(&self, state: TaskState, generate: &dyn Generator) -> Result<TaskState>;

    /// Name used in logs and registries.
    fn name(&self) -> &str {
        "solver"
    }
}

/// A single solver or a nested chain
#[derive(Clone)]
pub enum Step {
    Solver(Arc<dyn Solver>),
    Chain(Chain),
}

impl Step {
    pub fn solver<S: Solver + 'static>(solver: S) -> Self {
        Step::Solver(Arc::new(solver))
    }
}

impl From<Arc<dyn Solver>> for Step {
    fn from(solver: Arc<dyn Solver>) -> Self {
        Step::Solver(solver)
    }
}

impl From<Chain> for Step {
    fn from(chain: Chain) -> Self {
        Step::Chain(chain)
    }
}

/// Ordered, flattened list of solvers
#[derive(Clone, Default)]
pub struct Chain {
    steps: Vec<Arc<dyn Solver>>,
}

impl Chain {
    pub fn new<I>(steps: I) -> Self
    where
        I: IntoIterator<Item = Step>,
    {
        let mut chain = Self::default();
        for step in steps {
            chain = chain.then(step);
        }
        chain
    }

    /// Append a step, splicing in the steps of a nested chain.
    pub fn then(mut self, step: impl Into<Step>) -> Self {
        match step.into() {
            Step::Solver(solver) => self.steps.push(solver),
            Step::Chain(chain) => self.steps.extend(chain.steps),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("steps", &self.step_names())
            .finish()
    }
}

#[async_trait]
impl Solver for Chain {
    async fn solve(&self, mut state: TaskState, generate: &dyn Generator) -> Result<TaskState> {
        for (index, step) in self.steps.iter().enumerate() {
            if state.completed() {
                debug!(
                    sample_id = %state.sample_id(),
                    skipped = self.steps.len() - index,
                    "State completed, skipping remaining steps"
                );
                break;
            }

            debug!(sample_id = %state.sample_id(), step = step.name(), index, "Running step");
            state = step.solve(state, generate).await?;
        }

        Ok(state)
    }

    fn name(&self) -> &str {
        "chain"
    }
}

/// Named solvers that chains can be assembled from
#[derive(Clone, Default)]
pub struct SolverRegistry {
    solvers: HashMap<String, Arc<dyn Solver>>,
}

impl SolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, solver: Arc<dyn Solver>) -> Self {
        self.solvers.insert(name.into(), solver);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Solver>> {
        self.solvers.get(name).cloned()
    }

    /// Build a chain from step names.
    ///
    /// An unknown name is a configuration error.
    pub fn chain<I, S>(&self, names: I) -> Result<Chain>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().try_fold(Chain::default(), |chain, name| {
            let name = name.as_ref();
            self.get(name)
                .map(|solver| chain.then(solver))
                .ok_or_else(|| EngineError::Configuration(format!("Unknown solver '{}'", name)))
        })
    }
}

/// [`Solver`] backed by an async closure
pub struct FnSolver<F, Fut> {
    name: String,
    f: F,
    _future: PhantomData<fn() -> Fut>,
}

/// Wrap a closure `state -> Result<state>` as a named [`Solver`].
pub fn solver_fn<F, Fut>(name: impl Into<String>, f: F) -> FnSolver<F, Fut>
where
    F: Fn(TaskState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskState>> + Send + 'static,
{
    FnSolver {
        name: name.into(),
        f,
        _future: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> Solver for FnSolver<F, Fut>
where
    F: Fn(TaskState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskState>> + Send + 'static,
{
    async fn solve(&self, state: TaskState, _generate: &dyn Generator) -> Result<TaskState> {
        (self.f)(state).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Appends a fixed message, e.g. a system prompt or follow-up question
#[derive(Debug, Clone)]
pub struct AppendMessage {
    message: ChatMessage,
}

impl AppendMessage {
    pub fn new(message: ChatMessage) -> Self {
        Self { message }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatMessage::system(content))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatMessage::user(content))
    }
}

#[async_trait]
impl Solver for AppendMessage {
    async fn solve(&self, state: TaskState, _generate: &dyn Generator) -> Result<TaskState> {
        Ok(state.add_message(self.message.clone()))
    }

    fn name(&self) -> &str {
        "append_message"
    }
}

/// Marks the state completed
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkComplete;

#[async_trait]
impl Solver for MarkComplete {
    async fn solve(&self, state: TaskState, _generate: &dyn Generator) -> Result<TaskState> {
        Ok(state.complete())
    }

    fn name(&self) -> &str {
        "mark_complete"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{generator_fn, GenerateResponse};
    use crate::state::{Sample, TaskStateOptions};

    fn state() -> TaskState {
        TaskState::new(Sample::new("s", "X"), TaskStateOptions::new()).unwrap()
    }

    fn idle_backend() -> impl Generator {
        generator_fn(|_messages, _config| async { Ok(GenerateResponse::new("")) })
    }

    #[test]
    fn test_nested_chains_flatten() {
        let inner = Chain::new([Step::solver(AppendMessage::user("a")), Step::solver(MarkComplete)]);
        let outer = Chain::new([Step::solver(AppendMessage::system("s")), inner.into()]);

        assert_eq!(outer.len(), 3);
        assert_eq!(
            outer.step_names(),
            vec!["append_message", "append_message", "mark_complete"]
        );
    }

    #[tokio::test]
    async fn test_completed_input_runs_nothing() {
        let chain = Chain::new([Step::solver(AppendMessage::user("never"))]);
        let result = chain.solve(state().complete(), &idle_backend()).await.unwrap();
        assert_eq!(result.messages().len(), 1);
    }

    #[test]
    fn test_registry_rejects_unknown_name() {
        let registry = SolverRegistry::new().register("done", Arc::new(MarkComplete));

        assert_eq!(registry.chain(["done", "done"]).unwrap().len(), 2);
        match registry.chain(["done", "missing"]) {
            Err(EngineError::Configuration(msg)) => assert!(msg.contains("missing")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }
}
