//! Tasks and their results

use engine_core::{EngineError, Generator, Sample, Solver, TaskState, TaskStateOptions};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::retry::{ErrorRecord, FinalStatus};

/// Future returned by a condition
pub type ConditionFuture = BoxFuture<'static, engine_core::Result<Value>>;

/// Condition logic: sample in, success value or failure reason out
pub type ConditionFn = Arc<dyn Fn(Sample) -> ConditionFuture + Send + Sync>;

/// Named experimental condition applied to each sample
#[derive(Clone)]
pub struct Condition {
    name: String,
    run: ConditionFn,
}

impl Condition {
    /// Wrap an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Sample) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = engine_core::Result<Value>> + Send + 'static,
    {
        let run: ConditionFn =
            Arc::new(move |sample: Sample| -> ConditionFuture { Box::pin(f(sample)) });
        Self {
            name: name.into(),
            run,
        }
    }

    /// Run `solver` against `generator` on a fresh state per sample.
    ///
    /// The success value is the final state's record.
    pub fn from_solver(
        name: impl Into<String>,
        solver: Arc<dyn Solver>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self::from_solver_with(name, solver, generator, TaskStateOptions::new)
    }

    /// Like [`Condition::from_solver`], building state options per sample.
    pub fn from_solver_with<O>(
        name: impl Into<String>,
        solver: Arc<dyn Solver>,
        generator: Arc<dyn Generator>,
        options: O,
    ) -> Self
    where
        O: Fn() -> TaskStateOptions + Send + Sync + 'static,
    {
        Self::new(name, move |sample| {
            let solver = solver.clone();
            let generator = generator.clone();
            let state = TaskState::new(sample, options());
            async move {
                let state = solver.solve(state?, generator.as_ref()).await?;
                state.to_record()
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, sample: Sample) -> ConditionFuture {
        (self.run)(sample)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One condition applied to one sample for one repeat
#[derive(Debug, Clone)]
pub struct Task {
    pub experiment_id: String,
    pub condition: Condition,
    /// 1-based
    pub repeat: u32,
    pub sample: Sample,
    pub timeout: Duration,
}

impl Task {
    pub fn query_id(&self) -> &str {
        &self.sample.id
    }
}

/// Success value or failure reason of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success(Value),
    Failure(EngineError),
}

impl From<Result<Value, EngineError>> for Outcome {
    fn from(result: Result<Value, EngineError>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(err) => Outcome::Failure(err),
        }
    }
}

/// Terminal record of one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub experiment_id: String,
    pub condition: String,
    pub repeat: u32,
    pub query_id: String,
    pub outcome: Outcome,
    /// Time spent inside the condition, summed over attempts
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    pub attempts: u32,
    #[serde(with = "durations_ms")]
    pub retry_delays: Vec<Duration>,
    pub final_status: FinalStatus,
    pub error_history: Vec<ErrorRecord>,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        self.final_status == FinalStatus::Success
    }

    pub fn error(&self) -> Option<&EngineError> {
        match &self.outcome {
            Outcome::Failure(err) => Some(err),
            Outcome::Success(_) => None,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod durations_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &[Duration], serializer: S) -> Result<S::Ok, S::Error> {
        let millis: Vec<u64> = value.iter().map(|d| d.as_millis() as u64).collect();
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Duration>, D::Error> {
        Vec::<u64>::deserialize(deserializer)
            .map(|millis| millis.into_iter().map(Duration::from_millis).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::{generator_fn, AppendMessage, Chain, Generate, GenerateResponse, Step};
    use serde_json::json;

    #[tokio::test]
    async fn test_closure_condition() {
        let condition = Condition::new("echo", |sample: Sample| async move {
            Ok(json!({"id": sample.id}))
        });
        let value = condition.invoke(Sample::new("q7", "hi")).await.unwrap();
        assert_eq!(value, json!({"id": "q7"}));
        assert_eq!(condition.name(), "echo");
    }

    #[tokio::test]
    async fn test_solver_condition_returns_state_record() {
        let backend: Arc<dyn Generator> = Arc::new(generator_fn(|_messages, _config| async {
            Ok(GenerateResponse::new("Paris"))
        }));
        let chain = Chain::new([
            Step::solver(AppendMessage::system("Answer briefly.")),
            Step::solver(Generate::new()),
        ]);
        let condition = Condition::from_solver("baseline", Arc::new(chain), backend);

        let record = condition
            .invoke(Sample::new("q1", "Capital of France?"))
            .await
            .unwrap();

        assert_eq!(record["sample_id"], "q1");
        assert_eq!(record["output"]["content"], "Paris");
        assert_eq!(record["messages"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_solver_condition_propagates_failure() {
        let backend: Arc<dyn Generator> = Arc::new(generator_fn(|_messages, _config| async {
            Err(EngineError::http(401))
        }));
        let condition = Condition::from_solver("baseline", Arc::new(Generate::new()), backend);

        let err = condition.invoke(Sample::new("q1", "x")).await.unwrap_err();
        assert_eq!(err, EngineError::http(401));
    }

    #[test]
    fn test_result_serializes_durations_as_millis() {
        let result = TaskResult {
            experiment_id: "exp".into(),
            condition: "baseline".into(),
            repeat: 1,
            query_id: "q1".into(),
            outcome: Outcome::Success(json!(42)),
            elapsed: Duration::from_millis(1500),
            attempts: 2,
            retry_delays: vec![Duration::from_millis(1000)],
            final_status: FinalStatus::Success,
            error_history: vec![],
        };

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["elapsed"], 1500);
        assert_eq!(value["retry_delays"], json!([1000]));
        assert_eq!(value["final_status"], "success");
        assert_eq!(value["outcome"], json!({"success": 42}));
    }
}
