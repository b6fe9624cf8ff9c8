//! Task expansion and the bounded worker pool
//!
//! [`generate_tasks`] expands conditions × repeats × samples.
//! [`Scheduler::run`] executes tasks with at most `max_parallel` in flight.
//! Each attempt waits for a rate-limiter token (when configured), runs under
//! the per-task timeout on its own tokio task, and is retried per policy.
//! Results are returned in completion order.

use engine_core::{EngineError, Sample};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
use tooling::async_utils::timeout::{run_guarded, Guarded};
use tooling::logging::format_duration;
use tooling::rate_limit::RateLimiter;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::RunConfig;
use crate::dlq::{DeadLetter, DeadLetterQueue};
use crate::retry::{execute_with_retry, FinalStatus, RetryConfig};
use crate::task::{Condition, Task, TaskResult};
use crate::Result;

/// Expand conditions × repeats `1..=repeat` × samples into tasks.
///
/// Order is condition-major, then repeat, then sample.
pub fn generate_tasks(
    experiment_id: &str,
    conditions: &[Condition],
    repeat: u32,
    dataset: &[Sample],
    timeout: Duration,
) -> Vec<Task> {
    let mut tasks =
        Vec::with_capacity(conditions.len() * repeat as usize * dataset.len());

    for condition in conditions {
        for repeat_index in 1..=repeat {
            for sample in dataset {
                tasks.push(Task {
                    experiment_id: experiment_id.to_string(),
                    condition: condition.clone(),
                    repeat: repeat_index,
                    sample: sample.clone(),
                    timeout,
                });
            }
        }
    }

    tasks
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// In completion order
    pub results: Vec<TaskResult>,
    pub submitted: usize,
    /// Tasks never started because the circuit breaker tripped
    pub skipped: usize,
    pub aborted: bool,
    pub wall_time: Duration,
}

impl RunReport {
    pub fn count(&self, status: FinalStatus) -> usize {
        self.results
            .iter()
            .filter(|result| result.final_status == status)
            .count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(FinalStatus::Success)
    }

    pub fn failed_permanent(&self) -> usize {
        self.count(FinalStatus::FailedPermanent)
    }

    pub fn retries_exhausted(&self) -> usize {
        self.count(FinalStatus::FailedRetriesExhausted)
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} tasks in {}: {} succeeded, {} failed permanently, {} exhausted retries",
            self.submitted,
            format_duration(self.wall_time),
            self.succeeded(),
            self.failed_permanent(),
            self.retries_exhausted()
        );
        if self.aborted {
            line.push_str(&format!(", {} skipped (circuit breaker)", self.skipped));
        }
        line
    }
}

/// Per-run shared state handed to every worker
#[derive(Clone)]
struct Runner {
    retry: RetryConfig,
    limiter: Option<RateLimiter>,
    breaker: Option<Arc<CircuitBreaker>>,
    dlq: Option<Arc<DeadLetterQueue>>,
}

/// Runs tasks under one [`RunConfig`]
///
/// The rate limiter, circuit breaker and dead-letter queue belong to this
/// scheduler and are shared by all tasks it runs.
pub struct Scheduler {
    config: RunConfig,
    runner: Runner,
}

impl Scheduler {
    pub fn new(config: RunConfig) -> Result<Self> {
        config.check()?;

        let limiter = config.rate_limit.map(RateLimiter::new).transpose()?;
        let errors = &config.error_handling;
        let breaker = errors
            .max_failure_rate
            .map(|max| Arc::new(CircuitBreaker::new(errors.breaker_window, max)));
        let dlq = errors
            .dlq_path
            .clone()
            .map(|path| Arc::new(DeadLetterQueue::new(path)));

        Ok(Self {
            runner: Runner {
                retry: config.retry.clone(),
                limiter,
                breaker,
                dlq,
            },
            config,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.runner.breaker.as_deref()
    }

    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.runner.limiter.as_ref()
    }

    /// Run every task and collect results in completion order.
    ///
    /// Once the circuit breaker trips no further tasks are started; tasks
    /// already in flight still finish and are reported.
    pub async fn run(&self, tasks: Vec<Task>) -> RunReport {
        let start = Instant::now();
        let submitted = tasks.len();
        info!(
            tasks = submitted,
            max_parallel = self.config.max_parallel,
            rate_limit = ?self.config.rate_limit,
            "Starting run"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut skipped = 0;
        let mut aborted = false;

        for (index, task) in tasks.into_iter().enumerate() {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };

            if self
                .runner
                .breaker
                .as_ref()
                .is_some_and(|breaker| breaker.should_abort())
            {
                skipped = submitted - index;
                aborted = true;
                warn!(skipped, "Circuit breaker open, not starting remaining tasks");
                break;
            }

            let runner = self.runner.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let result = runner.run_task(task).await;
                let _ = tx.send(result);
            });
        }
        drop(tx);

        let mut results = Vec::with_capacity(submitted);
        while let Some(result) = rx.recv().await {
            results.push(result);
        }

        let report = RunReport {
            results,
            submitted,
            skipped,
            aborted,
            wall_time: start.elapsed(),
        };
        info!(
            succeeded = report.succeeded(),
            failed_permanent = report.failed_permanent(),
            retries_exhausted = report.retries_exhausted(),
            skipped = report.skipped,
            wall_time = %format_duration(report.wall_time),
            "Run finished"
        );
        report
    }

    /// Run a single task with retry, timeout and admission control.
    pub async fn run_task(&self, task: Task) -> TaskResult {
        self.runner.run_task(task).await
    }
}

impl Runner {
    async fn run_task(&self, task: Task) -> TaskResult {
        debug!(
            condition = task.condition.name(),
            query_id = task.query_id(),
            repeat = task.repeat,
            "Task started"
        );

        let busy_micros = Arc::new(AtomicU64::new(0));
        let outcome = execute_with_retry(&self.retry, || {
            let condition = task.condition.clone();
            let sample = task.sample.clone();
            let limiter = self.limiter.clone();
            let busy = busy_micros.clone();
            let timeout = task.timeout;

            async move {
                if let Some(limiter) = &limiter {
                    limiter.acquire().await;
                }

                let run = run_guarded(timeout, condition.invoke(sample)).await;
                busy.fetch_add(run.elapsed.as_micros() as u64, Ordering::Relaxed);

                match run.result {
                    Guarded::Finished(result) => result,
                    Guarded::TimedOut(limit) => Err(EngineError::timeout(limit)),
                    Guarded::Panicked(message) => Err(EngineError::Panicked(message)),
                }
            }
        })
        .await;

        if let Some(breaker) = &self.breaker {
            breaker.record(outcome.is_success());
        }

        let result = TaskResult {
            experiment_id: task.experiment_id.clone(),
            condition: task.condition.name().to_string(),
            repeat: task.repeat,
            query_id: task.query_id().to_string(),
            outcome: outcome.result.into(),
            elapsed: Duration::from_micros(busy_micros.load(Ordering::Relaxed)),
            attempts: outcome.attempts,
            retry_delays: outcome.retry_delays,
            final_status: outcome.status,
            error_history: outcome.error_history,
        };

        if result.final_status == FinalStatus::FailedPermanent {
            self.dead_letter(&result).await;
        }

        debug!(
            condition = %result.condition,
            query_id = %result.query_id,
            status = %result.final_status,
            attempts = result.attempts,
            "Task finished"
        );
        result
    }

    async fn dead_letter(&self, result: &TaskResult) {
        let (Some(dlq), Some(error)) = (&self.dlq, result.error()) else {
            return;
        };

        let letter = DeadLetter {
            id: Uuid::new_v4(),
            experiment_id: result.experiment_id.clone(),
            condition: result.condition.clone(),
            repeat: result.repeat,
            query_id: result.query_id.clone(),
            error: error.clone(),
            attempts: result.attempts,
            error_history: result.error_history.clone(),
            recorded_at: chrono::Utc::now(),
        };

        if let Err(err) = dlq.write(&letter).await {
            error!(
                path = %dlq.path().display(),
                query_id = %result.query_id,
                error = %err,
                "Failed to write dead letter"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn condition(name: &str) -> Condition {
        Condition::new(name, |sample: Sample| async move { Ok(json!(sample.id)) })
    }

    fn dataset(n: usize) -> Vec<Sample> {
        (0..n).map(|i| Sample::new(format!("q{}", i), "x")).collect()
    }

    #[test]
    fn test_expansion_is_cartesian() {
        let tasks = generate_tasks(
            "exp",
            &[condition("a"), condition("b")],
            3,
            &dataset(4),
            Duration::from_secs(5),
        );

        assert_eq!(tasks.len(), 2 * 3 * 4);
        assert_eq!(tasks[0].condition.name(), "a");
        assert_eq!(tasks[0].repeat, 1);
        assert_eq!(tasks[0].query_id(), "q0");
        assert_eq!(tasks[4].repeat, 2);
        assert_eq!(tasks[12].condition.name(), "b");
        assert!(tasks.iter().all(|t| t.timeout == Duration::from_secs(5)));
        assert!(tasks.iter().all(|t| (1..=3).contains(&t.repeat)));
    }

    #[test]
    fn test_zero_repeat_yields_nothing() {
        let tasks = generate_tasks("exp", &[condition("a")], 0, &dataset(3), Duration::from_secs(1));
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(Scheduler::new(RunConfig::default().with_max_parallel(0)).is_err());
    }

    #[test]
    fn test_summary_mentions_skips_only_when_aborted() {
        let report = RunReport {
            submitted: 3,
            ..Default::default()
        };
        assert!(!report.summary().contains("skipped"));

        let report = RunReport {
            submitted: 3,
            skipped: 2,
            aborted: true,
            ..Default::default()
        };
        assert!(report.summary().contains("2 skipped"));
    }
}
