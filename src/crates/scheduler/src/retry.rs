//! Retry engine with configurable backoff
//!
//! [`execute_with_retry`] calls an operation until it succeeds, fails with
//! an error the [`ErrorPolicy`] considers permanent, or runs out of
//! retries. Every failed attempt is kept in the error history.

use chrono::{DateTime, Utc};
use engine_core::EngineError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::classifier::ErrorPolicy;

/// How delays grow between attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Always `initial_delay`
    Constant,
    /// `initial_delay * (attempt + 1) * factor`
    Linear,
    /// `initial_delay * factor ^ attempt`
    #[default]
    Exponential,
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackoffStrategy::Constant => "constant",
            BackoffStrategy::Linear => "linear",
            BackoffStrategy::Exponential => "exponential",
        };
        f.write_str(name)
    }
}

impl FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "constant" => Ok(BackoffStrategy::Constant),
            "linear" => Ok(BackoffStrategy::Linear),
            "exponential" => Ok(BackoffStrategy::Exponential),
            other => Err(format!(
                "unknown backoff strategy '{}' (expected constant, linear or exponential)",
                other
            )),
        }
    }
}

/// Retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt
    pub max_retries: u32,

    pub initial_delay_ms: u64,

    /// Upper bound applied before jitter
    pub max_delay_ms: u64,

    pub backoff_factor: f64,

    pub strategy: BackoffStrategy,

    /// Scale each delay by a random factor in [0.5, 1.0]
    pub jitter: bool,

    /// Which errors are retried
    pub policy: ErrorPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            strategy: BackoffStrategy::Exponential,
            jitter: true,
            policy: ErrorPolicy::default(),
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_initial_delay(mut self, ms: u64) -> Self {
        self.initial_delay_ms = ms;
        self
    }

    pub fn with_max_delay(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Delay before each possible retry, in order.
    pub fn delay_schedule(&self) -> Vec<Duration> {
        (0..self.max_retries)
            .map(|attempt| calculate_delay(attempt, self))
            .collect()
    }
}

/// Delay before retry number `attempt` (0-based).
///
/// The strategy's value is capped at `max_delay_ms` first; jitter then
/// scales the capped value, so a jittered delay never exceeds the cap.
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let initial = config.initial_delay_ms as f64;
    let raw = match config.strategy {
        BackoffStrategy::Constant => initial,
        BackoffStrategy::Linear => initial * (attempt as f64 + 1.0) * config.backoff_factor,
        BackoffStrategy::Exponential => initial * config.backoff_factor.powf(attempt as f64),
    };

    let capped = raw.min(config.max_delay_ms as f64).max(0.0);
    let delay_ms = if config.jitter {
        capped * rand::thread_rng().gen_range(0.5..=1.0)
    } else {
        capped
    };

    Duration::from_millis(delay_ms as u64)
}

/// Terminal status of a retried operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Success,
    FailedPermanent,
    FailedRetriesExhausted,
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FinalStatus::Success => "success",
            FinalStatus::FailedPermanent => "failed_permanent",
            FinalStatus::FailedRetriesExhausted => "failed_retries_exhausted",
        };
        f.write_str(name)
    }
}

/// One failed attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// 1-based attempt number
    pub attempt: u32,
    pub error: EngineError,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(attempt: u32, error: EngineError) -> Self {
        Self {
            attempt,
            error,
            timestamp: Utc::now(),
        }
    }
}

/// Everything [`execute_with_retry`] learned
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub result: Result<T, EngineError>,
    pub status: FinalStatus,
    /// Invocations made, the first try included
    pub attempts: u32,
    pub retry_delays: Vec<Duration>,
    pub error_history: Vec<ErrorRecord>,
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.status == FinalStatus::Success
    }
}

/// Run `task_fn` under `config`.
///
/// Backoff sleeps happen on the calling task only.
pub async fn execute_with_retry<F, Fut, T>(config: &RetryConfig, mut task_fn: F) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut attempts = 0u32;
    let mut retry_delays = Vec::new();
    let mut error_history = Vec::new();

    loop {
        attempts += 1;

        let err = match task_fn().await {
            Ok(value) => {
                if attempts > 1 {
                    info!(attempts, "Operation succeeded after retry");
                }
                return RetryOutcome {
                    result: Ok(value),
                    status: FinalStatus::Success,
                    attempts,
                    retry_delays,
                    error_history,
                };
            }
            Err(err) => err,
        };

        let retryable = config.policy.is_retryable(&err);
        debug!(attempt = attempts, error = %err, retryable, "Attempt failed");
        error_history.push(ErrorRecord::new(attempts, err.clone()));

        let status = if !retryable {
            error!(attempt = attempts, error = %err, "Permanent error, not retrying");
            Some(FinalStatus::FailedPermanent)
        } else if attempts > config.max_retries {
            error!(
                attempts,
                max_retries = config.max_retries,
                error = %err,
                "All retry attempts exhausted"
            );
            Some(FinalStatus::FailedRetriesExhausted)
        } else {
            None
        };

        if let Some(status) = status {
            return RetryOutcome {
                result: Err(err),
                status,
                attempts,
                retry_delays,
                error_history,
            };
        }

        let delay = calculate_delay(attempts - 1, config);
        warn!(
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient error, will retry after delay"
        );
        retry_delays.push(delay);
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixed(strategy: BackoffStrategy) -> RetryConfig {
        RetryConfig::default()
            .with_strategy(strategy)
            .with_jitter(false)
    }

    #[test]
    fn test_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 30_000);
        assert_eq!(config.backoff_factor, 2.0);
        assert_eq!(config.strategy, BackoffStrategy::Exponential);
        assert!(config.jitter);
    }

    #[test]
    fn test_exponential_delays_and_cap() {
        let config = fixed(BackoffStrategy::Exponential);
        assert_eq!(calculate_delay(0, &config), Duration::from_millis(1000));
        assert_eq!(calculate_delay(1, &config), Duration::from_millis(2000));
        assert_eq!(calculate_delay(4, &config), Duration::from_millis(16_000));
        assert_eq!(calculate_delay(5, &config), Duration::from_millis(30_000));
        assert_eq!(calculate_delay(10, &config), Duration::from_millis(30_000));
    }

    #[test]
    fn test_linear_and_constant() {
        let linear = fixed(BackoffStrategy::Linear);
        assert_eq!(calculate_delay(0, &linear), Duration::from_millis(2000));
        assert_eq!(calculate_delay(2, &linear), Duration::from_millis(6000));

        let constant = fixed(BackoffStrategy::Constant);
        assert_eq!(calculate_delay(0, &constant), Duration::from_millis(1000));
        assert_eq!(calculate_delay(9, &constant), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = RetryConfig::default().with_max_delay(4000);
        for attempt in 0..8 {
            let unjittered = calculate_delay(attempt, &config.clone().with_jitter(false));
            let delay = calculate_delay(attempt, &config);
            assert!(delay <= unjittered, "{:?} > {:?}", delay, unjittered);
            assert!(delay.as_millis() + 1 >= unjittered.as_millis() / 2);
        }
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Linear".parse::<BackoffStrategy>(), Ok(BackoffStrategy::Linear));
        assert!("fibonacci".parse::<BackoffStrategy>().is_err());
        assert_eq!(BackoffStrategy::Constant.to_string(), "constant");
    }

    #[test]
    fn test_delay_schedule_length() {
        let config = fixed(BackoffStrategy::Exponential);
        let schedule = config.delay_schedule();
        assert_eq!(
            schedule,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000)
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_delay_never_exceeds_cap(
            attempt in 0u32..200,
            initial in 0u64..100_000,
            max in 0u64..100_000,
            factor in 1.0f64..10.0,
            jitter in any::<bool>(),
            strategy in prop_oneof![
                Just(BackoffStrategy::Constant),
                Just(BackoffStrategy::Linear),
                Just(BackoffStrategy::Exponential),
            ],
        ) {
            let config = RetryConfig::default()
                .with_initial_delay(initial)
                .with_max_delay(max)
                .with_factor(factor)
                .with_jitter(jitter)
                .with_strategy(strategy);
            prop_assert!(calculate_delay(attempt, &config) <= Duration::from_millis(max));
        }
    }
}
