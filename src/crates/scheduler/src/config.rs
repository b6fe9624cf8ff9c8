//! Run configuration
//!
//! Loaded from YAML, overlaid with `TASKRUN_*` environment variables and
//! validated before a [`Scheduler`](crate::Scheduler) is built.
//!
//! ```yaml
//! timeout_ms: 30000
//! rate_limit: 5.0
//! max_parallel: 8
//! retry:
//!   max_retries: 3
//!   strategy: exponential
//! error_handling:
//!   dlq_path: out/dead_letters.jsonl
//!   max_failure_rate: 0.5
//!   breaker_window: 20
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tooling::config::{ConfigBuilder, EnvReader};
use tooling::ToolingError;

use crate::retry::{BackoffStrategy, RetryConfig};
use crate::{Result, SchedulerError};

/// Environment prefix for run overrides
pub const ENV_PREFIX: &str = "TASKRUN_";

/// Failure-recovery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandlingConfig {
    /// Where permanently failed tasks are appended; none disables the DLQ
    pub dlq_path: Option<PathBuf>,

    /// Stop issuing tasks above this failure rate; none disables the breaker
    pub max_failure_rate: Option<f64>,

    /// Number of recent outcomes the breaker looks at
    pub breaker_window: usize,
}

impl Default for ErrorHandlingConfig {
    fn default() -> Self {
        Self {
            dlq_path: None,
            max_failure_rate: None,
            breaker_window: 20,
        }
    }
}

/// Settings for one scheduling run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Per-invocation deadline
    pub timeout_ms: u64,

    /// Admissions per second; none means unlimited
    pub rate_limit: Option<f64>,

    pub max_parallel: usize,

    pub retry: RetryConfig,

    pub error_handling: ErrorHandlingConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            rate_limit: None,
            max_parallel: 4,
            retry: RetryConfig::default(),
            error_handling: ErrorHandlingConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_rate_limit(mut self, rate: f64) -> Self {
        self.rate_limit = Some(rate);
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_dlq(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_handling.dlq_path = Some(path.into());
        self
    }

    pub fn with_circuit_breaker(mut self, window: usize, max_failure_rate: f64) -> Self {
        self.error_handling.breaker_window = window;
        self.error_handling.max_failure_rate = Some(max_failure_rate);
        self
    }

    /// Parse YAML; absent keys take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_yaml(&raw)
    }

    /// File (when given) with environment overrides on top, validated.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path).await?,
            None => Self::default(),
        };
        Ok(Self::layered(base, ENV_PREFIX)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate, reporting the problem as a scheduler error.
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| SchedulerError::Config(e.to_string()))
    }
}

/// Add the entries of `overlay` that are not built-in defaults.
fn extend_new<T: Ord>(target: &mut BTreeSet<T>, overlay: BTreeSet<T>, defaults: &BTreeSet<T>) {
    target.extend(overlay.into_iter().filter(|item| !defaults.contains(item)));
}

fn invalid(message: String) -> ToolingError {
    ToolingError::General(message)
}

impl ConfigBuilder for RunConfig {
    fn validate(&self) -> tooling::Result<()> {
        if self.max_parallel == 0 {
            return Err(invalid("max_parallel must be greater than 0".into()));
        }
        if self.timeout_ms == 0 {
            return Err(invalid("timeout_ms must be greater than 0".into()));
        }
        if let Some(rate) = self.rate_limit {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(invalid(format!("rate_limit must be positive, got {}", rate)));
            }
        }
        if let Some(rate) = self.error_handling.max_failure_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(invalid(format!(
                    "max_failure_rate must be within [0, 1], got {}",
                    rate
                )));
            }
        }
        if self.error_handling.breaker_window == 0 {
            return Err(invalid("breaker_window must be greater than 0".into()));
        }
        let retry = &self.retry;
        if retry.strategy != BackoffStrategy::Constant && !(retry.backoff_factor >= 1.0) {
            return Err(invalid(format!(
                "backoff_factor must be at least 1.0, got {}",
                retry.backoff_factor
            )));
        }
        if retry.initial_delay_ms > retry.max_delay_ms {
            return Err(invalid(format!(
                "initial_delay_ms ({}) exceeds max_delay_ms ({})",
                retry.initial_delay_ms, retry.max_delay_ms
            )));
        }
        Ok(())
    }

    fn from_env(prefix: &str) -> tooling::Result<Self> {
        let env = EnvReader::new(prefix);
        let mut config = Self::default();

        if let Some(ms) = env.parse("TIMEOUT_MS")? {
            config.timeout_ms = ms;
        }
        if let Some(rate) = env.parse("RATE_LIMIT")? {
            config.rate_limit = Some(rate);
        }
        if let Some(n) = env.parse("MAX_PARALLEL")? {
            config.max_parallel = n;
        }

        let retry = &mut config.retry;
        if let Some(n) = env.parse("MAX_RETRIES")? {
            retry.max_retries = n;
        }
        if let Some(ms) = env.parse("INITIAL_DELAY_MS")? {
            retry.initial_delay_ms = ms;
        }
        if let Some(ms) = env.parse("MAX_DELAY_MS")? {
            retry.max_delay_ms = ms;
        }
        if let Some(factor) = env.parse("BACKOFF_FACTOR")? {
            retry.backoff_factor = factor;
        }
        if let Some(strategy) = env.parse("BACKOFF_STRATEGY")? {
            retry.strategy = strategy;
        }
        if let Some(jitter) = env.bool("JITTER")? {
            retry.jitter = jitter;
        }
        if let Some(codes) = env.list::<String>("RETRYABLE_ERRORS")? {
            retry.policy.retryable_errors.extend(codes);
        }
        if let Some(codes) = env.list::<String>("PERMANENT_ERRORS")? {
            retry.policy.permanent_errors.extend(codes);
        }

        let errors = &mut config.error_handling;
        if let Some(path) = env.string("DLQ_PATH")? {
            errors.dlq_path = Some(PathBuf::from(path));
        }
        if let Some(rate) = env.parse("MAX_FAILURE_RATE")? {
            errors.max_failure_rate = Some(rate);
        }
        if let Some(window) = env.parse("BREAKER_WINDOW")? {
            errors.breaker_window = window;
        }

        Ok(config)
    }

    /// Fields of `other` that differ from the defaults win; optional
    /// fields win whenever they are set.
    fn merge(&mut self, other: Self) -> &mut Self {
        let defaults = Self::default();

        if other.timeout_ms != defaults.timeout_ms {
            self.timeout_ms = other.timeout_ms;
        }
        if other.rate_limit.is_some() {
            self.rate_limit = other.rate_limit;
        }
        if other.max_parallel != defaults.max_parallel {
            self.max_parallel = other.max_parallel;
        }

        let (retry, base) = (other.retry, defaults.retry);
        if retry.max_retries != base.max_retries {
            self.retry.max_retries = retry.max_retries;
        }
        if retry.initial_delay_ms != base.initial_delay_ms {
            self.retry.initial_delay_ms = retry.initial_delay_ms;
        }
        if retry.max_delay_ms != base.max_delay_ms {
            self.retry.max_delay_ms = retry.max_delay_ms;
        }
        if retry.backoff_factor != base.backoff_factor {
            self.retry.backoff_factor = retry.backoff_factor;
        }
        if retry.strategy != base.strategy {
            self.retry.strategy = retry.strategy;
        }
        if retry.jitter != base.jitter {
            self.retry.jitter = retry.jitter;
        }
        let (policy, default_policy) = (retry.policy, base.policy);
        let target = &mut self.retry.policy;
        extend_new(
            &mut target.retryable_errors,
            policy.retryable_errors,
            &default_policy.retryable_errors,
        );
        extend_new(
            &mut target.permanent_errors,
            policy.permanent_errors,
            &default_policy.permanent_errors,
        );
        extend_new(
            &mut target.retryable_statuses,
            policy.retryable_statuses,
            &default_policy.retryable_statuses,
        );
        extend_new(
            &mut target.permanent_statuses,
            policy.permanent_statuses,
            &default_policy.permanent_statuses,
        );

        let errors = other.error_handling;
        if errors.dlq_path.is_some() {
            self.error_handling.dlq_path = errors.dlq_path;
        }
        if errors.max_failure_rate.is_some() {
            self.error_handling.max_failure_rate = errors.max_failure_rate;
        }
        if errors.breaker_window != defaults.error_handling.breaker_window {
            self.error_handling.breaker_window = errors.breaker_window;
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RunConfig::build().unwrap();
        assert_eq!(config.max_parallel, 4);
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert!(config.rate_limit.is_none());
    }

    #[test]
    fn test_partial_yaml() {
        let config = RunConfig::from_yaml(
            "max_parallel: 16\nretry:\n  strategy: linear\nerror_handling:\n  max_failure_rate: 0.25\n",
        )
        .unwrap();

        assert_eq!(config.max_parallel, 16);
        assert_eq!(config.retry.strategy, BackoffStrategy::Linear);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.error_handling.max_failure_rate, Some(0.25));
        assert_eq!(config.error_handling.breaker_window, 20);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(RunConfig::default().with_max_parallel(0).check().is_err());
        assert!(RunConfig::default().with_rate_limit(0.0).check().is_err());
        assert!(RunConfig::default()
            .with_circuit_breaker(10, 1.5)
            .check()
            .is_err());
        assert!(RunConfig::default()
            .with_retry(RetryConfig::default().with_factor(0.5))
            .check()
            .is_err());
        assert!(RunConfig::default()
            .with_retry(
                RetryConfig::default()
                    .with_factor(0.5)
                    .with_strategy(BackoffStrategy::Constant)
            )
            .check()
            .is_ok());
    }

    #[test]
    fn test_merge_prefers_non_default_values() {
        let mut base = RunConfig::default()
            .with_max_parallel(8)
            .with_dlq("base.jsonl");
        let overlay = RunConfig::default().with_rate_limit(2.0).with_dlq("over.jsonl");

        base.merge(overlay);

        assert_eq!(base.max_parallel, 8);
        assert_eq!(base.rate_limit, Some(2.0));
        assert_eq!(
            base.error_handling.dlq_path.as_deref(),
            Some(Path::new("over.jsonl"))
        );
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("TASKRUN_TEST_ENV_MAX_PARALLEL", "12");
        std::env::set_var("TASKRUN_TEST_ENV_BACKOFF_STRATEGY", "constant");
        std::env::set_var("TASKRUN_TEST_ENV_PERMANENT_ERRORS", "quota_exceeded, ");

        let config = RunConfig::layered(RunConfig::default(), "TASKRUN_TEST_ENV_").unwrap();

        assert_eq!(config.max_parallel, 12);
        assert_eq!(config.retry.strategy, BackoffStrategy::Constant);
        assert!(config.retry.policy.permanent_errors.contains("quota_exceeded"));
        assert!(config.retry.policy.permanent_errors.contains("bad_request"));
    }

    #[test]
    fn test_merge_does_not_restore_removed_defaults() {
        let yaml = "retry:\n  policy:\n    retryable_errors: [overloaded]\n";
        let mut base = RunConfig::from_yaml(yaml).unwrap();
        let overlay = RunConfig::default();

        base.merge(overlay);

        let codes: Vec<&str> = base
            .retry
            .policy
            .retryable_errors
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(codes, vec!["overloaded"]);
    }

    #[test]
    fn test_malformed_env_value_is_an_error() {
        std::env::set_var("TASKRUN_TEST_BAD_MAX_PARALLEL", "many");
        assert!(RunConfig::from_env("TASKRUN_TEST_BAD_").is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = RunConfig::default().with_rate_limit(3.0).with_dlq("dlq.jsonl");
        let yaml = config.to_yaml().unwrap();
        assert_eq!(RunConfig::from_yaml(&yaml).unwrap(), config);
    }
}
