//! Subcommand implementations
//!
//! Each command returns its output as a string so it can be tested without
//! capturing stdout.

use anyhow::{bail, Context, Result};
use engine_core::{ErrorKind, Sample};
use scheduler::{
    generate_tasks, load_samples, read_dead_letters, BackoffStrategy, Condition, RunConfig,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;
use tooling::config::ConfigBuilder;
use tooling::logging::{format_duration, timed};
use tracing::debug;

pub async fn dlq(path: &Path, as_json: bool) -> Result<String> {
    let letters = read_dead_letters(path)
        .await
        .with_context(|| format!("Failed to read dead letters from {}", path.display()))?;

    let mut out = String::new();
    if as_json {
        for letter in &letters {
            writeln!(out, "{}", serde_json::to_string(letter)?)?;
        }
        return Ok(out);
    }

    let mut by_condition: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_error: BTreeMap<String, usize> = BTreeMap::new();
    for letter in &letters {
        *by_condition.entry(letter.condition.as_str()).or_default() += 1;
        *by_error.entry(error_label(letter.error.kind())).or_default() += 1;
    }

    writeln!(out, "{} dead letters in {}", letters.len(), path.display())?;
    if letters.is_empty() {
        return Ok(out);
    }

    writeln!(out, "By condition:")?;
    for (condition, count) in &by_condition {
        writeln!(out, "  {:<24} {}", condition, count)?;
    }
    writeln!(out, "By error:")?;
    for (error, count) in &by_error {
        writeln!(out, "  {:<24} {}", error, count)?;
    }
    Ok(out)
}

fn error_label(kind: ErrorKind<'_>) -> String {
    match kind {
        ErrorKind::Status(status) => format!("http {}", status),
        ErrorKind::Symbol(code) => code.to_string(),
    }
}

pub async fn config(file: Option<&Path>) -> Result<String> {
    let config = RunConfig::load(file)
        .await
        .context("Failed to load run configuration")?;
    Ok(config.to_yaml()?)
}

/// Command-line adjustments applied on top of the loaded retry policy
#[derive(Debug, Default)]
pub struct DelayOverrides {
    pub strategy: Option<String>,
    pub initial_ms: Option<u64>,
    pub max_ms: Option<u64>,
    pub factor: Option<f64>,
    pub retries: Option<u32>,
    /// `None` keeps whatever the loaded config says
    pub jitter: Option<bool>,
}

pub async fn delays(file: Option<&Path>, overrides: DelayOverrides) -> Result<String> {
    let mut config = RunConfig::load(file)
        .await
        .context("Failed to load run configuration")?;

    let retry = &mut config.retry;
    if let Some(strategy) = &overrides.strategy {
        retry.strategy = strategy.parse::<BackoffStrategy>().map_err(anyhow::Error::msg)?;
    }
    if let Some(ms) = overrides.initial_ms {
        retry.initial_delay_ms = ms;
    }
    if let Some(ms) = overrides.max_ms {
        retry.max_delay_ms = ms;
    }
    if let Some(factor) = overrides.factor {
        retry.backoff_factor = factor;
    }
    if let Some(retries) = overrides.retries {
        retry.max_retries = retries;
    }
    if let Some(jitter) = overrides.jitter {
        retry.jitter = jitter;
    }
    config.validate()?;

    let retry = &config.retry;
    let mut out = String::new();
    writeln!(
        out,
        "{} backoff, initial {}ms, factor {}, cap {}ms{}",
        retry.strategy,
        retry.initial_delay_ms,
        retry.backoff_factor,
        retry.max_delay_ms,
        if retry.jitter { ", jittered" } else { "" }
    )?;

    let mut total = std::time::Duration::ZERO;
    for (attempt, delay) in retry.delay_schedule().into_iter().enumerate() {
        total += delay;
        writeln!(
            out,
            "  retry {:>2}: wait {:>8}  (total {})",
            attempt + 1,
            format_duration(delay),
            format_duration(total)
        )?;
    }
    Ok(out)
}

pub async fn expand(
    dataset: &Path,
    condition_names: &[String],
    repeat: u32,
    show: usize,
) -> Result<String> {
    if condition_names.iter().all(|name| name.trim().is_empty()) {
        bail!("At least one condition name is required");
    }

    let samples: Vec<Sample> = timed("load dataset", load_samples(dataset))
        .await
        .with_context(|| format!("Failed to load dataset {}", dataset.display()))?;
    let config = RunConfig::load(None).await?;

    let conditions: Vec<Condition> = condition_names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(|name| Condition::new(name, |_sample: Sample| async { Ok(Value::Null) }))
        .collect();

    let tasks = generate_tasks("dry-run", &conditions, repeat, &samples, config.timeout());
    debug!(tasks = tasks.len(), "Expanded tasks");

    let mut out = String::new();
    writeln!(
        out,
        "{} tasks = {} conditions x {} repeats x {} samples (timeout {})",
        tasks.len(),
        conditions.len(),
        repeat,
        samples.len(),
        format_duration(config.timeout())
    )?;
    for task in tasks.iter().take(show) {
        writeln!(
            out,
            "  {:<16} repeat {:<3} {}",
            task.condition.name(),
            task.repeat,
            task.query_id()
        )?;
    }
    if tasks.len() > show {
        writeln!(out, "  ... {} more", tasks.len() - show)?;
    }
    Ok(out)
}
