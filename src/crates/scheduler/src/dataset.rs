//! JSONL dataset loading

use engine_core::Sample;
use std::path::Path;
use tracing::debug;

use crate::{Result, SchedulerError};

/// Parse one sample per non-blank line.
///
/// A record without an `id` gets its 0-based line index.
pub fn parse_samples(contents: &str) -> Result<Vec<Sample>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            let mut sample: Sample = serde_json::from_str(line).map_err(|e| {
                SchedulerError::Config(format!("Invalid sample on line {}: {}", index + 1, e))
            })?;
            if sample.id.is_empty() {
                sample.id = index.to_string();
            }
            Ok(sample)
        })
        .collect()
}

pub async fn load_samples(path: impl AsRef<Path>) -> Result<Vec<Sample>> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path).await?;
    let samples = parse_samples(&contents)?;
    debug!(path = %path.display(), samples = samples.len(), "Loaded dataset");
    Ok(samples)
}
