//! Prefixed environment variable reader

use crate::{Result, ToolingError};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Reads `{PREFIX}{NAME}` variables.
///
/// Every accessor returns `Ok(None)` when the variable is unset and an error
/// when it is set but malformed; a typo in an override is never silently
/// ignored.
#[derive(Debug, Clone)]
pub struct EnvReader {
    prefix: String,
}

impl EnvReader {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// Full variable name for `name`.
    pub fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name.to_uppercase())
    }

    /// Raw string value.
    pub fn string(&self, name: &str) -> Result<Option<String>> {
        let key = self.key(name);
        match env::var(&key) {
            Ok(val) => Ok(Some(val)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => Err(ToolingError::General(format!(
                "Environment variable {} contains invalid UTF-8",
                key
            ))),
        }
    }

    /// Parse with `FromStr`.
    pub fn parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(name)? {
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
                ToolingError::General(format!(
                    "Failed to parse environment variable {}: {}",
                    self.key(name),
                    e
                ))
            }),
            None => Ok(None),
        }
    }

    /// Boolean: true/1/yes/on and false/0/no/off, case-insensitive.
    pub fn bool(&self, name: &str) -> Result<Option<bool>> {
        let Some(raw) = self.string(name)? else {
            return Ok(None);
        };
        match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(ToolingError::General(format!(
                "Invalid boolean value for {}: {}",
                self.key(name),
                raw
            ))),
        }
    }

    /// Comma-separated list; empty items are dropped.
    pub fn list<T>(&self, name: &str) -> Result<Option<Vec<T>>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.string(name)? else {
            return Ok(None);
        };
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| {
                item.parse::<T>().map_err(|e| {
                    ToolingError::General(format!(
                        "Invalid item '{}' in {}: {}",
                        item,
                        self.key(name),
                        e
                    ))
                })
            })
            .collect::<Result<Vec<T>>>()
            .map(Some)
    }

    /// Milliseconds as a `Duration`.
    pub fn duration_ms(&self, name: &str) -> Result<Option<Duration>> {
        Ok(self.parse::<u64>(name)?.map(Duration::from_millis))
    }
}
