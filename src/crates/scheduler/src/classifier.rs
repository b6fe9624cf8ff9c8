//! Transient vs permanent error classification

use engine_core::{EngineError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const TRANSIENT_CODES: [&str; 4] = [
    "timeout",
    "connection_refused",
    "rate_limited",
    "temporarily_unavailable",
];
const TRANSIENT_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];
const PERMANENT_CODES: [&str; 3] = ["invalid_query", "authentication_failed", "bad_request"];
const PERMANENT_STATUSES: [u16; 5] = [400, 401, 403, 404, 422];

/// Which failures are worth retrying
///
/// Permanent sets always override retryable ones. HTTP statuses in neither
/// set are retryable when >= 500; unknown symbolic errors are not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorPolicy {
    pub retryable_errors: BTreeSet<String>,
    pub permanent_errors: BTreeSet<String>,
    pub retryable_statuses: BTreeSet<u16>,
    pub permanent_statuses: BTreeSet<u16>,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self {
            retryable_errors: TRANSIENT_CODES.iter().map(|c| c.to_string()).collect(),
            permanent_errors: PERMANENT_CODES.iter().map(|c| c.to_string()).collect(),
            retryable_statuses: TRANSIENT_STATUSES.into_iter().collect(),
            permanent_statuses: PERMANENT_STATUSES.into_iter().collect(),
        }
    }
}

impl ErrorPolicy {
    pub fn with_retryable(mut self, code: impl Into<String>) -> Self {
        self.retryable_errors.insert(code.into());
        self
    }

    pub fn with_permanent(mut self, code: impl Into<String>) -> Self {
        self.permanent_errors.insert(code.into());
        self
    }

    pub fn is_retryable(&self, error: &EngineError) -> bool {
        self.is_retryable_kind(error.kind())
    }

    pub fn is_retryable_kind(&self, kind: ErrorKind<'_>) -> bool {
        match kind {
            ErrorKind::Status(status) => {
                if self.permanent_statuses.contains(&status) {
                    false
                } else if self.retryable_statuses.contains(&status) {
                    true
                } else {
                    status >= 500
                }
            }
            ErrorKind::Symbol(code) => {
                !self.permanent_errors.contains(code) && self.retryable_errors.contains(code)
            }
        }
    }
}
