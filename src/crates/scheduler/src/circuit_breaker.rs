//! Failure-rate circuit breaker
//!
//! Tracks the outcomes of the most recent tasks in a fixed-size window.
//! When the share of failures rises above the configured maximum the
//! scheduler stops issuing new tasks for the rest of the run.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::warn;

/// Sliding-window failure monitor shared by all workers of a run
#[derive(Debug)]
pub struct CircuitBreaker {
    window: Mutex<VecDeque<bool>>,
    capacity: usize,
    max_failure_rate: f64,
}

impl CircuitBreaker {
    /// Window of `capacity` outcomes (at least 1).
    pub fn new(capacity: usize, max_failure_rate: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            max_failure_rate,
        }
    }

    /// Record one outcome, evicting the oldest when the window is full.
    pub fn record(&self, success: bool) {
        let mut window = self.window.lock();
        if window.len() == self.capacity {
            window.pop_front();
        }
        window.push_back(success);
    }

    pub fn record_success(&self) {
        self.record(true);
    }

    pub fn record_failure(&self) {
        self.record(false);
    }

    /// Failures over window length; 0.0 for an empty window.
    pub fn failure_rate(&self) -> f64 {
        let window = self.window.lock();
        if window.is_empty() {
            return 0.0;
        }
        let failures = window.iter().filter(|success| !**success).count();
        failures as f64 / window.len() as f64
    }

    /// True once the failure rate is strictly above the maximum.
    pub fn should_abort(&self) -> bool {
        let rate = self.failure_rate();
        let tripped = rate > self.max_failure_rate;
        if tripped {
            warn!(
                failure_rate = rate,
                max_failure_rate = self.max_failure_rate,
                "Circuit breaker tripped"
            );
        }
        tripped
    }

    pub fn len(&self) -> usize {
        self.window.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_failure_rate(&self) -> f64 {
        self.max_failure_rate
    }
}
