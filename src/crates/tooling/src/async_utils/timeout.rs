//! Deadline-bounded execution
//!
//! Timeouts here are a "stop waiting" signal. When a deadline passes the
//! spawned work is aborted at its next await point; anything it already did
//! stays done.

use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout as tokio_timeout, Instant};

/// How a guarded run ended
#[derive(Debug, Clone, PartialEq)]
pub enum Guarded<T> {
    /// The future ran to completion
    Finished(T),
    /// The deadline passed before completion
    TimedOut(Duration),
    /// The future panicked
    Panicked(String),
}

/// Result of [`run_guarded`] with the wall time spent waiting on it
#[derive(Debug, Clone)]
pub struct GuardedRun<T> {
    pub result: Guarded<T>,
    pub elapsed: Duration,
}

/// Run `operation` on a separate tokio task under a deadline.
///
/// `elapsed` covers only the time between spawning and the outcome.
pub async fn run_guarded<F, T>(limit: Duration, operation: F) -> GuardedRun<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let start = Instant::now();
    let mut handle = tokio::spawn(operation);

    let result = match tokio_timeout(limit, &mut handle).await {
        Ok(Ok(value)) => Guarded::Finished(value),
        Ok(Err(join_error)) => {
            if join_error.is_panic() {
                Guarded::Panicked(panic_message(join_error.into_panic()))
            } else {
                Guarded::Panicked("task was cancelled".to_string())
            }
        }
        Err(_elapsed) => {
            handle.abort();
            Guarded::TimedOut(limit)
        }
    };

    GuardedRun {
        result,
        elapsed: start.elapsed(),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_run_guarded_finishes() {
        let run = run_guarded(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_millis(250)).await;
            42
        })
        .await;

        assert_eq!(run.result, Guarded::Finished(42));
        assert!(run.elapsed >= Duration::from_millis(250));
        assert!(run.elapsed < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_guarded_times_out() {
        let run = run_guarded(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            "late"
        })
        .await;

        assert_eq!(run.result, Guarded::TimedOut(Duration::from_millis(50)));
        assert!(run.elapsed < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_run_guarded_captures_panic() {
        let run = run_guarded(Duration::from_secs(1), async {
            if true {
                panic!("backend exploded");
            }
            0u8
        })
        .await;

        assert_eq!(run.result, Guarded::Panicked("backend exploded".to_string()));
    }
}
