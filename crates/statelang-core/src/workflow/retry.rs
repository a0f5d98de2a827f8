//! Retry/Catch controller around a single Task invocation.
//!
//! The first `Retry` entry whose `ErrorEquals` matches a failure governs it.
//! Each entry keeps its own attempt counter, so different errors draw on
//! different budgets. Once retries are exhausted (or nothing matched) the
//! `Catch` list is consulted with the last error.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use statelang_types::config::RetryDefaults;
use statelang_types::definition::{CatchPolicy, RetryPolicy};
use statelang_types::error::{ERROR_ALL, ERROR_TASK_FAILED, ERROR_TIMEOUT, TaskError};

// ---------------------------------------------------------------------------
// TaskOutcome
// ---------------------------------------------------------------------------

/// How a Task invocation ended when it did not propagate an error.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The resolver succeeded. `attempts` counts every invocation.
    Completed { value: Value, attempts: u32 },
    /// The resolver failed for good and a catcher took over.
    Caught { error: TaskError, catcher_index: usize },
}

/// Whether `error` is covered by an `ErrorEquals` list.
///
/// `States.ALL` matches everything; `States.TaskFailed` matches everything
/// except `States.Timeout`.
pub fn error_matches(error_equals: &[String], error: &str) -> bool {
    error_equals.iter().any(|name| {
        name == ERROR_ALL || name == error || (name == ERROR_TASK_FAILED && error != ERROR_TIMEOUT)
    })
}

/// `seconds * time_scale` as a `Duration`. NaN and non-positive products
/// are zero; products too large to represent saturate at `Duration::MAX`.
pub fn scaled_delay(seconds: f64, time_scale: f64) -> Duration {
    let seconds = seconds * time_scale;
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

// ---------------------------------------------------------------------------
// RetryHandler
// ---------------------------------------------------------------------------

/// Retry/Catch policy for one Task state.
pub struct RetryHandler<'a> {
    state: &'a str,
    retriers: &'a [RetryPolicy],
    catchers: &'a [CatchPolicy],
    defaults: &'a RetryDefaults,
    time_scale: f64,
}

impl<'a> RetryHandler<'a> {
    pub fn new(
        state: &'a str,
        retriers: &'a [RetryPolicy],
        catchers: &'a [CatchPolicy],
        defaults: &'a RetryDefaults,
        time_scale: f64,
    ) -> Self {
        Self {
            state,
            retriers,
            catchers,
            defaults,
            time_scale,
        }
    }

    /// Delay before retry number `attempt_index` (0-based) under `policy`,
    /// before time scaling.
    pub fn backoff(&self, policy: &RetryPolicy, attempt_index: u32) -> f64 {
        let interval = policy
            .interval_seconds
            .unwrap_or(self.defaults.interval_seconds);
        let rate = policy.backoff_rate.unwrap_or(self.defaults.backoff_rate);
        let exponent = i32::try_from(attempt_index).unwrap_or(i32::MAX);
        let delay = interval * rate.powi(exponent);
        match policy.max_delay_seconds {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Run `invoke` until it succeeds, retries are exhausted, or an
    /// unmatched error occurs. Unrecovered errors are returned as `Err`.
    pub async fn run_with_policy<F, Fut>(&self, mut invoke: F) -> Result<TaskOutcome, TaskError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Value, TaskError>>,
    {
        let mut retry_counts = vec![0u32; self.retriers.len()];
        let mut attempts = 0u32;

        let last_error = loop {
            attempts += 1;
            let error = match invoke().await {
                Ok(value) => return Ok(TaskOutcome::Completed { value, attempts }),
                Err(error) => error,
            };

            let Some(index) = self
                .retriers
                .iter()
                .position(|policy| error_matches(&policy.error_equals, &error.error))
            else {
                break error;
            };

            let policy = &self.retriers[index];
            let max_attempts = policy.max_attempts.unwrap_or(self.defaults.max_attempts);
            let used = retry_counts[index];
            if used >= max_attempts {
                tracing::debug!(
                    state = self.state,
                    error = error.error.as_str(),
                    retries = used,
                    "retries exhausted"
                );
                break error;
            }

            let delay = scaled_delay(self.backoff(policy, used), self.time_scale);
            retry_counts[index] += 1;
            tracing::warn!(
                state = self.state,
                error = error.error.as_str(),
                cause = error.cause.as_str(),
                attempt = used + 1,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "task failed, retrying"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        };

        match self
            .catchers
            .iter()
            .position(|catcher| error_matches(&catcher.error_equals, &last_error.error))
        {
            Some(catcher_index) => {
                tracing::info!(
                    state = self.state,
                    error = last_error.error.as_str(),
                    next = self.catchers[catcher_index].next.as_str(),
                    "error caught"
                );
                Ok(TaskOutcome::Caught {
                    error: last_error,
                    catcher_index,
                })
            }
            None => Err(last_error),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
