//! Engine configuration types.
//!
//! `EngineConfig` represents an optional `statelang.toml` that tunes retry
//! defaults, wait scaling, and how Task states without a resolver behave.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the execution engine.
///
/// All fields have defaults, so an empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Values used when a `Retry` entry omits a field.
    #[serde(default)]
    pub retry: RetryDefaults,

    /// Multiplier applied to every Wait and retry delay. `0.0` disables
    /// sleeping entirely.
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,

    /// What a Task state does when nothing is registered for it.
    #[serde(default)]
    pub unresolved_task: UnresolvedTaskPolicy,

    /// Upper bound on state transitions per run.
    #[serde(default = "default_max_transitions")]
    pub max_transitions: u32,
}

fn default_time_scale() -> f64 {
    1.0
}

fn default_max_transitions() -> u32 {
    25_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryDefaults::default(),
            time_scale: default_time_scale(),
            unresolved_task: UnresolvedTaskPolicy::default(),
            max_transitions: default_max_transitions(),
        }
    }
}

impl EngineConfig {
    /// Defaults with all delays disabled. Used by tests and dry runs.
    pub fn instant() -> Self {
        Self {
            time_scale: 0.0,
            ..Self::default()
        }
    }
}

/// Fallbacks for `IntervalSeconds`, `BackoffRate`, and `MaxAttempts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryDefaults {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: f64,
    #[serde(default = "default_backoff_rate")]
    pub backoff_rate: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_interval_seconds() -> f64 {
    1.0
}

fn default_backoff_rate() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for RetryDefaults {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            backoff_rate: default_backoff_rate(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Behavior of a Task state whose resource has no registered resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedTaskPolicy {
    /// Use the effective input as the task result.
    #[default]
    PassThrough,
    /// Fail the task with `States.NoResolver`.
    Fail,
}
