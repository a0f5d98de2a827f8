//! The execution context document exposed to paths as `$$`.
//!
//! `ExecutionContext` holds the per-run facts; [`ExecutionContext::for_state`]
//! renders the document for the state about to run:
//!
//! ```json
//! {
//!   "Execution": { "Id": "...", "Name": "...", "Input": {...}, "StartTime": "..." },
//!   "State": { "Name": "...", "EnteredTime": "...", "RetryCount": 0 },
//!   "StateMachine": { "Id": "..." },
//!   "Task": {}
//! }
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};

/// Per-run facts that stay fixed for the whole execution.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub state_machine_id: String,
    pub input: Value,
    pub start_time: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(execution_id: impl Into<String>, state_machine_id: impl Into<String>, input: Value) -> Self {
        Self {
            execution_id: execution_id.into(),
            state_machine_id: state_machine_id.into(),
            input,
            start_time: Utc::now(),
        }
    }

    /// Build the `$$` document for `state_name`, entered now.
    ///
    /// Retries happen inside a single step, so `RetryCount` is 0 whenever
    /// the document is built.
    pub fn for_state(&self, state_name: &str) -> Value {
        json!({
            "Execution": {
                "Id": self.execution_id,
                "Name": self.execution_id,
                "Input": self.input,
                "StartTime": timestamp(self.start_time),
            },
            "State": {
                "Name": state_name,
                "EnteredTime": timestamp(Utc::now()),
                "RetryCount": 0,
            },
            "StateMachine": {
                "Id": self.state_machine_id,
            },
            "Task": {},
        })
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
