//! State machine definition types.
//!
//! Mirrors the JSON definition format field for field (`StartAt`, `States`,
//! `Type`, `Next`, `End`, ...). A definition is immutable once loaded; the
//! engine only ever reads it.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::choice::ChoiceRule;

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// A complete state machine: a start state and the named states.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateMachine {
    /// Name of the first state to run.
    pub start_at: String,
    /// All states keyed by name.
    pub states: HashMap<String, State>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Parsed but not enforced by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl StateMachine {
    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }
}

// ---------------------------------------------------------------------------
// Nullable paths
// ---------------------------------------------------------------------------

/// A path attribute that distinguishes an absent field from an explicit
/// JSON `null`.
///
/// - `Absent`: the field was not written; behaves like `$`.
/// - `Null`: the field was `null`; input/output becomes `{}`, a result is
///   discarded.
/// - `Path`: a path expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PathField {
    #[default]
    Absent,
    Null,
    Path(String),
}

impl PathField {
    pub fn is_absent(&self) -> bool {
        matches!(self, PathField::Absent)
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            PathField::Path(p) => Some(p),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for PathField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<String>::deserialize(deserializer)? {
            None => PathField::Null,
            Some(path) => PathField::Path(path),
        })
    }
}

impl Serialize for PathField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PathField::Absent | PathField::Null => serializer.serialize_none(),
            PathField::Path(p) => serializer.serialize_str(p),
        }
    }
}

// ---------------------------------------------------------------------------
// Error handling policies
// ---------------------------------------------------------------------------

/// A `Retry` entry. Unset numeric fields fall back to the engine's
/// configured retry defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RetryPolicy {
    pub error_equals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_rate: Option<f64>,
    /// Retries after the first failure; total tries is this plus one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Upper bound on a single retry delay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_seconds: Option<f64>,
}

/// A `Catch` entry: divert to `next` with the error written at `result_path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatchPolicy {
    pub error_equals: Vec<String>,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub result_path: PathField,
    pub next: String,
}

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// A single state, tagged by its `Type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum State {
    Task(TaskState),
    Pass(PassState),
    Choice(ChoiceState),
    Wait(WaitState),
    Succeed(SucceedState),
    Fail(FailState),
    Map(MapState),
    Parallel(ParallelState),
}

/// Invoke the resolver registered for `resource`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskState {
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub input_path: PathField,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub output_path: PathField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_selector: Option<Value>,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub result_path: PathField,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry: Vec<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catch: Vec<CatchPolicy>,
    /// Parsed but not enforced; left to the resolver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds_path: Option<String>,
    /// Parsed but not enforced; left to the resolver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_seconds_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub end: bool,
}

/// Emit `result` (or the effective input).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PassState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub input_path: PathField,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub output_path: PathField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub result_path: PathField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub end: bool,
}

/// Branch on the first matching rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChoiceState {
    pub choices: Vec<ChoiceRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub input_path: PathField,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub output_path: PathField,
    /// Must stay unset; kept so validation can report it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub end: bool,
}

/// Delay for a fixed duration or until a timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WaitState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub input_path: PathField,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub output_path: PathField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub end: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SucceedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub input_path: PathField,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub output_path: PathField,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FailState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Declared per-item sub-workflow. Items are not executed; the effective
/// input passes through.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MapState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterator: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_processor: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub input_path: PathField,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub output_path: PathField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_selector: Option<Value>,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub result_path: PathField,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry: Vec<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catch: Vec<CatchPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub end: bool,
}

/// Declared parallel branches. Branches are validated but not executed;
/// the effective input passes through.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParallelState {
    pub branches: Vec<StateMachine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub input_path: PathField,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub output_path: PathField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_selector: Option<Value>,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub result_path: PathField,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry: Vec<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catch: Vec<CatchPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub end: bool,
}

// ---------------------------------------------------------------------------
// Common accessors
// ---------------------------------------------------------------------------

impl State {
    /// The `Type` discriminator as written in the definition.
    pub fn type_name(&self) -> &'static str {
        match self {
            State::Task(_) => "Task",
            State::Pass(_) => "Pass",
            State::Choice(_) => "Choice",
            State::Wait(_) => "Wait",
            State::Succeed(_) => "Succeed",
            State::Fail(_) => "Fail",
            State::Map(_) => "Map",
            State::Parallel(_) => "Parallel",
        }
    }

    /// `InputPath`; Fail states always see their raw input.
    pub fn input_path(&self) -> &PathField {
        static ABSENT: PathField = PathField::Absent;
        match self {
            State::Task(s) => &s.input_path,
            State::Pass(s) => &s.input_path,
            State::Choice(s) => &s.input_path,
            State::Wait(s) => &s.input_path,
            State::Succeed(s) => &s.input_path,
            State::Map(s) => &s.input_path,
            State::Parallel(s) => &s.input_path,
            State::Fail(_) => &ABSENT,
        }
    }

    pub fn output_path(&self) -> &PathField {
        static ABSENT: PathField = PathField::Absent;
        match self {
            State::Task(s) => &s.output_path,
            State::Pass(s) => &s.output_path,
            State::Choice(s) => &s.output_path,
            State::Wait(s) => &s.output_path,
            State::Succeed(s) => &s.output_path,
            State::Map(s) => &s.output_path,
            State::Parallel(s) => &s.output_path,
            State::Fail(_) => &ABSENT,
        }
    }

    pub fn parameters(&self) -> Option<&Value> {
        match self {
            State::Task(s) => s.parameters.as_ref(),
            State::Pass(s) => s.parameters.as_ref(),
            State::Map(s) => s.parameters.as_ref(),
            State::Parallel(s) => s.parameters.as_ref(),
            State::Choice(_) | State::Wait(_) | State::Succeed(_) | State::Fail(_) => None,
        }
    }

    pub fn result_selector(&self) -> Option<&Value> {
        match self {
            State::Task(s) => s.result_selector.as_ref(),
            State::Map(s) => s.result_selector.as_ref(),
            State::Parallel(s) => s.result_selector.as_ref(),
            _ => None,
        }
    }

    pub fn result_path(&self) -> &PathField {
        static ABSENT: PathField = PathField::Absent;
        match self {
            State::Task(s) => &s.result_path,
            State::Pass(s) => &s.result_path,
            State::Map(s) => &s.result_path,
            State::Parallel(s) => &s.result_path,
            _ => &ABSENT,
        }
    }

    pub fn retry(&self) -> &[RetryPolicy] {
        match self {
            State::Task(s) => &s.retry,
            State::Map(s) => &s.retry,
            State::Parallel(s) => &s.retry,
            _ => &[],
        }
    }

    pub fn catch(&self) -> &[CatchPolicy] {
        match self {
            State::Task(s) => &s.catch,
            State::Map(s) => &s.catch,
            State::Parallel(s) => &s.catch,
            _ => &[],
        }
    }

    /// `(Next, End)` as declared. Choice reports its stray fields so they
    /// can be rejected; Succeed and Fail have neither.
    pub fn transition_fields(&self) -> (Option<&str>, bool) {
        match self {
            State::Task(s) => (s.next.as_deref(), s.end),
            State::Pass(s) => (s.next.as_deref(), s.end),
            State::Choice(s) => (s.next.as_deref(), s.end),
            State::Wait(s) => (s.next.as_deref(), s.end),
            State::Map(s) => (s.next.as_deref(), s.end),
            State::Parallel(s) => (s.next.as_deref(), s.end),
            State::Succeed(_) | State::Fail(_) => (None, false),
        }
    }

    /// Succeed and Fail end the run unconditionally.
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Succeed(_) | State::Fail(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
