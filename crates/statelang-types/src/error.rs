use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Wildcard error name: matches every error in `ErrorEquals`.
pub const ERROR_ALL: &str = "States.ALL";

/// Matches any task error except [`ERROR_TIMEOUT`].
pub const ERROR_TASK_FAILED: &str = "States.TaskFailed";

/// Reserved for resolvers reporting a timeout; not raised by the engine itself.
pub const ERROR_TIMEOUT: &str = "States.Timeout";

/// Raised for a Task with no registered resolver under the `fail` policy.
pub const ERROR_NO_RESOLVER: &str = "States.NoResolver";

/// Default error name for a Fail state without an `Error` attribute.
pub const ERROR_FAILED: &str = "States.Failed";

/// Errors produced while loading or running a state machine.
#[derive(Debug, Error)]
pub enum StatesError {
    /// Malformed path expression, or a segment that does not resolve.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Malformed intrinsic call or bad intrinsic arguments.
    #[error("invalid function: {0}")]
    InvalidFunction(String),

    /// Unknown comparison key in a choice rule.
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// A Choice state with no matching rule and no `Default`.
    #[error("no choice matched in state '{state}'")]
    NoChoiceMatched { state: String },

    /// A transition names a state that is not defined.
    #[error("unknown state: '{0}'")]
    UnknownState(String),

    /// A resolver failed and neither Retry nor Catch recovered it.
    #[error("task state '{state}' failed with {error}: {cause}")]
    TaskFailure {
        state: String,
        error: String,
        cause: String,
    },

    /// Structural problem in the definition.
    #[error("definition error: {0}")]
    DefinitionError(String),

    /// The run reached a Fail state.
    #[error("execution failed with {error}: {cause}")]
    Failed { error: String, cause: String },

    /// The run exceeded the configured number of transitions.
    #[error("execution exceeded {limit} state transitions")]
    TransitionLimitExceeded { limit: u32 },

    /// JSON/YAML parse failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StatesError {
    /// The error name used when reporting this failure, in the same
    /// namespace as `ErrorEquals` entries.
    pub fn error_name(&self) -> &str {
        match self {
            StatesError::InvalidPath(_) => "States.InvalidPath",
            StatesError::InvalidFunction(_) => "States.InvalidFunction",
            StatesError::UnsupportedOperator(_) => "States.UnsupportedOperator",
            StatesError::NoChoiceMatched { .. } => "States.NoChoiceMatched",
            StatesError::UnknownState(_) => "States.UnknownState",
            StatesError::TaskFailure { error, .. } => error,
            StatesError::DefinitionError(_) => "States.DefinitionError",
            StatesError::Failed { error, .. } => error,
            StatesError::TransitionLimitExceeded { .. } => "States.TransitionLimitExceeded",
            StatesError::Parse(_) => "States.ParseError",
            StatesError::Io(_) => "States.IoError",
        }
    }
}

/// The failure value a task resolver returns.
///
/// `error` is the classification matched against `ErrorEquals`; `cause`
/// is free text.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
#[error("{error}: {cause}")]
pub struct TaskError {
    pub error: String,
    pub cause: String,
}

impl TaskError {
    pub fn new(error: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            cause: cause.into(),
        }
    }

    /// The `{"Error": .., "Cause": ..}` document written at a catcher's
    /// `ResultPath`.
    pub fn to_value(&self) -> Value {
        json!({ "Error": self.error, "Cause": self.cause })
    }
}
