//! State machine executor: runs one state at a time from `StartAt` until a
//! terminal state.
//!
//! # Step flow
//!
//! 1. Look up the current state and rebuild the `$$` context document.
//! 2. Effective input = `InputPath`, then `Parameters`.
//! 3. Dispatch on the state type (resolver call, `Result`, wait, choice...).
//! 4. `ResultSelector` shapes the raw result; `ResultPath` splices it into
//!    the raw input; `OutputPath` selects the state output.
//! 5. Follow `Next`, or stop on `End` / a terminal state.
//!
//! The definition is shared behind `Arc` and never mutated; every run keeps
//! its cursor on the stack, so one executor can serve concurrent runs.
//!
//! Each run opens an `execution` span; every state runs inside a `state`
//! span and every resolver attempt inside a `task` span.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use statelang_types::config::{EngineConfig, UnresolvedTaskPolicy};
use statelang_types::definition::{ChoiceState, State, StateMachine, TaskState, WaitState};
use statelang_types::error::{ERROR_FAILED, ERROR_NO_RESOLVER, StatesError, TaskError};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::context::ExecutionContext;
use super::path;
use super::predicate::{evaluate_rule, parse_timestamp};
use super::resolver::ResolverRegistry;
use super::retry::{RetryHandler, TaskOutcome, scaled_delay};
use super::template::evaluate_template;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Whether a run cursor is still advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Running,
    Terminated,
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub execution_id: String,
    /// Output of the final state.
    pub output: Value,
    /// Names of the states entered, in order.
    pub transitions: Vec<String>,
    pub status: RunStatus,
}

/// What a single state decided.
enum StepOutcome {
    /// Result to run through `ResultSelector` / `ResultPath` / `OutputPath`.
    Result { value: Value, next: Option<String> },
    /// A catcher took over; `output` is final for this state.
    Diverted { output: Value, next: String },
}

// ---------------------------------------------------------------------------
// StateMachineExecutor
// ---------------------------------------------------------------------------

/// Runs a validated [`StateMachine`] against caller-supplied resolvers.
pub struct StateMachineExecutor {
    definition: Arc<StateMachine>,
    resolvers: ResolverRegistry,
    config: EngineConfig,
    state_machine_id: String,
}

impl StateMachineExecutor {
    pub fn new(definition: Arc<StateMachine>, resolvers: ResolverRegistry, config: EngineConfig) -> Self {
        Self {
            definition,
            resolvers,
            config,
            state_machine_id: Uuid::now_v7().to_string(),
        }
    }

    /// Override the id reported as `$$.StateMachine.Id`.
    pub fn with_state_machine_id(mut self, id: impl Into<String>) -> Self {
        self.state_machine_id = id.into();
        self
    }

    pub fn definition(&self) -> &StateMachine {
        &self.definition
    }

    pub fn state_machine_id(&self) -> &str {
        &self.state_machine_id
    }

    /// Run with a freshly generated (UUIDv7) execution id.
    pub async fn start(&self, input: Value) -> Result<ExecutionResult, StatesError> {
        let execution_id = Uuid::now_v7().to_string();
        self.execute_detailed(&execution_id, input).await
    }

    /// Run to completion and return the final output.
    pub async fn execute(&self, execution_id: &str, input: Value) -> Result<Value, StatesError> {
        Ok(self.execute_detailed(execution_id, input).await?.output)
    }

    /// Run to completion, also reporting the states that were entered.
    pub async fn execute_detailed(
        &self,
        execution_id: &str,
        input: Value,
    ) -> Result<ExecutionResult, StatesError> {
        let span = info_span!(
            "execution",
            execution_id,
            start_at = self.definition.start_at.as_str(),
            transitions = tracing::field::Empty,
        );
        self.run(execution_id, input).instrument(span).await
    }

    async fn run(&self, execution_id: &str, input: Value) -> Result<ExecutionResult, StatesError> {
        let ctx = ExecutionContext::new(execution_id, self.state_machine_id.as_str(), input.clone());
        let limit = self.config.max_transitions;

        tracing::info!(
            execution_id,
            start_at = self.definition.start_at.as_str(),
            "execution started"
        );

        let mut current = self.definition.start_at.clone();
        let mut status = RunStatus::Running;
        let mut document = input;
        let mut transitions: Vec<String> = Vec::new();

        while status == RunStatus::Running {
            if transitions.len() >= limit as usize {
                tracing::warn!(execution_id, limit, "transition limit exceeded");
                return Err(StatesError::TransitionLimitExceeded { limit });
            }

            let state = self
                .definition
                .state(&current)
                .ok_or_else(|| StatesError::UnknownState(current.clone()))?;
            transitions.push(current.clone());

            let span = info_span!("state", name = current.as_str(), kind = state.type_name());
            let stepped = self
                .step(&current, state, &ctx, document)
                .instrument(span)
                .await;
            let (output, next) = match stepped {
                Ok(stepped) => stepped,
                Err(e) => {
                    tracing::warn!(
                        execution_id,
                        state = current.as_str(),
                        error = e.error_name(),
                        "execution failed: {e}"
                    );
                    return Err(e);
                }
            };
            document = output;

            match next {
                Some(next) => current = next,
                None => status = RunStatus::Terminated,
            }
        }

        tracing::Span::current().record("transitions", transitions.len());
        tracing::info!(
            execution_id,
            transitions = transitions.len(),
            "execution finished"
        );

        Ok(ExecutionResult {
            execution_id: execution_id.to_string(),
            output: document,
            transitions,
            status,
        })
    }

    /// Run one state. Returns its output and the next state, if any.
    async fn step(
        &self,
        name: &str,
        state: &State,
        ctx: &ExecutionContext,
        raw_input: Value,
    ) -> Result<(Value, Option<String>), StatesError> {
        let context = ctx.for_state(name);
        tracing::debug!(state = name, kind = state.type_name(), "entering state");

        let selected = path::select(&raw_input, state.input_path(), &context)?;
        let effective = match state.parameters() {
            Some(template) => evaluate_template(template, &selected, &context)?,
            None => selected,
        };

        let outcome = match state {
            State::Task(task) => self.run_task(name, task, effective, &raw_input).await?,
            State::Pass(pass) => StepOutcome::Result {
                value: pass.result.clone().unwrap_or(effective),
                next: pass.next.clone(),
            },
            State::Wait(wait) => {
                self.wait(name, wait, &effective, &context).await?;
                StepOutcome::Result {
                    value: effective,
                    next: wait.next.clone(),
                }
            }
            State::Choice(choice) => {
                let next = choose(name, choice, &effective, &context)?;
                StepOutcome::Result {
                    value: effective,
                    next: Some(next),
                }
            }
            State::Succeed(_) => StepOutcome::Result {
                value: effective,
                next: None,
            },
            State::Map(map) => {
                tracing::debug!(state = name, "Map items are not executed; passing input through");
                StepOutcome::Result {
                    value: effective,
                    next: map.next.clone(),
                }
            }
            State::Parallel(parallel) => {
                tracing::debug!(
                    state = name,
                    branches = parallel.branches.len(),
                    "Parallel branches are not executed; passing input through"
                );
                StepOutcome::Result {
                    value: effective,
                    next: parallel.next.clone(),
                }
            }
            State::Fail(fail) => {
                return Err(StatesError::Failed {
                    error: fail.error.clone().unwrap_or_else(|| ERROR_FAILED.to_string()),
                    cause: fail.cause.clone().unwrap_or_default(),
                });
            }
        };

        match outcome {
            StepOutcome::Diverted { output, next } => Ok((output, Some(next))),
            StepOutcome::Result { value, next } => {
                let value = match state.result_selector() {
                    Some(selector) => evaluate_template(selector, &value, &context)?,
                    None => value,
                };
                let spliced = path::splice(&raw_input, state.result_path(), value)?;
                let output = path::select(&spliced, state.output_path(), &context)?;
                Ok((output, next))
            }
        }
    }

    async fn run_task(
        &self,
        name: &str,
        task: &TaskState,
        effective: Value,
        raw_input: &Value,
    ) -> Result<StepOutcome, StatesError> {
        if task.timeout_seconds.is_some()
            || task.timeout_seconds_path.is_some()
            || task.heartbeat_seconds.is_some()
            || task.heartbeat_seconds_path.is_some()
        {
            tracing::debug!(state = name, "task timeouts and heartbeats are not enforced");
        }

        let resolver = self
            .resolvers
            .get(&task.resource)
            .or_else(|| self.resolvers.get(name));

        let Some(resolver) = resolver else {
            return match self.config.unresolved_task {
                UnresolvedTaskPolicy::PassThrough => {
                    tracing::warn!(
                        state = name,
                        resource = task.resource.as_str(),
                        "no resolver registered; passing input through"
                    );
                    Ok(StepOutcome::Result {
                        value: effective,
                        next: task.next.clone(),
                    })
                }
                UnresolvedTaskPolicy::Fail => Err(StatesError::TaskFailure {
                    state: name.to_string(),
                    error: ERROR_NO_RESOLVER.to_string(),
                    cause: format!("no resolver registered for resource '{}'", task.resource),
                }),
            };
        };

        let handler = RetryHandler::new(
            name,
            &task.retry,
            &task.catch,
            &self.config.retry,
            self.config.time_scale,
        );
        let mut attempt = 0u32;
        let outcome = handler
            .run_with_policy(|| {
                attempt += 1;
                let span = info_span!("task", resource = task.resource.as_str(), attempt);
                resolver.invoke_boxed(effective.clone()).instrument(span)
            })
            .await;

        match outcome {
            Ok(TaskOutcome::Completed { value, attempts }) => {
                tracing::debug!(state = name, attempts, "task completed");
                Ok(StepOutcome::Result {
                    value,
                    next: task.next.clone(),
                })
            }
            Ok(TaskOutcome::Caught {
                error,
                catcher_index,
            }) => {
                let catcher = &task.catch[catcher_index];
                let output = path::splice(raw_input, &catcher.result_path, error.to_value())?;
                Ok(StepOutcome::Diverted {
                    output,
                    next: catcher.next.clone(),
                })
            }
            Err(TaskError { error, cause }) => Err(StatesError::TaskFailure {
                state: name.to_string(),
                error,
                cause,
            }),
        }
    }

    async fn wait(
        &self,
        name: &str,
        wait: &WaitState,
        effective: &Value,
        context: &Value,
    ) -> Result<(), StatesError> {
        let seconds = wait_seconds(name, wait, effective, context)?;
        let delay = scaled_delay(seconds, self.config.time_scale);
        tracing::debug!(state = name, seconds, delay_ms = delay.as_millis() as u64, "waiting");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Target of the first matching rule, else `Default`.
fn choose(name: &str, choice: &ChoiceState, input: &Value, context: &Value) -> Result<String, StatesError> {
    for rule in &choice.choices {
        if evaluate_rule(rule, input, context)? {
            if let Some(next) = &rule.next {
                return Ok(next.clone());
            }
        }
    }
    choice.default.clone().ok_or_else(|| StatesError::NoChoiceMatched {
        state: name.to_string(),
    })
}

/// Unscaled wait in seconds. Timestamps in the past wait zero.
fn wait_seconds(name: &str, wait: &WaitState, input: &Value, context: &Value) -> Result<f64, StatesError> {
    if let Some(seconds) = wait.seconds {
        return Ok(seconds as f64);
    }
    if let Some(expr) = &wait.seconds_path {
        let value = path::resolve(input, expr, context)?;
        return value
            .as_f64()
            .filter(|s| s.is_finite() && *s >= 0.0)
            .ok_or_else(|| {
                StatesError::InvalidPath(format!(
                    "{expr} must resolve to a non-negative number, got {value}"
                ))
            });
    }
    if let Some(timestamp) = &wait.timestamp {
        let until = parse_timestamp(timestamp).ok_or_else(|| {
            StatesError::DefinitionError(format!(
                "Wait state '{name}' has an invalid Timestamp '{timestamp}'"
            ))
        })?;
        return Ok(seconds_until(until));
    }
    if let Some(expr) = &wait.timestamp_path {
        let value = path::resolve(input, expr, context)?;
        let until = value.as_str().and_then(parse_timestamp).ok_or_else(|| {
            StatesError::InvalidPath(format!("{expr} must resolve to a timestamp, got {value}"))
        })?;
        return Ok(seconds_until(until));
    }
    Err(StatesError::DefinitionError(format!(
        "Wait state '{name}' declares no duration"
    )))
}

fn seconds_until(until: chrono::DateTime<Utc>) -> f64 {
    (until - Utc::now())
        .to_std()
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
