//! State machine definition parsing, validation, and file loading.
//!
//! Definitions are read as JSON or YAML into the typed `StateMachine` from
//! `statelang-types`, then checked for structural problems (dangling
//! transitions, missing `Next`/`End`, malformed retry policies) before the
//! executor ever sees them.

use std::path::Path;

use serde_json::Value;
use statelang_types::choice::ChoiceRule;
use statelang_types::definition::{CatchPolicy, RetryPolicy, State, StateMachine, WaitState};
use statelang_types::error::{ERROR_ALL, StatesError};

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a JSON definition and validate it.
pub fn parse_state_machine_json(json: &str) -> Result<StateMachine, StatesError> {
    let value: Value = serde_json::from_str(json).map_err(|e| StatesError::Parse(e.to_string()))?;
    from_value(value)
}

/// Parse a YAML definition and validate it.
pub fn parse_state_machine_yaml(yaml: &str) -> Result<StateMachine, StatesError> {
    let value: Value =
        serde_yaml_ng::from_str(yaml).map_err(|e| StatesError::Parse(e.to_string()))?;
    from_value(value)
}

/// Build a validated `StateMachine` from an already-parsed document.
pub fn from_value(value: Value) -> Result<StateMachine, StatesError> {
    // Choice rules are checked on the raw document first so an unknown
    // operator surfaces as `UnsupportedOperator` rather than a parse error.
    check_choice_rules(&value)?;
    let sm: StateMachine =
        serde_json::from_value(value).map_err(|e| StatesError::Parse(e.to_string()))?;
    validate(&sm)?;
    Ok(sm)
}

fn check_choice_rules(machine: &Value) -> Result<(), StatesError> {
    let Some(states) = machine.get("States").and_then(Value::as_object) else {
        return Ok(());
    };
    for state in states.values() {
        match state.get("Type").and_then(Value::as_str) {
            Some("Choice") => {
                let rules = state.get("Choices").and_then(Value::as_array);
                for rule in rules.into_iter().flatten() {
                    ChoiceRule::from_value(rule)?;
                }
            }
            Some("Parallel") => {
                let branches = state.get("Branches").and_then(Value::as_array);
                for branch in branches.into_iter().flatten() {
                    check_choice_rules(branch)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `StateMachine`.
///
/// Checks:
/// - `StartAt` and every `Next`, `Default`, and catcher `Next` name a state
/// - non-terminal states declare exactly one of `Next` / `End: true`
/// - Choice states declare neither, have at least one rule, and only their
///   top-level rules carry `Next`
/// - Retry entries have sane bounds; `States.ALL` stands alone and last
/// - Wait states declare exactly one duration field
/// - Parallel branches are valid machines in their own right
pub fn validate(sm: &StateMachine) -> Result<(), StatesError> {
    if sm.states.is_empty() {
        return Err(StatesError::DefinitionError(
            "state machine must define at least one state".to_string(),
        ));
    }
    if !sm.states.contains_key(&sm.start_at) {
        return Err(StatesError::UnknownState(sm.start_at.clone()));
    }

    // Sorted for deterministic error reporting.
    let mut names: Vec<&String> = sm.states.keys().collect();
    names.sort();
    for name in names {
        validate_state(sm, name, &sm.states[name])?;
    }
    Ok(())
}

fn check_target(sm: &StateMachine, target: &str) -> Result<(), StatesError> {
    if sm.states.contains_key(target) {
        Ok(())
    } else {
        Err(StatesError::UnknownState(target.to_string()))
    }
}

fn validate_state(sm: &StateMachine, name: &str, state: &State) -> Result<(), StatesError> {
    let (next, end) = state.transition_fields();

    match state {
        State::Choice(choice) => {
            if next.is_some() || end {
                return Err(StatesError::DefinitionError(format!(
                    "Choice state '{name}' must not declare Next or End"
                )));
            }
            if choice.choices.is_empty() {
                return Err(StatesError::DefinitionError(format!(
                    "Choice state '{name}' must have at least one rule"
                )));
            }
            for rule in &choice.choices {
                let target = rule.next.as_deref().ok_or_else(|| {
                    StatesError::DefinitionError(format!(
                        "every rule of Choice state '{name}' must declare Next"
                    ))
                })?;
                check_target(sm, target)?;

                let mut nested_next = false;
                rule.walk(&mut |inner, depth| nested_next |= depth > 0 && inner.next.is_some());
                if nested_next {
                    return Err(StatesError::DefinitionError(format!(
                        "nested rules of Choice state '{name}' must not declare Next"
                    )));
                }
            }
            if let Some(default) = &choice.default {
                check_target(sm, default)?;
            }
        }
        State::Succeed(_) | State::Fail(_) => {}
        _ => match (next, end) {
            (Some(target), false) => check_target(sm, target)?,
            (None, true) => {}
            (Some(_), true) => {
                return Err(StatesError::DefinitionError(format!(
                    "state '{name}' declares both Next and End"
                )));
            }
            (None, false) => {
                return Err(StatesError::DefinitionError(format!(
                    "state '{name}' must declare Next or End"
                )));
            }
        },
    }

    match state {
        State::Task(task) if task.resource.is_empty() => {
            return Err(StatesError::DefinitionError(format!(
                "Task state '{name}' has an empty Resource"
            )));
        }
        State::Wait(wait) => validate_wait(name, wait)?,
        State::Parallel(parallel) => {
            for branch in &parallel.branches {
                validate(branch)?;
            }
        }
        _ => {}
    }

    validate_retriers(name, state.retry())?;
    validate_catchers(sm, name, state.catch())
}

fn validate_wait(name: &str, wait: &WaitState) -> Result<(), StatesError> {
    let declared = [
        wait.seconds.is_some(),
        wait.seconds_path.is_some(),
        wait.timestamp.is_some(),
        wait.timestamp_path.is_some(),
    ]
    .into_iter()
    .filter(|set| *set)
    .count();

    if declared != 1 {
        return Err(StatesError::DefinitionError(format!(
            "Wait state '{name}' must declare exactly one of Seconds, SecondsPath, Timestamp, TimestampPath"
        )));
    }
    Ok(())
}

/// `States.ALL` must be the only name in its list and the list must be last.
fn check_error_lists<'a>(
    name: &str,
    field: &str,
    lists: impl ExactSizeIterator<Item = &'a [String]>,
) -> Result<(), StatesError> {
    let count = lists.len();
    for (index, errors) in lists.enumerate() {
        if errors.is_empty() {
            return Err(StatesError::DefinitionError(format!(
                "{field} entry {index} of state '{name}' has an empty ErrorEquals"
            )));
        }
        if errors.iter().any(|e| e == ERROR_ALL) && (errors.len() != 1 || index + 1 != count) {
            return Err(StatesError::DefinitionError(format!(
                "{ERROR_ALL} must appear alone in the last {field} entry of state '{name}'"
            )));
        }
    }
    Ok(())
}

fn validate_retriers(name: &str, retriers: &[RetryPolicy]) -> Result<(), StatesError> {
    check_error_lists(name, "Retry", retriers.iter().map(|r| r.error_equals.as_slice()))?;

    for policy in retriers {
        if policy.interval_seconds.is_some_and(|v| !(v >= 0.0)) {
            return Err(StatesError::DefinitionError(format!(
                "Retry IntervalSeconds of state '{name}' must be >= 0"
            )));
        }
        if policy.backoff_rate.is_some_and(|v| !(v >= 1.0)) {
            return Err(StatesError::DefinitionError(format!(
                "Retry BackoffRate of state '{name}' must be >= 1.0"
            )));
        }
        if policy.max_delay_seconds.is_some_and(|v| !(v > 0.0)) {
            return Err(StatesError::DefinitionError(format!(
                "Retry MaxDelaySeconds of state '{name}' must be > 0"
            )));
        }
    }
    Ok(())
}

fn validate_catchers(sm: &StateMachine, name: &str, catchers: &[CatchPolicy]) -> Result<(), StatesError> {
    check_error_lists(name, "Catch", catchers.iter().map(|c| c.error_equals.as_slice()))?;
    for catcher in catchers {
        check_target(sm, &catcher.next)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a definition from disk. `.yaml` / `.yml` files are read as YAML,
/// everything else as JSON.
pub fn load_state_machine_file(path: &Path) -> Result<StateMachine, StatesError> {
    let content = std::fs::read_to_string(path)?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    tracing::debug!(path = %path.display(), yaml = is_yaml, "loading state machine");
    if is_yaml {
        parse_state_machine_yaml(&content)
    } else {
        parse_state_machine_json(&content)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<StateMachine, StatesError> {
        parse_state_machine_json(&value.to_string())
    }

    fn definition_error(value: Value) -> String {
        match parse(value) {
            Err(StatesError::DefinitionError(msg)) => msg,
            other => panic!("expected DefinitionError, got {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    #[test]
    fn test_parse_json_and_yaml_agree() {
        let sm = parse(json!({
            "StartAt": "hello",
            "States": {
                "hello": { "Type": "Pass", "Result": "Hello World", "ResultPath": "$.msg", "Next": "bye" },
                "bye": { "Type": "Succeed" }
            }
        }))
        .unwrap();

        let yaml = r#"
StartAt: hello
States:
  hello:
    Type: Pass
    Result: Hello World
    ResultPath: $.msg
    Next: bye
  bye:
    Type: Succeed
"#;
        let from_yaml = parse_state_machine_yaml(yaml).unwrap();
        assert_eq!(sm.start_at, from_yaml.start_at);
        assert_eq!(sm.states.len(), from_yaml.states.len());
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(
            parse_state_machine_json("{ not json"),
            Err(StatesError::Parse(_))
        ));
        assert!(matches!(
            parse(json!({ "StartAt": "a", "States": { "a": { "Type": "Nope" } } })),
            Err(StatesError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_operator_is_unsupported() {
        let result = parse(json!({
            "StartAt": "c",
            "States": {
                "c": {
                    "Type": "Choice",
                    "Choices": [{ "Variable": "$.a", "StringContains": "x", "Next": "d" }]
                },
                "d": { "Type": "Succeed" }
            }
        }));
        assert!(matches!(result, Err(StatesError::UnsupportedOperator(_))));
    }

    #[test]
    fn test_bad_string_matches_pattern_fails_load() {
        let result = parse(json!({
            "StartAt": "c",
            "States": {
                "c": {
                    "Type": "Choice",
                    "Choices": [{
                        "Not": { "Variable": "$.f", "StringMatches": "log-*\\" },
                        "Next": "d"
                    }],
                    "Default": "d"
                },
                "d": { "Type": "Succeed" }
            }
        }));
        assert!(matches!(result, Err(StatesError::DefinitionError(ref m)) if m.contains("StringMatches")));
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    #[test]
    fn test_start_at_must_exist() {
        let result = parse(json!({ "StartAt": "missing", "States": { "a": { "Type": "Succeed" } } }));
        assert!(matches!(result, Err(StatesError::UnknownState(s)) if s == "missing"));
    }

    #[test]
    fn test_next_must_exist() {
        let result = parse(json!({
            "StartAt": "a",
            "States": { "a": { "Type": "Pass", "Next": "ghost" } }
        }));
        assert!(matches!(result, Err(StatesError::UnknownState(s)) if s == "ghost"));
    }

    #[test]
    fn test_next_xor_end() {
        let msg = definition_error(json!({
            "StartAt": "a",
            "States": { "a": { "Type": "Pass" } }
        }));
        assert!(msg.contains("must declare Next or End"), "got: {msg}");

        let msg = definition_error(json!({
            "StartAt": "a",
            "States": { "a": { "Type": "Pass", "Next": "a", "End": true } }
        }));
        assert!(msg.contains("both Next and End"), "got: {msg}");
    }

    #[test]
    fn test_choice_rules_structure() {
        let msg = definition_error(json!({
            "StartAt": "c",
            "States": {
                "c": { "Type": "Choice", "Choices": [{ "Variable": "$.a", "IsNull": true }] }
            }
        }));
        assert!(msg.contains("must declare Next"), "got: {msg}");

        let msg = definition_error(json!({
            "StartAt": "c",
            "States": {
                "c": {
                    "Type": "Choice",
                    "Choices": [{
                        "Not": { "Variable": "$.a", "IsNull": true, "Next": "d" },
                        "Next": "d"
                    }]
                },
                "d": { "Type": "Succeed" }
            }
        }));
        assert!(msg.contains("nested rules"), "got: {msg}");

        let msg = definition_error(json!({
            "StartAt": "c",
            "States": {
                "c": { "Type": "Choice", "Choices": [], "Default": "d" },
                "d": { "Type": "Succeed" }
            }
        }));
        assert!(msg.contains("at least one rule"), "got: {msg}");
    }

    #[test]
    fn test_choice_default_must_exist() {
        let result = parse(json!({
            "StartAt": "c",
            "States": {
                "c": {
                    "Type": "Choice",
                    "Choices": [{ "Variable": "$.a", "IsNull": true, "Next": "d" }],
                    "Default": "ghost"
                },
                "d": { "Type": "Succeed" }
            }
        }));
        assert!(matches!(result, Err(StatesError::UnknownState(s)) if s == "ghost"));
    }

    // -----------------------------------------------------------------------
    // Retry / Catch
    // -----------------------------------------------------------------------

    fn task_with(retry: Value, catch: Value) -> Value {
        json!({
            "StartAt": "t",
            "States": {
                "t": { "Type": "Task", "Resource": "r", "Retry": retry, "Catch": catch, "End": true },
                "handler": { "Type": "Succeed" }
            }
        })
    }

    #[test]
    fn test_retry_bounds() {
        let msg = definition_error(task_with(
            json!([{ "ErrorEquals": ["E"], "BackoffRate": 0.5 }]),
            json!([]),
        ));
        assert!(msg.contains("BackoffRate"), "got: {msg}");

        let msg = definition_error(task_with(
            json!([{ "ErrorEquals": ["E"], "IntervalSeconds": -1 }]),
            json!([]),
        ));
        assert!(msg.contains("IntervalSeconds"), "got: {msg}");

        let msg = definition_error(task_with(json!([{ "ErrorEquals": [] }]), json!([])));
        assert!(msg.contains("empty ErrorEquals"), "got: {msg}");
    }

    #[test]
    fn test_states_all_must_be_alone_and_last() {
        let msg = definition_error(task_with(
            json!([{ "ErrorEquals": ["States.ALL", "E"] }]),
            json!([]),
        ));
        assert!(msg.contains("States.ALL"), "got: {msg}");

        let msg = definition_error(task_with(
            json!([]),
            json!([
                { "ErrorEquals": ["States.ALL"], "Next": "handler" },
                { "ErrorEquals": ["E"], "Next": "handler" }
            ]),
        ));
        assert!(msg.contains("States.ALL"), "got: {msg}");

        assert!(parse(task_with(
            json!([{ "ErrorEquals": ["E"] }, { "ErrorEquals": ["States.ALL"] }]),
            json!([{ "ErrorEquals": ["States.ALL"], "Next": "handler" }]),
        ))
        .is_ok());
    }

    #[test]
    fn test_catch_next_must_exist() {
        let result = parse(task_with(
            json!([]),
            json!([{ "ErrorEquals": ["E"], "Next": "nowhere" }]),
        ));
        assert!(matches!(result, Err(StatesError::UnknownState(s)) if s == "nowhere"));
    }

    // -----------------------------------------------------------------------
    // Wait / Parallel
    // -----------------------------------------------------------------------

    #[test]
    fn test_wait_needs_exactly_one_duration() {
        let msg = definition_error(json!({
            "StartAt": "w",
            "States": { "w": { "Type": "Wait", "End": true } }
        }));
        assert!(msg.contains("exactly one"), "got: {msg}");

        let msg = definition_error(json!({
            "StartAt": "w",
            "States": { "w": { "Type": "Wait", "Seconds": 1, "SecondsPath": "$.s", "End": true } }
        }));
        assert!(msg.contains("exactly one"), "got: {msg}");
    }

    #[test]
    fn test_parallel_branches_are_validated() {
        let result = parse(json!({
            "StartAt": "p",
            "States": {
                "p": {
                    "Type": "Parallel",
                    "Branches": [{
                        "StartAt": "inner",
                        "States": { "inner": { "Type": "Pass", "Next": "elsewhere" } }
                    }],
                    "End": true
                }
            }
        }));
        assert!(matches!(result, Err(StatesError::UnknownState(s)) if s == "elsewhere"));
    }

    // -----------------------------------------------------------------------
    // Filesystem
    // -----------------------------------------------------------------------

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("machine.json");
        std::fs::write(
            &json_path,
            r#"{ "StartAt": "a", "States": { "a": { "Type": "Succeed" } } }"#,
        )
        .unwrap();
        assert_eq!(load_state_machine_file(&json_path).unwrap().start_at, "a");

        let yaml_path = dir.path().join("machine.yml");
        std::fs::write(&yaml_path, "StartAt: b\nStates:\n  b:\n    Type: Succeed\n").unwrap();
        assert_eq!(load_state_machine_file(&yaml_path).unwrap().start_at, "b");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_state_machine_file(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(StatesError::Io(_))));
    }
}
