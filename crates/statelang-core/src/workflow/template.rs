//! Payload templates for `Parameters` and `ResultSelector`.
//!
//! A key ending in `.$` marks a dynamic value: the suffix is dropped and the
//! string value is evaluated as a path or an intrinsic call. Plain keys are
//! copied, recursing into nested objects and arrays.

use serde_json::{Map, Value};
use statelang_types::error::StatesError;

use super::{intrinsic, path};

/// Evaluate `template` against `input`, reading `$$` from `context`.
pub fn evaluate_template(template: &Value, input: &Value, context: &Value) -> Result<Value, StatesError> {
    match template {
        Value::Object(fields) => {
            let mut out = Map::with_capacity(fields.len());
            for (key, value) in fields {
                match key.strip_suffix(".$") {
                    Some(name) => {
                        out.insert(name.to_string(), evaluate_dynamic(key, value, input, context)?);
                    }
                    None => {
                        out.insert(key.clone(), evaluate_template(value, input, context)?);
                    }
                }
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| evaluate_template(item, input, context))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::String(s) => evaluate_string(s, input, context),
        other => Ok(other.clone()),
    }
}

fn evaluate_string(s: &str, input: &Value, context: &Value) -> Result<Value, StatesError> {
    if path::is_path(s) {
        path::resolve(input, s, context)
    } else if intrinsic::is_intrinsic(s) {
        intrinsic::evaluate(input, s, context)
    } else {
        Ok(Value::String(s.to_string()))
    }
}

/// A `.$` field must hold a path or an intrinsic call.
fn evaluate_dynamic(key: &str, value: &Value, input: &Value, context: &Value) -> Result<Value, StatesError> {
    let Value::String(expr) = value else {
        return Err(StatesError::InvalidPath(format!(
            "field '{key}' must hold a path or intrinsic call, got {value}"
        )));
    };
    if path::is_path(expr) {
        path::resolve(input, expr, context)
    } else if expr.starts_with("States.") {
        intrinsic::evaluate(input, expr, context)
    } else {
        Err(StatesError::InvalidPath(format!(
            "field '{key}' must hold a path or intrinsic call, got '{expr}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({ "State": { "Name": "shape" } })
    }

    #[test]
    fn test_static_values_pass_through() {
        let template = json!({ "n": 1, "b": true, "z": null, "s": "plain", "nested": { "k": [1, "x"] } });
        assert_eq!(evaluate_template(&template, &json!({}), &ctx()).unwrap(), template);
    }

    #[test]
    fn test_dynamic_keys_drop_suffix() {
        let input = json!({ "user": { "id": 7, "name": "Ada" } });
        let template = json!({
            "id.$": "$.user.id",
            "greeting.$": "States.Format('Hi {}', $.user.name)",
            "state.$": "$$.State.Name"
        });
        assert_eq!(
            evaluate_template(&template, &input, &ctx()).unwrap(),
            json!({ "id": 7, "greeting": "Hi Ada", "state": "shape" })
        );
    }

    #[test]
    fn test_path_strings_resolve_without_suffix() {
        let input = json!({ "a": [1, 2, 3] });
        let template = json!({ "first": "$.a[0]", "list": ["$.a[1:]", "lit"] });
        assert_eq!(
            evaluate_template(&template, &input, &ctx()).unwrap(),
            json!({ "first": 1, "list": [[2, 3], "lit"] })
        );
    }

    #[test]
    fn test_nested_objects_are_walked() {
        let input = json!({ "v": "deep" });
        let template = json!({ "outer": { "inner.$": "$.v" } });
        assert_eq!(
            evaluate_template(&template, &input, &ctx()).unwrap(),
            json!({ "outer": { "inner": "deep" } })
        );
    }

    #[test]
    fn test_dynamic_key_with_literal_fails() {
        let input = json!({});
        assert!(evaluate_template(&json!({ "x.$": "literal" }), &input, &ctx()).is_err());
        assert!(evaluate_template(&json!({ "x.$": 5 }), &input, &ctx()).is_err());
    }

    #[test]
    fn test_errors_propagate() {
        let input = json!({});
        assert!(matches!(
            evaluate_template(&json!({ "x.$": "$.missing" }), &input, &ctx()),
            Err(StatesError::InvalidPath(_))
        ));
        assert!(matches!(
            evaluate_template(&json!({ "x.$": "States.Dormat('a')" }), &input, &ctx()),
            Err(StatesError::InvalidFunction(_))
        ));
    }
}
