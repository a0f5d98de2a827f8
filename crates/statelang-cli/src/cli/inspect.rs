//! `statelang path` and `statelang eval`: evaluate one expression against
//! an input document, with a throwaway `$$` context.

use anyhow::{Result, anyhow};
use serde_json::Value;
use uuid::Uuid;

use statelang_core::workflow::context::ExecutionContext;
use statelang_core::workflow::{intrinsic, path};

use super::parse_json_arg;

/// State name reported as `$$.State.Name`.
const INSPECT_STATE: &str = "Inspect";

fn scratch_context(input: &Value) -> Value {
    let id = Uuid::now_v7().to_string();
    ExecutionContext::new(id.as_str(), id.as_str(), input.clone()).for_state(INSPECT_STATE)
}

/// Resolve `expr` against `input`.
pub fn eval_path(expr: &str, input: &Value) -> Result<Value> {
    let context = scratch_context(input);
    path::resolve(input, expr, &context).map_err(|e| anyhow!("{} ({})", e, e.error_name()))
}

/// Evaluate a `States.*` call against `input`.
pub fn eval_intrinsic(call: &str, input: &Value) -> Result<Value> {
    let context = scratch_context(input);
    intrinsic::evaluate(input, call, &context).map_err(|e| anyhow!("{} ({})", e, e.error_name()))
}

/// Print the result of a path or intrinsic evaluation.
pub fn print(expr: &str, raw_input: &str, intrinsic: bool, json: bool) -> Result<()> {
    let input = parse_json_arg("input", raw_input)?;
    let value = if intrinsic {
        eval_intrinsic(expr, &input)?
    } else {
        eval_path(expr, &input)?
    };

    if json {
        println!("{}", serde_json::to_string(&value)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_eval_path() {
        let input = json!({ "a": [1, 2, 3, 4] });
        assert_eq!(eval_path("$.a[1:3]", &input).unwrap(), json!([2, 3]));
        assert_eq!(eval_path("$$.State.Name", &input).unwrap(), json!("Inspect"));
        assert_eq!(eval_path("$$.Execution.Input.a[0]", &input).unwrap(), json!(1));

        let err = eval_path("$.missing", &input).unwrap_err();
        assert!(err.to_string().ends_with("(States.InvalidPath)"));
    }

    #[test]
    fn test_eval_intrinsic() {
        let input = json!({ "name": "Ada" });
        assert_eq!(
            eval_intrinsic("States.Format('hi {}', $.name)", &input).unwrap(),
            json!("hi Ada")
        );
        assert!(eval_intrinsic("States.Nope(1)", &input).is_err());
    }
}
