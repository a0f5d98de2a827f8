//! Intrinsic functions: `States.Format`, `States.JsonToString`,
//! `States.StringToJson`, and `States.Array`.
//!
//! A call is recognised only when the whole string has the shape
//! `States.<Name>(<args>)` and `<Name>` is one of the four supported
//! functions. Arguments are paths, single-quoted strings, or JSON literals.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use statelang_types::error::StatesError;

use super::path;

static CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^States\.([a-zA-Z]+)\((.+)\)$").expect("intrinsic call regex is valid")
});

// ---------------------------------------------------------------------------
// Intrinsic
// ---------------------------------------------------------------------------

/// The supported intrinsic functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    Format,
    JsonToString,
    StringToJson,
    Array,
}

impl FromStr for Intrinsic {
    type Err = StatesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Format" => Ok(Intrinsic::Format),
            "JsonToString" => Ok(Intrinsic::JsonToString),
            "StringToJson" => Ok(Intrinsic::StringToJson),
            "Array" => Ok(Intrinsic::Array),
            other => Err(StatesError::InvalidFunction(format!(
                "unknown intrinsic 'States.{other}'"
            ))),
        }
    }
}

impl Intrinsic {
    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::Format => "Format",
            Intrinsic::JsonToString => "JsonToString",
            Intrinsic::StringToJson => "StringToJson",
            Intrinsic::Array => "Array",
        }
    }

    /// Apply the function to already-evaluated arguments.
    pub fn apply(self, args: Vec<Value>) -> Result<Value, StatesError> {
        match self {
            Intrinsic::Format => format(args),
            Intrinsic::JsonToString => {
                let value = single(self, args)?;
                Ok(Value::String(value.to_string()))
            }
            Intrinsic::StringToJson => match single(self, args)? {
                Value::String(s) => serde_json::from_str(&s).map_err(|e| {
                    StatesError::InvalidFunction(format!("States.StringToJson: {e}"))
                }),
                other => Err(StatesError::InvalidFunction(format!(
                    "States.StringToJson expects a string, got {other}"
                ))),
            },
            Intrinsic::Array => Ok(Value::Array(args)),
        }
    }
}

fn single(intrinsic: Intrinsic, args: Vec<Value>) -> Result<Value, StatesError> {
    let count = args.len();
    let mut iter = args.into_iter();
    match (iter.next(), count) {
        (Some(value), 1) => Ok(value),
        _ => Err(StatesError::InvalidFunction(format!(
            "States.{} takes exactly one argument, got {count}",
            intrinsic.name()
        ))),
    }
}

/// Fill each `{}` left to right. Surplus values are ignored and surplus
/// placeholders are kept.
fn format(args: Vec<Value>) -> Result<Value, StatesError> {
    let mut args = args.into_iter();
    let template = match args.next() {
        Some(Value::String(s)) => s,
        Some(other) => {
            return Err(StatesError::InvalidFunction(format!(
                "States.Format template must be a string, got {other}"
            )));
        }
        None => {
            return Err(StatesError::InvalidFunction(
                "States.Format requires a template".to_string(),
            ));
        }
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template.as_str();
    while let Some(pos) = rest.find("{}") {
        let Some(value) = args.next() else { break };
        out.push_str(&rest[..pos]);
        match value {
            Value::String(s) => out.push_str(&s),
            other => out.push_str(&other.to_string()),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    Ok(Value::String(out))
}

// ---------------------------------------------------------------------------
// Call parsing
// ---------------------------------------------------------------------------

/// Whether `s` is a call to a supported intrinsic.
pub fn is_intrinsic(s: &str) -> bool {
    CALL.captures(s)
        .is_some_and(|caps| caps[1].parse::<Intrinsic>().is_ok())
}

/// Evaluate an intrinsic call against `document` (for `$` arguments) and
/// `context` (for `$$` arguments).
pub fn evaluate(document: &Value, call: &str, context: &Value) -> Result<Value, StatesError> {
    let caps = CALL
        .captures(call)
        .ok_or_else(|| StatesError::InvalidFunction(format!("malformed call: {call}")))?;
    let intrinsic: Intrinsic = caps[1].parse()?;

    let args = split_args(&caps[2])?
        .into_iter()
        .map(|arg| evaluate_arg(document, arg, context))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::trace!(function = intrinsic.name(), args = args.len(), "evaluating intrinsic");
    intrinsic.apply(args)
}

/// Split on commas that are outside quotes and outside `{}` / `[]`.
fn split_args(raw: &str) -> Result<Vec<&str>, StatesError> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in raw.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    StatesError::InvalidFunction(format!("unbalanced '{c}' in arguments: {raw}"))
                })?;
            }
            ',' if depth == 0 => {
                parts.push(raw[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }

    if quote.is_some() || depth != 0 {
        return Err(StatesError::InvalidFunction(format!(
            "unterminated argument list: {raw}"
        )));
    }
    parts.push(raw[start..].trim());

    if parts.iter().any(|p| p.is_empty()) {
        return Err(StatesError::InvalidFunction(format!("empty argument in: {raw}")));
    }
    Ok(parts)
}

fn evaluate_arg(document: &Value, arg: &str, context: &Value) -> Result<Value, StatesError> {
    if path::is_path(arg) {
        return path::resolve(document, arg, context);
    }
    if let Some(inner) = arg
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return Ok(Value::String(unescape(inner)));
    }
    serde_json::from_str(arg)
        .map_err(|e| StatesError::InvalidFunction(format!("bad argument {arg}: {e}")))
}

/// Undo `\'` and `\\` escapes inside a single-quoted literal.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('\'' | '\\')) => out.push(next),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(doc: &Value, call: &str) -> Result<Value, StatesError> {
        evaluate(doc, call, &json!({ "Execution": { "Id": "e-1" } }))
    }

    // -----------------------------------------------------------------------
    // is_intrinsic
    // -----------------------------------------------------------------------

    #[test]
    fn test_is_intrinsic_allow_list() {
        assert!(is_intrinsic("States.Array('Foo', 2020, $.someJson, null)"));
        assert!(is_intrinsic("States.Format('Hello {}', 'World')"));
        assert!(is_intrinsic("States.StringToJson($.a)"));
        assert!(is_intrinsic("States.JsonToString($.a)"));
        assert!(!is_intrinsic("States.Dormat('Hello {}','World')"));
        assert!(!is_intrinsic("States.UUID(1)"));
    }

    #[test]
    fn test_is_intrinsic_shape() {
        assert!(!is_intrinsic("States.Format()"));
        assert!(!is_intrinsic("Format('x')"));
        assert!(!is_intrinsic("States.Format('x') "));
        assert!(!is_intrinsic("$.a"));
    }

    // -----------------------------------------------------------------------
    // evaluate
    // -----------------------------------------------------------------------

    #[test]
    fn test_format_with_paths() {
        let doc = json!({ "a": "Mr", "b": "Bloomberg" });
        assert_eq!(
            eval(&doc, "States.Format('Hello {} {}', $.a, $.b)").unwrap(),
            json!("Hello Mr Bloomberg")
        );
    }

    #[test]
    fn test_format_stringifies_non_strings() {
        let doc = json!({ "n": 3, "o": { "k": [1, 2] } });
        assert_eq!(
            eval(&doc, "States.Format('{} items: {}', $.n, $.o)").unwrap(),
            json!("3 items: {\"k\":[1,2]}")
        );
    }

    #[test]
    fn test_format_surplus_values_and_placeholders() {
        let doc = json!({});
        assert_eq!(
            eval(&doc, "States.Format('{}', 'a', 'b')").unwrap(),
            json!("a")
        );
        assert_eq!(
            eval(&doc, "States.Format('{} and {}', 'a')").unwrap(),
            json!("a and {}")
        );
    }

    #[test]
    fn test_format_does_not_rescan_substituted_text() {
        let doc = json!({});
        assert_eq!(
            eval(&doc, "States.Format('{}-{}', '{}', 'x')").unwrap(),
            json!("{}-x")
        );
    }

    #[test]
    fn test_format_requires_string_template() {
        assert!(matches!(
            eval(&json!({}), "States.Format(42, 'x')"),
            Err(StatesError::InvalidFunction(_))
        ));
    }

    #[test]
    fn test_quoted_commas_and_escapes() {
        let doc = json!({});
        assert_eq!(
            eval(&doc, r"States.Format('{}, {}', 'a,b', 'it\'s')").unwrap(),
            json!("a,b, it's")
        );
    }

    #[test]
    fn test_array_keeps_order_and_literals() {
        let doc = json!({ "someJson": { "x": 1 } });
        assert_eq!(
            eval(&doc, "States.Array('Foo', 2020, $.someJson, null, [1, 2], {\"k\": true})").unwrap(),
            json!(["Foo", 2020, { "x": 1 }, null, [1, 2], { "k": true }])
        );
    }

    #[test]
    fn test_json_to_string_and_back() {
        let doc = json!({ "a": { "b": [1, "two"] } });
        let text = eval(&doc, "States.JsonToString($.a)").unwrap();
        assert_eq!(text, json!("{\"b\":[1,\"two\"]}"));

        let doc = json!({ "s": text });
        assert_eq!(
            eval(&doc, "States.StringToJson($.s)").unwrap(),
            json!({ "b": [1, "two"] })
        );
    }

    #[test]
    fn test_string_to_json_rejects_bad_input() {
        let doc = json!({ "n": 1, "bad": "{not json" });
        assert!(eval(&doc, "States.StringToJson($.n)").is_err());
        assert!(eval(&doc, "States.StringToJson($.bad)").is_err());
    }

    #[test]
    fn test_arity_mismatch() {
        assert!(matches!(
            eval(&json!({}), "States.JsonToString(1, 2)"),
            Err(StatesError::InvalidFunction(_))
        ));
    }

    #[test]
    fn test_context_argument() {
        assert_eq!(
            eval(&json!({}), "States.Format('run {}', $$.Execution.Id)").unwrap(),
            json!("run e-1")
        );
    }

    #[test]
    fn test_invalid_calls() {
        let doc = json!({});
        assert!(matches!(
            eval(&doc, "States.Dormat('x')"),
            Err(StatesError::InvalidFunction(_))
        ));
        assert!(matches!(
            eval(&doc, "not a call"),
            Err(StatesError::InvalidFunction(_))
        ));
        assert!(matches!(
            eval(&doc, "States.Array(bare)"),
            Err(StatesError::InvalidFunction(_))
        ));
        assert!(matches!(
            eval(&doc, "States.Array('open)"),
            Err(StatesError::InvalidFunction(_))
        ));
        assert!(matches!(
            eval(&doc, "States.Array(1,,2)"),
            Err(StatesError::InvalidFunction(_))
        ));
    }

    #[test]
    fn test_missing_path_argument_is_invalid_path() {
        assert!(matches!(
            eval(&json!({}), "States.Array($.missing)"),
            Err(StatesError::InvalidPath(_))
        ));
    }
}
