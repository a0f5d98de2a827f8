//! Choice rule evaluation.
//!
//! Comparisons resolve their `Variable` through the path engine on every
//! call. Operand type mismatches evaluate to `false` rather than failing;
//! unresolvable paths fail with `InvalidPath`, except under `IsPresent`.

use std::cmp::Ordering;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;
use statelang_types::choice::{
    ChoiceRule, CompareKind, CompareOp, Comparison, ComparisonOperator, Operand, RuleExpr, TypeTest,
};
use statelang_types::error::StatesError;

use super::path;

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(-?(?:[1-9][0-9]*)?[0-9]{4})-(1[0-2]|0[1-9])-(3[01]|0[1-9]|[12][0-9])T(2[0-3]|[01][0-9]):([0-5][0-9]):([0-5][0-9])(\.[0-9]+)?(Z)?$",
    )
    .expect("timestamp regex is valid")
});

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Evaluate a rule tree. `And` / `Or` evaluate every branch before folding,
/// so an error anywhere in the tree is reported.
pub fn evaluate_rule(rule: &ChoiceRule, input: &Value, context: &Value) -> Result<bool, StatesError> {
    match &rule.expr {
        RuleExpr::And(rules) => {
            let results = evaluate_all(rules, input, context)?;
            Ok(results.into_iter().all(|b| b))
        }
        RuleExpr::Or(rules) => {
            let results = evaluate_all(rules, input, context)?;
            Ok(results.into_iter().any(|b| b))
        }
        RuleExpr::Not(inner) => Ok(!evaluate_rule(inner, input, context)?),
        RuleExpr::Comparison(cmp) => evaluate_comparison(cmp, input, context),
    }
}

fn evaluate_all(rules: &[ChoiceRule], input: &Value, context: &Value) -> Result<Vec<bool>, StatesError> {
    rules
        .iter()
        .map(|rule| evaluate_rule(rule, input, context))
        .collect()
}

// ---------------------------------------------------------------------------
// Comparisons
// ---------------------------------------------------------------------------

pub fn evaluate_comparison(cmp: &Comparison, input: &Value, context: &Value) -> Result<bool, StatesError> {
    if let ComparisonOperator::TypeTest {
        test: TypeTest::IsPresent,
        expected,
    } = cmp.operator
    {
        let present = path::resolve(input, &cmp.variable, context).is_ok();
        return Ok(present == expected);
    }

    let value = path::resolve(input, &cmp.variable, context)?;

    match &cmp.operator {
        ComparisonOperator::Compare { kind, op, operand } => {
            let rhs = match operand {
                Operand::Literal(literal) => literal.clone(),
                Operand::Path(expr) => path::resolve(input, expr, context)?,
            };
            Ok(compare(*kind, &value, &rhs).is_some_and(|ord| holds(*op, ord)))
        }
        ComparisonOperator::StringMatches(pattern) => match value.as_str() {
            Some(s) => Ok(pattern.is_match(s)),
            None => Ok(false),
        },
        ComparisonOperator::TypeTest { test, expected } => Ok(type_test(*test, &value) == *expected),
    }
}

/// Ordering of `lhs` relative to `rhs`, or `None` when either side is the
/// wrong type for `kind`.
fn compare(kind: CompareKind, lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match kind {
        CompareKind::String => Some(lhs.as_str()?.cmp(rhs.as_str()?)),
        CompareKind::Numeric => lhs.as_f64()?.partial_cmp(&rhs.as_f64()?),
        CompareKind::Boolean => {
            let (l, r) = (lhs.as_bool()?, rhs.as_bool()?);
            (l == r).then_some(Ordering::Equal).or(Some(Ordering::Less))
        }
        CompareKind::Timestamp => {
            let l = parse_timestamp(lhs.as_str()?)?;
            let r = parse_timestamp(rhs.as_str()?)?;
            Some(l.cmp(&r))
        }
    }
}

fn holds(op: CompareOp, ord: Ordering) -> bool {
    match op {
        CompareOp::Equals => ord == Ordering::Equal,
        CompareOp::LessThan => ord == Ordering::Less,
        CompareOp::GreaterThan => ord == Ordering::Greater,
        CompareOp::LessThanEquals => ord != Ordering::Greater,
        CompareOp::GreaterThanEquals => ord != Ordering::Less,
    }
}

/// RFC 3339 instant; a missing offset is read as UTC.
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn type_test(test: TypeTest, value: &Value) -> bool {
    match test {
        TypeTest::IsNull => value.is_null(),
        TypeTest::IsPresent => true,
        TypeTest::IsNumeric => value.is_number(),
        TypeTest::IsString => value.is_string(),
        TypeTest::IsBoolean => value.is_boolean(),
        TypeTest::IsTimestamp => value.as_str().is_some_and(is_timestamp),
    }
}

/// Strict `YYYY-MM-DDTHH:MM:SS[.fff][Z]` shape check.
pub fn is_timestamp(s: &str) -> bool {
    TIMESTAMP.is_match(s)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
