//! Choice rule types.
//!
//! A choice rule is a recursive boolean expression: `And`/`Or` lists, a
//! single `Not`, or a leaf comparison `{ "Variable": <path>, <Operator>:
//! <operand> }`. Rules are parsed from JSON into this typed tree when the
//! definition is loaded, so unknown operator keys are rejected up front.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::StatesError;

// ---------------------------------------------------------------------------
// Rule tree
// ---------------------------------------------------------------------------

/// One node of a choice rule. Only top-level rules of a Choice state carry
/// `next`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub struct ChoiceRule {
    pub expr: RuleExpr,
    pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleExpr {
    And(Vec<ChoiceRule>),
    Or(Vec<ChoiceRule>),
    Not(Box<ChoiceRule>),
    Comparison(Comparison),
}

/// A leaf comparison against the value found at `variable`.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub variable: String,
    pub operator: ComparisonOperator,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonOperator {
    /// `String*`, `Numeric*`, `Boolean*` and `Timestamp*` comparisons.
    Compare {
        kind: CompareKind,
        op: CompareOp,
        operand: Operand,
    },
    /// Glob match where `*` stands for one or more characters.
    StringMatches(GlobPattern),
    /// `Is*` tests. `expected` is the boolean operand.
    TypeTest { test: TypeTest, expected: bool },
}

/// A compiled `StringMatches` pattern.
///
/// `*` matches one or more characters and `\*` a literal `*`; every other
/// character is literal. The match is anchored at both ends.
#[derive(Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(source: &str) -> Result<Self, StatesError> {
        let invalid = |reason: String| {
            StatesError::DefinitionError(format!("StringMatches pattern '{source}': {reason}"))
        };

        let mut re = String::from("(?s)^");
        let mut literal = String::new();
        let mut chars = source.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(escaped) => literal.push(escaped),
                    None => return Err(invalid("dangling escape".to_string())),
                },
                '*' => {
                    re.push_str(&regex::escape(&literal));
                    literal.clear();
                    re.push_str(".+");
                }
                other => literal.push(other),
            }
        }
        re.push_str(&regex::escape(&literal));
        re.push('$');

        let regex = Regex::new(&re).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.regex.is_match(s)
    }
}

impl PartialEq for GlobPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Debug for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobPattern").field(&self.source).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareKind {
    String,
    Numeric,
    Boolean,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Equals,
    LessThan,
    GreaterThan,
    LessThanEquals,
    GreaterThanEquals,
}

/// Right-hand side of a comparison: a literal, or a path for `*Path` keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Path(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTest {
    IsNull,
    IsPresent,
    IsNumeric,
    IsString,
    IsBoolean,
    IsTimestamp,
}

// ---------------------------------------------------------------------------
// Operator names
// ---------------------------------------------------------------------------

impl CompareKind {
    fn prefix(self) -> &'static str {
        match self {
            CompareKind::String => "String",
            CompareKind::Numeric => "Numeric",
            CompareKind::Boolean => "Boolean",
            CompareKind::Timestamp => "Timestamp",
        }
    }
}

impl CompareOp {
    fn suffix(self) -> &'static str {
        match self {
            CompareOp::Equals => "Equals",
            CompareOp::LessThan => "LessThan",
            CompareOp::GreaterThan => "GreaterThan",
            CompareOp::LessThanEquals => "LessThanEquals",
            CompareOp::GreaterThanEquals => "GreaterThanEquals",
        }
    }

    fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "Equals" => Some(CompareOp::Equals),
            "LessThan" => Some(CompareOp::LessThan),
            "GreaterThan" => Some(CompareOp::GreaterThan),
            "LessThanEquals" => Some(CompareOp::LessThanEquals),
            "GreaterThanEquals" => Some(CompareOp::GreaterThanEquals),
            _ => None,
        }
    }
}

impl TypeTest {
    pub fn name(self) -> &'static str {
        match self {
            TypeTest::IsNull => "IsNull",
            TypeTest::IsPresent => "IsPresent",
            TypeTest::IsNumeric => "IsNumeric",
            TypeTest::IsString => "IsString",
            TypeTest::IsBoolean => "IsBoolean",
            TypeTest::IsTimestamp => "IsTimestamp",
        }
    }

    fn from_name(s: &str) -> Option<Self> {
        match s {
            "IsNull" => Some(TypeTest::IsNull),
            "IsPresent" => Some(TypeTest::IsPresent),
            "IsNumeric" => Some(TypeTest::IsNumeric),
            "IsString" => Some(TypeTest::IsString),
            "IsBoolean" => Some(TypeTest::IsBoolean),
            "IsTimestamp" => Some(TypeTest::IsTimestamp),
            _ => None,
        }
    }
}

impl ComparisonOperator {
    /// The JSON key this operator is written under, e.g. `NumericLessThanPath`.
    pub fn key(&self) -> String {
        match self {
            ComparisonOperator::Compare { kind, op, operand } => {
                let path = if matches!(operand, Operand::Path(_)) { "Path" } else { "" };
                format!("{}{}{}", kind.prefix(), op.suffix(), path)
            }
            ComparisonOperator::StringMatches(_) => "StringMatches".to_string(),
            ComparisonOperator::TypeTest { test, .. } => test.name().to_string(),
        }
    }

    fn operand_value(&self) -> Value {
        match self {
            ComparisonOperator::Compare { operand, .. } => match operand {
                Operand::Literal(v) => v.clone(),
                Operand::Path(p) => Value::String(p.clone()),
            },
            ComparisonOperator::StringMatches(p) => Value::String(p.as_str().to_string()),
            ComparisonOperator::TypeTest { expected, .. } => Value::Bool(*expected),
        }
    }

    /// Parse an operator key and its JSON operand.
    pub fn parse(key: &str, operand: &Value) -> Result<Self, StatesError> {
        if let Some(test) = TypeTest::from_name(key) {
            let expected = operand.as_bool().ok_or_else(|| {
                StatesError::DefinitionError(format!("{key} expects a boolean operand"))
            })?;
            return Ok(ComparisonOperator::TypeTest { test, expected });
        }

        if key == "StringMatches" {
            let pattern = operand.as_str().ok_or_else(|| {
                StatesError::DefinitionError("StringMatches expects a string operand".to_string())
            })?;
            return Ok(ComparisonOperator::StringMatches(GlobPattern::new(pattern)?));
        }

        let (kind, rest) = [
            CompareKind::String,
            CompareKind::Numeric,
            CompareKind::Boolean,
            CompareKind::Timestamp,
        ]
        .into_iter()
        .find_map(|kind| key.strip_prefix(kind.prefix()).map(|rest| (kind, rest)))
        .ok_or_else(|| StatesError::UnsupportedOperator(key.to_string()))?;

        let (op_name, is_path) = match rest.strip_suffix("Path") {
            Some(op_name) => (op_name, true),
            None => (rest, false),
        };
        let op = CompareOp::from_suffix(op_name)
            .ok_or_else(|| StatesError::UnsupportedOperator(key.to_string()))?;
        if kind == CompareKind::Boolean && op != CompareOp::Equals {
            return Err(StatesError::UnsupportedOperator(key.to_string()));
        }

        let operand = if is_path {
            let path = operand.as_str().ok_or_else(|| {
                StatesError::DefinitionError(format!("{key} expects a path string operand"))
            })?;
            Operand::Path(path.to_string())
        } else {
            let well_typed = match kind {
                CompareKind::String | CompareKind::Timestamp => operand.is_string(),
                CompareKind::Numeric => operand.is_number(),
                CompareKind::Boolean => operand.is_boolean(),
            };
            if !well_typed {
                return Err(StatesError::DefinitionError(format!(
                    "{key} has an operand of the wrong type: {operand}"
                )));
            }
            Operand::Literal(operand.clone())
        };

        Ok(ComparisonOperator::Compare { kind, op, operand })
    }
}

// ---------------------------------------------------------------------------
// JSON conversion
// ---------------------------------------------------------------------------

const RESERVED_KEYS: [&str; 3] = ["Variable", "Next", "Comment"];

impl TryFrom<Value> for ChoiceRule {
    type Error = StatesError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        ChoiceRule::from_value(&value)
    }
}

impl ChoiceRule {
    /// Parse a rule object. Unknown comparison keys fail with
    /// [`StatesError::UnsupportedOperator`].
    pub fn from_value(value: &Value) -> Result<Self, StatesError> {
        let obj = value.as_object().ok_or_else(|| {
            StatesError::DefinitionError(format!("choice rule must be an object, got {value}"))
        })?;

        let next = match obj.get("Next") {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(StatesError::DefinitionError(format!(
                    "choice rule Next must be a string, got {other}"
                )));
            }
        };

        let expr = if let Some(list) = obj.get("And") {
            RuleExpr::And(Self::parse_list("And", list)?)
        } else if let Some(list) = obj.get("Or") {
            RuleExpr::Or(Self::parse_list("Or", list)?)
        } else if let Some(inner) = obj.get("Not") {
            RuleExpr::Not(Box::new(ChoiceRule::from_value(inner)?))
        } else {
            RuleExpr::Comparison(Self::parse_comparison(obj)?)
        };

        Ok(ChoiceRule { expr, next })
    }

    fn parse_list(name: &str, list: &Value) -> Result<Vec<ChoiceRule>, StatesError> {
        let items = list.as_array().ok_or_else(|| {
            StatesError::DefinitionError(format!("{name} expects a list of rules"))
        })?;
        if items.is_empty() {
            return Err(StatesError::DefinitionError(format!(
                "{name} must contain at least one rule"
            )));
        }
        items.iter().map(ChoiceRule::from_value).collect()
    }

    fn parse_comparison(obj: &Map<String, Value>) -> Result<Comparison, StatesError> {
        let mut operators = obj
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()));

        let (key, operand) = operators.next().ok_or_else(|| {
            StatesError::DefinitionError("choice rule has no comparison operator".to_string())
        })?;
        if let Some((extra, _)) = operators.next() {
            return Err(StatesError::DefinitionError(format!(
                "choice rule has more than one operator: '{key}' and '{extra}'"
            )));
        }

        let operator = ComparisonOperator::parse(key, operand)?;

        let variable = obj
            .get("Variable")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                StatesError::DefinitionError(format!("{key} comparison requires a Variable path"))
            })?;

        Ok(Comparison {
            variable: variable.to_string(),
            operator,
        })
    }

    /// Render the rule back to its JSON form.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        match &self.expr {
            RuleExpr::And(rules) => {
                obj.insert("And".into(), rules.iter().map(ChoiceRule::to_value).collect());
            }
            RuleExpr::Or(rules) => {
                obj.insert("Or".into(), rules.iter().map(ChoiceRule::to_value).collect());
            }
            RuleExpr::Not(rule) => {
                obj.insert("Not".into(), rule.to_value());
            }
            RuleExpr::Comparison(cmp) => {
                obj.insert("Variable".into(), Value::String(cmp.variable.clone()));
                obj.insert(cmp.operator.key(), cmp.operator.operand_value());
            }
        }
        if let Some(next) = &self.next {
            obj.insert("Next".into(), Value::String(next.clone()));
        }
        Value::Object(obj)
    }

    /// Visit this rule and every nested rule, depth first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a ChoiceRule, usize)) {
        self.walk_at(0, visit);
    }

    fn walk_at<'a>(&'a self, depth: usize, visit: &mut impl FnMut(&'a ChoiceRule, usize)) {
        visit(self, depth);
        match &self.expr {
            RuleExpr::And(rules) | RuleExpr::Or(rules) => {
                for rule in rules {
                    rule.walk_at(depth + 1, visit);
                }
            }
            RuleExpr::Not(rule) => rule.walk_at(depth + 1, visit),
            RuleExpr::Comparison(_) => {}
        }
    }
}

impl Serialize for ChoiceRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
