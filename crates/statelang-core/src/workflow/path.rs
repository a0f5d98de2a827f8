//! Path expressions over JSON documents.
//!
//! `$` addresses the state's document and `$$` the execution context.
//! After the root come dot-separated keys with optional bracket steps:
//! `$.orders[0].id`, `$.items[1:3]`, `$$.Execution.Id`, `$[2]`.

use std::borrow::Cow;

use serde_json::{Map, Value};
use statelang_types::definition::PathField;
use statelang_types::error::StatesError;

// ---------------------------------------------------------------------------
// Parsed form
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Root {
    Document,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(i64),
    Slice { start: Option<i64>, end: Option<i64> },
}

fn invalid(expr: &str, reason: &str) -> StatesError {
    StatesError::InvalidPath(format!("{expr} ({reason})"))
}

/// Whether `s` should be treated as a path expression rather than a literal.
pub fn is_path(s: &str) -> bool {
    s.starts_with('$')
}

fn parse(expr: &str) -> Result<(Root, Vec<Segment>), StatesError> {
    let (root, rest) = if let Some(rest) = expr.strip_prefix("$$") {
        (Root::Context, rest)
    } else if let Some(rest) = expr.strip_prefix('$') {
        (Root::Document, rest)
    } else {
        return Err(invalid(expr, "must start with '$' or '$$'"));
    };

    let mut segments = Vec::new();
    if rest.is_empty() {
        return Ok((root, segments));
    }

    let body = if let Some(body) = rest.strip_prefix('.') {
        body
    } else if rest.starts_with('[') {
        rest
    } else {
        return Err(invalid(expr, "expected '.' or '[' after the root"));
    };

    for piece in body.split('.') {
        parse_piece(piece, expr, &mut segments)?;
    }
    Ok((root, segments))
}

/// One dot-separated piece: `name`, `name[0]`, `name[1:2][0]`, or `[0]`.
fn parse_piece(piece: &str, expr: &str, out: &mut Vec<Segment>) -> Result<(), StatesError> {
    let (name, mut brackets) = match piece.find('[') {
        Some(i) => (&piece[..i], &piece[i..]),
        None => (piece, ""),
    };

    if name.is_empty() && brackets.is_empty() {
        return Err(invalid(expr, "empty segment"));
    }
    if name.contains(']') {
        return Err(invalid(expr, "unbalanced ']'"));
    }
    if !name.is_empty() {
        out.push(Segment::Key(name.to_string()));
    }

    while !brackets.is_empty() {
        let close = brackets
            .find(']')
            .ok_or_else(|| invalid(expr, "unclosed '['"))?;
        let inner = &brackets[1..close];
        let segment = parse_bracket(inner)
            .ok_or_else(|| invalid(expr, "bracket must hold an index or a slice"))?;
        out.push(segment);

        brackets = &brackets[close + 1..];
        if !brackets.is_empty() && !brackets.starts_with('[') {
            return Err(invalid(expr, "unexpected text after ']'"));
        }
    }
    Ok(())
}

fn parse_bracket(inner: &str) -> Option<Segment> {
    match inner.split_once(':') {
        Some((start, end)) => Some(Segment::Slice {
            start: parse_bound(start)?,
            end: parse_bound(end)?,
        }),
        None => inner.parse().ok().map(Segment::Index),
    }
}

fn parse_bound(s: &str) -> Option<Option<i64>> {
    if s.is_empty() {
        Some(None)
    } else {
        s.parse().ok().map(Some)
    }
}

/// Half-open `[start, end)` bounds of a slice over `len` items.
fn slice_bounds(len: usize, start: Option<i64>, end: Option<i64>) -> (usize, usize) {
    let len = len as i64;
    let start = start.unwrap_or(0).clamp(0, len);
    let end = end.unwrap_or(len).max(start).min(len);
    (start as usize, end as usize)
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Select the value addressed by `expr`.
///
/// Keys must exist, indices must be in range and non-negative, and slices
/// only apply to arrays. Anything else is `InvalidPath`.
pub fn resolve(document: &Value, expr: &str, context: &Value) -> Result<Value, StatesError> {
    let (root, segments) = parse(expr)?;
    let start = match root {
        Root::Document => document,
        Root::Context => context,
    };

    let mut current = Cow::Borrowed(start);
    for segment in &segments {
        current = match current {
            Cow::Borrowed(value) => step(value, segment, expr)?,
            Cow::Owned(value) => Cow::Owned(step(&value, segment, expr)?.into_owned()),
        };
    }
    Ok(current.into_owned())
}

fn step<'a>(current: &'a Value, segment: &Segment, expr: &str) -> Result<Cow<'a, Value>, StatesError> {
    match segment {
        Segment::Key(key) => current
            .as_object()
            .and_then(|map| map.get(key))
            .map(Cow::Borrowed)
            .ok_or_else(|| invalid(expr, &format!("no field '{key}'"))),
        Segment::Index(index) => {
            let items = current
                .as_array()
                .ok_or_else(|| invalid(expr, "index applied to a non-array"))?;
            usize::try_from(*index)
                .ok()
                .and_then(|i| items.get(i))
                .map(Cow::Borrowed)
                .ok_or_else(|| invalid(expr, &format!("index {index} out of range")))
        }
        Segment::Slice { start, end } => {
            let items = current
                .as_array()
                .ok_or_else(|| invalid(expr, "slice applied to a non-array"))?;
            let (start, end) = slice_bounds(items.len(), *start, *end);
            Ok(Cow::Owned(Value::Array(items[start..end].to_vec())))
        }
    }
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

/// Write `value` at `expr`, creating intermediate objects as needed.
///
/// `$` replaces the whole document. The context (`$$`) is never writable,
/// and slices cannot be assigned through.
pub fn assign(document: &mut Value, expr: &str, value: Value) -> Result<(), StatesError> {
    let (root, segments) = parse(expr)?;
    if root == Root::Context {
        return Err(invalid(expr, "the execution context is read-only"));
    }

    let Some((last, parents)) = segments.split_last() else {
        *document = value;
        return Ok(());
    };

    let mut current = document;
    for segment in parents {
        current = descend_mut(current, segment, expr)?;
    }

    match (last, current) {
        (Segment::Key(key), Value::Object(map)) => {
            map.insert(key.clone(), value);
            Ok(())
        }
        (Segment::Index(index), Value::Array(items)) => {
            let slot = usize::try_from(*index)
                .ok()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| invalid(expr, &format!("index {index} out of range")))?;
            *slot = value;
            Ok(())
        }
        (Segment::Slice { .. }, _) => Err(invalid(expr, "cannot assign to a slice")),
        _ => Err(invalid(expr, "cannot assign into a scalar")),
    }
}

fn descend_mut<'a>(
    current: &'a mut Value,
    segment: &Segment,
    expr: &str,
) -> Result<&'a mut Value, StatesError> {
    match (segment, current) {
        (Segment::Key(key), Value::Object(map)) => Ok(map
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()))),
        (Segment::Index(index), Value::Array(items)) => usize::try_from(*index)
            .ok()
            .and_then(|i| items.get_mut(i))
            .ok_or_else(|| invalid(expr, &format!("index {index} out of range"))),
        (Segment::Slice { .. }, _) => Err(invalid(expr, "cannot assign through a slice")),
        _ => Err(invalid(expr, "cannot traverse a scalar")),
    }
}

// ---------------------------------------------------------------------------
// State IO helpers
// ---------------------------------------------------------------------------

/// Apply an `InputPath` / `OutputPath`: absent keeps the document, `null`
/// yields `{}`.
pub fn select(document: &Value, path: &PathField, context: &Value) -> Result<Value, StatesError> {
    match path {
        PathField::Absent => Ok(document.clone()),
        PathField::Null => Ok(Value::Object(Map::new())),
        PathField::Path(expr) => resolve(document, expr, context),
    }
}

/// Apply a `ResultPath`: absent replaces the input with the result, `null`
/// discards the result, a path splices the result into a copy of the input.
pub fn splice(raw_input: &Value, result_path: &PathField, result: Value) -> Result<Value, StatesError> {
    match result_path {
        PathField::Absent => Ok(result),
        PathField::Null => Ok(raw_input.clone()),
        PathField::Path(expr) => {
            let mut output = raw_input.clone();
            assign(&mut output, expr, result)?;
            Ok(output)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
