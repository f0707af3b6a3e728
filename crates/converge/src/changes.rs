//! Change list computation - field-level diff of actual vs expected state
//!
//! Task values are compared through their serde representation, so the
//! fields a type serializes are exactly the fields that get compared.
//! Bookkeeping fields marked `#[serde(skip)]` never show up in a change list.

use crate::error::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use similar::{ChangeTag, TextDiff};

/// What kind of difference a field shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    /// The field is unset on the actual object
    Created,
    /// The field is set on both sides with different values
    Modified,
}

/// A single field-level difference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub field_name: String,
    /// Human-readable description; may span several lines
    pub description: String,
    pub kind: ChangeKind,
}

impl Change {
    pub fn is_multi_line(&self) -> bool {
        self.description.contains('\n')
    }
}

/// Build the ordered list of fields where `actual` differs from `expected`
///
/// Only fields set in `changes` are considered; a `changes` value with no set
/// field at all means every field of `expected` is a candidate.
pub fn build_change_list<T: Serialize>(
    actual: Option<&T>,
    expected: &T,
    changes: &T,
) -> Result<Vec<Change>> {
    let expected = to_fields(expected)?;
    let changes = to_fields(changes)?;
    let actual = match actual {
        Some(a) => to_fields(a)?,
        None => Map::new(),
    };

    let restrict = changes.values().any(is_set);
    let mut list = Vec::new();

    for (field, e) in &expected {
        if restrict && !changes.get(field).is_some_and(is_set) {
            continue;
        }

        let a = actual.get(field).unwrap_or(&Value::Null);
        if a == e {
            continue;
        }

        if !is_set(a) {
            list.push(Change {
                field_name: field.clone(),
                description: format!("<none> -> {}", value_as_string(e)),
                kind: ChangeKind::Created,
            });
            continue;
        }

        list.push(Change {
            field_name: field.clone(),
            description: describe(a, e),
            kind: ChangeKind::Modified,
        });
    }

    Ok(list)
}

/// Derive a `changes` value from actual and expected state
///
/// Fields equal on both sides take the value from `T::default()`; the rest
/// take the expected value. With no actual object, every field is a change.
pub fn build_changes<T>(actual: Option<&T>, expected: &T) -> Result<T>
where
    T: Serialize + DeserializeOwned + Default + Clone,
{
    let Some(actual) = actual else {
        return Ok(expected.clone());
    };

    let actual = to_fields(actual)?;
    let mut changes = to_fields(&T::default())?;
    for (field, e) in to_fields(expected)? {
        if actual.get(&field) != Some(&e) {
            changes.insert(field, e);
        }
    }

    serde_json::from_value(Value::Object(changes)).map_err(|source| Error::Serialize {
        task_type: type_name::<T>(),
        source,
    })
}

/// Whether a value counts as set (not null or empty)
pub(crate) fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

pub(crate) fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|source| Error::Serialize {
        task_type: type_name::<T>(),
        source,
    })
}

fn to_fields<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match to_value(value)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            Ok(map)
        }
    }
}

/// Short type name without the module path
pub(crate) fn type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

fn describe(a: &Value, e: &Value) -> String {
    match (a, e) {
        (Value::Object(a), Value::Object(e)) => {
            let mut lines = Vec::new();
            describe_nested("", a, e, &mut lines);
            lines.join("\n")
        }
        (Value::String(a), Value::String(e)) if a.contains('\n') || e.contains('\n') => {
            line_diff(a, e)
        }
        _ => format!("{} -> {}", value_as_string(a), value_as_string(e)),
    }
}

fn describe_nested(
    prefix: &str,
    a: &Map<String, Value>,
    e: &Map<String, Value>,
    lines: &mut Vec<String>,
) {
    let keys = e.keys().chain(a.keys().filter(|k| !e.contains_key(*k)));
    for key in keys {
        let av = a.get(key).unwrap_or(&Value::Null);
        let ev = e.get(key).unwrap_or(&Value::Null);
        if av == ev {
            continue;
        }
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match (av, ev) {
            (Value::Object(an), Value::Object(en)) => describe_nested(&path, an, en, lines),
            _ => lines.push(format!(
                "{path}: {} -> {}",
                value_as_string(av),
                value_as_string(ev)
            )),
        }
    }
}

fn line_diff(a: &str, e: &str) -> String {
    let diff = TextDiff::from_lines(a, e);
    let mut lines = Vec::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => '-',
            ChangeTag::Insert => '+',
            ChangeTag::Equal => ' ',
        };
        lines.push(format!("{sign} {}", change.value().trim_end_matches('\n')));
    }
    lines.join("\n")
}

/// Render a value for a one-line description
pub fn value_as_string(value: &Value) -> String {
    match value {
        Value::Null => "<nil>".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(value_as_string).collect::<Vec<_>>().join(", ")
        ),
        other => other.to_string(),
    }
}
