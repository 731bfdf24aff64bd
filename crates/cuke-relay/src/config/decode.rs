//! Decoding of untyped configuration values, with failures drawn as a tree
//! of the offending properties.

use std::fmt;

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Tree {
    value: String,
    forest: Vec<Tree>,
}

/// Every failure found while decoding one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    forest: Vec<Tree>,
}

impl DecodeError {
    pub(super) fn expected(actual: &Value, expected: &str) -> Self {
        let actual = serde_json::to_string(actual).unwrap_or_else(|_| actual.to_string());
        Self {
            forest: vec![Tree {
                value: format!("cannot decode {actual}, should be {expected}"),
                forest: Vec::new(),
            }],
        }
    }

    fn under(self, label: String) -> Tree {
        Tree {
            value: label,
            forest: self.forest,
        }
    }
}

fn draw_forest(out: &mut String, indentation: &str, forest: &[Tree]) {
    for (index, tree) in forest.iter().enumerate() {
        let last = index + 1 == forest.len();
        out.push('\n');
        out.push_str(indentation);
        out.push_str(if last { "└─ " } else { "├─ " });
        out.push_str(&tree.value);
        let nested = if forest.len() > 1 && !last { "│  " } else { "   " };
        draw_forest(out, &format!("{indentation}{nested}"), &tree.forest);
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let drawn: Vec<String> = self
            .forest
            .iter()
            .map(|tree| {
                let mut out = tree.value.clone();
                draw_forest(&mut out, "", &tree.forest);
                out
            })
            .collect();
        f.write_str(&drawn.join("\n"))
    }
}

impl std::error::Error for DecodeError {}

/// An object whose properties are all optional. Failures are collected so
/// that every bad property is reported at once.
pub(super) struct Partial<'a> {
    map: &'a Map<String, Value>,
    errors: Vec<Tree>,
}

impl<'a> Partial<'a> {
    pub(super) fn new(value: &'a Value) -> Result<Self, DecodeError> {
        match value {
            Value::Object(map) => Ok(Self {
                map,
                errors: Vec::new(),
            }),
            other => Err(DecodeError::expected(other, "Record<string, unknown>")),
        }
    }

    pub(super) fn field<T, F>(&mut self, name: &str, decode: F) -> Option<T>
    where
        F: FnOnce(&Value) -> Result<T, DecodeError>,
    {
        let value = self.map.get(name)?;
        match decode(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                self.errors
                    .push(err.under(format!("optional property \"{name}\"")));
                None
            }
        }
    }

    pub(super) fn finish<T>(self, decoded: T) -> Result<T, DecodeError> {
        if self.errors.is_empty() {
            Ok(decoded)
        } else {
            Err(DecodeError {
                forest: self.errors,
            })
        }
    }
}

pub(super) fn boolean(value: &Value) -> Result<bool, DecodeError> {
    value
        .as_bool()
        .ok_or_else(|| DecodeError::expected(value, "boolean"))
}

pub(super) fn string(value: &Value) -> Result<String, DecodeError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| DecodeError::expected(value, "string"))
}

/// A single pattern or a list of them.
pub(super) fn patterns(value: &Value) -> Result<Vec<String>, DecodeError> {
    match value {
        Value::String(pattern) => Ok(vec![pattern.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| DecodeError::expected(value, "string | Array<string>")),
        other => Err(DecodeError::expected(other, "string | Array<string>")),
    }
}

/// `""` is unset, `"0"` and `"false"` are false, any other string is true.
pub fn stringish_to_boolean(value: &str) -> Option<bool> {
    match value {
        "" => None,
        "0" | "false" => Some(false),
        _ => Some(true),
    }
}

/// A boolean, or a string read with [`stringish_to_boolean`].
pub(super) fn stringish(value: &Value) -> Result<Option<bool>, DecodeError> {
    match value {
        Value::Bool(flag) => Ok(Some(*flag)),
        Value::String(text) => Ok(stringish_to_boolean(text)),
        other => Err(DecodeError::expected(other, "string")),
    }
}
