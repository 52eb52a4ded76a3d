//! JSON serialization that keeps regular-expression and function literals.
//!
//! Plain JSON has no representation for `/\d+/g` or `function () {}`. Such
//! values are written as ordinary JSON strings carrying a marker prefix:
//!
//! - `@@RegExp@@/\d+/g`
//! - `@@Function@@function () { return 1 }`
//!
//! The output is valid JSON, so ordinary substructure survives any standard
//! parser unchanged. [`parse_with_extended_literals`] recognizes the markers
//! and restores the literal's source text. Literals are never evaluated.
//!
//! A plain string that already starts with a marker is written behind
//! `@@String@@`, so `"@@Function@@x"` goes out as `"@@String@@@@Function@@x"`
//! and comes back as the same string.
//!
//! # Invariants
//! - Object key order is preserved in both directions.
//! - Marker decoding only applies to string values, never to object keys.
//! - Every value survives stringify then parse unchanged.

use super::{Branch, Tree};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Number, Value};
use std::borrow::Cow;

pub const REGEXP_MARKER: &str = "@@RegExp@@";
pub const FUNCTION_MARKER: &str = "@@Function@@";
pub const STRING_MARKER: &str = "@@String@@";

const MARKERS: [&str; 3] = [REGEXP_MARKER, FUNCTION_MARKER, STRING_MARKER];

static REGEXP_LITERAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/(?:[^/\\\n]|\\.)+/[dgimsuvy]*$").expect("valid regexp literal regex"));

/// Returns whether `text` has the shape of a `/pattern/flags` literal.
pub fn is_regexp_literal(text: &str) -> bool {
    REGEXP_LITERAL_RE.is_match(text.trim())
}

/// Escapes a plain string that would otherwise decode as a literal.
fn escape_plain_string(value: &str) -> Cow<'_, str> {
    if MARKERS.iter().any(|marker| value.starts_with(marker)) {
        Cow::Owned(format!("{STRING_MARKER}{value}"))
    } else {
        Cow::Borrowed(value)
    }
}

/// JSON value model extended with opaque regexp and function literals.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtendedValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<ExtendedValue>),
    /// Ordered fields.
    Object(Vec<(String, ExtendedValue)>),
    /// Literal source text, e.g. `/^a+$/i`.
    RegExp(String),
    /// Function source text.
    Function(String),
}

impl ExtendedValue {
    /// Builds an object from ordered fields.
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, ExtendedValue)>) -> Self {
        Self::Object(
            fields
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    /// Sets `key` on an object, replacing an existing field in place.
    /// Has no effect on non-object values.
    pub fn insert(&mut self, key: impl Into<String>, value: ExtendedValue) {
        if let Self::Object(fields) = self {
            let key = key.into();
            match fields.iter_mut().find(|(existing, _)| *existing == key) {
                Some((_, slot)) => *slot = value,
                None => fields.push((key, value)),
            }
        }
    }

    /// Looks up an object field.
    pub fn get(&self, key: &str) -> Option<&ExtendedValue> {
        match self {
            Self::Object(fields) => fields
                .iter()
                .find(|(existing, _)| existing == key)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Lowers to plain JSON, encoding literals as marker strings.
    pub fn into_json(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(value) => Value::Bool(value),
            Self::Number(value) => Value::Number(value),
            Self::String(value) => Value::String(escape_plain_string(&value).into_owned()),
            Self::Array(items) => Value::Array(items.into_iter().map(Self::into_json).collect()),
            Self::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, value.into_json()))
                    .collect(),
            ),
            Self::RegExp(source) => Value::String(format!("{REGEXP_MARKER}{source}")),
            Self::Function(source) => Value::String(format!("{FUNCTION_MARKER}{source}")),
        }
    }

    fn decode_markers(value: Value) -> Self {
        match value {
            Value::String(text) => {
                if let Some(plain) = text.strip_prefix(STRING_MARKER) {
                    Self::String(plain.to_string())
                } else if let Some(source) = text.strip_prefix(REGEXP_MARKER) {
                    Self::RegExp(source.to_string())
                } else if let Some(source) = text.strip_prefix(FUNCTION_MARKER) {
                    Self::Function(source.to_string())
                } else {
                    Self::String(text)
                }
            }
            Value::Array(items) => Self::Array(items.into_iter().map(Self::decode_markers).collect()),
            Value::Object(fields) => Self::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, Self::decode_markers(value)))
                    .collect(),
            ),
            other => Self::from(other),
        }
    }
}

impl Serialize for ExtendedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Number(value) => value.serialize(serializer),
            Self::String(value) => serializer.serialize_str(&escape_plain_string(value)),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Self::RegExp(source) => serializer.serialize_str(&format!("{REGEXP_MARKER}{source}")),
            Self::Function(source) => {
                serializer.serialize_str(&format!("{FUNCTION_MARKER}{source}"))
            }
        }
    }
}

impl From<Value> for ExtendedValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(value) => Self::Bool(value),
            Value::Number(value) => Self::Number(value),
            Value::String(value) => Self::String(value),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(fields) => Self::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<i64> for ExtendedValue {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<u32> for ExtendedValue {
    fn from(value: u32) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<bool> for ExtendedValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ExtendedValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ExtendedValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Option<&str>> for ExtendedValue {
    fn from(value: Option<&str>) -> Self {
        value.map_or(Self::Null, Self::from)
    }
}

/// Conversion into the extended value model.
pub trait ToExtended {
    fn to_extended(&self) -> ExtendedValue;
}

impl ToExtended for ExtendedValue {
    fn to_extended(&self) -> ExtendedValue {
        self.clone()
    }
}

impl<T: ToExtended> ToExtended for [T] {
    fn to_extended(&self) -> ExtendedValue {
        ExtendedValue::Array(self.iter().map(ToExtended::to_extended).collect())
    }
}

impl<T: ToExtended> ToExtended for Vec<T> {
    fn to_extended(&self) -> ExtendedValue {
        self.as_slice().to_extended()
    }
}

impl<T: ToExtended> ToExtended for Branch<T> {
    fn to_extended(&self) -> ExtendedValue {
        let mut value = self.item.to_extended();
        value.insert("depth", ExtendedValue::from(self.depth));
        value.insert("children", self.children.to_extended());
        value
    }
}

impl<T: ToExtended> ToExtended for Tree<T> {
    fn to_extended(&self) -> ExtendedValue {
        ExtendedValue::object([("children", self.children.to_extended())])
    }
}

/// Serializes `value` as pretty JSON (two-space indent), writing regexp and
/// function literals as marker tokens.
pub fn stringify_with_extended_literals<T: ToExtended + ?Sized>(
    value: &T,
) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&value.to_extended())
}

/// Parses text produced by [`stringify_with_extended_literals`], restoring
/// marker tokens to literal values.
pub fn parse_with_extended_literals(text: &str) -> serde_json::Result<ExtendedValue> {
    let value: Value = serde_json::from_str(text)?;
    Ok(ExtendedValue::decode_markers(value))
}
