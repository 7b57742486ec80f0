//! Attribute value types shared by snapshots, desired configs and patches.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Three-way optionality for an attribute.
///
/// `Unknown` is "not yet resolved", `Null` is "explicitly absent".
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TriState<T> {
    #[default]
    Unknown,
    Null,
    Value(T),
}

impl<T> TriState<T> {
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true if the state is resolved (`Null` or `Value`).
    pub const fn is_known(&self) -> bool {
        !self.is_unknown()
    }

    pub const fn as_value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> TriState<U> {
        match self {
            Self::Unknown => TriState::Unknown,
            Self::Null => TriState::Null,
            Self::Value(v) => TriState::Value(f(v)),
        }
    }
}

impl<T> From<Option<T>> for TriState<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Self::Value)
    }
}

/// A resolved attribute value.
///
/// Equality is semantic: lists compare element-wise in order, maps compare
/// by content regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub const fn as_map(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Convert a JSON value into an attribute state. JSON `null` becomes `Null`.
    ///
    /// Only a top-level `null` is kept. `AttrValue` has no null variant, so
    /// `null` elements inside arrays and objects are dropped: `{"a": null}`
    /// converts to an empty map and does not round-trip through [`Self::to_json`].
    pub fn from_json(value: Value) -> TriState<Self> {
        match value {
            Value::Null => TriState::Null,
            Value::Bool(b) => TriState::Value(Self::Bool(b)),
            Value::Number(n) => TriState::Value(
                n.as_i64()
                    .map_or_else(|| Self::Float(n.as_f64().unwrap_or_default()), Self::Int),
            ),
            Value::String(s) => TriState::Value(Self::String(s)),
            Value::Array(items) => TriState::Value(Self::List(
                items
                    .into_iter()
                    .filter_map(|v| match Self::from_json(v) {
                        TriState::Value(v) => Some(v),
                        _ => None,
                    })
                    .collect(),
            )),
            Value::Object(fields) => TriState::Value(Self::Map(
                fields
                    .into_iter()
                    .filter_map(|(k, v)| match Self::from_json(v) {
                        TriState::Value(v) => Some((k, v)),
                        _ => None,
                    })
                    .collect(),
            )),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::String(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<V: Into<Self>> From<BTreeMap<String, V>> for AttrValue {
    fn from(value: BTreeMap<String, V>) -> Self {
        Self::Map(value.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<V: Into<Self>> From<Vec<V>> for AttrValue {
    fn from(value: Vec<V>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}
