//! Resource snapshots, desired configs and patch documents.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{ClupError, Result};
use crate::types::{AttrValue, TriState};

static UNKNOWN: TriState<AttrValue> = TriState::Unknown;

/// Last-observed attribute state of a remote resource.
///
/// Attributes are kept in a `BTreeMap` so iteration order is stable.
/// A snapshot is never mutated in place by this crate; every change
/// produces a new value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    attributes: BTreeMap<String, TriState<AttrValue>>,
}

/// Caller intent for one reconcile cycle. Same shape as a snapshot.
pub type DesiredConfig = Snapshot;

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes
            .insert(name.to_string(), TriState::Value(value.into()));
        self
    }

    /// Builder-style setter for an explicit tri-state.
    #[must_use]
    pub fn with_state(mut self, name: &str, state: TriState<AttrValue>) -> Self {
        self.attributes.insert(name.to_string(), state);
        self
    }

    /// State of an attribute. Attributes never observed are `Unknown`.
    pub fn get(&self, name: &str) -> &TriState<AttrValue> {
        self.attributes.get(name).unwrap_or(&UNKNOWN)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &TriState<AttrValue>)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Return a new snapshot with every patch entry applied wholesale.
    #[must_use]
    pub fn with_patch(&self, patch: &PatchDocument) -> Self {
        let mut next = self.clone();
        for (name, value) in patch.iter() {
            next.attributes.insert(name.to_string(), value.clone());
        }
        next
    }

    /// Build a snapshot from a JSON object returned by the remote API.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(fields) = value else {
            return Err(ClupError::fatal(
                module_path!(),
                "expected a JSON object for resource snapshot",
            ));
        };

        let attributes = fields
            .into_iter()
            .map(|(k, v)| (k, AttrValue::from_json(v)))
            .collect();

        Ok(Self { attributes })
    }

    /// Serialize resolved attributes to a JSON object. `Unknown` attributes are omitted.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.attributes
                .iter()
                .filter_map(|(k, v)| state_to_json(v).map(|j| (k.clone(), j)))
                .collect::<Map<String, Value>>(),
        )
    }
}

impl FromIterator<(String, TriState<AttrValue>)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, TriState<AttrValue>)>>(iter: I) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

/// Ordered list of attribute changes, submitted as a single remote update or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchDocument {
    entries: Vec<(String, TriState<AttrValue>)>,
}

impl PatchDocument {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, name: &str, value: TriState<AttrValue>) {
        self.entries.push((name.to_string(), value));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TriState<AttrValue>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, name: &str) -> Option<&TriState<AttrValue>> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Names of the patched attributes, in patch order.
    pub fn attribute_names(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// An empty patch means no remote call is needed.
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Request body for the remote update. `Null` entries are sent as JSON `null`.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .filter_map(|(k, v)| state_to_json(v).map(|j| (k.clone(), j)))
                .collect::<Map<String, Value>>(),
        )
    }
}

fn state_to_json(state: &TriState<AttrValue>) -> Option<Value> {
    match state {
        TriState::Unknown => None,
        TriState::Null => Some(Value::Null),
        TriState::Value(v) => Some(v.to_json()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_missing_is_unknown() {
        let snap = Snapshot::new().with("replicas", 3);
        assert!(snap.get("type").is_unknown());
        assert_eq!(snap.get("replicas"), &TriState::Value(AttrValue::Int(3)));
    }

    #[test]
    fn test_with_patch_returns_new_snapshot() {
        let prior = Snapshot::new().with("replicas", 3).with("type", "m5.xlarge");
        let mut patch = PatchDocument::new();
        patch.push("replicas", TriState::Value(AttrValue::Int(5)));

        let next = prior.with_patch(&patch);
        assert_eq!(next.get("replicas"), &TriState::Value(AttrValue::Int(5)));
        assert_eq!(prior.get("replicas"), &TriState::Value(AttrValue::Int(3)));
        assert_eq!(next.get("type"), prior.get("type"));
    }

    #[test]
    fn test_from_json_requires_object() {
        assert!(Snapshot::from_json(json!([1, 2])).is_err());
        let snap = Snapshot::from_json(json!({"id": "abc", "label": null})).unwrap();
        assert_eq!(snap.len(), 2);
        assert!(snap.get("label").is_null());
    }

    #[test]
    fn test_patch_to_json_omits_unknown() {
        let mut patch = PatchDocument::new();
        patch.push("replicas", TriState::Value(AttrValue::Int(5)));
        patch.push("label", TriState::Null);
        patch.push("pending", TriState::Unknown);
        assert_eq!(patch.to_json(), json!({"replicas": 5, "label": null}));
        assert_eq!(patch.attribute_names(), vec!["replicas", "label", "pending"]);
    }

    #[test]
    fn test_snapshot_to_json_round_trip_fields() {
        let snap = Snapshot::new()
            .with("replicas", 3)
            .with_state("name", TriState::Unknown);
        assert_eq!(snap.to_json(), json!({"replicas": 3}));
    }
}
