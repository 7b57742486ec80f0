//! Attribute-level diffing of a desired config against an observed snapshot.
//!
//! Produces the minimal [`PatchDocument`] for the remote update, or rejects the
//! change when it touches an immutable attribute or a reserved map key.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::{ClupError, Result};
use crate::snapshot::{DesiredConfig, PatchDocument, Snapshot};
use crate::types::{AttrValue, TriState};

/// How a collection-typed attribute is merged before comparison.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CollectionPolicy {
    /// Any difference replaces the whole collection.
    #[default]
    ReplaceWholesale,
    /// Callers may not set these keys; their system-managed defaults are
    /// merged into the desired map before a wholesale comparison.
    ReservedKeys(BTreeMap<String, AttrValue>),
}

/// Per-resource-type diff configuration, injected by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffPolicy {
    immutable: BTreeSet<String>,
    collections: BTreeMap<String, CollectionPolicy>,
}

impl DiffPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_immutable<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.immutable.extend(attributes.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_reserved_keys(
        mut self,
        attribute: &str,
        defaults: BTreeMap<String, AttrValue>,
    ) -> Self {
        self.collections.insert(
            attribute.to_string(),
            CollectionPolicy::ReservedKeys(defaults),
        );
        self
    }

    pub fn is_immutable(&self, attribute: &str) -> bool {
        self.immutable.contains(attribute)
    }

    pub fn collection_policy(&self, attribute: &str) -> &CollectionPolicy {
        static WHOLESALE: CollectionPolicy = CollectionPolicy::ReplaceWholesale;
        self.collections.get(attribute).unwrap_or(&WHOLESALE)
    }
}

/// Decide whether `desired` must be sent to replace `current`.
///
/// An `Unknown` desired value is never patched. Any other tri-state transition
/// is a change, and two values are compared with `eq`.
pub fn should_patch<T, F>(current: &TriState<T>, desired: &TriState<T>, eq: F) -> bool
where
    F: Fn(&T, &T) -> bool,
{
    match (current, desired) {
        (_, TriState::Unknown) | (TriState::Null, TriState::Null) => false,
        (TriState::Value(a), TriState::Value(b)) => !eq(a, b),
        _ => true,
    }
}

/// Semantic equality for attribute values.
///
/// Integers and floats holding the same number are equal; collections compare
/// element-wise with the same rule.
#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
pub fn values_equal(a: &AttrValue, b: &AttrValue) -> bool {
    match (a, b) {
        (AttrValue::Int(i), AttrValue::Float(f)) | (AttrValue::Float(f), AttrValue::Int(i)) => {
            *i as f64 == *f
        }
        (AttrValue::List(x), AttrValue::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (AttrValue::Map(x), AttrValue::Map(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, l)| y.get(k).is_some_and(|r| values_equal(l, r)))
        }
        _ => a == b,
    }
}

/// Compare `desired` against `snapshot` and build the patch to submit.
///
/// Attributes are visited in name order; the first immutable or reserved-key
/// violation aborts the diff and no patch is returned.
pub fn diff(
    snapshot: &Snapshot,
    desired: &DesiredConfig,
    policy: &DiffPolicy,
) -> Result<PatchDocument> {
    let mut patch = PatchDocument::new();

    for (name, wanted) in desired.attributes() {
        let current = snapshot.get(name);
        let wanted = merge_collection(name, wanted, policy.collection_policy(name))?;

        if !should_patch(current, wanted.as_ref(), values_equal) {
            continue;
        }

        if policy.is_immutable(name) && current.as_value().is_some() {
            debug!(attribute = name, "Rejecting change to immutable attribute");
            return Err(ClupError::ImmutableAttributeChanged {
                attribute: name.to_string(),
            });
        }

        patch.push(name, wanted.into_owned());
    }

    debug!(
        attributes = ?patch.attribute_names(),
        "Computed patch with {} attribute(s)",
        patch.len()
    );
    Ok(patch)
}

/// Apply the collection policy of `name` to its desired state.
fn merge_collection<'a>(
    name: &str,
    wanted: &'a TriState<AttrValue>,
    policy: &CollectionPolicy,
) -> Result<Cow<'a, TriState<AttrValue>>> {
    let CollectionPolicy::ReservedKeys(defaults) = policy else {
        return Ok(Cow::Borrowed(wanted));
    };

    match wanted {
        TriState::Value(AttrValue::Map(entries)) => {
            if let Some(key) = defaults.keys().find(|k| entries.contains_key(*k)) {
                return Err(ClupError::ReservedKeyConflict {
                    attribute: name.to_string(),
                    key: key.clone(),
                });
            }
            let mut merged = entries.clone();
            merged.extend(defaults.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(Cow::Owned(TriState::Value(AttrValue::Map(merged))))
        }
        TriState::Null if !defaults.is_empty() => {
            Ok(Cow::Owned(TriState::Value(AttrValue::Map(defaults.clone()))))
        }
        _ => Ok(Cow::Borrowed(wanted)),
    }
}
