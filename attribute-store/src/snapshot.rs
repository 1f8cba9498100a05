//! Immutable, fully populated view of a device's attributes

use serde::Serialize;
use std::collections::BTreeMap;

use crate::change::AttributeChange;
use crate::value::{AttributeSchema, AttributeValue};

/// The complete set of tracked attribute values at one point in time
///
/// Snapshots are only ever built from a schema's empty snapshot plus overrides,
/// so every tracked name is always present. A snapshot is never edited in
/// place once published; updates produce a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AttributeSnapshot {
    values: BTreeMap<String, AttributeValue>,
}

impl AttributeSnapshot {
    pub(crate) fn from_entries(entries: impl IntoIterator<Item = (String, AttributeValue)>) -> Self {
        Self {
            values: entries.into_iter().collect(),
        }
    }

    /// Start a snapshot from the schema's empty values
    pub fn builder(schema: &AttributeSchema) -> SnapshotBuilder {
        SnapshotBuilder {
            snapshot: schema.empty_snapshot(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(AttributeValue::as_bool)
    }

    pub fn number(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(AttributeValue::as_number)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttributeValue::as_text)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Attributes whose value differs in `newer`
    pub fn diff(&self, newer: &AttributeSnapshot) -> Vec<AttributeChange> {
        newer
            .values
            .iter()
            .filter_map(|(name, current)| match self.values.get(name) {
                Some(previous) if previous == current => None,
                Some(previous) => Some(AttributeChange::new(name, previous.clone(), current.clone())),
                None => None,
            })
            .collect()
    }

    /// A copy with the given known attributes replaced
    ///
    /// Names that are not part of this snapshot are ignored so the result stays
    /// aligned with the schema it was built from.
    pub fn with_values<'a>(
        &self,
        overrides: impl IntoIterator<Item = (&'a str, AttributeValue)>,
    ) -> AttributeSnapshot {
        let mut values = self.values.clone();
        for (name, value) in overrides {
            if let Some(slot) = values.get_mut(name) {
                *slot = value;
            }
        }
        AttributeSnapshot { values }
    }
}

/// Builder filling a schema-shaped snapshot one attribute at a time
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    snapshot: AttributeSnapshot,
}

impl SnapshotBuilder {
    /// Set a tracked attribute; returns `false` if the name is not tracked
    pub fn set(&mut self, name: &str, value: impl Into<AttributeValue>) -> bool {
        match self.snapshot.values.get_mut(name) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn build(self) -> AttributeSnapshot {
        self.snapshot
    }
}
