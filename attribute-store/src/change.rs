//! Attribute-level differences between two snapshots
//!
//! Observers always receive whole snapshots. Changes are computed alongside a
//! publication so callers can log what moved without diffing again.

use crate::value::AttributeValue;

/// One attribute whose value differs between two snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    /// Attribute name as listed in the schema
    pub name: String,

    /// Value held before the update
    pub previous: AttributeValue,

    /// Value held after the update
    pub current: AttributeValue,
}

impl AttributeChange {
    pub fn new(name: impl Into<String>, previous: AttributeValue, current: AttributeValue) -> Self {
        Self {
            name: name.into(),
            previous,
            current,
        }
    }
}

impl std::fmt::Display for AttributeChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} -> {}", self.name, self.previous, self.current)
    }
}

/// Render a list of changes as `a: x -> y, b: ...` for log lines
pub fn describe(changes: &[AttributeChange]) -> String {
    changes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
