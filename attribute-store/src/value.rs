//! Typed attribute values and the ordered schema of tracked attributes
//!
//! A device reports its attributes as a positional list. The schema fixes the
//! order and the static kind of every tracked attribute, so a raw list can be
//! coerced into typed values and so that every snapshot carries a well-defined
//! empty value for each name.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::snapshot::AttributeSnapshot;

/// A single typed attribute value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(i64),
    Text(String),
}

impl AttributeValue {
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeValue::Bool(_) => AttributeKind::Boolean,
            AttributeValue::Number(_) => AttributeKind::Number,
            AttributeValue::Text(_) => AttributeKind::Text,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Number(n) => write!(f, "{}", n),
            AttributeValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Number(i64::from(value))
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

/// Static kind of a tracked attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Number,
    Boolean,
    Text,
}

impl AttributeKind {
    /// The value an attribute of this kind holds before the device reports it
    pub fn empty_value(self) -> AttributeValue {
        match self {
            AttributeKind::Number => AttributeValue::Number(0),
            AttributeKind::Boolean => AttributeValue::Bool(false),
            AttributeKind::Text => AttributeValue::Text(String::new()),
        }
    }
}

/// One tracked attribute: its name, kind, and whether it reflects power state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub name: String,
    pub kind: AttributeKind,
    #[serde(default)]
    pub power: bool,
}

impl AttributeSpec {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            power: false,
        }
    }

    /// Mark this attribute as a power switch (forced off while unreachable)
    pub fn power(mut self) -> Self {
        self.power = true;
        self
    }
}

/// Ordered list of tracked attributes
///
/// The order is significant: it is the order in which attribute names are
/// requested from the device and in which the device answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSchema {
    specs: Vec<AttributeSpec>,
}

impl AttributeSchema {
    pub fn new(specs: Vec<AttributeSpec>) -> Self {
        Self { specs }
    }

    /// The attribute set queried from Yeelight bulbs and ceiling lights
    pub fn yeelight() -> Self {
        use AttributeKind::*;

        Self::new(vec![
            AttributeSpec::new("power", Boolean).power(),
            AttributeSpec::new("bright", Number),
            AttributeSpec::new("ct", Number),
            AttributeSpec::new("rgb", Number),
            AttributeSpec::new("hue", Number),
            AttributeSpec::new("sat", Number),
            AttributeSpec::new("color_mode", Number),
            AttributeSpec::new("flowing", Number),
            AttributeSpec::new("delayoff", Number),
            AttributeSpec::new("music_on", Number),
            AttributeSpec::new("name", Text),
            AttributeSpec::new("bg_power", Boolean).power(),
            AttributeSpec::new("bg_flowing", Number),
            AttributeSpec::new("bg_ct", Number),
            AttributeSpec::new("bg_lmode", Number),
            AttributeSpec::new("bg_bright", Number),
            AttributeSpec::new("bg_rgb", Number),
            AttributeSpec::new("bg_hue", Number),
            AttributeSpec::new("bg_sat", Number),
            AttributeSpec::new("nl_br", Number),
            AttributeSpec::new("active_mode", Number),
        ])
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeSpec> {
        self.specs.iter()
    }

    /// Attribute names in query order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|spec| spec.name.as_str())
    }

    pub fn spec(&self, name: &str) -> Option<&AttributeSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    pub fn power_attributes(&self) -> impl Iterator<Item = &str> {
        self.specs
            .iter()
            .filter(|spec| spec.power)
            .map(|spec| spec.name.as_str())
    }

    /// A snapshot holding the empty value of every tracked attribute
    pub fn empty_snapshot(&self) -> AttributeSnapshot {
        AttributeSnapshot::from_entries(
            self.specs
                .iter()
                .map(|spec| (spec.name.clone(), spec.kind.empty_value())),
        )
    }
}

impl Default for AttributeSchema {
    fn default() -> Self {
        Self::yeelight()
    }
}
