//! Static description of a discovered device

use serde::{Deserialize, Serialize};

/// Identity and capabilities advertised by a device during discovery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Unique device id
    pub id: String,

    /// Model identifier, e.g. `"color"` or `"ceiling4"`
    pub model: String,

    /// Firmware version
    #[serde(default)]
    pub fw_ver: String,

    /// Methods the device says it supports; empty when unknown
    #[serde(default)]
    pub support: Vec<String>,

    /// Name stored on the device, if any
    #[serde(default)]
    pub name: Option<String>,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set the supported methods from the space-separated discovery list
    pub fn with_support(mut self, support: &str) -> Self {
        self.support = support.split_whitespace().map(str::to_string).collect();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether `method` is advertised; an empty list means "unknown" and allows all
    pub fn supports(&self, method: &str) -> bool {
        self.support.is_empty() || self.support.iter().any(|m| m == method)
    }

    /// Name used as the base for the display name
    pub fn base_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.model,
        }
    }
}
