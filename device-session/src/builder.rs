//! Builder for creating and configuring a DeviceSession.
//!
//! # Example
//!
//! ```rust,ignore
//! use device_session::{DeviceInfo, DeviceSession, DisplayNames, SessionConfig};
//!
//! let names = DisplayNames::new();
//! let session = DeviceSession::builder(DeviceInfo::new("0x1", "color"), connection)
//!     .with_config(SessionConfig::blocking())
//!     .with_names(names.clone())
//!     .build()?;
//! ```

use attribute_store::AttributeSchema;
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::connection::Connection;
use crate::device::DeviceInfo;
use crate::error::Result;
use crate::names::DisplayNames;
use crate::session::DeviceSession;

/// Builder for creating and configuring a [`DeviceSession`].
///
/// # Validation
///
/// `build()` validates the configuration before anything is created and only
/// claims a display name once validation has passed.
pub struct DeviceSessionBuilder {
    device: DeviceInfo,
    connection: Arc<dyn Connection>,
    config: SessionConfig,
    schema: AttributeSchema,
    names: Option<DisplayNames>,
    name: Option<String>,
}

impl DeviceSessionBuilder {
    /// Create a new builder with the default configuration and the Yeelight
    /// attribute schema.
    pub fn new(device: DeviceInfo, connection: Arc<dyn Connection>) -> Self {
        Self {
            device,
            connection,
            config: SessionConfig::default(),
            schema: AttributeSchema::yeelight(),
            names: None,
            name: None,
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Track a different ordered attribute list
    pub fn with_schema(mut self, schema: AttributeSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Draw the display name from a shared name registry
    pub fn with_names(mut self, names: DisplayNames) -> Self {
        self.names = Some(names);
        self
    }

    /// Use this exact display name, bypassing any name registry
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Build the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ConfigurationError` if the configuration is invalid.
    pub fn build(self) -> Result<DeviceSession> {
        self.config.validate()?;

        let name = match (self.name, &self.names) {
            (Some(name), _) => name,
            (None, Some(names)) => names.claim(self.device.base_name()),
            (None, None) => self.device.base_name().to_string(),
        };

        Ok(DeviceSession::new(
            name,
            self.device,
            self.connection,
            self.config,
            self.schema,
        ))
    }
}
