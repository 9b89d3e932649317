//! Component configuration model.
//!
//! Components are realm-scoped configuration entries that bind a named
//! provider implementation to a configuration map. User storage providers
//! are components whose `provider_type` is the user storage SPI.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A realm-scoped component configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentModel {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Id of the provider factory that implements this component.
    pub provider_id: String,
    /// SPI this component belongs to.
    pub provider_type: String,
    /// Provider-specific configuration.
    pub config: HashMap<String, String>,
}

impl ComponentModel {
    /// Creates a component whose display name equals its id.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        provider_id: impl Into<String>,
        provider_type: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            provider_id: provider_id.into(),
            provider_type: provider_type.into(),
            config: HashMap::new(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a config value.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Gets a config value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }
}
