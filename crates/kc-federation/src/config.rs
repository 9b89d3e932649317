//! User storage configuration.
//!
//! [`UserStorageProviderModel`] is the typed view of a realm component that
//! configures one user storage provider. [`UserStorageSettings`] tunes the
//! router itself.

use std::collections::HashMap;

use kc_model::ComponentModel;
use kc_spi::FactoryConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FederationError, FederationResult};
use crate::provider::USER_STORAGE_SPI;

/// Config key holding the provider priority.
pub const PRIORITY: &str = "priority";

/// Config key holding whether the provider is enabled.
pub const ENABLED: &str = "enabled";

/// Environment variable overriding the skip-phase batch size.
pub const QUERY_BATCH_SIZE_ENV: &str = "KC_USER_STORAGE_QUERY_BATCH_SIZE";

/// Default number of rows read per skip-phase call.
pub const DEFAULT_QUERY_BATCH_SIZE: usize = 50;

/// A user storage provider descriptor.
///
/// Descriptors are created by realm administration; the router only reads
/// them. Lower priority values are consulted first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStorageProviderModel {
    component: ComponentModel,
}

impl UserStorageProviderModel {
    /// Creates a new descriptor builder.
    #[must_use]
    pub fn builder() -> UserStorageProviderModelBuilder {
        UserStorageProviderModelBuilder::new()
    }

    /// Wraps a component, if it configures a user storage provider.
    #[must_use]
    pub fn from_component(component: &ComponentModel) -> Option<Self> {
        (component.provider_type == USER_STORAGE_SPI).then(|| Self {
            component: component.clone(),
        })
    }

    /// Descriptor id, used as the provider tag in composite user ids.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.component.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.component.name
    }

    /// Id of the factory implementing this provider.
    #[must_use]
    pub fn provider_id(&self) -> &str {
        &self.component.provider_id
    }

    /// Lookup priority (lower = consulted earlier).
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.get_int(PRIORITY, 0)
    }

    /// Whether the provider is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.get_bool(ENABLED, true)
    }

    /// Returns the underlying component.
    #[must_use]
    pub const fn component(&self) -> &ComponentModel {
        &self.component
    }
}

impl FactoryConfig for UserStorageProviderModel {
    fn get(&self, key: &str) -> Option<&str> {
        self.component.get(key)
    }
}

impl From<UserStorageProviderModel> for ComponentModel {
    fn from(model: UserStorageProviderModel) -> Self {
        model.component
    }
}

/// Builder for [`UserStorageProviderModel`].
#[derive(Debug, Default)]
pub struct UserStorageProviderModelBuilder {
    id: Option<String>,
    name: Option<String>,
    provider_id: Option<String>,
    priority: i32,
    enabled: bool,
    config: HashMap<String, String>,
}

impl UserStorageProviderModelBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    /// Sets the descriptor id.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the factory id.
    #[must_use]
    pub fn provider_id(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets whether the provider is enabled.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Adds a config value.
    #[must_use]
    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Builds the descriptor.
    ///
    /// A missing id defaults to a fresh UUID, a missing name to the id.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if no provider id was set, or if the
    /// id contains `:` and so could not tag composite user ids.
    pub fn build(self) -> FederationResult<UserStorageProviderModel> {
        let provider_id = self
            .provider_id
            .ok_or_else(|| FederationError::config("provider_id is required"))?;
        let id = self.id.unwrap_or_else(|| Uuid::now_v7().to_string());
        if id.is_empty() || id.contains(':') {
            return Err(FederationError::config(format!(
                "invalid user storage provider id '{id}'"
            )));
        }

        let mut component = ComponentModel::new(id, provider_id, USER_STORAGE_SPI);
        if let Some(name) = self.name {
            component.name = name;
        }
        component.config = self.config;
        component
            .config
            .insert(PRIORITY.to_string(), self.priority.to_string());
        component
            .config
            .insert(ENABLED.to_string(), self.enabled.to_string());

        Ok(UserStorageProviderModel { component })
    }
}

/// Router settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserStorageSettings {
    /// Rows read per call while skipping over a provider's results.
    pub query_batch_size: usize,
}

impl Default for UserStorageSettings {
    fn default() -> Self {
        Self {
            query_batch_size: DEFAULT_QUERY_BATCH_SIZE,
        }
    }
}

impl UserStorageSettings {
    /// Loads settings from environment variables, falling back to defaults.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if a variable is set to an invalid value.
    pub fn from_env() -> FederationResult<Self> {
        let batch_size = match std::env::var(QUERY_BATCH_SIZE_ENV) {
            Ok(raw) => Some(raw),
            Err(std::env::VarError::NotPresent) => None,
            Err(std::env::VarError::NotUnicode(_)) => {
                return Err(FederationError::config(format!(
                    "{QUERY_BATCH_SIZE_ENV} is not valid unicode"
                )));
            }
        };
        Self::from_batch_size_var(batch_size)
    }

    /// Builds settings from the raw value of the batch size variable.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if the value is not a positive number.
    pub fn from_batch_size_var(raw: Option<String>) -> FederationResult<Self> {
        let mut settings = Self::default();
        if let Some(raw) = raw {
            settings.query_batch_size = raw.trim().parse().map_err(|_| {
                FederationError::config(format!("{QUERY_BATCH_SIZE_ENV} must be a number: {raw}"))
            })?;
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Sets the skip-phase batch size.
    #[must_use]
    pub const fn with_query_batch_size(mut self, size: usize) -> Self {
        self.query_batch_size = size;
        self
    }

    /// Checks the settings are usable.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if the batch size is zero.
    pub fn validate(&self) -> FederationResult<()> {
        if self.query_batch_size == 0 {
            return Err(FederationError::config("query batch size must be positive"));
        }
        Ok(())
    }
}
