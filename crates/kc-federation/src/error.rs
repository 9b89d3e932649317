//! Federation error types.

use kc_spi::SpiError;
use kc_storage::StorageError;
use thiserror::Error;

use crate::provider::Capability;

/// Errors that can occur during federation operations.
#[derive(Debug, Error)]
pub enum FederationError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No user storage provider with this id is configured in the realm.
    #[error("Could not resolve storage provider: {0}")]
    ProviderNotFound(String),

    /// The descriptor names a provider type with no registered factory.
    #[error("Could not find user storage provider factory for: {0}")]
    FactoryNotFound(String),

    /// The provider does not offer a capability the operation requires.
    #[error("Storage provider {provider_id} does not support {capability}")]
    MissingCapability {
        /// Descriptor id of the provider.
        provider_id: String,
        /// The capability that was required.
        capability: Capability,
    },

    /// The user argument is not usable for the operation.
    #[error("Invalid user: {0}")]
    InvalidUser(String),

    /// An externally owned user needs the federated attribute store, but
    /// none is configured.
    #[error("Federated storage is not available")]
    FederatedStorageUnavailable,

    /// Failure reported by an external provider.
    #[error("Provider {provider_id} failed: {message}")]
    Provider {
        /// Descriptor id of the provider.
        provider_id: String,
        /// Failure description.
        message: String,
    },

    /// Connection error to an external system.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation not supported by this provider.
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Provider is read-only.
    #[error("Provider is read-only: cannot {0}")]
    ReadOnly(String),

    /// Provider factory or session failure.
    #[error("SPI error: {0}")]
    Spi(#[from] SpiError),

    /// Error from the local or federated attribute store.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl FederationError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a provider failure.
    #[must_use]
    pub fn provider(provider_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider_id: provider_id.into(),
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates an invalid user error.
    #[must_use]
    pub fn invalid_user(msg: impl Into<String>) -> Self {
        Self::InvalidUser(msg.into())
    }

    /// Creates a missing capability error.
    #[must_use]
    pub fn missing_capability(provider_id: impl Into<String>, capability: Capability) -> Self {
        Self::MissingCapability {
            provider_id: provider_id.into(),
            capability,
        }
    }

    /// Creates a read-only error.
    #[must_use]
    pub fn read_only(operation: impl Into<String>) -> Self {
        Self::ReadOnly(operation.into())
    }

    /// Creates a not supported error.
    #[must_use]
    pub fn not_supported(operation: impl Into<String>) -> Self {
        Self::NotSupported(operation.into())
    }

    /// Checks if routing to a provider failed.
    #[must_use]
    pub const fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Self::ProviderNotFound(_) | Self::FactoryNotFound(_) | Self::Spi(_)
        )
    }

    /// Checks if a required capability was missing.
    #[must_use]
    pub const fn is_missing_capability(&self) -> bool {
        matches!(self, Self::MissingCapability { .. })
    }

    /// Checks if this is a connection error.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Result type for federation operations.
pub type FederationResult<T> = Result<T, FederationError>;
