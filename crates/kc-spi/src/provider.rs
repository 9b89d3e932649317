//! Provider traits for the SPI system.

use std::fmt::Debug;

use thiserror::Error;

/// Error type for SPI operations.
#[derive(Debug, Error)]
pub enum SpiError {
    /// Provider creation failed.
    #[error("provider creation failed: {0}")]
    CreationFailed(String),

    /// The provider's configuration is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The session was already closed.
    #[error("session {0} is closed")]
    SessionClosed(uuid::Uuid),
}

/// Base trait for all providers.
///
/// A provider instance is created per session by its factory and released
/// when the session is closed.
pub trait Provider: Send + Sync + Debug {
    /// Called when the session that created the provider is closed.
    ///
    /// Use this to clean up any resources held by the provider.
    fn close(&self) {}
}

/// Metadata about a provider.
#[derive(Debug, Clone)]
pub struct ProviderMetadata {
    /// Unique identifier for this provider.
    pub id: &'static str,

    /// Human-readable name.
    pub name: &'static str,

    /// Description of what this provider does.
    pub description: &'static str,

    /// Priority for ordering (higher = preferred).
    pub priority: i32,
}

/// Factory for creating provider instances.
///
/// Factories are singletons registered once in the [`SpiRegistry`]. The
/// `create` operation is defined by each SPI, since the arguments a provider
/// needs differ per extension point.
///
/// [`SpiRegistry`]: crate::SpiRegistry
pub trait ProviderFactory: Send + Sync + Debug {
    /// Returns the unique identifier for this factory.
    fn id(&self) -> &'static str;

    /// Returns metadata about providers created by this factory.
    fn metadata(&self) -> ProviderMetadata;
}

/// Configuration interface read by providers.
pub trait FactoryConfig: Send + Sync {
    /// Gets a string configuration value.
    fn get(&self, key: &str) -> Option<&str>;

    /// Gets an integer configuration value.
    fn get_int(&self, key: &str, default: i32) -> i32 {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Gets a boolean configuration value.
    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}

/// Definition of an SPI extension point.
///
/// An SPI defines a category of providers (e.g., "authenticator", "user-storage").
pub trait Spi: Send + Sync {
    /// Returns the unique name of this SPI.
    fn name(&self) -> &'static str;
}
