//! SPI Registry for managing provider factories.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;

use crate::provider::{ProviderMetadata, Spi};

/// Registry for SPI provider factories.
///
/// The registry maintains a mapping of SPI names to their provider factories.
/// Factories are stored type-erased; each SPI looks its factories up again
/// under the handle type it registered them with (usually an
/// `Arc<dyn SomeFactory>`).
#[derive(Debug, Default)]
pub struct SpiRegistry {
    factories: DashMap<&'static str, Vec<FactoryEntry>>,
}

#[derive(Debug)]
struct FactoryEntry {
    metadata: ProviderMetadata,
    factory: Arc<dyn Any + Send + Sync>,
}

impl SpiRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider factory handle under an SPI.
    ///
    /// A factory registered again under the same id replaces the previous one.
    pub fn register<F>(&self, spi: &dyn Spi, metadata: ProviderMetadata, factory: F)
    where
        F: Any + Send + Sync,
    {
        let mut entries = self.factories.entry(spi.name()).or_default();
        entries.retain(|e| e.metadata.id != metadata.id);
        tracing::debug!(
            spi = spi.name(),
            provider_id = metadata.id,
            name = metadata.name,
            "registered provider factory"
        );
        entries.push(FactoryEntry {
            metadata,
            factory: Arc::new(factory),
        });
    }

    /// Looks up a factory handle by SPI and provider ID.
    ///
    /// Returns `None` if nothing is registered under that id, or if it was
    /// registered with a different handle type.
    #[must_use]
    pub fn get_factory<F>(&self, spi_name: &str, provider_id: &str) -> Option<F>
    where
        F: Any + Send + Sync + Clone,
    {
        self.factories.get(spi_name).and_then(|entries| {
            entries
                .iter()
                .find(|e| e.metadata.id == provider_id)
                .and_then(|e| e.factory.downcast_ref::<F>().cloned())
        })
    }

    /// Lists all registered provider IDs for an SPI, in registration order.
    #[must_use]
    pub fn list_providers(&self, spi_name: &str) -> Vec<&'static str> {
        self.factories
            .get(spi_name)
            .map(|entries| entries.iter().map(|e| e.metadata.id).collect())
            .unwrap_or_default()
    }

    /// Gets provider metadata by SPI and provider ID.
    #[must_use]
    pub fn get_metadata(&self, spi_name: &str, provider_id: &str) -> Option<ProviderMetadata> {
        self.factories.get(spi_name).and_then(|entries| {
            entries
                .iter()
                .find(|e| e.metadata.id == provider_id)
                .map(|e| e.metadata.clone())
        })
    }
}
