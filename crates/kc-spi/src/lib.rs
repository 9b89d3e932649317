//! # kc-spi
//!
//! Service Provider Interface (SPI) traits for Keycloak Rust extensibility.
//!
//! This crate defines the core abstractions for the plugin system, allowing
//! custom implementations of storage and other components.
//!
//! ## Design
//!
//! The SPI pattern uses Rust traits instead of Java interfaces:
//! - [`Provider`] - Base trait for all provider implementations
//! - [`ProviderFactory`] - Factory trait for creating provider instances
//! - [`Spi`] - Definition of an SPI extension point
//! - [`KeycloakSession`] - Per-request context that owns provider instances

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod provider;
pub mod registry;
pub mod session;

pub use provider::{FactoryConfig, Provider, ProviderFactory, ProviderMetadata, Spi, SpiError};
pub use registry::SpiRegistry;
pub use session::KeycloakSession;
