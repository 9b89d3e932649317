//! # kc-federation
//!
//! User storage federation for Keycloak Rust.
//!
//! Users of a realm may live in the local store, in any number of external
//! providers (LDAP, Kerberos, legacy databases, ...), or partly in both. This
//! crate routes every user operation to the right place:
//!
//! - [`StorageId`] encodes which provider owns a user.
//! - [`registry`] resolves a realm's providers and caches their instances
//!   in the [`KeycloakSession`](kc_spi::KeycloakSession).
//! - [`query`] merges paged results across providers under one window.
//! - [`UserStorageManager`] ties it together: lookups, queries, import
//!   validation, mutations and lifecycle fan-out.
//!
//! ## Example
//!
//! ```ignore
//! let manager = UserStorageManager::new(local_store, UserStorageSettings::from_env()?)
//!     .with_federated_storage(federated_store);
//!
//! let session = KeycloakSession::new(registry);
//! let page = manager.get_users(&session, &realm, 0, 20, false).await?;
//! session.close();
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod manager;
pub mod provider;
pub mod query;
pub mod registry;
pub mod storage_id;

pub use config::{UserStorageProviderModel, UserStorageProviderModelBuilder, UserStorageSettings};
pub use error::{FederationError, FederationResult};
pub use manager::UserStorageManager;
pub use provider::{
    register_factory, Capability, ImportedUserValidation, UserLookupProvider, UserQueryProvider,
    UserRegistrationProvider, UserStorageFactoryHandle, UserStorageLifecycle, UserStorageProvider,
    UserStorageProviderFactory, UserStorageSpi, USER_STORAGE_SPI,
};
pub use query::UNLIMITED;
pub use registry::ResolvedProvider;
pub use storage_id::StorageId;
