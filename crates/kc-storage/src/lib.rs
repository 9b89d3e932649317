//! # kc-storage
//!
//! Storage abstraction traits for Keycloak Rust user storage.
//!
//! This crate defines the interfaces of the two stores that are always
//! local to a realm, whatever external providers are configured:
//!
//! - [`UserProvider`] - the local user store
//! - [`UserFederatedStorageProvider`] - supplementary data for externally owned users
//! - [`OnUserCache`] - hook run when a user enters the user cache

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cache;
pub mod error;
pub mod federated;
pub mod removal;
pub mod user;

pub use cache::{CachedUser, OnUserCache};
pub use error::{StorageError, StorageResult};
pub use federated::UserFederatedStorageProvider;
pub use removal::RemovalTarget;
pub use user::UserProvider;
