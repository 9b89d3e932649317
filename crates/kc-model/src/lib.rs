//! # kc-model
//!
//! Domain models for Keycloak Rust (User, Realm, Client, etc.).
//!
//! This crate defines the core domain entities shared by the user storage
//! layer and its providers.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod client;
pub mod component;
pub mod group;
pub mod realm;
pub mod role;
pub mod user;

pub use client::Client;
pub use component::ComponentModel;
pub use group::Group;
pub use realm::Realm;
pub use role::Role;
pub use user::{FederatedIdentity, User, UserConsent};
