//! Composite user identifiers.
//!
//! A user owned by an external storage provider carries an id of the form
//! `f:<provider id>:<external id>`. Any other string is a local id. The
//! router only ever reads the provider part; the external part is opaque and
//! handed back to the owning provider untouched.

use std::fmt;

use kc_model::User;

use crate::error::{FederationError, FederationResult};

const PREFIX: &str = "f:";
const SEPARATOR: char = ':';

/// A decoded user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageId {
    id: String,
    provider_id: Option<String>,
    external_id: String,
}

impl StorageId {
    /// Decodes an identifier.
    ///
    /// Ids without the `f:` prefix, or without a separator after the
    /// provider part, are local.
    #[must_use]
    pub fn parse(id: &str) -> Self {
        let tagged = id.strip_prefix(PREFIX).and_then(|rest| {
            let (provider, external) = rest.split_once(SEPARATOR)?;
            (!provider.is_empty()).then_some((provider, external))
        });

        match tagged {
            Some((provider, external)) => Self {
                id: id.to_string(),
                provider_id: Some(provider.to_string()),
                external_id: external.to_string(),
            },
            None => Self {
                id: id.to_string(),
                provider_id: None,
                external_id: id.to_string(),
            },
        }
    }

    /// Builds the identifier of a user owned by `provider_id`.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if `provider_id` is empty or contains
    /// `:`.
    pub fn new(provider_id: &str, external_id: &str) -> FederationResult<Self> {
        Ok(Self {
            id: Self::keycloak_id(provider_id, external_id)?,
            provider_id: Some(provider_id.to_string()),
            external_id: external_id.to_string(),
        })
    }

    /// Builds an encoded identifier string.
    ///
    /// ## Errors
    ///
    /// Fails like [`StorageId::new`].
    pub fn keycloak_id(provider_id: &str, external_id: &str) -> FederationResult<String> {
        if provider_id.is_empty() || provider_id.contains(SEPARATOR) {
            return Err(FederationError::config(format!(
                "provider id cannot tag user ids: '{provider_id}'"
            )));
        }
        Ok(format!("{PREFIX}{provider_id}{SEPARATOR}{external_id}"))
    }

    /// Returns true if the user is stored locally.
    #[must_use]
    pub fn is_local_storage(user: &User) -> bool {
        Self::parse(&user.id).is_local()
    }

    /// Returns the id of the provider owning the user, if any.
    #[must_use]
    pub fn resolve_provider_id(user: &User) -> Option<String> {
        Self::parse(&user.id).provider_id
    }

    /// The full encoded identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The owning provider, or `None` for local ids.
    #[must_use]
    pub fn provider_id(&self) -> Option<&str> {
        self.provider_id.as_deref()
    }

    /// The provider-specific part (the whole id for local ids).
    #[must_use]
    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    /// Returns true for local ids.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        self.provider_id.is_none()
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl From<&str> for StorageId {
    fn from(id: &str) -> Self {
        Self::parse(id)
    }
}
