//! User domain model.
//!
//! Users belong to a realm and may be stored locally, imported from an
//! external directory (`federation_link` set), or proxied entirely by an
//! external user storage provider (identifier tagged with the provider id).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A federated identity link (e.g., Google, GitHub login).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FederatedIdentity {
    /// Identity provider alias (e.g., "google", "github").
    pub identity_provider: String,
    /// User ID at the identity provider.
    pub user_id: String,
    /// Username at the identity provider.
    pub user_name: Option<String>,
    /// Token stored for the identity provider, if token storage is enabled.
    pub token: Option<String>,
}

impl FederatedIdentity {
    /// Creates a new federated identity.
    #[must_use]
    pub fn new(provider: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            identity_provider: provider.into(),
            user_id: user_id.into(),
            user_name: None,
            token: None,
        }
    }

    /// Sets the username at the identity provider.
    #[must_use]
    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }
}

/// Consent a user granted to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConsent {
    /// Internal id of the client the consent was granted to.
    pub client_id: Uuid,
    /// Client scopes covered by the consent.
    pub granted_client_scopes: Vec<String>,
    /// When the consent was first granted.
    pub created_at: DateTime<Utc>,
    /// When the consent was last changed.
    pub last_updated_at: DateTime<Utc>,
}

impl UserConsent {
    /// Creates an empty consent for a client.
    #[must_use]
    pub fn new(client_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            client_id,
            granted_client_scopes: Vec::new(),
            created_at: now,
            last_updated_at: now,
        }
    }

    /// Adds a granted client scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.granted_client_scopes.push(scope.into());
        self
    }
}

/// A Keycloak user.
///
/// The `id` is an opaque string: for locally stored users it is a UUID,
/// for users owned by an external provider it is a composite identifier
/// that names the owning provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    // === Identity ===
    /// Unique identifier (local UUID or composite storage id).
    pub id: String,
    /// Realm this user belongs to.
    pub realm_id: Uuid,
    /// Unique username within the realm.
    pub username: String,
    /// Whether the user account is enabled.
    pub enabled: bool,

    // === Profile ===
    /// User's first name.
    pub first_name: Option<String>,
    /// User's last name.
    pub last_name: Option<String>,
    /// User's email address.
    pub email: Option<String>,
    /// Whether the email has been verified.
    pub email_verified: bool,

    /// When the user was created.
    pub created_at: DateTime<Utc>,

    // === Federation ===
    /// Id of the user storage provider this record was imported from.
    pub federation_link: Option<String>,
    /// Link to service account client (if this is a service account).
    pub service_account_client_link: Option<Uuid>,

    /// Custom user attributes.
    pub attributes: HashMap<String, Vec<String>>,
}

impl User {
    /// Creates a new locally identified user with the given username.
    #[must_use]
    pub fn new(realm_id: Uuid, username: impl Into<String>) -> Self {
        Self::with_id(Uuid::now_v7().to_string(), realm_id, username)
    }

    /// Creates a user with an explicit identifier.
    #[must_use]
    pub fn with_id(id: impl Into<String>, realm_id: Uuid, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            realm_id,
            username: username.into(),
            enabled: true,
            first_name: None,
            last_name: None,
            email: None,
            email_verified: false,
            created_at: Utc::now(),
            federation_link: None,
            service_account_client_link: None,
            attributes: HashMap::new(),
        }
    }

    /// Sets the user's email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the user's first name.
    #[must_use]
    pub fn with_first_name(mut self, name: impl Into<String>) -> Self {
        self.first_name = Some(name.into());
        self
    }

    /// Sets the user's last name.
    #[must_use]
    pub fn with_last_name(mut self, name: impl Into<String>) -> Self {
        self.last_name = Some(name.into());
        self
    }

    /// Marks the user as imported from a user storage provider.
    #[must_use]
    pub fn with_federation_link(mut self, provider_id: impl Into<String>) -> Self {
        self.federation_link = Some(provider_id.into());
        self
    }

    /// Marks the user as the service account of a client.
    #[must_use]
    pub const fn with_service_account_client(mut self, client_id: Uuid) -> Self {
        self.service_account_client_link = Some(client_id);
        self
    }

    /// Sets whether the user is enabled.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Gets the user's full name.
    #[must_use]
    pub fn full_name(&self) -> Option<String> {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.clone()),
            (None, Some(last)) => Some(last.clone()),
            (None, None) => None,
        }
    }

    /// Checks if this is a service account.
    #[must_use]
    pub const fn is_service_account(&self) -> bool {
        self.service_account_client_link.is_some()
    }

    /// Checks if this record was imported from a user storage provider.
    #[must_use]
    pub const fn is_federated(&self) -> bool {
        self.federation_link.is_some()
    }

    /// Gets the first value of an attribute.
    #[must_use]
    pub fn get_first_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// Checks whether an attribute holds the given value.
    #[must_use]
    pub fn has_attribute_value(&self, name: &str, value: &str) -> bool {
        self.attributes
            .get(name)
            .is_some_and(|values| values.iter().any(|v| v == value))
    }

    /// Sets an attribute value.
    pub fn set_attribute(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.attributes.insert(name.into(), values);
    }
}
