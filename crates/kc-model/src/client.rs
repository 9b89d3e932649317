//! Client domain model.
//!
//! Only what user storage needs to know about a client: its identity, and
//! whether it owns a service account user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A Keycloak client (OAuth 2.0 / OIDC / SAML application).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Unique identifier.
    pub id: Uuid,
    /// Realm this client belongs to.
    pub realm_id: Uuid,
    /// Unique client identifier (OAuth `client_id`).
    pub client_id: String,
    /// Whether the client is enabled.
    pub enabled: bool,
    /// Whether the client has a service account user.
    pub service_accounts_enabled: bool,
    /// When the client was created.
    pub created_at: DateTime<Utc>,
}

impl Client {
    /// Creates a new client.
    #[must_use]
    pub fn new(realm_id: Uuid, client_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            realm_id,
            client_id: client_id.into(),
            enabled: true,
            service_accounts_enabled: false,
            created_at: Utc::now(),
        }
    }

    /// Enables the service account for this client.
    #[must_use]
    pub const fn with_service_account(mut self) -> Self {
        self.service_accounts_enabled = true;
        self
    }
}
