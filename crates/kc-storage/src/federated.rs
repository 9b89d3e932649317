//! Federated attribute store contract.
//!
//! Users owned by an external provider have no local row to hang data on.
//! The federated attribute store keeps that supplementary data (attributes,
//! group memberships, identity provider links, consents) keyed by
//! `(realm, user id)`, whoever owns the user record itself.

use async_trait::async_trait;
use kc_model::{FederatedIdentity, Group, Realm, UserConsent};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::removal::RemovalTarget;

/// Provider for supplementary data of externally owned users.
#[async_trait]
pub trait UserFederatedStorageProvider: Send + Sync {
    // === Attributes ===

    /// Sets a multi-valued attribute.
    async fn set_attribute(
        &self,
        realm: &Realm,
        user_id: &str,
        name: &str,
        values: Vec<String>,
    ) -> StorageResult<()>;

    /// Removes an attribute.
    async fn remove_attribute(&self, realm: &Realm, user_id: &str, name: &str)
        -> StorageResult<()>;

    /// Gets the values of an attribute.
    async fn get_attribute(
        &self,
        realm: &Realm,
        user_id: &str,
        name: &str,
    ) -> StorageResult<Vec<String>>;

    /// Lists ids of users holding an attribute value.
    async fn get_users_by_user_attribute(
        &self,
        realm: &Realm,
        name: &str,
        value: &str,
    ) -> StorageResult<Vec<String>>;

    // === Group membership ===

    /// Adds a user to a group.
    async fn join_group(&self, realm: &Realm, user_id: &str, group: &Group) -> StorageResult<()>;

    /// Removes a user from a group.
    async fn leave_group(&self, realm: &Realm, user_id: &str, group: &Group)
        -> StorageResult<()>;

    /// Lists ids of group members, paged in the store's natural order.
    async fn get_membership(
        &self,
        realm: &Realm,
        group: &Group,
        first: usize,
        max: usize,
    ) -> StorageResult<Vec<String>>;

    // === Federated identities ===

    /// Links an identity provider account to a user.
    async fn add_federated_identity(
        &self,
        realm: &Realm,
        user_id: &str,
        identity: &FederatedIdentity,
    ) -> StorageResult<()>;

    /// Updates a stored identity provider link.
    async fn update_federated_identity(
        &self,
        realm: &Realm,
        user_id: &str,
        identity: &FederatedIdentity,
    ) -> StorageResult<()>;

    /// Removes an identity provider link, returning whether it existed.
    async fn remove_federated_identity(
        &self,
        realm: &Realm,
        user_id: &str,
        identity_provider: &str,
    ) -> StorageResult<bool>;

    /// Lists a user's identity provider links.
    async fn get_federated_identities(
        &self,
        realm: &Realm,
        user_id: &str,
    ) -> StorageResult<Vec<FederatedIdentity>>;

    /// Gets a user's link to one identity provider.
    async fn get_federated_identity(
        &self,
        realm: &Realm,
        user_id: &str,
        identity_provider: &str,
    ) -> StorageResult<Option<FederatedIdentity>>;

    /// Gets the id of the user linked to an identity provider account.
    async fn get_user_by_federated_identity(
        &self,
        realm: &Realm,
        identity: &FederatedIdentity,
    ) -> StorageResult<Option<String>>;

    // === Consents ===

    /// Records a consent.
    async fn add_consent(
        &self,
        realm: &Realm,
        user_id: &str,
        consent: &UserConsent,
    ) -> StorageResult<()>;

    /// Gets the consent a user granted to a client.
    async fn get_consent_by_client(
        &self,
        realm: &Realm,
        user_id: &str,
        client_id: Uuid,
    ) -> StorageResult<Option<UserConsent>>;

    /// Lists a user's consents.
    async fn get_consents(&self, realm: &Realm, user_id: &str) -> StorageResult<Vec<UserConsent>>;

    /// Replaces a stored consent.
    async fn update_consent(
        &self,
        realm: &Realm,
        user_id: &str,
        consent: &UserConsent,
    ) -> StorageResult<()>;

    /// Revokes the consent granted to a client, returning whether it existed.
    async fn revoke_consent_for_client(
        &self,
        realm: &Realm,
        user_id: &str,
        client_id: Uuid,
    ) -> StorageResult<bool>;

    // === Lifecycle ===

    /// Drops every record held for a user that is being removed.
    async fn pre_remove_user(&self, realm: &Realm, user_id: &str) -> StorageResult<()>;

    /// Drops records referencing an entity that is about to be removed.
    async fn pre_remove(&self, realm: &Realm, target: RemovalTarget<'_>) -> StorageResult<()>;
}
