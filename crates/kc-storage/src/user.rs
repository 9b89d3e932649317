//! Local user store contract.

use std::collections::HashMap;

use async_trait::async_trait;
use kc_model::{Client, FederatedIdentity, Group, Realm, Role, User, UserConsent};

use crate::cache::OnUserCache;
use crate::error::StorageResult;
use crate::removal::RemovalTarget;

/// Provider for the realm's local user store.
///
/// The local store holds canonical local users as well as users imported
/// from external providers. Paged methods take `first` as a zero-based
/// offset and `max` as the page size; `usize::MAX` means no upper bound.
#[async_trait]
pub trait UserProvider: Send + Sync {
    // === Registration ===

    /// Creates a user with a generated id.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Duplicate` if a user with the same username exists.
    async fn add_user(&self, realm: &Realm, username: &str) -> StorageResult<User>;

    /// Removes a user, returning whether it existed.
    async fn remove_user(&self, realm: &Realm, user: &User) -> StorageResult<bool>;

    /// Grants a role to every local user of the realm.
    async fn grant_to_all_users(&self, realm: &Realm, role: &Role) -> StorageResult<()>;

    // === Lookup ===

    /// Gets a user by ID.
    async fn get_user_by_id(&self, realm: &Realm, id: &str) -> StorageResult<Option<User>>;

    /// Gets a user by username.
    async fn get_user_by_username(&self, realm: &Realm, username: &str)
        -> StorageResult<Option<User>>;

    /// Gets a user by email.
    async fn get_user_by_email(&self, realm: &Realm, email: &str) -> StorageResult<Option<User>>;

    /// Gets the local user linked to an identity provider account.
    async fn get_user_by_federated_identity(
        &self,
        realm: &Realm,
        identity: &FederatedIdentity,
    ) -> StorageResult<Option<User>>;

    /// Gets the service account user for a client.
    async fn get_service_account(&self, realm: &Realm, client: &Client)
        -> StorageResult<Option<User>>;

    // === Query ===

    /// Lists users in the store's natural order.
    async fn get_users(
        &self,
        realm: &Realm,
        first: usize,
        max: usize,
        include_service_accounts: bool,
    ) -> StorageResult<Vec<User>>;

    /// Counts the users of the realm.
    async fn get_users_count(&self, realm: &Realm) -> StorageResult<usize>;

    /// Searches users by a free-text string (username, email, first and last name).
    async fn search_for_user(
        &self,
        realm: &Realm,
        search: &str,
        first: usize,
        max: usize,
    ) -> StorageResult<Vec<User>>;

    /// Searches users matching every given profile field.
    async fn search_for_user_by_attributes(
        &self,
        realm: &Realm,
        attributes: &HashMap<String, String>,
        first: usize,
        max: usize,
    ) -> StorageResult<Vec<User>>;

    /// Finds users holding a custom attribute value.
    async fn search_for_user_by_user_attribute(
        &self,
        realm: &Realm,
        name: &str,
        value: &str,
    ) -> StorageResult<Vec<User>>;

    /// Lists members of a group.
    async fn get_group_members(
        &self,
        realm: &Realm,
        group: &Group,
        first: usize,
        max: usize,
    ) -> StorageResult<Vec<User>>;

    // === Federated identities ===

    /// Links an identity provider account to a user.
    async fn add_federated_identity(
        &self,
        realm: &Realm,
        user: &User,
        identity: &FederatedIdentity,
    ) -> StorageResult<()>;

    /// Updates a stored identity provider link.
    async fn update_federated_identity(
        &self,
        realm: &Realm,
        user: &User,
        identity: &FederatedIdentity,
    ) -> StorageResult<()>;

    /// Removes an identity provider link, returning whether it existed.
    async fn remove_federated_identity(
        &self,
        realm: &Realm,
        user: &User,
        identity_provider: &str,
    ) -> StorageResult<bool>;

    /// Lists a user's identity provider links.
    async fn get_federated_identities(
        &self,
        realm: &Realm,
        user: &User,
    ) -> StorageResult<Vec<FederatedIdentity>>;

    /// Gets a user's link to one identity provider.
    async fn get_federated_identity(
        &self,
        realm: &Realm,
        user: &User,
        identity_provider: &str,
    ) -> StorageResult<Option<FederatedIdentity>>;

    // === Consents ===

    /// Records a consent.
    async fn add_consent(&self, realm: &Realm, user: &User, consent: &UserConsent)
        -> StorageResult<()>;

    /// Gets the consent a user granted to a client.
    async fn get_consent_by_client(
        &self,
        realm: &Realm,
        user: &User,
        client_id: uuid::Uuid,
    ) -> StorageResult<Option<UserConsent>>;

    /// Lists a user's consents.
    async fn get_consents(&self, realm: &Realm, user: &User) -> StorageResult<Vec<UserConsent>>;

    /// Replaces a stored consent.
    async fn update_consent(
        &self,
        realm: &Realm,
        user: &User,
        consent: &UserConsent,
    ) -> StorageResult<()>;

    /// Revokes the consent granted to a client, returning whether it existed.
    async fn revoke_consent_for_client(
        &self,
        realm: &Realm,
        user: &User,
        client_id: uuid::Uuid,
    ) -> StorageResult<bool>;

    // === Lifecycle ===

    /// Drops local data referencing an entity that is about to be removed.
    async fn pre_remove(&self, realm: &Realm, target: RemovalTarget<'_>) -> StorageResult<()>;

    /// Returns the store's cache hook, if it has one.
    fn as_cache_hook(&self) -> Option<&dyn OnUserCache> {
        None
    }
}
