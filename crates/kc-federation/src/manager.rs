//! The user storage router.
//!
//! [`UserStorageManager`] is the single entry point through which callers
//! read and mutate users. It decides, per operation, whether the local
//! store, one external provider, every provider, or the federated attribute
//! store is involved, and post-processes every returned user through the
//! owning provider's import validation.
//!
//! Calls are made one after another on the calling task; nothing is spawned.
//! Broadcasts stop at the first failure and leave the effects of the stores
//! already visited in place.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use kc_model::{Client, ComponentModel, FederatedIdentity, Group, Realm, Role, User, UserConsent};
use kc_spi::KeycloakSession;
use kc_storage::{CachedUser, RemovalTarget, UserFederatedStorageProvider, UserProvider};
use uuid::Uuid;

use crate::config::UserStorageSettings;
use crate::error::{FederationError, FederationResult};
use crate::provider::{Capability, UserQueryProvider, USER_STORAGE_SPI};
use crate::query::{merge_window, PagedSource, UNLIMITED};
use crate::registry::{self, ResolvedProvider};
use crate::storage_id::StorageId;

/// Routes user operations across the local store, the configured external
/// providers and the federated attribute store.
///
/// The manager itself is stateless apart from its collaborators; provider
/// instances live in the [`KeycloakSession`] passed to every call.
#[derive(Clone)]
pub struct UserStorageManager {
    local: Arc<dyn UserProvider>,
    federated: Option<Arc<dyn UserFederatedStorageProvider>>,
    settings: UserStorageSettings,
}

impl fmt::Debug for UserStorageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserStorageManager")
            .field("federated", &self.federated.is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl UserStorageManager {
    /// Creates a router over a local store.
    #[must_use]
    pub fn new(local: Arc<dyn UserProvider>, settings: UserStorageSettings) -> Self {
        Self {
            local,
            federated: None,
            settings,
        }
    }

    /// Adds the federated attribute store.
    #[must_use]
    pub fn with_federated_storage(mut self, federated: Arc<dyn UserFederatedStorageProvider>) -> Self {
        self.federated = Some(federated);
        self
    }

    /// The local store.
    #[must_use]
    pub fn local_storage(&self) -> &Arc<dyn UserProvider> {
        &self.local
    }

    /// The federated attribute store, if configured.
    #[must_use]
    pub fn federated_storage(&self) -> Option<&Arc<dyn UserFederatedStorageProvider>> {
        self.federated.as_ref()
    }

    /// Router settings.
    #[must_use]
    pub const fn settings(&self) -> &UserStorageSettings {
        &self.settings
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Gets a user by id.
    ///
    /// Local ids are served by the local store; tagged ids by the owning
    /// provider, which must support lookups.
    ///
    /// ## Errors
    ///
    /// Fails if the owning provider cannot be resolved or lacks the lookup
    /// capability, or if a store fails.
    pub async fn get_user_by_id(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        id: &str,
    ) -> FederationResult<Option<User>> {
        let user = self.lookup_raw(session, realm, id).await?;
        self.validate_optional(session, realm, user).await
    }

    /// Gets a user by username, trying the local store first and then each
    /// lookup-capable provider in order.
    ///
    /// ## Errors
    ///
    /// Fails if a provider cannot be resolved or a store fails.
    pub async fn get_user_by_username(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        username: &str,
    ) -> FederationResult<Option<User>> {
        if let Some(user) = self.local.get_user_by_username(realm, username).await? {
            return self.validate(session, realm, user).await;
        }
        for provider in registry::resolve_by_capability(session, realm, Capability::Lookup)? {
            if let Some(user) = provider.lookup()?.get_user_by_username(realm, username).await? {
                return self.validate(session, realm, user).await;
            }
        }
        Ok(None)
    }

    /// Gets a user by email, trying the local store first and then each
    /// lookup-capable provider in order.
    ///
    /// ## Errors
    ///
    /// Fails if a provider cannot be resolved or a store fails.
    pub async fn get_user_by_email(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        email: &str,
    ) -> FederationResult<Option<User>> {
        if let Some(user) = self.local.get_user_by_email(realm, email).await? {
            return self.validate(session, realm, user).await;
        }
        for provider in registry::resolve_by_capability(session, realm, Capability::Lookup)? {
            if let Some(user) = provider.lookup()?.get_user_by_email(realm, email).await? {
                return self.validate(session, realm, user).await;
            }
        }
        Ok(None)
    }

    /// Gets the user linked to an identity provider account.
    ///
    /// Checks the local store, then the federated attribute store, then each
    /// lookup-capable provider.
    ///
    /// ## Errors
    ///
    /// Fails if a provider cannot be resolved or a store fails.
    pub async fn get_user_by_federated_identity(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        identity: &FederatedIdentity,
    ) -> FederationResult<Option<User>> {
        if let Some(user) = self
            .local
            .get_user_by_federated_identity(realm, identity)
            .await?
        {
            return self.validate(session, realm, user).await;
        }
        if let Some(federated) = &self.federated {
            if let Some(id) = federated
                .get_user_by_federated_identity(realm, identity)
                .await?
            {
                return self.get_user_by_id(session, realm, &id).await;
            }
        }
        for provider in registry::resolve_by_capability(session, realm, Capability::Lookup)? {
            if let Some(user) = provider
                .lookup()?
                .get_user_by_federated_identity(realm, identity)
                .await?
            {
                return self.validate(session, realm, user).await;
            }
        }
        Ok(None)
    }

    /// Gets the service account user of a client. Service accounts are
    /// always local.
    ///
    /// ## Errors
    ///
    /// Fails if the local store fails.
    pub async fn get_service_account(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        client: &Client,
    ) -> FederationResult<Option<User>> {
        let user = self.local.get_service_account(realm, client).await?;
        self.validate_optional(session, realm, user).await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Lists users across every store within the window `(first, max)`.
    ///
    /// ## Errors
    ///
    /// Fails if a provider cannot be resolved or a store fails.
    pub async fn get_users(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        first: usize,
        max: usize,
        include_service_accounts: bool,
    ) -> FederationResult<Vec<User>> {
        let query = UserQuery::Users {
            include_service_accounts,
        };
        self.query(session, realm, &query, first, max).await
    }

    /// Lists every user, service accounts excluded.
    ///
    /// ## Errors
    ///
    /// As [`get_users`](Self::get_users).
    pub async fn get_all_users(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
    ) -> FederationResult<Vec<User>> {
        self.get_users(session, realm, 0, UNLIMITED, false).await
    }

    /// Searches users by a free-text string.
    ///
    /// ## Errors
    ///
    /// Fails if a provider cannot be resolved or a store fails.
    pub async fn search_for_user(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        search: &str,
        first: usize,
        max: usize,
    ) -> FederationResult<Vec<User>> {
        self.query(session, realm, &UserQuery::Search(search), first, max)
            .await
    }

    /// Searches users matching every given profile field.
    ///
    /// ## Errors
    ///
    /// Fails if a provider cannot be resolved or a store fails.
    pub async fn search_for_user_by_attributes(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        attributes: &HashMap<String, String>,
        first: usize,
        max: usize,
    ) -> FederationResult<Vec<User>> {
        self.query(session, realm, &UserQuery::Attributes(attributes), first, max)
            .await
    }

    /// Finds every user holding an attribute value.
    ///
    /// Users whose attributes live in the federated attribute store are
    /// included.
    ///
    /// ## Errors
    ///
    /// Fails if a provider cannot be resolved or a store fails.
    pub async fn search_for_user_by_user_attribute(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        name: &str,
        value: &str,
    ) -> FederationResult<Vec<User>> {
        let query = UserQuery::UserAttribute { name, value };
        self.query(session, realm, &query, 0, UNLIMITED).await
    }

    /// Lists members of a group within the window `(first, max)`.
    ///
    /// Memberships recorded in the federated attribute store are included.
    ///
    /// ## Errors
    ///
    /// Fails if a provider cannot be resolved or a store fails.
    pub async fn get_group_members(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        group: &Group,
        first: usize,
        max: usize,
    ) -> FederationResult<Vec<User>> {
        self.query(session, realm, &UserQuery::GroupMembers(group), first, max)
            .await
    }

    /// Counts users in the local store and every query-capable provider.
    ///
    /// ## Errors
    ///
    /// Fails if a provider cannot be resolved or a store fails.
    pub async fn get_users_count(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
    ) -> FederationResult<usize> {
        let mut count = self.local.get_users_count(realm).await?;
        for provider in registry::resolve_by_capability(session, realm, Capability::Query)? {
            count = count.saturating_add(provider.query()?.get_users_count(realm).await?);
        }
        Ok(count)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Creates a user in the first registration-capable provider, or in the
    /// local store (with a lower-cased username) if there is none.
    ///
    /// ## Errors
    ///
    /// Fails if a provider cannot be resolved or the store refuses the user.
    pub async fn add_user(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        username: &str,
    ) -> FederationResult<User> {
        if let Some(provider) =
            registry::first_by_capability(session, realm, Capability::Registration)?
        {
            tracing::debug!(
                realm = %realm.name,
                provider_id = provider.id(),
                username,
                "adding user to storage provider"
            );
            return provider.registration()?.add_user(realm, username).await;
        }
        Ok(self.local.add_user(realm, &username.to_lowercase()).await?)
    }

    /// Removes a user from the store that owns it.
    ///
    /// The owner is resolved first. Supplementary data in the federated
    /// attribute store is dropped only once the owner is known to accept the
    /// removal, and before the owner removes the user.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidUser` for a user that does not belong to `realm`, and
    /// fails if the owning provider cannot be resolved or cannot remove users.
    /// Nothing is deleted in either case.
    pub async fn remove_user(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        user: &User,
    ) -> FederationResult<bool> {
        ensure_valid_user(realm, user)?;

        let owner = match StorageId::parse(&user.id).provider_id() {
            None => None,
            Some(provider_id) => Some(registry::resolve_by_id(session, realm, provider_id)?),
        };
        let registration = owner.as_ref().map(|p| p.registration()).transpose()?;

        if let Some(federated) = &self.federated {
            federated.pre_remove_user(realm, &user.id).await?;
        }

        match registration {
            None => Ok(self.local.remove_user(realm, user).await?),
            Some(registration) => registration.remove_user(realm, user).await,
        }
    }

    /// Grants a role to every user of the local store and of every
    /// registration-capable provider.
    ///
    /// ## Errors
    ///
    /// Stops at the first store that fails.
    pub async fn grant_to_all_users(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        role: &Role,
    ) -> FederationResult<()> {
        self.local.grant_to_all_users(realm, role).await?;
        for provider in registry::resolve_by_capability(session, realm, Capability::Registration)? {
            provider
                .registration()?
                .grant_to_all_users(realm, role)
                .await
                .inspect_err(|err| {
                    tracing::warn!(
                        realm = %realm.name,
                        provider_id = provider.id(),
                        role = %role.name,
                        error = %err,
                        "grant to all users failed"
                    );
                })?;
        }
        Ok(())
    }

    // ========================================================================
    // Federated identities
    // ========================================================================

    /// Links an identity provider account to a user.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidUser` for an unusable user, and
    /// `FederatedStorageUnavailable` for an externally owned user when no
    /// federated attribute store is configured.
    pub async fn add_federated_identity(
        &self,
        realm: &Realm,
        user: &User,
        identity: &FederatedIdentity,
    ) -> FederationResult<()> {
        ensure_valid_user(realm, user)?;
        if StorageId::is_local_storage(user) {
            Ok(self.local.add_federated_identity(realm, user, identity).await?)
        } else {
            Ok(self
                .require_federated()?
                .add_federated_identity(realm, &user.id, identity)
                .await?)
        }
    }

    /// Updates an identity provider link.
    ///
    /// ## Errors
    ///
    /// As [`add_federated_identity`](Self::add_federated_identity).
    pub async fn update_federated_identity(
        &self,
        realm: &Realm,
        user: &User,
        identity: &FederatedIdentity,
    ) -> FederationResult<()> {
        ensure_valid_user(realm, user)?;
        if StorageId::is_local_storage(user) {
            Ok(self
                .local
                .update_federated_identity(realm, user, identity)
                .await?)
        } else {
            Ok(self
                .require_federated()?
                .update_federated_identity(realm, &user.id, identity)
                .await?)
        }
    }

    /// Removes an identity provider link, returning whether it existed.
    ///
    /// ## Errors
    ///
    /// As [`add_federated_identity`](Self::add_federated_identity).
    pub async fn remove_federated_identity(
        &self,
        realm: &Realm,
        user: &User,
        identity_provider: &str,
    ) -> FederationResult<bool> {
        ensure_valid_user(realm, user)?;
        if StorageId::is_local_storage(user) {
            Ok(self
                .local
                .remove_federated_identity(realm, user, identity_provider)
                .await?)
        } else {
            Ok(self
                .require_federated()?
                .remove_federated_identity(realm, &user.id, identity_provider)
                .await?)
        }
    }

    /// Lists a user's identity provider links.
    ///
    /// For local users, links held by the local store and by the federated
    /// attribute store are combined without duplicates.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidUser` for an unusable user, or a store failure.
    pub async fn get_federated_identities(
        &self,
        realm: &Realm,
        user: &User,
    ) -> FederationResult<Vec<FederatedIdentity>> {
        ensure_valid_user(realm, user)?;
        let mut identities = Vec::new();
        if StorageId::is_local_storage(user) {
            identities = self.local.get_federated_identities(realm, user).await?;
        }
        if let Some(federated) = &self.federated {
            for identity in federated.get_federated_identities(realm, &user.id).await? {
                if !identities.contains(&identity) {
                    identities.push(identity);
                }
            }
        }
        Ok(identities)
    }

    /// Gets a user's link to one identity provider.
    ///
    /// For local users the local store is checked before the federated
    /// attribute store.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidUser` for an unusable user, or a store failure.
    pub async fn get_federated_identity(
        &self,
        realm: &Realm,
        user: &User,
        identity_provider: &str,
    ) -> FederationResult<Option<FederatedIdentity>> {
        ensure_valid_user(realm, user)?;
        if StorageId::is_local_storage(user) {
            if let Some(identity) = self
                .local
                .get_federated_identity(realm, user, identity_provider)
                .await?
            {
                return Ok(Some(identity));
            }
        }
        match &self.federated {
            Some(federated) => Ok(federated
                .get_federated_identity(realm, &user.id, identity_provider)
                .await?),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Consents
    // ========================================================================

    /// Records a consent.
    ///
    /// ## Errors
    ///
    /// As [`add_federated_identity`](Self::add_federated_identity).
    pub async fn add_consent(
        &self,
        realm: &Realm,
        user: &User,
        consent: &UserConsent,
    ) -> FederationResult<()> {
        ensure_valid_user(realm, user)?;
        if StorageId::is_local_storage(user) {
            Ok(self.local.add_consent(realm, user, consent).await?)
        } else {
            Ok(self
                .require_federated()?
                .add_consent(realm, &user.id, consent)
                .await?)
        }
    }

    /// Gets the consent a user granted to a client.
    ///
    /// ## Errors
    ///
    /// As [`add_federated_identity`](Self::add_federated_identity).
    pub async fn get_consent_by_client(
        &self,
        realm: &Realm,
        user: &User,
        client_id: Uuid,
    ) -> FederationResult<Option<UserConsent>> {
        ensure_valid_user(realm, user)?;
        if StorageId::is_local_storage(user) {
            Ok(self.local.get_consent_by_client(realm, user, client_id).await?)
        } else {
            Ok(self
                .require_federated()?
                .get_consent_by_client(realm, &user.id, client_id)
                .await?)
        }
    }

    /// Lists a user's consents.
    ///
    /// ## Errors
    ///
    /// As [`add_federated_identity`](Self::add_federated_identity).
    pub async fn get_consents(
        &self,
        realm: &Realm,
        user: &User,
    ) -> FederationResult<Vec<UserConsent>> {
        ensure_valid_user(realm, user)?;
        if StorageId::is_local_storage(user) {
            Ok(self.local.get_consents(realm, user).await?)
        } else {
            Ok(self
                .require_federated()?
                .get_consents(realm, &user.id)
                .await?)
        }
    }

    /// Replaces a stored consent.
    ///
    /// ## Errors
    ///
    /// As [`add_federated_identity`](Self::add_federated_identity).
    pub async fn update_consent(
        &self,
        realm: &Realm,
        user: &User,
        consent: &UserConsent,
    ) -> FederationResult<()> {
        ensure_valid_user(realm, user)?;
        if StorageId::is_local_storage(user) {
            Ok(self.local.update_consent(realm, user, consent).await?)
        } else {
            Ok(self
                .require_federated()?
                .update_consent(realm, &user.id, consent)
                .await?)
        }
    }

    /// Revokes the consent granted to a client, returning whether it existed.
    ///
    /// ## Errors
    ///
    /// As [`add_federated_identity`](Self::add_federated_identity).
    pub async fn revoke_consent_for_client(
        &self,
        realm: &Realm,
        user: &User,
        client_id: Uuid,
    ) -> FederationResult<bool> {
        ensure_valid_user(realm, user)?;
        if StorageId::is_local_storage(user) {
            Ok(self
                .local
                .revoke_consent_for_client(realm, user, client_id)
                .await?)
        } else {
            Ok(self
                .require_federated()?
                .revoke_consent_for_client(realm, &user.id, client_id)
                .await?)
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Announces the removal of the realm to every store.
    ///
    /// ## Errors
    ///
    /// Stops at the first store that fails; earlier stores keep their
    /// changes.
    pub async fn pre_remove_realm(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
    ) -> FederationResult<()> {
        self.broadcast(session, realm, RemovalTarget::Realm, FederatedOrder::Last)
            .await
    }

    /// Announces the removal of a group to every store.
    ///
    /// ## Errors
    ///
    /// As [`pre_remove_realm`](Self::pre_remove_realm).
    pub async fn pre_remove_group(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        group: &Group,
    ) -> FederationResult<()> {
        self.broadcast(session, realm, RemovalTarget::Group(group), FederatedOrder::Last)
            .await
    }

    /// Announces the removal of a role to every store.
    ///
    /// ## Errors
    ///
    /// As [`pre_remove_realm`](Self::pre_remove_realm).
    pub async fn pre_remove_role(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        role: &Role,
    ) -> FederationResult<()> {
        self.broadcast(session, realm, RemovalTarget::Role(role), FederatedOrder::Last)
            .await
    }

    /// Announces the removal of a client to every store.
    ///
    /// ## Errors
    ///
    /// As [`pre_remove_realm`](Self::pre_remove_realm).
    pub async fn pre_remove_client(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        client: &Client,
    ) -> FederationResult<()> {
        self.broadcast(
            session,
            realm,
            RemovalTarget::Client(client),
            FederatedOrder::AfterLocal,
        )
        .await
    }

    /// Announces the removal of a user storage descriptor.
    ///
    /// Components of other types are ignored. The session's cached instance
    /// of the removed provider is evicted afterwards.
    ///
    /// ## Errors
    ///
    /// As [`pre_remove_realm`](Self::pre_remove_realm).
    pub async fn pre_remove_component(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        component: &ComponentModel,
    ) -> FederationResult<()> {
        if component.provider_type != USER_STORAGE_SPI {
            return Ok(());
        }
        self.broadcast(
            session,
            realm,
            RemovalTarget::Component(component),
            FederatedOrder::AfterLocal,
        )
        .await?;
        if registry::evict(session, &component.id) {
            tracing::debug!(
                realm = %realm.name,
                provider_id = %component.id,
                "evicted removed user storage provider"
            );
        }
        Ok(())
    }

    /// Lets the store owning a user enrich or veto its cache entry.
    ///
    /// Local users go to the local store's hook, other users to the owning
    /// provider's hook. A missing hook, or a provider that is no longer
    /// configured, makes this a no-op.
    ///
    /// ## Errors
    ///
    /// Fails if the owning provider's factory is missing or cannot create
    /// an instance.
    pub fn on_cache(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        cached: &mut CachedUser,
        delegate: &User,
    ) -> FederationResult<()> {
        let Some(provider_id) = StorageId::resolve_provider_id(&cached.user) else {
            if let Some(hook) = self.local.as_cache_hook() {
                hook.on_cache(realm, cached, delegate);
            }
            return Ok(());
        };

        let provider = match registry::resolve_by_id(session, realm, &provider_id) {
            Ok(provider) => provider,
            Err(FederationError::ProviderNotFound(_)) => {
                tracing::debug!(
                    realm = %realm.name,
                    provider_id = %provider_id,
                    user_id = cached.id(),
                    "cached user belongs to a removed provider"
                );
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        if let Some(hook) = provider.cache_hook() {
            hook.on_cache(realm, cached, delegate);
        }
        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Runs a query through the merge engine and validates the results.
    async fn query(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        query: &UserQuery<'_>,
        first: usize,
        max: usize,
    ) -> FederationResult<Vec<User>> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let providers = registry::resolve_by_capability(session, realm, Capability::Query)?;
        let local = QuerySource::new(self, session, realm, query, Store::Local(self.local.as_ref()));
        let users = if providers.is_empty() {
            local.page(first, max).await?
        } else {
            let mut sources = vec![local];
            for provider in &providers {
                sources.push(QuerySource::new(
                    self,
                    session,
                    realm,
                    query,
                    Store::Provider(provider.query()?),
                ));
            }
            if let Some(federated) = &self.federated {
                sources.push(QuerySource::new(
                    self,
                    session,
                    realm,
                    query,
                    Store::Federated(federated.as_ref()),
                ));
            }
            let sources: Vec<&dyn PagedSource<User>> = sources
                .iter()
                .map(|source| source as &dyn PagedSource<User>)
                .collect();
            merge_window(&sources, first, max, self.settings.query_batch_size).await?
        };

        self.validate_all(session, realm, users).await
    }

    /// Looks a user up by id without import validation.
    async fn lookup_raw(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        id: &str,
    ) -> FederationResult<Option<User>> {
        match StorageId::parse(id).provider_id() {
            None => Ok(self.local.get_user_by_id(realm, id).await?),
            Some(provider_id) => {
                let provider = registry::resolve_by_id(session, realm, provider_id)?;
                provider.lookup()?.get_user_by_id(realm, id).await
            }
        }
    }

    /// Resolves user ids held by the federated attribute store.
    async fn resolve_ids(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        ids: Vec<String>,
    ) -> FederationResult<Vec<User>> {
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(user) = self.lookup_raw(session, realm, &id).await? {
                users.push(user);
            }
        }
        Ok(users)
    }

    /// Gives the provider an imported user is linked to a chance to refresh
    /// or invalidate it.
    async fn validate(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        user: User,
    ) -> FederationResult<Option<User>> {
        let Some(link) = user.federation_link.clone() else {
            return Ok(Some(user));
        };
        let provider = match registry::resolve_by_id(session, realm, &link) {
            Ok(provider) => provider,
            Err(err) => {
                tracing::debug!(
                    realm = %realm.name,
                    provider_id = %link,
                    user_id = %user.id,
                    error = %err,
                    "skipping import validation"
                );
                return Ok(Some(user));
            }
        };
        match provider.import_validation() {
            Some(validation) => validation.validate(realm, user).await,
            None => Ok(Some(user)),
        }
    }

    async fn validate_optional(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        user: Option<User>,
    ) -> FederationResult<Option<User>> {
        match user {
            Some(user) => self.validate(session, realm, user).await,
            None => Ok(None),
        }
    }

    /// Validates a batch, dropping invalidated users and keeping order.
    async fn validate_all(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        users: Vec<User>,
    ) -> FederationResult<Vec<User>> {
        let mut valid = Vec::with_capacity(users.len());
        for user in users {
            if let Some(user) = self.validate(session, realm, user).await? {
                valid.push(user);
            }
        }
        Ok(valid)
    }

    async fn broadcast(
        &self,
        session: &KeycloakSession,
        realm: &Realm,
        target: RemovalTarget<'_>,
        order: FederatedOrder,
    ) -> FederationResult<()> {
        self.local
            .pre_remove(realm, target)
            .await
            .inspect_err(|err| log_broadcast_failure(realm, target, "local", err))?;

        if order == FederatedOrder::AfterLocal {
            self.pre_remove_federated(realm, target).await?;
        }

        let providers: Vec<ResolvedProvider> =
            registry::resolve_by_capability(session, realm, Capability::Lifecycle)?;
        for provider in &providers {
            provider
                .lifecycle()?
                .pre_remove(realm, target)
                .await
                .inspect_err(|err| log_broadcast_failure(realm, target, provider.id(), err))?;
        }

        if order == FederatedOrder::Last {
            self.pre_remove_federated(realm, target).await?;
        }
        Ok(())
    }

    async fn pre_remove_federated(
        &self,
        realm: &Realm,
        target: RemovalTarget<'_>,
    ) -> FederationResult<()> {
        if let Some(federated) = &self.federated {
            federated
                .pre_remove(realm, target)
                .await
                .inspect_err(|err| log_broadcast_failure(realm, target, "federated", err))?;
        }
        Ok(())
    }

    fn require_federated(&self) -> FederationResult<&dyn UserFederatedStorageProvider> {
        self.federated
            .as_deref()
            .ok_or(FederationError::FederatedStorageUnavailable)
    }
}

/// Rejects users that cannot be routed within `realm`.
fn ensure_valid_user(realm: &Realm, user: &User) -> FederationResult<()> {
    if user.id.is_empty() {
        return Err(FederationError::invalid_user("user has no id"));
    }
    if user.realm_id != realm.id {
        return Err(FederationError::invalid_user(format!(
            "user {} does not belong to realm {}",
            user.id, realm.name
        )));
    }
    Ok(())
}

fn log_broadcast_failure(
    realm: &Realm,
    target: RemovalTarget<'_>,
    store: &str,
    err: &impl fmt::Display,
) {
    tracing::warn!(
        realm = %realm.name,
        target = target.kind(),
        store,
        error = %err,
        "pre-remove failed; stores already notified keep their changes"
    );
}

/// Where the federated attribute store sits in a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FederatedOrder {
    /// Right after the local store, before providers.
    AfterLocal,
    /// After every provider.
    Last,
}

// ============================================================================
// Query sources
// ============================================================================

/// A query the merge engine runs against every store.
#[derive(Debug, Clone, Copy)]
enum UserQuery<'a> {
    Users { include_service_accounts: bool },
    Search(&'a str),
    Attributes(&'a HashMap<String, String>),
    UserAttribute { name: &'a str, value: &'a str },
    GroupMembers(&'a Group),
}

#[derive(Clone, Copy)]
enum Store<'a> {
    Local(&'a dyn UserProvider),
    Provider(&'a dyn UserQueryProvider),
    Federated(&'a dyn UserFederatedStorageProvider),
}

/// One store answering one query.
struct QuerySource<'a> {
    manager: &'a UserStorageManager,
    session: &'a KeycloakSession,
    realm: &'a Realm,
    query: &'a UserQuery<'a>,
    store: Store<'a>,
}

impl<'a> QuerySource<'a> {
    const fn new(
        manager: &'a UserStorageManager,
        session: &'a KeycloakSession,
        realm: &'a Realm,
        query: &'a UserQuery<'a>,
        store: Store<'a>,
    ) -> Self {
        Self {
            manager,
            session,
            realm,
            query,
            store,
        }
    }
}

#[async_trait]
impl<'a> PagedSource<User> for QuerySource<'a> {
    async fn page(&self, first: usize, max: usize) -> FederationResult<Vec<User>> {
        let realm = self.realm;
        match (self.store, *self.query) {
            (Store::Local(local), UserQuery::Users { include_service_accounts }) => Ok(local
                .get_users(realm, first, max, include_service_accounts)
                .await?),
            (Store::Local(local), UserQuery::Search(search)) => {
                Ok(local.search_for_user(realm, search, first, max).await?)
            }
            (Store::Local(local), UserQuery::Attributes(attributes)) => Ok(local
                .search_for_user_by_attributes(realm, attributes, first, max)
                .await?),
            (Store::Local(local), UserQuery::UserAttribute { name, value }) => {
                let users = local
                    .search_for_user_by_user_attribute(realm, name, value)
                    .await?;
                Ok(slice(users, first, max))
            }
            (Store::Local(local), UserQuery::GroupMembers(group)) => {
                Ok(local.get_group_members(realm, group, first, max).await?)
            }

            (Store::Provider(provider), UserQuery::Users { .. }) => {
                provider.get_users(realm, first, max).await
            }
            (Store::Provider(provider), UserQuery::Search(search)) => {
                provider.search_for_user(realm, search, first, max).await
            }
            (Store::Provider(provider), UserQuery::Attributes(attributes)) => {
                provider
                    .search_for_user_by_attributes(realm, attributes, first, max)
                    .await
            }
            (Store::Provider(provider), UserQuery::UserAttribute { name, value }) => {
                let users = provider
                    .search_for_user_by_user_attribute(realm, name, value)
                    .await?;
                Ok(slice(users, first, max))
            }
            (Store::Provider(provider), UserQuery::GroupMembers(group)) => {
                provider.get_group_members(realm, group, first, max).await
            }

            (Store::Federated(federated), UserQuery::UserAttribute { name, value }) => {
                let ids = federated
                    .get_users_by_user_attribute(realm, name, value)
                    .await?;
                self.manager
                    .resolve_ids(self.session, realm, slice(ids, first, max))
                    .await
            }
            (Store::Federated(federated), UserQuery::GroupMembers(group)) => {
                let ids = federated.get_membership(realm, group, first, max).await?;
                self.manager.resolve_ids(self.session, realm, ids).await
            }
            (Store::Federated(_), _) => Ok(Vec::new()),
        }
    }
}

/// Applies a window to a result set that a store could not page itself.
fn slice<T>(rows: Vec<T>, first: usize, max: usize) -> Vec<T> {
    rows.into_iter().skip(first).take(max).collect()
}
