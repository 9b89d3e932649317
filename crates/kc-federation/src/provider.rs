//! User storage provider traits.
//!
//! An external provider (LDAP, Kerberos, a legacy database, ...) implements
//! [`UserStorageProvider`] plus any subset of the capability traits. Its
//! factory declares that subset up front, so the router can select
//! providers per operation without probing instances.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use kc_model::{FederatedIdentity, Group, Realm, Role, User};
use kc_spi::{KeycloakSession, Provider, ProviderFactory, Spi, SpiError, SpiRegistry};
use kc_storage::{OnUserCache, RemovalTarget};
use serde::{Deserialize, Serialize};

use crate::config::UserStorageProviderModel;
use crate::error::FederationResult;

/// Name of the user storage SPI.
pub const USER_STORAGE_SPI: &str = "user-storage";

/// The user storage extension point.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserStorageSpi;

impl Spi for UserStorageSpi {
    fn name(&self) -> &'static str {
        USER_STORAGE_SPI
    }
}

/// A capability a user storage provider may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Single-user lookups ([`UserLookupProvider`]).
    Lookup,
    /// Paged queries and counts ([`UserQueryProvider`]).
    Query,
    /// Creating and removing users ([`UserRegistrationProvider`]).
    Registration,
    /// Revalidating imported users on read ([`ImportedUserValidation`]).
    ImportValidation,
    /// User cache hook ([`OnUserCache`]).
    CacheHook,
    /// Cleanup when realm entities are removed ([`UserStorageLifecycle`]).
    Lifecycle,
}

impl Capability {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lookup => "lookup",
            Self::Query => "query",
            Self::Registration => "registration",
            Self::ImportValidation => "import-validation",
            Self::CacheHook => "cache-hook",
            Self::Lifecycle => "lifecycle",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Capability traits
// ============================================================================

/// Looks up single users in an external store.
#[async_trait]
pub trait UserLookupProvider: Send + Sync {
    /// Gets a user by its composite id.
    async fn get_user_by_id(&self, realm: &Realm, id: &str) -> FederationResult<Option<User>>;

    /// Gets a user by username.
    async fn get_user_by_username(
        &self,
        realm: &Realm,
        username: &str,
    ) -> FederationResult<Option<User>>;

    /// Gets a user by email.
    async fn get_user_by_email(&self, realm: &Realm, email: &str)
        -> FederationResult<Option<User>>;

    /// Gets the user linked to an identity provider account.
    async fn get_user_by_federated_identity(
        &self,
        _realm: &Realm,
        _identity: &FederatedIdentity,
    ) -> FederationResult<Option<User>> {
        Ok(None)
    }
}

/// Answers paged queries over an external store.
///
/// `first` is an offset into the provider's own result stream and `max` the
/// page size; `usize::MAX` means no upper bound. Results must come back in a
/// stable order so that consecutive pages line up.
#[async_trait]
pub trait UserQueryProvider: Send + Sync {
    /// Counts the provider's users.
    async fn get_users_count(&self, realm: &Realm) -> FederationResult<usize>;

    /// Lists users.
    async fn get_users(&self, realm: &Realm, first: usize, max: usize)
        -> FederationResult<Vec<User>>;

    /// Searches users by a free-text string.
    async fn search_for_user(
        &self,
        realm: &Realm,
        search: &str,
        first: usize,
        max: usize,
    ) -> FederationResult<Vec<User>>;

    /// Searches users matching every given profile field.
    async fn search_for_user_by_attributes(
        &self,
        realm: &Realm,
        attributes: &HashMap<String, String>,
        first: usize,
        max: usize,
    ) -> FederationResult<Vec<User>>;

    /// Finds users holding an attribute value.
    async fn search_for_user_by_user_attribute(
        &self,
        realm: &Realm,
        name: &str,
        value: &str,
    ) -> FederationResult<Vec<User>>;

    /// Lists members of a group.
    async fn get_group_members(
        &self,
        realm: &Realm,
        group: &Group,
        first: usize,
        max: usize,
    ) -> FederationResult<Vec<User>>;
}

/// Creates and removes users in an external store.
#[async_trait]
pub trait UserRegistrationProvider: Send + Sync {
    /// Creates a user.
    async fn add_user(&self, realm: &Realm, username: &str) -> FederationResult<User>;

    /// Removes a user, returning whether it existed.
    async fn remove_user(&self, realm: &Realm, user: &User) -> FederationResult<bool>;

    /// Grants a role to every user of the store.
    async fn grant_to_all_users(&self, _realm: &Realm, _role: &Role) -> FederationResult<()> {
        Ok(())
    }
}

/// Revalidates users imported into the local store.
///
/// Called every time an imported user is read. The provider may return the
/// user unchanged, return a refreshed copy, or return `None` if the user no
/// longer exists upstream and must not be served.
#[async_trait]
pub trait ImportedUserValidation: Send + Sync {
    /// Validates an imported user.
    async fn validate(&self, realm: &Realm, user: User) -> FederationResult<Option<User>>;
}

/// Reacts to the removal of realm entities.
#[async_trait]
pub trait UserStorageLifecycle: Send + Sync {
    /// Drops provider state referencing an entity that is about to be removed.
    async fn pre_remove(&self, realm: &Realm, target: RemovalTarget<'_>) -> FederationResult<()>;
}

// ============================================================================
// Provider and factory
// ============================================================================

/// A user storage provider instance, bound to one descriptor and one session.
///
/// Capability accessors default to `None`; an implementation overrides the
/// ones matching the capabilities its factory declares.
pub trait UserStorageProvider: Provider {
    /// Returns the lookup capability.
    fn as_lookup(&self) -> Option<&dyn UserLookupProvider> {
        None
    }

    /// Returns the query capability.
    fn as_query(&self) -> Option<&dyn UserQueryProvider> {
        None
    }

    /// Returns the registration capability.
    fn as_registration(&self) -> Option<&dyn UserRegistrationProvider> {
        None
    }

    /// Returns the import validation capability.
    fn as_import_validation(&self) -> Option<&dyn ImportedUserValidation> {
        None
    }

    /// Returns the cache hook capability.
    fn as_cache_hook(&self) -> Option<&dyn OnUserCache> {
        None
    }

    /// Returns the lifecycle capability.
    fn as_lifecycle(&self) -> Option<&dyn UserStorageLifecycle> {
        None
    }
}

/// Factory for user storage providers.
pub trait UserStorageProviderFactory: ProviderFactory {
    /// The closed set of capabilities instances of this factory implement.
    fn capabilities(&self) -> &'static [Capability];

    /// Creates a provider bound to `model` for the given session.
    ///
    /// ## Errors
    ///
    /// Returns an error if the provider cannot be created from `model`.
    fn create(
        &self,
        session: &KeycloakSession,
        model: &UserStorageProviderModel,
    ) -> Result<Arc<dyn UserStorageProvider>, SpiError>;

    /// Returns true if the factory declares `capability`.
    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

/// Shared handle under which user storage factories are registered.
pub type UserStorageFactoryHandle = Arc<dyn UserStorageProviderFactory>;

/// Registers a user storage provider factory.
pub fn register_factory(registry: &SpiRegistry, factory: UserStorageFactoryHandle) {
    let mut metadata = factory.metadata();
    metadata.id = factory.id();
    registry.register(&UserStorageSpi, metadata, factory);
}

/// Looks up the factory registered under a provider id.
#[must_use]
pub fn lookup_factory(registry: &SpiRegistry, provider_id: &str) -> Option<UserStorageFactoryHandle> {
    registry.get_factory::<UserStorageFactoryHandle>(USER_STORAGE_SPI, provider_id)
}
