//! Resolution of a realm's user storage providers.
//!
//! Descriptors come from the realm configuration; factories come from the
//! session's [`SpiRegistry`](kc_spi::SpiRegistry). Instances are created on
//! first use, cached in the session under the descriptor id and enlisted for
//! close, so a session never sees two instances of one descriptor and never
//! shares an instance with another session.

use std::sync::Arc;

use kc_model::Realm;
use kc_spi::{KeycloakSession, Provider, SpiError};
use kc_storage::OnUserCache;

use crate::config::UserStorageProviderModel;
use crate::error::{FederationError, FederationResult};
use crate::provider::{
    lookup_factory, Capability, ImportedUserValidation, UserLookupProvider, UserQueryProvider,
    UserRegistrationProvider, UserStorageLifecycle, UserStorageProvider,
};

const INSTANCE_KEY_PREFIX: &str = "user-storage:";

/// A provider instance together with the descriptor it was created from.
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    model: UserStorageProviderModel,
    instance: Arc<dyn UserStorageProvider>,
}

impl ResolvedProvider {
    /// Descriptor id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.model.id()
    }

    /// The descriptor.
    #[must_use]
    pub const fn model(&self) -> &UserStorageProviderModel {
        &self.model
    }

    /// The provider instance.
    #[must_use]
    pub const fn instance(&self) -> &Arc<dyn UserStorageProvider> {
        &self.instance
    }

    /// Lookup capability, required.
    ///
    /// ## Errors
    ///
    /// Returns `MissingCapability` if the provider does not implement it.
    pub fn lookup(&self) -> FederationResult<&dyn UserLookupProvider> {
        self.instance
            .as_lookup()
            .ok_or_else(|| self.missing(Capability::Lookup))
    }

    /// Query capability, required.
    ///
    /// ## Errors
    ///
    /// Returns `MissingCapability` if the provider does not implement it.
    pub fn query(&self) -> FederationResult<&dyn UserQueryProvider> {
        self.instance
            .as_query()
            .ok_or_else(|| self.missing(Capability::Query))
    }

    /// Registration capability, required.
    ///
    /// ## Errors
    ///
    /// Returns `MissingCapability` if the provider does not implement it.
    pub fn registration(&self) -> FederationResult<&dyn UserRegistrationProvider> {
        self.instance
            .as_registration()
            .ok_or_else(|| self.missing(Capability::Registration))
    }

    /// Lifecycle capability, required.
    ///
    /// ## Errors
    ///
    /// Returns `MissingCapability` if the provider does not implement it.
    pub fn lifecycle(&self) -> FederationResult<&dyn UserStorageLifecycle> {
        self.instance
            .as_lifecycle()
            .ok_or_else(|| self.missing(Capability::Lifecycle))
    }

    /// Import validation capability, optional.
    #[must_use]
    pub fn import_validation(&self) -> Option<&dyn ImportedUserValidation> {
        self.instance.as_import_validation()
    }

    /// Cache hook capability, optional.
    #[must_use]
    pub fn cache_hook(&self) -> Option<&dyn OnUserCache> {
        self.instance.as_cache_hook()
    }

    fn missing(&self, capability: Capability) -> FederationError {
        FederationError::missing_capability(self.id(), capability)
    }
}

/// Lists the realm's enabled user storage descriptors, by ascending priority.
///
/// Descriptors with equal priority keep their configuration order.
#[must_use]
pub fn list_descriptors(realm: &Realm) -> Vec<UserStorageProviderModel> {
    let mut models: Vec<_> = realm
        .components
        .iter()
        .filter_map(UserStorageProviderModel::from_component)
        .filter(UserStorageProviderModel::is_enabled)
        .collect();
    models.sort_by_key(UserStorageProviderModel::priority);
    models
}

/// Resolves the provider a composite id or federation link names.
///
/// ## Errors
///
/// Returns `ProviderNotFound` if the realm has no such descriptor and
/// `FactoryNotFound` if its provider type is not registered. Fails with
/// `SpiError::SessionClosed` once the session has been closed.
pub fn resolve_by_id(
    session: &KeycloakSession,
    realm: &Realm,
    provider_id: &str,
) -> FederationResult<ResolvedProvider> {
    let model = realm
        .component(provider_id)
        .and_then(UserStorageProviderModel::from_component)
        .ok_or_else(|| FederationError::ProviderNotFound(provider_id.to_string()))?;
    resolve(session, model)
}

/// Resolves every enabled provider whose factory declares `capability`,
/// in descriptor order.
///
/// ## Errors
///
/// Fails on the first descriptor whose factory is missing or whose
/// instance cannot be created, and on a closed session.
pub fn resolve_by_capability(
    session: &KeycloakSession,
    realm: &Realm,
    capability: Capability,
) -> FederationResult<Vec<ResolvedProvider>> {
    let mut resolved = Vec::new();
    for model in list_descriptors(realm) {
        let factory = lookup_factory(session.registry(), model.provider_id())
            .ok_or_else(|| FederationError::FactoryNotFound(model.provider_id().to_string()))?;
        if !factory.supports(capability) {
            continue;
        }
        resolved.push(resolve(session, model)?);
    }
    Ok(resolved)
}

/// Resolves the first enabled provider declaring `capability`.
///
/// ## Errors
///
/// As [`resolve_by_capability`].
pub fn first_by_capability(
    session: &KeycloakSession,
    realm: &Realm,
    capability: Capability,
) -> FederationResult<Option<ResolvedProvider>> {
    Ok(resolve_by_capability(session, realm, capability)?
        .into_iter()
        .next())
}

/// Drops the session's cached instance for a descriptor.
///
/// The instance stays enlisted and is still closed with the session.
pub fn evict(session: &KeycloakSession, provider_id: &str) -> bool {
    session.remove_attribute(&instance_key(provider_id))
}

/// A closed session no longer closes what it creates, so nothing is
/// resolved through it.
fn resolve(
    session: &KeycloakSession,
    model: UserStorageProviderModel,
) -> FederationResult<ResolvedProvider> {
    if session.is_closed() {
        return Err(SpiError::SessionClosed(session.id()).into());
    }

    let key = instance_key(model.id());
    if let Some(instance) = session.get_attribute::<Arc<dyn UserStorageProvider>>(&key) {
        return Ok(ResolvedProvider { model, instance });
    }

    let factory = lookup_factory(session.registry(), model.provider_id())
        .ok_or_else(|| FederationError::FactoryNotFound(model.provider_id().to_string()))?;
    let created = factory.create(session, &model)?;
    let instance = session.set_attribute_if_absent(key, Arc::clone(&created));
    if Arc::ptr_eq(&instance, &created) {
        let closeable: Arc<dyn Provider> = created;
        session.enlist_for_close(closeable);
        tracing::debug!(
            session_id = %session.id(),
            provider_id = model.id(),
            factory = model.provider_id(),
            "created user storage provider instance"
        );
    }
    Ok(ResolvedProvider { model, instance })
}

fn instance_key(provider_id: &str) -> String {
    format!("{INSTANCE_KEY_PREFIX}{provider_id}")
}
