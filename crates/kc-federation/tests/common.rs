//! Common test utilities and fixtures.
//!
//! Every fake writes what it is asked to do into a shared [`Journal`], so
//! tests can assert on routing and ordering across stores.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kc_federation::{
    register_factory, Capability, FederationError, FederationResult, ImportedUserValidation,
    StorageId, UserLookupProvider, UserQueryProvider, UserRegistrationProvider,
    UserStorageLifecycle, UserStorageManager, UserStorageProvider, UserStorageProviderFactory,
    UserStorageProviderModel, UserStorageSettings,
};
use kc_model::{Client, FederatedIdentity, Group, Realm, Role, User, UserConsent};
use kc_spi::{
    KeycloakSession, Provider, ProviderFactory, ProviderMetadata, SpiError, SpiRegistry,
};
use kc_storage::{
    CachedUser, OnUserCache, RemovalTarget, StorageError, StorageResult,
    UserFederatedStorageProvider, UserProvider,
};
use parking_lot::Mutex;
use uuid::Uuid;

/// Every capability.
pub const FULL: &[Capability] = &[
    Capability::Lookup,
    Capability::Query,
    Capability::Registration,
    Capability::ImportValidation,
    Capability::CacheHook,
    Capability::Lifecycle,
];

/// A directory that can only be read.
pub const READ_ONLY: &[Capability] = &[
    Capability::Lookup,
    Capability::Query,
    Capability::ImportValidation,
];

/// A directory that only answers single lookups.
pub const LOOKUP_ONLY: &[Capability] = &[Capability::Lookup];

// ============================================================================
// Journal
// ============================================================================

/// Ordered record of store calls, shared by every fake of a test.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Entries starting with `prefix`, in call order.
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.matching(prefix).len()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().iter().any(|e| e == entry)
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

// ============================================================================
// Local store
// ============================================================================

/// In-memory local user store.
#[derive(Debug, Default)]
pub struct LocalStore {
    journal: Journal,
    users: Mutex<Vec<User>>,
    identities: Mutex<Vec<(String, FederatedIdentity)>>,
    consents: Mutex<Vec<(String, UserConsent)>>,
    members: Mutex<Vec<(Uuid, String)>>,
    cache_hook: AtomicBool,
    fail_pre_remove: AtomicBool,
}

impl LocalStore {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    /// Stores a user as-is.
    pub fn insert(&self, user: User) -> User {
        self.users.lock().push(user.clone());
        user
    }

    pub fn join(&self, group: &Group, user: &User) {
        self.members.lock().push((group.id, user.id.clone()));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.users.lock().iter().any(|u| u.id == id)
    }

    pub fn enable_cache_hook(&self) {
        self.cache_hook.store(true, Ordering::SeqCst);
    }

    pub fn fail_pre_remove(&self) {
        self.fail_pre_remove.store(true, Ordering::SeqCst);
    }

    fn find(&self, realm: &Realm, predicate: impl Fn(&User) -> bool) -> Option<User> {
        self.users
            .lock()
            .iter()
            .find(|u| u.realm_id == realm.id && predicate(u))
            .cloned()
    }

    fn page(
        &self,
        realm: &Realm,
        first: usize,
        max: usize,
        predicate: impl Fn(&User) -> bool,
    ) -> Vec<User> {
        self.users
            .lock()
            .iter()
            .filter(|u| u.realm_id == realm.id && predicate(u))
            .skip(first)
            .take(max)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UserProvider for LocalStore {
    async fn add_user(&self, realm: &Realm, username: &str) -> StorageResult<User> {
        self.journal.record(format!("local.add_user:{username}"));
        if self.find(realm, |u| u.username == username).is_some() {
            return Err(StorageError::duplicate("User", "username", username));
        }
        Ok(self.insert(User::new(realm.id, username)))
    }

    async fn remove_user(&self, _realm: &Realm, user: &User) -> StorageResult<bool> {
        self.journal.record(format!("local.remove_user:{}", user.username));
        let mut users = self.users.lock();
        let before = users.len();
        users.retain(|u| u.id != user.id);
        Ok(users.len() < before)
    }

    async fn grant_to_all_users(&self, _realm: &Realm, role: &Role) -> StorageResult<()> {
        self.journal
            .record(format!("local.grant_to_all_users:{}", role.name));
        Ok(())
    }

    async fn get_user_by_id(&self, realm: &Realm, id: &str) -> StorageResult<Option<User>> {
        self.journal.record(format!("local.get_user_by_id:{id}"));
        Ok(self.find(realm, |u| u.id == id))
    }

    async fn get_user_by_username(
        &self,
        realm: &Realm,
        username: &str,
    ) -> StorageResult<Option<User>> {
        self.journal
            .record(format!("local.get_user_by_username:{username}"));
        Ok(self.find(realm, |u| u.username == username))
    }

    async fn get_user_by_email(&self, realm: &Realm, email: &str) -> StorageResult<Option<User>> {
        self.journal.record(format!("local.get_user_by_email:{email}"));
        Ok(self.find(realm, |u| u.email.as_deref() == Some(email)))
    }

    async fn get_user_by_federated_identity(
        &self,
        realm: &Realm,
        identity: &FederatedIdentity,
    ) -> StorageResult<Option<User>> {
        self.journal.record("local.get_user_by_federated_identity");
        let owner = self
            .identities
            .lock()
            .iter()
            .find(|(_, i)| {
                i.identity_provider == identity.identity_provider && i.user_id == identity.user_id
            })
            .map(|(user_id, _)| user_id.clone());
        Ok(owner.and_then(|id| self.find(realm, |u| u.id == id)))
    }

    async fn get_service_account(
        &self,
        realm: &Realm,
        client: &Client,
    ) -> StorageResult<Option<User>> {
        self.journal.record("local.get_service_account");
        Ok(self.find(realm, |u| u.service_account_client_link == Some(client.id)))
    }

    async fn get_users(
        &self,
        realm: &Realm,
        first: usize,
        max: usize,
        include_service_accounts: bool,
    ) -> StorageResult<Vec<User>> {
        self.journal
            .record(format!("local.get_users({first},{})", fmt_max(max)));
        Ok(self.page(realm, first, max, |u| {
            include_service_accounts || !u.is_service_account()
        }))
    }

    async fn get_users_count(&self, realm: &Realm) -> StorageResult<usize> {
        self.journal.record("local.get_users_count");
        Ok(self.page(realm, 0, usize::MAX, |_| true).len())
    }

    async fn search_for_user(
        &self,
        realm: &Realm,
        search: &str,
        first: usize,
        max: usize,
    ) -> StorageResult<Vec<User>> {
        self.journal
            .record(format!("local.search_for_user({first},{})", fmt_max(max)));
        Ok(self.page(realm, first, max, |u| matches_search(u, search)))
    }

    async fn search_for_user_by_attributes(
        &self,
        realm: &Realm,
        attributes: &HashMap<String, String>,
        first: usize,
        max: usize,
    ) -> StorageResult<Vec<User>> {
        self.journal.record(format!(
            "local.search_for_user_by_attributes({first},{})",
            fmt_max(max)
        ));
        Ok(self.page(realm, first, max, |u| matches_attributes(u, attributes)))
    }

    async fn search_for_user_by_user_attribute(
        &self,
        realm: &Realm,
        name: &str,
        value: &str,
    ) -> StorageResult<Vec<User>> {
        self.journal.record("local.search_for_user_by_user_attribute");
        Ok(self.page(realm, 0, usize::MAX, |u| u.has_attribute_value(name, value)))
    }

    async fn get_group_members(
        &self,
        realm: &Realm,
        group: &Group,
        first: usize,
        max: usize,
    ) -> StorageResult<Vec<User>> {
        self.journal
            .record(format!("local.get_group_members({first},{})", fmt_max(max)));
        let members: Vec<String> = self
            .members
            .lock()
            .iter()
            .filter(|(group_id, _)| *group_id == group.id)
            .map(|(_, user_id)| user_id.clone())
            .collect();
        Ok(self.page(realm, first, max, |u| members.contains(&u.id)))
    }

    async fn add_federated_identity(
        &self,
        _realm: &Realm,
        user: &User,
        identity: &FederatedIdentity,
    ) -> StorageResult<()> {
        self.journal.record("local.add_federated_identity");
        self.identities
            .lock()
            .push((user.id.clone(), identity.clone()));
        Ok(())
    }

    async fn update_federated_identity(
        &self,
        _realm: &Realm,
        user: &User,
        identity: &FederatedIdentity,
    ) -> StorageResult<()> {
        self.journal.record("local.update_federated_identity");
        let mut identities = self.identities.lock();
        let stored = identities
            .iter_mut()
            .find(|(id, i)| *id == user.id && i.identity_provider == identity.identity_provider)
            .ok_or_else(|| StorageError::not_found("FederatedIdentity", &identity.identity_provider))?;
        stored.1 = identity.clone();
        Ok(())
    }

    async fn remove_federated_identity(
        &self,
        _realm: &Realm,
        user: &User,
        identity_provider: &str,
    ) -> StorageResult<bool> {
        self.journal.record("local.remove_federated_identity");
        let mut identities = self.identities.lock();
        let before = identities.len();
        identities.retain(|(id, i)| !(*id == user.id && i.identity_provider == identity_provider));
        Ok(identities.len() < before)
    }

    async fn get_federated_identities(
        &self,
        _realm: &Realm,
        user: &User,
    ) -> StorageResult<Vec<FederatedIdentity>> {
        self.journal.record("local.get_federated_identities");
        Ok(self
            .identities
            .lock()
            .iter()
            .filter(|(id, _)| *id == user.id)
            .map(|(_, i)| i.clone())
            .collect())
    }

    async fn get_federated_identity(
        &self,
        _realm: &Realm,
        user: &User,
        identity_provider: &str,
    ) -> StorageResult<Option<FederatedIdentity>> {
        self.journal.record("local.get_federated_identity");
        Ok(self
            .identities
            .lock()
            .iter()
            .find(|(id, i)| *id == user.id && i.identity_provider == identity_provider)
            .map(|(_, i)| i.clone()))
    }

    async fn add_consent(
        &self,
        _realm: &Realm,
        user: &User,
        consent: &UserConsent,
    ) -> StorageResult<()> {
        self.journal.record("local.add_consent");
        self.consents.lock().push((user.id.clone(), consent.clone()));
        Ok(())
    }

    async fn get_consent_by_client(
        &self,
        _realm: &Realm,
        user: &User,
        client_id: Uuid,
    ) -> StorageResult<Option<UserConsent>> {
        self.journal.record("local.get_consent_by_client");
        Ok(self
            .consents
            .lock()
            .iter()
            .find(|(id, c)| *id == user.id && c.client_id == client_id)
            .map(|(_, c)| c.clone()))
    }

    async fn get_consents(&self, _realm: &Realm, user: &User) -> StorageResult<Vec<UserConsent>> {
        self.journal.record("local.get_consents");
        Ok(self
            .consents
            .lock()
            .iter()
            .filter(|(id, _)| *id == user.id)
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn update_consent(
        &self,
        _realm: &Realm,
        user: &User,
        consent: &UserConsent,
    ) -> StorageResult<()> {
        self.journal.record("local.update_consent");
        let mut consents = self.consents.lock();
        let stored = consents
            .iter_mut()
            .find(|(id, c)| *id == user.id && c.client_id == consent.client_id)
            .ok_or_else(|| StorageError::not_found("UserConsent", consent.client_id.to_string()))?;
        stored.1 = consent.clone();
        Ok(())
    }

    async fn revoke_consent_for_client(
        &self,
        _realm: &Realm,
        user: &User,
        client_id: Uuid,
    ) -> StorageResult<bool> {
        self.journal.record("local.revoke_consent_for_client");
        let mut consents = self.consents.lock();
        let before = consents.len();
        consents.retain(|(id, c)| !(*id == user.id && c.client_id == client_id));
        Ok(consents.len() < before)
    }

    async fn pre_remove(&self, _realm: &Realm, target: RemovalTarget<'_>) -> StorageResult<()> {
        self.journal
            .record(format!("local.pre_remove:{}", target.kind()));
        if self.fail_pre_remove.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("database unavailable".to_string()));
        }
        Ok(())
    }

    fn as_cache_hook(&self) -> Option<&dyn OnUserCache> {
        if self.cache_hook.load(Ordering::SeqCst) {
            Some(self as &dyn OnUserCache)
        } else {
            None
        }
    }
}

impl OnUserCache for LocalStore {
    fn on_cache(&self, _realm: &Realm, cached: &mut CachedUser, _delegate: &User) {
        self.journal
            .record(format!("local.on_cache:{}", cached.user.username));
        cached.set_note("cached-by", "local");
    }
}

// ============================================================================
// Federated attribute store
// ============================================================================

/// In-memory federated attribute store.
#[derive(Debug, Default)]
pub struct FederatedStore {
    journal: Journal,
    attributes: Mutex<Vec<(String, String, Vec<String>)>>,
    memberships: Mutex<Vec<(Uuid, String)>>,
    identities: Mutex<Vec<(String, FederatedIdentity)>>,
    consents: Mutex<Vec<(String, UserConsent)>>,
}

impl FederatedStore {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn identities_of(&self, user_id: &str) -> Vec<FederatedIdentity> {
        self.identities
            .lock()
            .iter()
            .filter(|(id, _)| id == user_id)
            .map(|(_, i)| i.clone())
            .collect()
    }
}

#[async_trait]
impl UserFederatedStorageProvider for FederatedStore {
    async fn set_attribute(
        &self,
        _realm: &Realm,
        user_id: &str,
        name: &str,
        values: Vec<String>,
    ) -> StorageResult<()> {
        self.journal.record("federated.set_attribute");
        let mut attributes = self.attributes.lock();
        attributes.retain(|(id, n, _)| !(id == user_id && n == name));
        attributes.push((user_id.to_string(), name.to_string(), values));
        Ok(())
    }

    async fn remove_attribute(
        &self,
        _realm: &Realm,
        user_id: &str,
        name: &str,
    ) -> StorageResult<()> {
        self.journal.record("federated.remove_attribute");
        self.attributes
            .lock()
            .retain(|(id, n, _)| !(id == user_id && n == name));
        Ok(())
    }

    async fn get_attribute(
        &self,
        _realm: &Realm,
        user_id: &str,
        name: &str,
    ) -> StorageResult<Vec<String>> {
        self.journal.record("federated.get_attribute");
        Ok(self
            .attributes
            .lock()
            .iter()
            .find(|(id, n, _)| id == user_id && n == name)
            .map(|(_, _, values)| values.clone())
            .unwrap_or_default())
    }

    async fn get_users_by_user_attribute(
        &self,
        _realm: &Realm,
        name: &str,
        value: &str,
    ) -> StorageResult<Vec<String>> {
        self.journal.record("federated.get_users_by_user_attribute");
        Ok(self
            .attributes
            .lock()
            .iter()
            .filter(|(_, n, values)| n == name && values.iter().any(|v| v == value))
            .map(|(id, _, _)| id.clone())
            .collect())
    }

    async fn join_group(&self, _realm: &Realm, user_id: &str, group: &Group) -> StorageResult<()> {
        self.journal.record("federated.join_group");
        self.memberships.lock().push((group.id, user_id.to_string()));
        Ok(())
    }

    async fn leave_group(&self, _realm: &Realm, user_id: &str, group: &Group) -> StorageResult<()> {
        self.journal.record("federated.leave_group");
        self.memberships
            .lock()
            .retain(|(g, id)| !(*g == group.id && id == user_id));
        Ok(())
    }

    async fn get_membership(
        &self,
        _realm: &Realm,
        group: &Group,
        first: usize,
        max: usize,
    ) -> StorageResult<Vec<String>> {
        self.journal
            .record(format!("federated.get_membership({first},{})", fmt_max(max)));
        Ok(self
            .memberships
            .lock()
            .iter()
            .filter(|(g, _)| *g == group.id)
            .map(|(_, id)| id.clone())
            .skip(first)
            .take(max)
            .collect())
    }

    async fn add_federated_identity(
        &self,
        _realm: &Realm,
        user_id: &str,
        identity: &FederatedIdentity,
    ) -> StorageResult<()> {
        self.journal.record("federated.add_federated_identity");
        self.identities
            .lock()
            .push((user_id.to_string(), identity.clone()));
        Ok(())
    }

    async fn update_federated_identity(
        &self,
        _realm: &Realm,
        user_id: &str,
        identity: &FederatedIdentity,
    ) -> StorageResult<()> {
        self.journal.record("federated.update_federated_identity");
        let mut identities = self.identities.lock();
        if let Some(stored) = identities
            .iter_mut()
            .find(|(id, i)| id == user_id && i.identity_provider == identity.identity_provider)
        {
            stored.1 = identity.clone();
        }
        Ok(())
    }

    async fn remove_federated_identity(
        &self,
        _realm: &Realm,
        user_id: &str,
        identity_provider: &str,
    ) -> StorageResult<bool> {
        self.journal.record("federated.remove_federated_identity");
        let mut identities = self.identities.lock();
        let before = identities.len();
        identities.retain(|(id, i)| !(id == user_id && i.identity_provider == identity_provider));
        Ok(identities.len() < before)
    }

    async fn get_federated_identities(
        &self,
        _realm: &Realm,
        user_id: &str,
    ) -> StorageResult<Vec<FederatedIdentity>> {
        self.journal.record("federated.get_federated_identities");
        Ok(self.identities_of(user_id))
    }

    async fn get_federated_identity(
        &self,
        _realm: &Realm,
        user_id: &str,
        identity_provider: &str,
    ) -> StorageResult<Option<FederatedIdentity>> {
        self.journal.record("federated.get_federated_identity");
        Ok(self
            .identities_of(user_id)
            .into_iter()
            .find(|i| i.identity_provider == identity_provider))
    }

    async fn get_user_by_federated_identity(
        &self,
        _realm: &Realm,
        identity: &FederatedIdentity,
    ) -> StorageResult<Option<String>> {
        self.journal.record("federated.get_user_by_federated_identity");
        Ok(self
            .identities
            .lock()
            .iter()
            .find(|(_, i)| {
                i.identity_provider == identity.identity_provider && i.user_id == identity.user_id
            })
            .map(|(id, _)| id.clone()))
    }

    async fn add_consent(
        &self,
        _realm: &Realm,
        user_id: &str,
        consent: &UserConsent,
    ) -> StorageResult<()> {
        self.journal.record("federated.add_consent");
        self.consents
            .lock()
            .push((user_id.to_string(), consent.clone()));
        Ok(())
    }

    async fn get_consent_by_client(
        &self,
        _realm: &Realm,
        user_id: &str,
        client_id: Uuid,
    ) -> StorageResult<Option<UserConsent>> {
        self.journal.record("federated.get_consent_by_client");
        Ok(self
            .consents
            .lock()
            .iter()
            .find(|(id, c)| id == user_id && c.client_id == client_id)
            .map(|(_, c)| c.clone()))
    }

    async fn get_consents(&self, _realm: &Realm, user_id: &str) -> StorageResult<Vec<UserConsent>> {
        self.journal.record("federated.get_consents");
        Ok(self
            .consents
            .lock()
            .iter()
            .filter(|(id, _)| id == user_id)
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn update_consent(
        &self,
        _realm: &Realm,
        user_id: &str,
        consent: &UserConsent,
    ) -> StorageResult<()> {
        self.journal.record("federated.update_consent");
        let mut consents = self.consents.lock();
        if let Some(stored) = consents
            .iter_mut()
            .find(|(id, c)| id == user_id && c.client_id == consent.client_id)
        {
            stored.1 = consent.clone();
        }
        Ok(())
    }

    async fn revoke_consent_for_client(
        &self,
        _realm: &Realm,
        user_id: &str,
        client_id: Uuid,
    ) -> StorageResult<bool> {
        self.journal.record("federated.revoke_consent_for_client");
        let mut consents = self.consents.lock();
        let before = consents.len();
        consents.retain(|(id, c)| !(id == user_id && c.client_id == client_id));
        Ok(consents.len() < before)
    }

    async fn pre_remove_user(&self, _realm: &Realm, user_id: &str) -> StorageResult<()> {
        self.journal
            .record(format!("federated.pre_remove_user:{user_id}"));
        self.attributes.lock().retain(|(id, _, _)| id != user_id);
        self.memberships.lock().retain(|(_, id)| id != user_id);
        self.identities.lock().retain(|(id, _)| id != user_id);
        self.consents.lock().retain(|(id, _)| id != user_id);
        Ok(())
    }

    async fn pre_remove(&self, _realm: &Realm, target: RemovalTarget<'_>) -> StorageResult<()> {
        self.journal
            .record(format!("federated.pre_remove:{}", target.kind()));
        Ok(())
    }
}

// ============================================================================
// External directory provider
// ============================================================================

/// Backing data of one configured directory, shared by every instance the
/// factory creates for it.
#[derive(Debug)]
pub struct DirectoryData {
    descriptor_id: String,
    journal: Journal,
    users: Mutex<Vec<User>>,
    members: Mutex<Vec<(Uuid, String)>>,
    stale: Mutex<Vec<String>>,
    fail_pre_remove: AtomicBool,
    closed: AtomicUsize,
}

impl DirectoryData {
    fn new(descriptor_id: &str, journal: Journal) -> Self {
        Self {
            descriptor_id: descriptor_id.to_string(),
            journal,
            users: Mutex::new(Vec::new()),
            members: Mutex::new(Vec::new()),
            stale: Mutex::new(Vec::new()),
            fail_pre_remove: AtomicBool::new(false),
            closed: AtomicUsize::new(0),
        }
    }

    /// Adds a user owned by this directory.
    pub fn add_user(&self, realm: &Realm, username: &str) -> User {
        let id = StorageId::keycloak_id(&self.descriptor_id, username).unwrap();
        let user = User::with_id(id, realm.id, username)
            .with_email(format!("{username}@{}.example.com", self.descriptor_id));
        self.users.lock().push(user.clone());
        user
    }

    pub fn join(&self, group: &Group, user: &User) {
        self.members.lock().push((group.id, user.id.clone()));
    }

    /// Makes import validation reject users imported under `username`.
    pub fn mark_stale(&self, username: &str) {
        self.stale.lock().push(username.to_string());
    }

    pub fn fail_pre_remove(&self) {
        self.fail_pre_remove.store(true, Ordering::SeqCst);
    }

    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, op: impl std::fmt::Display) {
        self.journal.record(format!("{}.{op}", self.descriptor_id));
    }

    fn page(&self, first: usize, max: usize, predicate: impl Fn(&User) -> bool) -> Vec<User> {
        self.users
            .lock()
            .iter()
            .filter(|u| predicate(u))
            .skip(first)
            .take(max)
            .cloned()
            .collect()
    }
}

/// A provider instance over a [`DirectoryData`].
#[derive(Debug)]
pub struct FakeDirectory {
    data: Arc<DirectoryData>,
    capabilities: &'static [Capability],
}

impl FakeDirectory {
    fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

impl Provider for FakeDirectory {
    fn close(&self) {
        self.data.closed.fetch_add(1, Ordering::SeqCst);
        self.data.record("close");
    }
}

impl UserStorageProvider for FakeDirectory {
    fn as_lookup(&self) -> Option<&dyn UserLookupProvider> {
        if self.has(Capability::Lookup) {
            Some(self as &dyn UserLookupProvider)
        } else {
            None
        }
    }

    fn as_query(&self) -> Option<&dyn UserQueryProvider> {
        if self.has(Capability::Query) {
            Some(self as &dyn UserQueryProvider)
        } else {
            None
        }
    }

    fn as_registration(&self) -> Option<&dyn UserRegistrationProvider> {
        if self.has(Capability::Registration) {
            Some(self as &dyn UserRegistrationProvider)
        } else {
            None
        }
    }

    fn as_import_validation(&self) -> Option<&dyn ImportedUserValidation> {
        if self.has(Capability::ImportValidation) {
            Some(self as &dyn ImportedUserValidation)
        } else {
            None
        }
    }

    fn as_cache_hook(&self) -> Option<&dyn OnUserCache> {
        if self.has(Capability::CacheHook) {
            Some(self as &dyn OnUserCache)
        } else {
            None
        }
    }

    fn as_lifecycle(&self) -> Option<&dyn UserStorageLifecycle> {
        if self.has(Capability::Lifecycle) {
            Some(self as &dyn UserStorageLifecycle)
        } else {
            None
        }
    }
}

#[async_trait]
impl UserLookupProvider for FakeDirectory {
    async fn get_user_by_id(&self, _realm: &Realm, id: &str) -> FederationResult<Option<User>> {
        self.data.record(format_args!("get_user_by_id:{id}"));
        Ok(self.data.page(0, 1, |u| u.id == id).pop())
    }

    async fn get_user_by_username(
        &self,
        _realm: &Realm,
        username: &str,
    ) -> FederationResult<Option<User>> {
        self.data
            .record(format_args!("get_user_by_username:{username}"));
        Ok(self.data.page(0, 1, |u| u.username == username).pop())
    }

    async fn get_user_by_email(
        &self,
        _realm: &Realm,
        email: &str,
    ) -> FederationResult<Option<User>> {
        self.data.record(format_args!("get_user_by_email:{email}"));
        Ok(self
            .data
            .page(0, 1, |u| u.email.as_deref() == Some(email))
            .pop())
    }
}

#[async_trait]
impl UserQueryProvider for FakeDirectory {
    async fn get_users_count(&self, _realm: &Realm) -> FederationResult<usize> {
        self.data.record("get_users_count");
        Ok(self.data.users.lock().len())
    }

    async fn get_users(
        &self,
        _realm: &Realm,
        first: usize,
        max: usize,
    ) -> FederationResult<Vec<User>> {
        self.data
            .record(format_args!("get_users({first},{})", fmt_max(max)));
        Ok(self.data.page(first, max, |_| true))
    }

    async fn search_for_user(
        &self,
        _realm: &Realm,
        search: &str,
        first: usize,
        max: usize,
    ) -> FederationResult<Vec<User>> {
        self.data
            .record(format_args!("search_for_user({first},{})", fmt_max(max)));
        Ok(self.data.page(first, max, |u| matches_search(u, search)))
    }

    async fn search_for_user_by_attributes(
        &self,
        _realm: &Realm,
        attributes: &HashMap<String, String>,
        first: usize,
        max: usize,
    ) -> FederationResult<Vec<User>> {
        self.data.record(format_args!(
            "search_for_user_by_attributes({first},{})",
            fmt_max(max)
        ));
        Ok(self
            .data
            .page(first, max, |u| matches_attributes(u, attributes)))
    }

    async fn search_for_user_by_user_attribute(
        &self,
        _realm: &Realm,
        name: &str,
        value: &str,
    ) -> FederationResult<Vec<User>> {
        self.data.record("search_for_user_by_user_attribute");
        Ok(self
            .data
            .page(0, usize::MAX, |u| u.has_attribute_value(name, value)))
    }

    async fn get_group_members(
        &self,
        _realm: &Realm,
        group: &Group,
        first: usize,
        max: usize,
    ) -> FederationResult<Vec<User>> {
        self.data
            .record(format_args!("get_group_members({first},{})", fmt_max(max)));
        let members: Vec<String> = self
            .data
            .members
            .lock()
            .iter()
            .filter(|(g, _)| *g == group.id)
            .map(|(_, id)| id.clone())
            .collect();
        Ok(self.data.page(first, max, |u| members.contains(&u.id)))
    }
}

#[async_trait]
impl UserRegistrationProvider for FakeDirectory {
    async fn add_user(&self, realm: &Realm, username: &str) -> FederationResult<User> {
        self.data.record(format_args!("add_user:{username}"));
        Ok(self.data.add_user(realm, username))
    }

    async fn remove_user(&self, _realm: &Realm, user: &User) -> FederationResult<bool> {
        self.data
            .record(format_args!("remove_user:{}", user.username));
        let mut users = self.data.users.lock();
        let before = users.len();
        users.retain(|u| u.id != user.id);
        Ok(users.len() < before)
    }

    async fn grant_to_all_users(&self, _realm: &Realm, role: &Role) -> FederationResult<()> {
        self.data
            .record(format_args!("grant_to_all_users:{}", role.name));
        Ok(())
    }
}

#[async_trait]
impl ImportedUserValidation for FakeDirectory {
    async fn validate(&self, _realm: &Realm, mut user: User) -> FederationResult<Option<User>> {
        self.data.record(format_args!("validate:{}", user.username));
        if self.data.stale.lock().contains(&user.username) {
            return Ok(None);
        }
        user.set_attribute("validated-by", vec![self.data.descriptor_id.clone()]);
        Ok(Some(user))
    }
}

impl OnUserCache for FakeDirectory {
    fn on_cache(&self, _realm: &Realm, cached: &mut CachedUser, _delegate: &User) {
        self.data
            .record(format_args!("on_cache:{}", cached.user.username));
        cached.set_note("cached-by", self.data.descriptor_id.clone());
    }
}

#[async_trait]
impl UserStorageLifecycle for FakeDirectory {
    async fn pre_remove(&self, _realm: &Realm, target: RemovalTarget<'_>) -> FederationResult<()> {
        self.data
            .record(format_args!("pre_remove:{}", target.kind()));
        if self.data.fail_pre_remove.load(Ordering::SeqCst) {
            return Err(FederationError::provider(
                &self.data.descriptor_id,
                "directory unreachable",
            ));
        }
        Ok(())
    }
}

/// Factory creating [`FakeDirectory`] instances.
#[derive(Debug)]
pub struct DirectoryFactory {
    id: &'static str,
    declared: &'static [Capability],
    provided: &'static [Capability],
    journal: Journal,
    directories: Mutex<HashMap<String, Arc<DirectoryData>>>,
    created: AtomicUsize,
    fail_create: AtomicBool,
}

impl DirectoryFactory {
    pub fn new(id: &'static str, capabilities: &'static [Capability], journal: Journal) -> Self {
        Self {
            id,
            declared: capabilities,
            provided: capabilities,
            journal,
            directories: Mutex::new(HashMap::new()),
            created: AtomicUsize::new(0),
            fail_create: AtomicBool::new(false),
        }
    }

    /// Makes instances implement fewer capabilities than declared.
    pub fn providing(mut self, capabilities: &'static [Capability]) -> Self {
        self.provided = capabilities;
        self
    }

    /// Data of the directory configured under `descriptor_id`.
    pub fn directory(&self, descriptor_id: &str) -> Arc<DirectoryData> {
        let mut directories = self.directories.lock();
        Arc::clone(
            directories
                .entry(descriptor_id.to_string())
                .or_insert_with(|| Arc::new(DirectoryData::new(descriptor_id, self.journal.clone()))),
        )
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }
}

impl ProviderFactory for DirectoryFactory {
    fn id(&self) -> &'static str {
        self.id
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            id: self.id,
            name: "Fake directory",
            description: "In-memory external user directory",
            priority: 0,
        }
    }
}

impl UserStorageProviderFactory for DirectoryFactory {
    fn capabilities(&self) -> &'static [Capability] {
        self.declared
    }

    fn create(
        &self,
        _session: &KeycloakSession,
        model: &UserStorageProviderModel,
    ) -> Result<Arc<dyn UserStorageProvider>, SpiError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(SpiError::CreationFailed(format!(
                "cannot connect {}",
                model.id()
            )));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        let data = self.directory(model.id());
        data.record("create");
        Ok(Arc::new(FakeDirectory {
            data,
            capabilities: self.provided,
        }))
    }
}

// ============================================================================
// Test environment
// ============================================================================

/// A realm with a local store, a federated attribute store and a router.
pub struct TestEnv {
    pub journal: Journal,
    pub registry: Arc<SpiRegistry>,
    pub realm: Realm,
    pub local: Arc<LocalStore>,
    pub federated: Arc<FederatedStore>,
    pub manager: UserStorageManager,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_settings(UserStorageSettings::default())
    }

    pub fn with_settings(settings: UserStorageSettings) -> Self {
        init_tracing();

        let journal = Journal::default();
        let local = Arc::new(LocalStore::new(journal.clone()));
        let federated = Arc::new(FederatedStore::new(journal.clone()));
        let manager = UserStorageManager::new(local.clone(), settings)
            .with_federated_storage(federated.clone());

        Self {
            journal,
            registry: Arc::new(SpiRegistry::new()),
            realm: Realm::new("test"),
            local,
            federated,
            manager,
        }
    }

    /// Drops the federated attribute store from the router.
    pub fn without_federated_storage(mut self) -> Self {
        self.manager = UserStorageManager::new(self.local.clone(), self.manager.settings().clone());
        self
    }

    pub fn session(&self) -> KeycloakSession {
        KeycloakSession::new(Arc::clone(&self.registry))
    }

    /// Registers a directory factory.
    pub fn factory(&self, id: &'static str, capabilities: &'static [Capability]) -> Arc<DirectoryFactory> {
        self.register(DirectoryFactory::new(id, capabilities, self.journal.clone()))
    }

    pub fn register(&self, factory: DirectoryFactory) -> Arc<DirectoryFactory> {
        let factory = Arc::new(factory);
        register_factory(&self.registry, factory.clone());
        factory
    }

    /// Configures a directory in the realm and returns its data.
    pub fn add_directory(
        &mut self,
        descriptor_id: &str,
        factory: &DirectoryFactory,
        priority: i32,
    ) -> Arc<DirectoryData> {
        self.add_descriptor(descriptor_id, factory.id(), priority, true);
        factory.directory(descriptor_id)
    }

    /// Configures a descriptor without requiring its factory to exist.
    pub fn add_descriptor(&mut self, descriptor_id: &str, provider_id: &str, priority: i32, enabled: bool) {
        let model = UserStorageProviderModel::builder()
            .id(descriptor_id)
            .provider_id(provider_id)
            .priority(priority)
            .enabled(enabled)
            .build()
            .unwrap();
        self.realm.add_component(model.into());
    }

    /// Stores a plain local user.
    pub fn local_user(&self, username: &str) -> User {
        self.local.insert(User::new(self.realm.id, username))
    }

    /// Stores a local copy of a user imported from `descriptor_id`.
    pub fn imported_user(&self, username: &str, descriptor_id: &str) -> User {
        self.local
            .insert(User::new(self.realm.id, username).with_federation_link(descriptor_id))
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("kc_federation=debug,kc_spi=debug")
        .with_test_writer()
        .try_init();
}

pub fn usernames(users: &[User]) -> Vec<&str> {
    users.iter().map(|u| u.username.as_str()).collect()
}

fn fmt_max(max: usize) -> String {
    if max == usize::MAX {
        "max".to_string()
    } else {
        max.to_string()
    }
}

fn matches_search(user: &User, search: &str) -> bool {
    let search = search.to_lowercase();
    [
        Some(user.username.as_str()),
        user.email.as_deref(),
        user.first_name.as_deref(),
        user.last_name.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(&search))
}

fn matches_attributes(user: &User, attributes: &HashMap<String, String>) -> bool {
    attributes.iter().all(|(key, value)| {
        let field = match key.as_str() {
            "username" => Some(user.username.as_str()),
            "email" => user.email.as_deref(),
            "first_name" => user.first_name.as_deref(),
            "last_name" => user.last_name.as_deref(),
            _ => user.get_first_attribute(key),
        };
        field == Some(value.as_str())
    })
}
