//! Keycloak session management.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::provider::Provider;
use crate::registry::SpiRegistry;

type Attribute = Arc<dyn Any + Send + Sync>;

/// A Keycloak session represents a unit of work.
///
/// Each request gets its own session. Providers created while serving the
/// request are cached in the session attributes and enlisted for close, so
/// they live exactly as long as the session and are never shared with
/// another one.
#[derive(Debug)]
pub struct KeycloakSession {
    /// Unique session identifier.
    id: Uuid,

    /// Reference to the SPI registry.
    registry: Arc<SpiRegistry>,

    /// Session attributes.
    attributes: RwLock<HashMap<String, Attribute>>,

    /// Providers closed when the session ends, in enlistment order.
    close_list: Mutex<Vec<Arc<dyn Provider>>>,

    /// Whether this session has been closed.
    closed: RwLock<bool>,
}

impl KeycloakSession {
    /// Creates a new session.
    #[must_use]
    pub fn new(registry: Arc<SpiRegistry>) -> Self {
        Self {
            id: Uuid::now_v7(),
            registry,
            attributes: RwLock::new(HashMap::new()),
            close_list: Mutex::new(Vec::new()),
            closed: RwLock::new(false),
        }
    }

    /// Returns the session ID.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the SPI registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SpiRegistry> {
        &self.registry
    }

    /// Sets a session attribute, replacing any previous value.
    pub fn set_attribute<T>(&self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.attributes.write().insert(key.into(), Arc::new(value));
    }

    /// Sets a session attribute unless one is already present, and returns
    /// the value stored under the key afterwards.
    ///
    /// If the key holds a value of another type it is replaced.
    pub fn set_attribute_if_absent<T>(&self, key: impl Into<String>, value: T) -> T
    where
        T: Any + Send + Sync + Clone,
    {
        let mut attributes = self.attributes.write();
        let slot = attributes
            .entry(key.into())
            .or_insert_with(|| Arc::new(value.clone()));
        if let Some(existing) = slot.downcast_ref::<T>() {
            return existing.clone();
        }
        *slot = Arc::new(value.clone());
        value
    }

    /// Gets a session attribute of the given type.
    #[must_use]
    pub fn get_attribute<T>(&self, key: &str) -> Option<T>
    where
        T: Any + Send + Sync + Clone,
    {
        self.attributes
            .read()
            .get(key)
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    /// Removes a session attribute, returning whether one was present.
    pub fn remove_attribute(&self, key: &str) -> bool {
        self.attributes.write().remove(key).is_some()
    }

    /// Enlists a provider to be closed when the session ends.
    pub fn enlist_for_close(&self, provider: Arc<dyn Provider>) {
        self.close_list.lock().push(provider);
    }

    /// Returns the number of providers waiting to be closed.
    #[must_use]
    pub fn enlisted_count(&self) -> usize {
        self.close_list.lock().len()
    }

    /// Returns whether the session has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.read()
    }

    /// Closes the session.
    ///
    /// Every enlisted provider is closed in enlistment order and all
    /// attributes are dropped. Closing twice is a no-op.
    pub fn close(&self) {
        {
            let mut closed = self.closed.write();
            if *closed {
                return;
            }
            *closed = true;
        }

        let providers = std::mem::take(&mut *self.close_list.lock());
        tracing::debug!(session_id = %self.id, providers = providers.len(), "closing session");
        for provider in providers {
            provider.close();
        }
        self.attributes.write().clear();
    }
}

impl Drop for KeycloakSession {
    fn drop(&mut self) {
        if !*self.closed.read() {
            self.close();
        }
    }
}
