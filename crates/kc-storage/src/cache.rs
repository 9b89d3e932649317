//! Hooks run when a user is placed in the user cache.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use kc_model::{Realm, User};

/// A user snapshot held by the user cache.
///
/// Stores may attach notes while the entry is being built and may
/// invalidate it if the snapshot must not be served.
#[derive(Debug, Clone)]
pub struct CachedUser {
    /// The cached snapshot.
    pub user: User,
    /// When the snapshot was taken.
    pub cached_at: DateTime<Utc>,
    /// Data stashed alongside the entry by the owning store.
    pub notes: HashMap<String, String>,
    invalidated: bool,
}

impl CachedUser {
    /// Wraps a user snapshot.
    #[must_use]
    pub fn new(user: User) -> Self {
        Self {
            user,
            cached_at: Utc::now(),
            notes: HashMap::new(),
            invalidated: false,
        }
    }

    /// Returns the cached user's id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.user.id
    }

    /// Attaches a note to the cache entry.
    pub fn set_note(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.notes.insert(key.into(), value.into());
    }

    /// Gets a note attached to the cache entry.
    #[must_use]
    pub fn note(&self, key: &str) -> Option<&str> {
        self.notes.get(key).map(String::as_str)
    }

    /// Marks the entry as stale.
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    /// Returns true if the entry was marked stale.
    #[must_use]
    pub const fn is_invalidated(&self) -> bool {
        self.invalidated
    }
}

/// Implemented by stores that want to enrich or veto user cache entries.
pub trait OnUserCache: Send + Sync {
    /// Called when `delegate` is about to be cached as `cached`.
    fn on_cache(&self, realm: &Realm, cached: &mut CachedUser, delegate: &User);
}
