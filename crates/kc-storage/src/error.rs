//! Storage error types.

use thiserror::Error;

/// Errors raised by the local user store and the federated attribute store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The referenced user, link or consent does not exist.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        /// Kind of record ("User", "UserConsent", ...).
        entity_type: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A unique field is already taken, e.g. a username within a realm.
    #[error("Duplicate {entity_type}: {field} '{value}' already exists")]
    Duplicate {
        /// Kind of record.
        entity_type: &'static str,
        /// Field that caused the conflict.
        field: &'static str,
        /// Conflicting value.
        value: String,
    },

    /// The store rejected the data it was given.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The backing database could not be reached.
    #[error("Database connection error: {0}")]
    Connection(String),
}

impl StorageError {
    /// Creates a not found error for a record.
    #[must_use]
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a duplicate error.
    #[must_use]
    pub fn duplicate(
        entity_type: &'static str,
        field: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self::Duplicate {
            entity_type,
            field,
            value: value.into(),
        }
    }

    /// Checks if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Checks if this is a duplicate error.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
