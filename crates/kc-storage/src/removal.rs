//! Entities whose removal is announced to user stores.

use kc_model::{Client, ComponentModel, Group, Role};

/// An entity about to be removed from a realm.
///
/// Stores receive this before the removal happens so they can drop any
/// user data that references it (memberships, role grants, consents, ...).
#[derive(Debug, Clone, Copy)]
pub enum RemovalTarget<'a> {
    /// The whole realm.
    Realm,
    /// A group.
    Group(&'a Group),
    /// A role.
    Role(&'a Role),
    /// A client.
    Client(&'a Client),
    /// A component, such as a user storage provider descriptor.
    Component(&'a ComponentModel),
}

impl RemovalTarget<'_> {
    /// Short label used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Realm => "realm",
            Self::Group(_) => "group",
            Self::Role(_) => "role",
            Self::Client(_) => "client",
            Self::Component(_) => "component",
        }
    }
}
