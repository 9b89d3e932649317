//! Realm domain model.
//!
//! A realm is the top-level container for all Keycloak entities.
//! Each realm is isolated and carries its own component configuration,
//! including the user storage providers it federates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::component::ComponentModel;

/// A Keycloak realm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Realm {
    /// Unique identifier.
    pub id: Uuid,
    /// Unique realm name.
    pub name: String,
    /// Display name for UI.
    pub display_name: Option<String>,
    /// Whether the realm is enabled.
    pub enabled: bool,
    /// When the realm was created.
    pub created_at: DateTime<Utc>,
    /// Components configured for this realm, in configuration order.
    pub components: Vec<ComponentModel>,
}

impl Realm {
    /// Creates a new realm with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            display_name: None,
            enabled: true,
            created_at: Utc::now(),
            components: Vec::new(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Appends a component.
    #[must_use]
    pub fn with_component(mut self, component: ComponentModel) -> Self {
        self.add_component(component);
        self
    }

    /// Appends a component.
    pub fn add_component(&mut self, component: ComponentModel) {
        self.components.push(component);
    }

    /// Removes a component by id, returning it if present.
    pub fn remove_component(&mut self, id: &str) -> Option<ComponentModel> {
        let index = self.components.iter().position(|c| c.id == id)?;
        Some(self.components.remove(index))
    }

    /// Finds a component by id.
    #[must_use]
    pub fn component(&self, id: &str) -> Option<&ComponentModel> {
        self.components.iter().find(|c| c.id == id)
    }

    /// Iterates the components of one provider type, in configuration order.
    pub fn components_of_type<'a>(
        &'a self,
        provider_type: &'a str,
    ) -> impl Iterator<Item = &'a ComponentModel> + 'a {
        self.components
            .iter()
            .filter(move |c| c.provider_type == provider_type)
    }
}
