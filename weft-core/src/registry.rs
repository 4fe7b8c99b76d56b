//! Component kind registry.
//!
//! A module process hosts one registry mapping kind names to prototype
//! instances; [`ComponentRegistry::create`] produces fresh instances via
//! the prototype's factory.

use crate::traits::{Component, ComponentInfo};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of component kinds available in a module.
#[derive(Default)]
pub struct ComponentRegistry {
    kinds: HashMap<String, Arc<dyn Component>>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prototype under its kind name.
    ///
    /// Registering the same name twice replaces the previous prototype;
    /// the last registration wins.
    pub fn register(&mut self, prototype: Arc<dyn Component>) {
        let name = prototype.info().name;
        if self.kinds.insert(name.clone(), prototype).is_some() {
            tracing::warn!(kind = %name, "component kind re-registered");
        }
    }

    /// Create a fresh instance of the named kind.
    pub fn create(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.kinds.get(name).map(|proto| proto.instance())
    }

    /// Whether a kind is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    /// Descriptions of all registered kinds, sorted by name.
    pub fn kinds(&self) -> Vec<ComponentInfo> {
        let mut infos: Vec<_> = self.kinds.values().map(|proto| proto.info()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
