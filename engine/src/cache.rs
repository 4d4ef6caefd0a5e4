//! The identity cache: one [`EntityStore`] and one [`ListStore`].

use crate::{EntityStore, ListStore};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// String-keyed map that ignores every operation while disabled.
#[derive(Debug)]
pub(crate) struct KeyedStore<V> {
    enabled: Cell<bool>,
    map: RefCell<HashMap<String, V>>,
}

impl<V: Clone> KeyedStore<V> {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled: Cell::new(enabled),
            map: RefCell::new(HashMap::new()),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    pub(crate) fn get(&self, key: &str) -> Option<V> {
        if !self.is_enabled() {
            return None;
        }
        self.map.borrow().get(key).cloned()
    }

    pub(crate) fn set(&self, key: String, value: V) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.map.borrow_mut().insert(key, value);
        true
    }

    pub(crate) fn remove(&self, key: &str) -> Option<V> {
        if !self.is_enabled() {
            return None;
        }
        self.map.borrow_mut().remove(key)
    }

    /// Drop all entries and hand them back.
    pub(crate) fn drain(&self) -> Vec<V> {
        self.map.borrow_mut().drain().map(|(_, value)| value).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.map.borrow().len()
    }
}

/// Identity cache service passed to every entity and list.
///
/// Disabled caches make every entity independent; enable them for
/// long-running clients where repeated lookups should share objects.
#[derive(Debug, Clone)]
pub struct Cache {
    entities: EntityStore,
    lists: ListStore,
}

impl Cache {
    pub fn new(enabled: bool) -> Self {
        let entities = EntityStore::new(enabled);
        let lists = ListStore::new(enabled, entities.clone());
        Self { entities, lists }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn lists(&self) -> &ListStore {
        &self.lists
    }

    pub fn is_enabled(&self) -> bool {
        self.entities.is_enabled()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.entities.set_enabled(enabled);
        self.lists.set_enabled(enabled);
    }

    /// Forget every cached entity and list.
    pub fn clear(&self) {
        let lists = self.lists.clear();
        let entities = self.entities.clear();
        tracing::debug!(lists, entities, "identity cache cleared");
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::disabled()
    }
}
