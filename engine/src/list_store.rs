//! One live list per (path, query).

use crate::cache::KeyedStore;
use crate::kind::ListKind;
use crate::{Attrs, Context, EntityList, EntityStore, ListOptions, Result, Seed};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::rc::Rc;

const QUERY_HASH_LEN: usize = 16;

/// Stable digest of a query filter, independent of key order.
pub fn query_hash(query: &Attrs) -> String {
    let mut canonical = String::new();
    write_canonical(&Value::Object(query.clone()), &mut canonical);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let full = format!("{:x}", hasher.finalize());
    full[..QUERY_HASH_LEN].to_string()
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(value) = map.get(key) {
                    write_canonical(value, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Identity cache for lists, keyed by lower-cased path and query hash.
///
/// Registration cascades to the [`EntityStore`]: members of a stored list
/// are the canonical entities, and removing a list forgets its members.
#[derive(Clone)]
pub struct ListStore {
    inner: Rc<KeyedStore<EntityList>>,
    entities: EntityStore,
}

impl ListStore {
    pub fn new(enabled: bool, entities: EntityStore) -> Self {
        Self {
            inner: Rc::new(KeyedStore::new(enabled)),
            entities,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.inner.set_enabled(enabled);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn clear(&self) -> usize {
        self.inner.drain().len()
    }

    pub fn key(list: &EntityList) -> Option<String> {
        if list.is_no_store() {
            return None;
        }
        Some(format!(
            "{}-{}",
            list.path().to_lowercase(),
            query_hash(&list.query())
        ))
    }

    pub fn add(&self, list: &EntityList) -> bool {
        let Some(key) = Self::key(list) else {
            return false;
        };
        if !self.is_enabled() {
            return false;
        }
        list.canonicalize(&self.entities);
        self.inner.set(key, list.clone())
    }

    pub fn get(&self, list: &EntityList) -> Option<EntityList> {
        Self::key(list).and_then(|key| self.inner.get(&key))
    }

    pub fn remove(&self, list: &EntityList) -> Option<EntityList> {
        let key = Self::key(list)?;
        if !self.is_enabled() {
            return None;
        }
        for member in list.models() {
            self.entities.remove(&member);
        }
        self.inner.remove(&key)
    }

    pub fn is_cached(&self, list: &EntityList) -> bool {
        self.get(list).is_some()
    }

    /// Resolve `list` to the canonical list for its key, optionally resetting
    /// the cached one with the candidate's members. A discarded candidate is
    /// deallocated.
    pub fn check(&self, list: &EntityList, reset: bool) -> Result<EntityList> {
        if list.is_no_store() {
            return Ok(list.clone());
        }
        match self.get(list) {
            Some(cached) if cached.ptr_eq(list) => Ok(cached),
            Some(cached) => {
                if reset {
                    cached.reset(list.models().into_iter().map(Seed::Entity).collect())?;
                }
                list.dealloc();
                Ok(cached)
            }
            None => {
                self.add(list);
                Ok(list.clone())
            }
        }
    }

    /// Build-or-reuse a list of `kind`.
    ///
    /// A new list is always reset with `seeds`; a cached one only when
    /// `opts.reset` asks for it.
    pub fn check_new_list(
        &self,
        kind: Rc<dyn ListKind>,
        seeds: Vec<Seed>,
        opts: &ListOptions,
        ctx: &Context,
    ) -> Result<EntityList> {
        let candidate = EntityList::new(kind, vec![], opts, ctx)?;
        let (list, reset) = if self.is_cached(&candidate) {
            tracing::trace!(path = candidate.path(), "list cache hit");
            (self.check(&candidate, false)?, opts.reset.unwrap_or(false))
        } else {
            self.add(&candidate);
            (candidate, true)
        };
        if reset {
            list.reset(seeds)?;
        }
        Ok(list)
    }
}

impl fmt::Debug for ListStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListStore")
            .field("enabled", &self.is_enabled())
            .field("len", &self.len())
            .finish()
    }
}
