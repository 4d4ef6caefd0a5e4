//! One live entity per resource path.

use crate::cache::KeyedStore;
use crate::kind::ResourceKind;
use crate::{Attrs, Context, Entity, EntityOptions, Result, Seed};
use std::fmt;
use std::rc::Rc;

/// Identity cache for entities, keyed by lower-cased path.
#[derive(Clone)]
pub struct EntityStore {
    inner: Rc<KeyedStore<Entity>>,
}

impl EntityStore {
    pub fn new(enabled: bool) -> Self {
        Self {
            inner: Rc::new(KeyedStore::new(enabled)),
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

    /// Cache key, or `None` for `no_store` and id-less entities.
    pub fn key(entity: &Entity) -> Option<String> {
        if entity.is_no_store() {
            return None;
        }
        entity.id()?;
        Some(entity.path().to_lowercase())
    }

    pub fn add(&self, entity: &Entity) -> bool {
        match Self::key(entity) {
            Some(key) => self.inner.set(key, entity.clone()),
            None => false,
        }
    }

    pub fn get(&self, entity: &Entity) -> Option<Entity> {
        Self::key(entity).and_then(|key| self.inner.get(&key))
    }

    pub fn remove(&self, entity: &Entity) -> Option<Entity> {
        Self::key(entity).and_then(|key| self.inner.remove(&key))
    }

    /// Move `entity` off the slot it held under `old_path` and resolve it
    /// under its current key. Another entity cached at `old_path` stays.
    pub(crate) fn rekey(&self, entity: &Entity, old_path: Option<&str>) -> Entity {
        if let Some(old_key) = old_path.map(str::to_lowercase) {
            if self.inner.get(&old_key).is_some_and(|cached| cached.ptr_eq(entity)) {
                self.inner.remove(&old_key);
            }
        }
        self.check_alias(entity)
    }

    /// Resolve `entity` to the canonical instance for its path.
    ///
    /// On a hit the cached entity is refreshed from the candidate (`reset`
    /// replaces, otherwise merges), the candidate is retired and the cached
    /// one returned. On a miss the candidate becomes canonical.
    pub fn check(&self, entity: &Entity, reset: bool) -> Entity {
        self.resolve(entity, reset, true)
    }

    /// Like [`check`](Self::check), but the candidate stays usable. Used when
    /// a fetch through an alias id reveals the real one.
    pub(crate) fn check_alias(&self, entity: &Entity) -> Entity {
        self.resolve(entity, false, false)
    }

    fn resolve(&self, entity: &Entity, reset: bool, retire: bool) -> Entity {
        let Some(key) = Self::key(entity) else {
            return entity.clone();
        };
        match self.inner.get(&key) {
            Some(cached) if cached.ptr_eq(entity) => cached,
            Some(cached) if !cached.is_destroyed() => {
                tracing::trace!(%key, reset, "entity cache hit");
                let refreshed = if reset {
                    cached.reset(entity)
                } else {
                    cached.extend(entity.attrs())
                };
                if let Err(err) = refreshed {
                    tracing::warn!(%key, error = %err, "failed to refresh cached entity");
                }
                if retire {
                    entity.retire();
                }
                cached
            }
            _ => {
                tracing::trace!(%key, "entity cache miss");
                self.inner.set(key, entity.clone());
                entity.clone()
            }
        }
    }

    /// Build-or-reuse an entity of `kind` from `seed`.
    ///
    /// Attribute seeds are written raw onto the candidate so a cache hit
    /// skips parsing; the parse happens only for a freshly registered
    /// entity, or when `reset` asks to refresh the cached one. `reset`
    /// defaults to true for attributes and false for a bare id. A hit is
    /// refreshed once: reset from the seed, merged with its attributes, or
    /// left alone for a bare id.
    pub fn check_new_entity(
        &self,
        kind: Rc<dyn ResourceKind>,
        seed: impl Into<Seed>,
        opts: &EntityOptions,
        ctx: &Context,
    ) -> Result<Entity> {
        let seed = seed.into();
        let (candidate, reset) = match &seed {
            Seed::Entity(entity) => {
                let entity = self.check(entity, opts.reset.unwrap_or(false));
                warn_if_idless(&entity, opts, &seed);
                return Ok(entity);
            }
            Seed::Id(id) => (
                Entity::new(kind, Seed::Id(id.clone()), opts, ctx)?,
                opts.reset.unwrap_or(false),
            ),
            Seed::Attrs(attrs) => {
                let entity = Entity::empty(kind, opts, ctx)?;
                entity.write_raw(attrs.clone());
                (entity, opts.reset.unwrap_or(true))
            }
        };

        let cached = self
            .get(&candidate)
            .filter(|cached| !cached.is_destroyed() && !cached.ptr_eq(&candidate));
        let entity = match cached {
            Some(cached) => {
                tracing::trace!(path = %cached.path(), reset, "entity cache hit");
                candidate.retire();
                if reset {
                    cached.reset(seed.clone())?;
                } else if !seed.is_id() {
                    cached.extend(seed.attrs())?;
                }
                cached
            }
            None => {
                let entity = self.check(&candidate, false);
                candidate.write_raw(Attrs::new());
                entity.reset(seed.clone())?;
                entity
            }
        };
        warn_if_idless(&entity, opts, &seed);
        Ok(entity)
    }
}

fn warn_if_idless(entity: &Entity, opts: &EntityOptions, seed: &Seed) {
    if entity.id().is_none() && opts.warn.unwrap_or(true) {
        tracing::warn!(
            kind = entity.kind().name(),
            attrs = %serde_json::Value::Object(seed.attrs()),
            "possible duplicate entity: created without an id, the store cannot dedupe it"
        );
    }
}

impl fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStore")
            .field("enabled", &self.is_enabled())
            .field("len", &self.len())
            .finish()
    }
}
