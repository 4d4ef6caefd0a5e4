//! A single addressable resource and its mutation protocol.
//!
//! An [`Entity`] is a shared handle: clones point at the same object and
//! identity is pointer identity. Network operations apply their optimistic
//! change when called and return a future that performs the request and
//! either confirms or rolls back.

use crate::client::{fail, Reply, RequestOptions, StatusCodes};
use crate::events::{Emitter, EntityEvent, Flow, ListenerId};
use crate::kind::{Merge, ResourceKind};
use crate::retry::{self, Backoff};
use crate::transport::Method;
use crate::{attrs::keypath, path, Attrs, Context, EntityList, Error, Result, Seed};
use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Construction options for entities.
#[derive(Debug, Clone, Default)]
pub struct EntityOptions {
    /// Path of the owning resource; the kind's segment is appended to it
    pub parent_path: String,
    /// Keep this entity out of the identity cache
    pub no_store: bool,
    /// Warn when a resolved entity has no id (default true)
    pub warn: Option<bool>,
    /// Refresh a cached entity from the given data (default depends on input)
    pub reset: Option<bool>,
}

impl EntityOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent_path(mut self, parent_path: impl Into<String>) -> Self {
        self.parent_path = parent_path.into();
        self
    }

    pub fn no_store(mut self) -> Self {
        self.no_store = true;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.warn = Some(false);
        self
    }

    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = Some(reset);
        self
    }
}

/// Result of an operation that may hand back a different canonical entity.
#[derive(Debug, Clone)]
pub struct Synced {
    /// The canonical instance after the store check
    pub entity: Entity,
    pub reply: Reply,
}

#[derive(Debug, Default)]
struct EntityState {
    attrs: Attrs,
    working: Attrs,
    etag: Option<String>,
    last_modified: Option<String>,
    destroyed: bool,
}

struct EntityInner {
    kind: Rc<dyn ResourceKind>,
    ctx: Context,
    url_path: String,
    parent_path: String,
    no_store: bool,
    state: RefCell<EntityState>,
    events: Emitter<EntityEvent>,
    related: RefCell<BTreeMap<String, EntityList>>,
}

/// Handle to a single resource.
#[derive(Clone)]
pub struct Entity(Rc<EntityInner>);

impl Entity {
    /// Build an entity without consulting the identity cache.
    ///
    /// Use [`crate::EntityStore::check_new_entity`] (or a [`crate::Parent`]
    /// factory) to get the canonical instance instead.
    pub fn new(
        kind: Rc<dyn ResourceKind>,
        seed: impl Into<Seed>,
        opts: &EntityOptions,
        ctx: &Context,
    ) -> Result<Self> {
        let entity = Self::empty(kind, opts, ctx)?;
        entity.reset(seed)?;
        Ok(entity)
    }

    pub(crate) fn empty(kind: Rc<dyn ResourceKind>, opts: &EntityOptions, ctx: &Context) -> Result<Self> {
        if !opts.no_store && ctx.client().is_none() {
            return Err(Error::MissingClient(kind.name().to_string()));
        }
        let url_path = path::join(&[&opts.parent_path, kind.url_segment()]);
        Ok(Self(Rc::new(EntityInner {
            kind,
            ctx: ctx.clone(),
            url_path,
            parent_path: opts.parent_path.clone(),
            no_store: opts.no_store,
            state: RefCell::new(EntityState::default()),
            events: Emitter::new(),
            related: RefCell::new(BTreeMap::new()),
        })))
    }

    pub fn kind(&self) -> &Rc<dyn ResourceKind> {
        &self.0.kind
    }

    pub fn context(&self) -> &Context {
        &self.0.ctx
    }

    pub fn is_no_store(&self) -> bool {
        self.0.no_store
    }

    pub fn parent_path(&self) -> &str {
        &self.0.parent_path
    }

    /// Base route for this type, without the id.
    pub fn url_path(&self) -> &str {
        &self.0.url_path
    }

    pub fn id(&self) -> Option<String> {
        self.0.kind.id(&self.0.state.borrow().attrs)
    }

    /// Full path including the id, if any.
    pub fn path(&self) -> String {
        let id = self.id().unwrap_or_default();
        self.path_for(&id)
    }

    pub fn path_for(&self, id: &str) -> String {
        path::join(&[&self.0.url_path, id])
    }

    /// Copy of the current attributes.
    pub fn attrs(&self) -> Attrs {
        self.0.state.borrow().attrs.clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        keypath::get(&self.0.state.borrow().attrs, key).cloned()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.attrs())
    }

    pub fn etag(&self) -> Option<String> {
        self.0.state.borrow().etag.clone()
    }

    pub fn last_modified(&self) -> Option<String> {
        self.0.state.borrow().last_modified.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.state.borrow().destroyed
    }

    pub fn ptr_eq(&self, other: &Entity) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable address while the entity lives; used to key per-member state.
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Same resource: equal paths when both have ids, otherwise the same object.
    pub fn equals(&self, other: &Entity) -> bool {
        match (self.id(), other.id()) {
            (Some(_), Some(_)) => self.path() == other.path(),
            _ => self.ptr_eq(other),
        }
    }

    pub(crate) fn ensure_live(&self, operation: &str) -> Result<()> {
        if !self.is_destroyed() {
            return Ok(());
        }
        let kind = self.0.kind.name().to_string();
        let path = self.path();
        tracing::error!(%kind, %path, operation, "entity is destroyed, don't use it anymore");
        Err(Error::Destroyed { kind, path })
    }

    fn emit(&self, event: EntityEvent) {
        self.0.events.emit(&event);
    }

    /// Set the id attribute without emitting an update.
    pub fn set_id(&self, id: &str) -> Result<()> {
        self.ensure_live("set_id")?;
        let kind = Rc::clone(&self.0.kind);
        kind.set_id(&mut self.0.state.borrow_mut().attrs, id);
        Ok(())
    }

    /// Parse `attrs` and merge them over the current attributes.
    pub fn extend(&self, attrs: Attrs) -> Result<()> {
        self.ensure_live("extend")?;
        let parsed = self.0.kind.parse(attrs);
        {
            let mut state = self.0.state.borrow_mut();
            for (key, value) in &parsed {
                state.attrs.insert(key.clone(), value.clone());
            }
        }
        self.emit(EntityEvent::Update {
            entity: self.clone(),
            attrs: parsed,
        });
        Ok(())
    }

    /// Replace the attributes.
    ///
    /// A bare id only sets the id (and still emits an update); an entity
    /// seed copies that entity's attributes.
    pub fn reset(&self, seed: impl Into<Seed>) -> Result<()> {
        self.ensure_live("reset")?;
        match seed.into() {
            Seed::Id(id) => {
                self.set_id(&id)?;
                self.extend(Attrs::new())
            }
            Seed::Attrs(attrs) => self.replace(attrs),
            Seed::Entity(other) => self.replace(other.attrs()),
        }
    }

    fn replace(&self, attrs: Attrs) -> Result<()> {
        let parsed = self.0.kind.parse(attrs);
        self.0.state.borrow_mut().attrs = parsed.clone();
        self.emit(EntityEvent::Update {
            entity: self.clone(),
            attrs: parsed,
        });
        Ok(())
    }

    /// Overwrite attributes without parsing or events.
    pub(crate) fn write_raw(&self, attrs: Attrs) {
        self.0.state.borrow_mut().attrs = attrs;
    }

    /// Put back a snapshot exactly as it was taken.
    fn restore(&self, snapshot: Attrs) {
        if self.is_destroyed() {
            return;
        }
        self.write_raw(snapshot.clone());
        self.emit(EntityEvent::Update {
            entity: self.clone(),
            attrs: snapshot,
        });
    }

    fn absorb(&self, body: &Value, merge: Merge) -> Result<()> {
        let Value::Object(attrs) = body else {
            return Ok(());
        };
        match merge {
            Merge::Reset => self.replace_checked(attrs.clone()),
            Merge::Extend => self.extend(attrs.clone()),
        }
    }

    fn replace_checked(&self, attrs: Attrs) -> Result<()> {
        self.ensure_live("reset")?;
        self.replace(attrs)
    }

    // Working state

    pub fn set_state(&self, key: &str, value: Value) -> Result<()> {
        self.ensure_live("set_state")?;
        keypath::set(&mut self.0.state.borrow_mut().working, key, value);
        Ok(())
    }

    pub fn get_state(&self, key: &str) -> Option<Value> {
        keypath::get(&self.0.state.borrow().working, key).cloned()
    }

    pub fn has_state(&self, key: &str) -> bool {
        keypath::has(&self.0.state.borrow().working, key)
    }

    /// Discard uncommitted edits, optionally starting over from `state`.
    pub fn reset_state(&self, state: Option<Attrs>) -> Result<()> {
        self.ensure_live("reset_state")?;
        self.0.state.borrow_mut().working = state.unwrap_or_default();
        Ok(())
    }

    /// Commit the working state into the attributes.
    pub fn save_state(&self) -> Result<()> {
        self.ensure_live("save_state")?;
        let mut state = self.0.state.borrow_mut();
        let working = std::mem::take(&mut state.working);
        state.attrs.extend(working);
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        !self.0.state.borrow().working.is_empty()
    }

    // Events

    pub fn subscribe(&self, listener: impl FnMut(&EntityEvent) -> Flow + 'static) -> ListenerId {
        self.0.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.0.events.unsubscribe(id)
    }

    pub fn listener_count(&self) -> usize {
        self.0.events.len()
    }

    // Related lists

    pub(crate) fn related(&self, name: &str) -> Option<EntityList> {
        self.0.related.borrow().get(name).cloned()
    }

    pub(crate) fn attach_related(&self, name: &str, list: EntityList) {
        self.0.related.borrow_mut().insert(name.to_string(), list);
    }

    // Lifecycle

    /// Tear the entity down: notify listeners, leave the cache and refuse
    /// any further use.
    pub fn dealloc(&self, emit_destroy: bool) -> Result<()> {
        self.ensure_live("dealloc")?;
        if emit_destroy {
            self.emit(EntityEvent::Destroy(self.clone()));
        }
        self.emit(EntityEvent::Destroyed(self.clone()));

        let store = self.0.ctx.cache().entities();
        if store.get(self).is_some_and(|cached| cached.ptr_eq(self)) {
            store.remove(self);
        }
        self.0.state.borrow_mut().destroyed = true;
        self.0.events.clear();
        self.0.related.borrow_mut().clear();
        tracing::debug!(kind = self.0.kind.name(), path = %self.path(), "entity deallocated");
        Ok(())
    }

    /// Mark a discarded duplicate as unusable, silently.
    pub(crate) fn retire(&self) {
        self.0.state.borrow_mut().destroyed = true;
        self.0.events.clear();
        self.0.related.borrow_mut().clear();
    }

    /// Target id of a request: `opts.id` when given, else the entity's own.
    /// The attributes are left alone.
    fn resolve_id(&self, opts: &RequestOptions) -> Result<String> {
        opts.id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| self.id().filter(|id| !id.is_empty()))
            .ok_or(Error::MissingId)
    }

    /// Re-check against the store after a response changed the id away from
    /// `old_id`, so alias and real id converge on one instance.
    fn follow_id_change(&self, old_id: Option<String>) -> Entity {
        let new_id = self.id();
        if new_id == old_id {
            return self.clone();
        }
        tracing::debug!(from = ?old_id, to = ?new_id, "response changed the entity id");
        let old_path = old_id.map(|id| self.path_for(&id));
        self.0
            .ctx
            .cache()
            .entities()
            .rekey(self, old_path.as_deref())
    }

    // Network operations

    /// Create the resource on the server.
    ///
    /// Only valid while the entity has no id. On success the attributes are
    /// replaced from the response and the entity is run through the cache;
    /// the returned [`Synced::entity`] is the canonical instance.
    pub fn create(&self, opts: RequestOptions) -> LocalBoxFuture<'static, Result<Synced>> {
        if let Err(err) = self.ensure_live("create") {
            return fail(err);
        }
        if self.id().is_some() {
            return fail(Error::AlreadyCreated(self.0.kind.name().to_string()));
        }
        let client = match self.0.ctx.require_client(self.0.kind.name()) {
            Ok(client) => client,
            Err(err) => return fail(err),
        };
        let opts = opts.or_status_codes(StatusCodes::create());
        let path = self.path();
        let entity = self.clone();

        async move {
            let result = retry::run(opts.retry.clone(), Backoff::Immediate, "create", || {
                client.post(&path, &opts)
            })
            .await;

            match result {
                Ok(reply) => {
                    entity.absorb(&reply.body, Merge::Reset)?;
                    let canonical = entity.0.ctx.cache().entities().check(&entity, false);
                    Ok(Synced {
                        entity: canonical,
                        reply,
                    })
                }
                Err(err) => {
                    tracing::debug!(path = %path, error = %err, "create failed");
                    entity.emit(EntityEvent::CreatedError {
                        entity: entity.clone(),
                        error: err.clone(),
                    });
                    Err(err)
                }
            }
        }
        .boxed_local()
    }

    /// Fetch the resource, replacing attributes unless the server answers
    /// "not modified".
    pub fn fetch(&self, opts: RequestOptions) -> LocalBoxFuture<'static, Result<Synced>> {
        if let Err(err) = self.ensure_live("fetch") {
            return fail(err);
        }
        let id = match self.resolve_id(&opts) {
            Ok(id) => id,
            Err(err) => return fail(err),
        };
        let client = match self.0.ctx.require_client(self.0.kind.name()) {
            Ok(client) => client,
            Err(err) => return fail(err),
        };
        let mut opts = opts.or_status_codes(StatusCodes::fetch());
        if self.0.kind.use_etags() {
            if let Some(etag) = self.etag() {
                opts.headers.insert("If-None-Match".to_string(), etag);
            }
        }
        let path = self.path_for(&id);
        let old_id = self.id();
        let entity = self.clone();

        async move {
            let reply = retry::run(opts.retry.clone(), Backoff::Delayed, "fetch", || {
                client.get(&path, &opts)
            })
            .await?;

            if entity.0.kind.use_etags() {
                if let Some(etag) = reply.header("etag") {
                    entity.0.state.borrow_mut().etag = Some(etag.to_string());
                }
            }
            if reply.status != 304 {
                entity.absorb(&reply.body, Merge::Reset)?;
                entity.0.state.borrow_mut().last_modified =
                    reply.header("last-modified").map(str::to_string);
            }

            if entity.id().is_none() {
                entity.set_id(&id)?;
            }
            let canonical = entity.follow_id_change(old_id);
            Ok(Synced {
                entity: canonical,
                reply,
            })
        }
        .boxed_local()
    }

    /// Update the resource optimistically.
    ///
    /// The JSON body is applied locally right away (`put` replaces, otherwise
    /// merges). The server response is folded in on success; on failure the
    /// attributes go back to the exact pre-update snapshot.
    pub fn update(&self, opts: RequestOptions) -> LocalBoxFuture<'static, Result<Reply>> {
        if let Err(err) = self.ensure_live("update") {
            return fail(err);
        }
        let id = match self.resolve_id(&opts) {
            Ok(id) => id,
            Err(err) => return fail(err),
        };
        let client = match self.0.ctx.require_client(self.0.kind.name()) {
            Ok(client) => client,
            Err(err) => return fail(err),
        };
        let opts = opts.or_status_codes(StatusCodes::update());

        let old_id = self.id();
        let snapshot = self.attrs();
        if let Some(body) = opts.json_attrs() {
            let applied = if opts.put {
                self.replace(body)
            } else {
                self.extend(body)
            };
            if let Err(err) = applied {
                return fail(err);
            }
        }

        let method = if opts.put { Method::Put } else { Method::Patch };
        let path = self.path_for(&id);
        let entity = self.clone();

        async move {
            let result = retry::run(opts.retry.clone(), Backoff::Delayed, "update", || {
                client.send(method, &path, &opts)
            })
            .await;

            match result {
                Ok(reply) => {
                    let merge = entity.0.kind.update_merge();
                    entity.absorb(&reply.body, merge)?;
                    entity.follow_id_change(old_id);
                    Ok(reply)
                }
                Err(err) => {
                    tracing::debug!(path = %path, error = %err, "update failed, rolling back");
                    entity.restore(snapshot);
                    Err(err)
                }
            }
        }
        .boxed_local()
    }

    /// Delete the resource.
    ///
    /// `Destroy` is emitted immediately so owning lists can drop the entity;
    /// a failure emits `DestroyedError` and leaves the entity live.
    pub fn destroy(&self, opts: RequestOptions) -> LocalBoxFuture<'static, Result<Reply>> {
        if let Err(err) = self.ensure_live("destroy") {
            return fail(err);
        }
        let id = match self.resolve_id(&opts) {
            Ok(id) => id,
            Err(err) => return fail(err),
        };
        let client = match self.0.ctx.require_client(self.0.kind.name()) {
            Ok(client) => client,
            Err(err) => return fail(err),
        };
        let mut opts = opts.or_status_codes(StatusCodes::destroy());
        if opts.json.is_none() {
            opts.json = self.0.kind.destroy_body(&self.0.state.borrow().attrs);
        }
        let path = self.path_for(&id);
        self.emit(EntityEvent::Destroy(self.clone()));
        let entity = self.clone();

        async move {
            match client.delete(&path, &opts).await {
                Ok(reply) => {
                    if !entity.is_destroyed() {
                        entity.dealloc(false)?;
                    }
                    Ok(reply)
                }
                Err(err) => {
                    tracing::debug!(path = %path, error = %err, "destroy failed");
                    entity.emit(EntityEvent::DestroyedError {
                        entity: entity.clone(),
                        error: err.clone(),
                    });
                    Err(err)
                }
            }
        }
        .boxed_local()
    }

    /// Probe the server with a HEAD request and report whether its
    /// last-modified marker differs from the one seen at the last fetch.
    pub fn has_remote_changes(&self, opts: RequestOptions) -> LocalBoxFuture<'static, Result<bool>> {
        if let Err(err) = self.ensure_live("has_remote_changes") {
            return fail(err);
        }
        let Some(last_modified) = self.last_modified() else {
            return fail(Error::NotFetched(self.0.kind.name().to_string()));
        };
        let id = match self.resolve_id(&opts) {
            Ok(id) => id,
            Err(err) => return fail(err),
        };
        let client = match self.0.ctx.require_client(self.0.kind.name()) {
            Ok(client) => client,
            Err(err) => return fail(err),
        };
        let opts = opts.or_status_codes(StatusCodes::head());
        let path = self.path_for(&id);

        async move {
            let reply = client.head(&path, &opts).await?;
            Ok(reply.header("last-modified") != Some(last_modified.as_str()))
        }
        .boxed_local()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.state.borrow();
        f.debug_struct("Entity")
            .field("kind", &self.0.kind.name())
            .field("url_path", &self.0.url_path)
            .field("attrs", &state.attrs)
            .field("destroyed", &state.destroyed)
            .finish()
    }
}
