//! Ordered, deduplicated, query-scoped sets of entities.

use crate::client::{fail, Reply, RequestOptions, StatusCodes};
use crate::events::{Emitter, EntityEvent, Flow, ListEvent, ListenerId};
use crate::kind::ListKind;
use crate::{path, Attrs, Context, Entity, EntityOptions, EntityStore, Error, Result, Seed, Synced};
use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

/// Construction options for lists.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub parent_path: String,
    /// Query filter; part of the list's cache key
    pub qs: Option<Attrs>,
    pub no_store: bool,
    /// Reset a cached list with the given members (default: only new lists)
    pub reset: Option<bool>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent_path(mut self, parent_path: impl Into<String>) -> Self {
        self.parent_path = parent_path.into();
        self
    }

    pub fn with_qs(mut self, qs: Attrs) -> Self {
        self.qs = Some(qs);
        self
    }

    pub fn no_store(mut self) -> Self {
        self.no_store = true;
        self
    }

    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = Some(reset);
        self
    }
}

/// Options for [`EntityList::add`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AddOptions {
    /// Suppress `Add` events
    pub silent: bool,
}

impl AddOptions {
    pub fn silent() -> Self {
        Self { silent: true }
    }
}

#[derive(Default)]
struct Members {
    models: Vec<Entity>,
    index: HashMap<String, Entity>,
}

struct Watch {
    entity: Entity,
    listener: ListenerId,
    /// Dropped optimistically by a destroy that has not resolved yet
    awaiting_destroy: Cell<bool>,
}

struct ListInner {
    kind: Rc<dyn ListKind>,
    ctx: Context,
    url_path: String,
    parent_path: String,
    no_store: bool,
    query: RefCell<Attrs>,
    members: RefCell<Members>,
    watches: RefCell<HashMap<usize, Watch>>,
    pending: RefCell<HashMap<usize, (Entity, ListenerId)>>,
    events: Emitter<ListEvent>,
}

/// Handle to a list of entities.
#[derive(Clone)]
pub struct EntityList(Rc<ListInner>);

impl EntityList {
    /// Build a list without consulting the list cache.
    pub fn new(
        kind: Rc<dyn ListKind>,
        seeds: Vec<Seed>,
        opts: &ListOptions,
        ctx: &Context,
    ) -> Result<Self> {
        if !opts.no_store && ctx.client().is_none() {
            return Err(Error::MissingClient(kind.name().to_string()));
        }
        let url_path = path::join(&[&opts.parent_path, kind.url_segment()]);
        let list = Self(Rc::new(ListInner {
            kind,
            ctx: ctx.clone(),
            url_path,
            parent_path: opts.parent_path.clone(),
            no_store: opts.no_store,
            query: RefCell::new(opts.qs.clone().unwrap_or_default()),
            members: RefCell::new(Members::default()),
            watches: RefCell::new(HashMap::new()),
            pending: RefCell::new(HashMap::new()),
            events: Emitter::new(),
        }));
        list.add(seeds, AddOptions::default())?;
        Ok(list)
    }

    pub fn kind(&self) -> &Rc<dyn ListKind> {
        &self.0.kind
    }

    pub fn context(&self) -> &Context {
        &self.0.ctx
    }

    pub fn path(&self) -> &str {
        &self.0.url_path
    }

    pub fn parent_path(&self) -> &str {
        &self.0.parent_path
    }

    pub fn is_no_store(&self) -> bool {
        self.0.no_store
    }

    pub fn query(&self) -> Attrs {
        self.0.query.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &EntityList) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn models(&self) -> Vec<Entity> {
        self.0.members.borrow().models.clone()
    }

    pub fn len(&self) -> usize {
        self.0.members.borrow().models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_by_id(&self, id: &str) -> Option<Entity> {
        self.0.members.borrow().index.get(id).cloned()
    }

    pub fn find(&self, mut predicate: impl FnMut(&Entity) -> bool) -> Option<Entity> {
        self.0
            .members
            .borrow()
            .models
            .iter()
            .find(|entity| predicate(entity))
            .cloned()
    }

    pub fn position(&self, mut predicate: impl FnMut(&Entity) -> bool) -> Option<usize> {
        self.0
            .members
            .borrow()
            .models
            .iter()
            .position(|entity| predicate(entity))
    }

    pub fn last(&self) -> Option<Entity> {
        self.0.members.borrow().models.last().cloned()
    }

    /// Take the last member off the list without emitting events.
    pub fn pop(&self) -> Option<Entity> {
        let entity = {
            let mut members = self.0.members.borrow_mut();
            let entity = members.models.pop()?;
            if let Some(id) = entity.id() {
                members.index.remove(&id);
            }
            entity
        };
        self.unwatch(&entity);
        Some(entity)
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.models().iter().map(Entity::to_json).collect())
    }

    pub fn subscribe(&self, listener: impl FnMut(&ListEvent) -> Flow + 'static) -> ListenerId {
        self.0.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.0.events.unsubscribe(id)
    }

    fn emit(&self, event: ListEvent) {
        self.0.events.emit(&event);
    }

    /// Whether the list already holds the resource `seed` describes.
    ///
    /// Plain data without an id cannot be matched; that case logs a warning
    /// and answers `false`.
    pub fn contains(&self, seed: &Seed) -> bool {
        match seed {
            Seed::Id(id) => self.get_by_id(id).is_some(),
            Seed::Entity(entity) => match entity.id() {
                Some(id) => self.get_by_id(&id).is_some(),
                None => self
                    .0
                    .members
                    .borrow()
                    .models
                    .iter()
                    .any(|member| member.equals(entity)),
            },
            Seed::Attrs(attrs) => match self.0.kind.member_id(attrs) {
                Some(id) => self.get_by_id(&id).is_some(),
                None => {
                    let data = serde_json::Value::Object(attrs.clone());
                    tracing::warn!(
                        list = self.0.kind.name(),
                        %data,
                        "possible duplicate list member: data without an id attribute"
                    );
                    false
                }
            },
        }
    }

    fn validate(&self, seeds: &[Seed]) -> Result<()> {
        seeds
            .iter()
            .try_for_each(|seed| self.0.kind.validate(&seed.attrs()))
    }

    /// Add members, skipping any the list already contains.
    ///
    /// Every seed is validated before anything is added.
    pub fn add(&self, seeds: Vec<Seed>, opts: AddOptions) -> Result<()> {
        self.validate(&seeds)?;
        self.add_validated(seeds, opts)
    }

    pub fn add_one(&self, seed: impl Into<Seed>) -> Result<()> {
        self.add(vec![seed.into()], AddOptions::default())
    }

    fn add_validated(&self, seeds: Vec<Seed>, opts: AddOptions) -> Result<()> {
        for seed in seeds {
            let entity = match seed {
                Seed::Entity(entity) if self.0.kind.accepts(&entity) => entity,
                Seed::Entity(entity) => self.new_member(Seed::Attrs(entity.attrs()), true)?,
                other => self.new_member(other, true)?,
            };
            self.insert(entity, opts.silent);
        }
        Ok(())
    }

    /// Resolve a seed to the canonical member entity.
    fn new_member(&self, seed: Seed, warn: bool) -> Result<Entity> {
        let attrs = seed.attrs();
        let kind = self.0.kind.member_kind(&attrs);
        let mut opts = EntityOptions::new()
            .with_parent_path(self.0.parent_path.clone())
            .with_reset(!seed.is_id() && !self.0.no_store);
        if !warn {
            opts = opts.quiet();
        }
        self.0
            .ctx
            .cache()
            .entities()
            .check_new_entity(kind, seed, &opts, &self.0.ctx)
    }

    fn insert(&self, entity: Entity, silent: bool) -> bool {
        if self.contains(&Seed::Entity(entity.clone())) {
            return false;
        }
        self.add_to_hash(&entity);
        self.0.members.borrow_mut().models.push(entity.clone());
        self.watch(&entity);
        tracing::trace!(list = %self.0.url_path, path = %entity.path(), "member added");
        if !silent {
            self.emit(ListEvent::Add(entity));
        }
        true
    }

    /// Index a member by id, or wait for the id of a member still being
    /// created.
    fn add_to_hash(&self, entity: &Entity) {
        let Some(id) = entity.id() else {
            self.await_id(entity);
            return;
        };
        if self.get_by_id(&id).is_some() {
            self.remove_duplicates(entity);
        } else {
            self.0.members.borrow_mut().index.insert(id, entity.clone());
        }
    }

    fn await_id(&self, entity: &Entity) {
        let addr = entity.addr();
        if self.0.pending.borrow().contains_key(&addr) {
            return;
        }
        let weak = Rc::downgrade(&self.0);
        let listener = entity.subscribe(move |event| {
            let Some(list) = upgrade(&weak) else {
                return Flow::Detach;
            };
            match event {
                EntityEvent::Update { entity, .. } if entity.id().is_some() => {
                    list.0.pending.borrow_mut().remove(&entity.addr());
                    list.add_to_hash(entity);
                    Flow::Detach
                }
                EntityEvent::CreatedError { entity, .. } | EntityEvent::Destroyed(entity) => {
                    list.0.pending.borrow_mut().remove(&entity.addr());
                    Flow::Detach
                }
                _ => Flow::Continue,
            }
        });
        self.0
            .pending
            .borrow_mut()
            .insert(addr, (entity.clone(), listener));
    }

    /// Collapse members equal to `entity` onto the first occurrence,
    /// canonicalized through the entity store.
    fn remove_duplicates(&self, entity: &Entity) {
        let store = self.0.ctx.cache().entities();
        let models = std::mem::take(&mut self.0.members.borrow_mut().models);
        let mut kept = Vec::with_capacity(models.len());
        let mut index = HashMap::new();
        let mut first = true;
        let mut dropped = 0;

        for member in models {
            if member.equals(entity) {
                if !first {
                    dropped += 1;
                    continue;
                }
                first = false;
            }
            let member = match member.id() {
                Some(id) => {
                    let member = store.get(&member).unwrap_or(member);
                    index.insert(id, member.clone());
                    member
                }
                None => member,
            };
            kept.push(member);
        }

        {
            let mut members = self.0.members.borrow_mut();
            members.models = kept;
            members.index = index;
        }
        tracing::debug!(list = %self.0.url_path, path = %entity.path(), dropped, "duplicate members removed");
        self.sync_watches();
    }

    /// Remove a member; matches by object first, then by id.
    pub fn remove(&self, entity: &Entity) -> bool {
        self.remove_member(entity, true)
    }

    fn remove_member(&self, entity: &Entity, unwatch: bool) -> bool {
        let removed = {
            let mut members = self.0.members.borrow_mut();
            let id = entity.id();
            if let Some(id) = &id {
                members.index.remove(id);
            }
            let position = members
                .models
                .iter()
                .position(|member| member.ptr_eq(entity))
                .or_else(|| {
                    id.as_ref().and_then(|id| {
                        members
                            .models
                            .iter()
                            .position(|member| member.id().as_ref() == Some(id))
                    })
                });
            position.map(|i| members.models.remove(i))
        };

        if unwatch {
            self.unwatch(entity);
            if let Some(member) = &removed {
                self.unwatch(member);
            }
        }
        self.drop_pending(entity);

        match removed {
            Some(member) => {
                tracing::trace!(list = %self.0.url_path, path = %member.path(), "member removed");
                self.emit(ListEvent::Remove(member));
                true
            }
            None => false,
        }
    }

    /// Replace membership with `seeds`.
    ///
    /// When the seeds describe exactly the current members only their
    /// attributes are refreshed and no events fire. Otherwise membership is
    /// rebuilt silently and a single `Reset` is emitted.
    pub fn reset(&self, seeds: Vec<Seed>) -> Result<()> {
        if self.data_matches(&seeds) {
            for seed in seeds {
                if let Seed::Attrs(attrs) = seed {
                    let member = self
                        .0
                        .kind
                        .member_id(&attrs)
                        .and_then(|id| self.get_by_id(&id));
                    if let Some(member) = member {
                        member.reset(attrs)?;
                    }
                }
            }
            return Ok(());
        }

        self.validate(&seeds)?;
        let old = {
            let mut members = self.0.members.borrow_mut();
            members.index.clear();
            std::mem::take(&mut members.models)
        };
        for member in &old {
            self.unwatch(member);
            self.drop_pending(member);
        }
        self.add_validated(seeds, AddOptions::silent())?;
        tracing::debug!(list = %self.0.url_path, before = old.len(), after = self.len(), "list reset");
        self.emit(ListEvent::Reset);
        Ok(())
    }

    fn data_matches(&self, seeds: &[Seed]) -> bool {
        seeds.len() == self.len() && seeds.iter().all(|seed| self.contains(seed))
    }

    /// Create a new member through this list.
    ///
    /// Optimistic list kinds add a placeholder right away and drop it again
    /// if the create fails; others add the created entity on success.
    pub fn create(&self, opts: RequestOptions) -> LocalBoxFuture<'static, Result<Synced>> {
        let Some(body) = opts.json_attrs() else {
            return fail(Error::MissingBody);
        };
        if let Err(err) = self.0.kind.validate(&body) {
            return fail(err);
        }
        let body = self.0.kind.prepare_create(body, &self.query());
        let placeholder = match self.new_member(Seed::Attrs(self.0.kind.placeholder_attrs(&body)), false) {
            Ok(entity) => entity,
            Err(err) => return fail(err),
        };

        // An existing member resolved from the body is not ours to remove.
        let added = self.0.kind.optimistic_create() && self.insert(placeholder.clone(), false);
        let pending = placeholder.create(RequestOptions {
            json: Some(Value::Object(body)),
            ..opts
        });
        let list = self.clone();

        async move {
            match pending.await {
                Ok(synced) => {
                    if added {
                        list.replace_member(&placeholder, &synced.entity);
                    } else {
                        list.insert(synced.entity.clone(), false);
                    }
                    Ok(synced)
                }
                Err(err) => {
                    if added {
                        list.remove(&placeholder);
                    }
                    Err(err)
                }
            }
        }
        .boxed_local()
    }

    /// Swap a retired placeholder for its canonical entity.
    fn replace_member(&self, placeholder: &Entity, canonical: &Entity) {
        if placeholder.ptr_eq(canonical) {
            return;
        }
        let already_member = self.find(|member| member.ptr_eq(canonical)).is_some();
        {
            let mut members = self.0.members.borrow_mut();
            if already_member {
                members.models.retain(|member| !member.ptr_eq(placeholder));
            } else {
                for member in members.models.iter_mut() {
                    if member.ptr_eq(placeholder) {
                        *member = canonical.clone();
                    }
                }
            }
            if let Some(id) = canonical.id() {
                members.index.insert(id, canonical.clone());
            }
        }
        self.drop_pending(placeholder);
        self.sync_watches();
    }

    /// Fetch members from the server and reset the list with them.
    ///
    /// Uses `opts.qs` when given, otherwise the list's query.
    pub fn fetch(&self, opts: RequestOptions) -> LocalBoxFuture<'static, Result<Reply>> {
        let client = match self.0.ctx.require_client(self.0.kind.name()) {
            Ok(client) => client,
            Err(err) => return fail(err),
        };
        let mut opts = opts.or_status_codes(StatusCodes::list());
        if opts.qs.is_none() {
            opts.qs = Some(self.query());
        }
        let path = self.0.url_path.clone();
        let list = self.clone();

        async move {
            let reply = client.get(&path, &opts).await?;
            let Value::Array(items) = &reply.body else {
                return Err(Error::NonArrayResponse {
                    list: list.0.kind.name().to_string(),
                    body: reply.body.clone(),
                });
            };
            let seeds = items
                .iter()
                .cloned()
                .map(Seed::from_value)
                .collect::<Result<Vec<_>>>()?;
            list.reset(seeds)?;
            Ok(reply)
        }
        .boxed_local()
    }

    /// Destroy a member through the list.
    pub fn destroy(&self, entity: &Entity, opts: RequestOptions) -> LocalBoxFuture<'static, Result<Reply>> {
        entity.destroy(opts)
    }

    /// Change the query, moving the list to its new cache key.
    pub fn set_query(&self, qs: Attrs) {
        let store = self.0.ctx.cache().lists();
        store.remove(self);
        *self.0.query.borrow_mut() = qs;
        store.add(self);
    }

    /// Run every member through the entity store, adopting cached instances.
    pub(crate) fn canonicalize(&self, store: &EntityStore) {
        let models = self.models();
        let mut changed = false;
        let canonical: Vec<Entity> = models
            .iter()
            .map(|member| {
                let resolved = store.check(member, false);
                changed |= !resolved.ptr_eq(member);
                resolved
            })
            .collect();
        if !changed {
            return;
        }
        {
            let mut members = self.0.members.borrow_mut();
            members.index = canonical
                .iter()
                .filter_map(|member| member.id().map(|id| (id, member.clone())))
                .collect();
            members.models = canonical;
        }
        self.sync_watches();
    }

    /// Detach from every member; used when a duplicate list is discarded.
    pub(crate) fn dealloc(&self) {
        let watches: Vec<Watch> = self.0.watches.borrow_mut().drain().map(|(_, w)| w).collect();
        for watch in watches {
            watch.entity.unsubscribe(watch.listener);
        }
        let pending: Vec<(Entity, ListenerId)> =
            self.0.pending.borrow_mut().drain().map(|(_, p)| p).collect();
        for (entity, listener) in pending {
            entity.unsubscribe(listener);
        }
        self.0.events.clear();
    }

    fn watch(&self, entity: &Entity) {
        let addr = entity.addr();
        if self.0.watches.borrow().contains_key(&addr) {
            return;
        }
        let weak = Rc::downgrade(&self.0);
        let listener = entity.subscribe(move |event| {
            let Some(list) = upgrade(&weak) else {
                return Flow::Detach;
            };
            list.on_member_event(event)
        });
        self.0.watches.borrow_mut().insert(
            addr,
            Watch {
                entity: entity.clone(),
                listener,
                awaiting_destroy: Cell::new(false),
            },
        );
    }

    fn on_member_event(&self, event: &EntityEvent) -> Flow {
        match event {
            EntityEvent::Destroy(entity) => {
                if let Some(watch) = self.0.watches.borrow().get(&entity.addr()) {
                    watch.awaiting_destroy.set(true);
                }
                self.remove_member(entity, false);
                Flow::Continue
            }
            EntityEvent::DestroyedError { entity, .. } => {
                if let Some(watch) = self.0.watches.borrow().get(&entity.addr()) {
                    watch.awaiting_destroy.set(false);
                }
                self.insert(entity.clone(), false);
                Flow::Continue
            }
            EntityEvent::Destroyed(entity) => {
                self.0.watches.borrow_mut().remove(&entity.addr());
                Flow::Detach
            }
            EntityEvent::Update { entity, .. } => {
                self.reindex(entity);
                Flow::Continue
            }
            _ => Flow::Continue,
        }
    }

    /// Follow a member whose id changed. A clash with another member is
    /// left for `add_to_hash` to resolve.
    fn reindex(&self, entity: &Entity) {
        let Some(id) = entity.id() else {
            return;
        };
        let mut members = self.0.members.borrow_mut();
        if members.index.contains_key(&id) {
            return;
        }
        if !members.models.iter().any(|member| member.ptr_eq(entity)) {
            return;
        }
        members.index.retain(|_, member| !member.ptr_eq(entity));
        members.index.insert(id, entity.clone());
    }

    /// Rebuild the id index from current membership.
    pub(crate) fn rebuild_index(&self) {
        let mut members = self.0.members.borrow_mut();
        let index = members
            .models
            .iter()
            .filter_map(|member| member.id().map(|id| (id, member.clone())))
            .collect();
        members.index = index;
    }

    fn unwatch(&self, entity: &Entity) {
        let watch = self.0.watches.borrow_mut().remove(&entity.addr());
        if let Some(watch) = watch {
            watch.entity.unsubscribe(watch.listener);
        }
    }

    fn drop_pending(&self, entity: &Entity) {
        let pending = self.0.pending.borrow_mut().remove(&entity.addr());
        if let Some((entity, listener)) = pending {
            entity.unsubscribe(listener);
        }
    }

    /// Make watches match current membership.
    fn sync_watches(&self) {
        let models = self.models();
        let live: HashSet<usize> = models.iter().map(Entity::addr).collect();
        let stale: Vec<Watch> = {
            let mut watches = self.0.watches.borrow_mut();
            let stale_keys: Vec<usize> = watches
                .iter()
                .filter(|(addr, watch)| !live.contains(addr) && !watch.awaiting_destroy.get())
                .map(|(addr, _)| *addr)
                .collect();
            stale_keys
                .into_iter()
                .filter_map(|addr| watches.remove(&addr))
                .collect()
        };
        for watch in stale {
            watch.entity.unsubscribe(watch.listener);
        }
        for member in &models {
            self.watch(member);
        }
    }
}

fn upgrade(weak: &Weak<ListInner>) -> Option<EntityList> {
    weak.upgrade().map(EntityList)
}

impl fmt::Debug for EntityList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityList")
            .field("kind", &self.0.kind.name())
            .field("path", &self.0.url_path)
            .field("query", &self.0.query.borrow())
            .field("len", &self.len())
            .finish()
    }
}
