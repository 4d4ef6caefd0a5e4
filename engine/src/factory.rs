//! Parent → child construction.
//!
//! Anything with a path can hand out child entities and lists whose paths
//! nest under its own. The [`Root`] sits at the top with an empty path.

use crate::client::{fail, Reply, RequestOptions};
use crate::kind::{ListKind, ResourceKind};
use crate::{
    Attrs, Cache, Client, Context, Entity, EntityList, EntityOptions, Error, ListOptions, Result,
    Seed, Synced,
};
use futures::future::{FutureExt, LocalBoxFuture};
use std::rc::Rc;

/// A resource that child entities and lists nest under.
pub trait Parent {
    fn context(&self) -> &Context;

    /// Path children are built under.
    fn child_path(&self) -> String;

    /// Resolve a child entity through the identity cache.
    fn new_child(
        &self,
        kind: Rc<dyn ResourceKind>,
        seed: impl Into<Seed>,
        opts: EntityOptions,
    ) -> Result<Entity> {
        let opts = opts.with_parent_path(self.child_path());
        let ctx = self.context();
        ctx.cache().entities().check_new_entity(kind, seed, &opts, ctx)
    }

    /// Create a child on the server; resolves to the canonical entity.
    fn create_child(
        &self,
        kind: Rc<dyn ResourceKind>,
        opts: RequestOptions,
    ) -> LocalBoxFuture<'static, Result<Synced>> {
        let entity_opts = EntityOptions::new().with_parent_path(self.child_path());
        match Entity::new(kind, Seed::Attrs(Default::default()), &entity_opts, self.context()) {
            Ok(entity) => entity.create(opts),
            Err(err) => fail(err),
        }
    }

    /// Fetch a child by id.
    fn fetch_child(
        &self,
        kind: Rc<dyn ResourceKind>,
        id: &str,
        opts: RequestOptions,
    ) -> LocalBoxFuture<'static, Result<Synced>> {
        match self.cached_child(kind, id) {
            Ok(entity) => entity.fetch(opts),
            Err(err) => fail(err),
        }
    }

    /// Update a child by id; resolves to the entity and the server reply.
    fn update_child(
        &self,
        kind: Rc<dyn ResourceKind>,
        id: &str,
        opts: RequestOptions,
    ) -> LocalBoxFuture<'static, Result<Synced>> {
        let entity = match self.cached_child(kind, id) {
            Ok(entity) => entity,
            Err(err) => return fail(err),
        };
        let pending = entity.update(opts);
        async move {
            let reply = pending.await?;
            Ok(Synced { entity, reply })
        }
        .boxed_local()
    }

    fn destroy_child(
        &self,
        kind: Rc<dyn ResourceKind>,
        id: &str,
        opts: RequestOptions,
    ) -> LocalBoxFuture<'static, Result<Reply>> {
        match self.cached_child(kind, id) {
            Ok(entity) => entity.destroy(opts),
            Err(err) => fail(err),
        }
    }

    #[doc(hidden)]
    fn cached_child(&self, kind: Rc<dyn ResourceKind>, id: &str) -> Result<Entity> {
        if id.is_empty() {
            return Err(Error::MissingId);
        }
        let opts = EntityOptions::new().with_parent_path(self.child_path());
        let candidate = Entity::new(kind, id, &opts, self.context())?;
        Ok(self.context().cache().entities().check(&candidate, false))
    }

    /// Resolve a child list through the list cache.
    ///
    /// A query (possibly empty) or `no_store` is required.
    fn new_list(
        &self,
        kind: Rc<dyn ListKind>,
        seeds: Vec<Seed>,
        opts: ListOptions,
    ) -> Result<EntityList> {
        if opts.qs.is_none() && !opts.no_store {
            return Err(Error::MissingQuery);
        }
        let opts = opts.with_parent_path(self.child_path());
        let ctx = self.context();
        ctx.cache().lists().check_new_list(kind, seeds, &opts, ctx)
    }

    /// Fetch a child list for `qs`; resolves to the canonical list.
    fn fetch_list(
        &self,
        kind: Rc<dyn ListKind>,
        qs: Attrs,
        opts: RequestOptions,
    ) -> LocalBoxFuture<'static, Result<EntityList>> {
        let list_opts = ListOptions::new()
            .with_parent_path(self.child_path())
            .with_qs(qs.clone());
        let ctx = self.context();
        let list = match EntityList::new(kind, vec![], &list_opts, ctx)
            .and_then(|list| ctx.cache().lists().check(&list, false))
        {
            Ok(list) => list,
            Err(err) => return fail(err),
        };
        let pending = list.fetch(opts.with_qs(qs));
        async move {
            pending.await?;
            Ok(list)
        }
        .boxed_local()
    }
}

impl Parent for Entity {
    fn context(&self) -> &Context {
        Entity::context(self)
    }

    fn child_path(&self) -> String {
        self.path()
    }
}

/// Top of the resource tree.
#[derive(Debug, Clone)]
pub struct Root {
    ctx: Context,
}

impl Root {
    pub fn new(client: Client, cache: Cache) -> Self {
        Self {
            ctx: Context::new(client, cache),
        }
    }

    pub fn from_context(ctx: Context) -> Self {
        Self { ctx }
    }

    pub fn cache(&self) -> &Cache {
        self.ctx.cache()
    }
}

impl Parent for Root {
    fn context(&self) -> &Context {
        &self.ctx
    }

    fn child_path(&self) -> String {
        String::new()
    }
}
