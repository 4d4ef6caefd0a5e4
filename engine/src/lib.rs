//! # Tether Engine
//!
//! Client-side object mapping for REST resources.
//!
//! This crate models server resources as stateful, shared objects and keeps
//! an identity cache so that every lookup of the same resource yields the
//! same in-memory object. Mutations are applied optimistically and rolled
//! back when the server refuses them.
//!
//! ## Design Principles
//!
//! - **No IO**: requests go through the [`Transport`] trait; the engine never
//!   opens a socket
//! - **One object per resource**: [`EntityStore`] and [`ListStore`] hand out
//!   canonical instances keyed by path (and query, for lists)
//! - **Optimistic**: local state changes when an operation is called, not when
//!   the server answers
//! - **Explicit wiring**: the [`Cache`] and [`Client`] travel in a [`Context`];
//!   there are no globals
//!
//! ## Core Concepts
//!
//! ### Entities
//!
//! An [`Entity`] is one resource: a path derived from its kind and id, an
//! attribute bag, a working-state overlay, ETag/last-modified markers and a
//! destroyed flag. Operations:
//! - [`Entity::create`] - POST, then register in the cache
//! - [`Entity::fetch`] - GET, conditional when the kind uses ETags
//! - [`Entity::update`] - PATCH/PUT, applied locally first, rolled back on failure
//! - [`Entity::destroy`] - DELETE, announced to owning lists before it resolves
//! - [`Entity::has_remote_changes`] - HEAD probe against last-modified
//!
//! ### Lists
//!
//! An [`EntityList`] is an ordered, deduplicated set of entities sharing a
//! base path and query. Lists watch their members and drop them when they are
//! destroyed.
//!
//! ### Kinds
//!
//! [`ResourceKind`] and [`ListKind`] are per-type strategies (URL segment, id
//! attribute, parsing, creation rules). [`GenericKind`] covers config-only
//! resource types; [`fs`] provides files and directories.
//!
//! ## Quick Start
//!
//! ```rust
//! use tether_engine::{
//!     attrs_of, Cache, Client, EntityOptions, GenericKind, MockTransport, Parent,
//!     RawResponse, RequestOptions, Root,
//! };
//! use serde_json::json;
//!
//! // 1. A transport (here an in-memory one) and a cache
//! let transport = MockTransport::new(|_| {
//!     Ok(RawResponse::new(200, json!({"_id": "42", "name": "fresh"})))
//! });
//! let root = Root::new(Client::new(transport), Cache::new(true));
//!
//! // 2. Resolve entities through the cache
//! let widgets = GenericKind::new("Widget", "widgets").shared();
//! let a = root.new_child(widgets.clone(), "42", EntityOptions::new()).unwrap();
//! let b = root
//!     .new_child(widgets, attrs_of(json!({"_id": "42"})), EntityOptions::new())
//!     .unwrap();
//! assert!(a.ptr_eq(&b));
//!
//! // 3. Fetch
//! futures::executor::block_on(a.fetch(RequestOptions::new())).unwrap();
//! assert_eq!(b.get("name"), Some(json!("fresh")));
//! ```

pub mod attrs;
pub mod cache;
pub mod client;
pub mod context;
pub mod entity;
pub mod entity_store;
pub mod error;
pub mod events;
pub mod factory;
pub mod fs;
pub mod kind;
pub mod list;
pub mod list_store;
pub mod mock;
pub mod path;
pub mod retry;
pub mod transport;

// Re-export main types at crate root
pub use attrs::{attrs_of, id_from_value, Attrs, Seed};
pub use cache::Cache;
pub use client::{Client, Reply, RequestOptions, StatusCodes, TOKEN_HEADER};
pub use context::Context;
pub use entity::{Entity, EntityOptions, Synced};
pub use entity_store::EntityStore;
pub use error::{ApiError, Error, RequestContext, Result};
pub use events::{EntityEvent, Flow, ListEvent, ListenerId};
pub use factory::{Parent, Root};
pub use kind::{GenericKind, GenericListKind, ListKind, Merge, ResourceKind};
pub use list::{AddOptions, EntityList, ListOptions};
pub use list_store::{query_hash, ListStore};
pub use mock::MockTransport;
pub use retry::RetryPolicy;
pub use transport::{Method, RawResponse, Request, Transport, TransportError};
