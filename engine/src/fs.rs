//! File-system resources: files and directories inside a container.
//!
//! Entries are addressed by their absolute filepath, built from the `path`
//! (parent directory) and `name` attributes. Directories end in `/` and the
//! root directory is `/`. Each directory's contents are a list keyed by
//! `{ "path": <dir id> }`.

use crate::client::{fail, Reply, RequestOptions};
use crate::kind::{ListKind, Merge, ResourceKind};
use crate::{Attrs, Entity, EntityList, Error, ListOptions, Result, Seed, Synced};
use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::{json, Value};
use std::rc::Rc;

/// URL segment shared by files, dirs and their lists.
pub const FILES_SEGMENT: &str = "files";

const CONTENTS: &str = "contents";

/// Kind for a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsEntryKind {
    dir: bool,
}

impl FsEntryKind {
    pub const FILE: FsEntryKind = FsEntryKind { dir: false };
    pub const DIR: FsEntryKind = FsEntryKind { dir: true };

    pub fn is_dir(&self) -> bool {
        self.dir
    }
}

pub fn file_kind() -> Rc<dyn ResourceKind> {
    Rc::new(FsEntryKind::FILE)
}

pub fn dir_kind() -> Rc<dyn ResourceKind> {
    Rc::new(FsEntryKind::DIR)
}

pub fn fs_list_kind() -> Rc<dyn ListKind> {
    Rc::new(FsListKind)
}

impl ResourceKind for FsEntryKind {
    fn name(&self) -> &str {
        if self.dir {
            "Dir"
        } else {
            "File"
        }
    }

    fn url_segment(&self) -> &str {
        FILES_SEGMENT
    }

    fn use_etags(&self) -> bool {
        !self.dir
    }

    fn id(&self, attrs: &Attrs) -> Option<String> {
        filepath(attrs)
    }

    fn set_id(&self, attrs: &mut Attrs, id: &str) {
        let (path, name) = split_filepath(id);
        attrs.insert("path".to_string(), Value::String(path));
        attrs.insert("name".to_string(), Value::String(name));
    }

    fn update_merge(&self) -> Merge {
        if self.dir {
            Merge::Reset
        } else {
            Merge::Extend
        }
    }

    fn destroy_body(&self, attrs: &Attrs) -> Option<Value> {
        Some(Value::Object(attrs.clone()))
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn is_dir_attrs(attrs: &Attrs) -> bool {
    attrs.get("isDir").and_then(Value::as_bool).unwrap_or(false)
}

/// Absolute filepath from `path` and `name`; dirs get a trailing slash.
pub fn filepath(attrs: &Attrs) -> Option<String> {
    let dir = attrs.get("path").and_then(text)?;
    let name = attrs.get("name").and_then(text)?;
    let mut joined = normalize(&format!("{dir}/{name}"));
    if is_dir_attrs(attrs) && !joined.ends_with('/') {
        joined.push('/');
    }
    Some(joined)
}

fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}

/// Split a filepath into parent directory and name.
///
/// The root `/` becomes an empty path with name `/`.
pub fn split_filepath(filepath: &str) -> (String, String) {
    let trimmed = filepath.trim_end_matches('/');
    if trimmed.is_empty() {
        return (String::new(), "/".to_string());
    }
    match trimmed.rfind('/') {
        Some(0) => ("/".to_string(), trimmed[1..].to_string()),
        Some(i) => (trimmed[..i].to_string(), trimmed[i + 1..].to_string()),
        None => (".".to_string(), trimmed.to_string()),
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.contains('/') {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

/// List of a directory's entries.
#[derive(Debug, Clone, Copy)]
pub struct FsListKind;

impl ListKind for FsListKind {
    fn name(&self) -> &str {
        "FsList"
    }

    fn url_segment(&self) -> &str {
        FILES_SEGMENT
    }

    fn member_kind(&self, attrs: &Attrs) -> Rc<dyn ResourceKind> {
        if is_dir_attrs(attrs) {
            dir_kind()
        } else {
            file_kind()
        }
    }

    fn accepts(&self, entity: &Entity) -> bool {
        matches!(entity.kind().name(), "File" | "Dir")
    }

    fn member_id(&self, attrs: &Attrs) -> Option<String> {
        filepath(attrs)
    }

    fn validate(&self, attrs: &Attrs) -> Result<()> {
        match attrs.get("name").and_then(Value::as_str) {
            Some(name) => check_name(name),
            None => Ok(()),
        }
    }

    fn optimistic_create(&self) -> bool {
        false
    }

    fn prepare_create(&self, mut body: Attrs, query: &Attrs) -> Attrs {
        body.insert(
            "path".to_string(),
            query.get("path").cloned().unwrap_or(Value::Null),
        );
        body
    }

    fn placeholder_attrs(&self, body: &Attrs) -> Attrs {
        let mut attrs = body.clone();
        attrs.remove("name");
        attrs.remove("path");
        attrs
    }
}

/// The contents list of `dir`, created and cached on first use.
pub fn dir_contents(dir: &Entity) -> Result<EntityList> {
    if let Some(list) = dir.related(CONTENTS) {
        return Ok(list);
    }
    let qs = contents_query(dir);
    let opts = ListOptions::new()
        .with_parent_path(dir.parent_path())
        .with_qs(qs);
    let ctx = dir.context();
    let list = ctx
        .cache()
        .lists()
        .check_new_list(fs_list_kind(), vec![], &opts, ctx)?;
    dir.attach_related(CONTENTS, list.clone());
    Ok(list)
}

fn contents_query(dir: &Entity) -> Attrs {
    let mut qs = Attrs::new();
    qs.insert("path".to_string(), dir.id().map(Value::String).unwrap_or(Value::Null));
    qs
}

pub fn create_dir(list: &EntityList, name: &str) -> LocalBoxFuture<'static, Result<Synced>> {
    list.create(RequestOptions::json(json!({"name": name, "isDir": true})))
}

pub fn create_file(list: &EntityList, name: &str) -> LocalBoxFuture<'static, Result<Synced>> {
    list.create(RequestOptions::json(json!({"name": name})))
}

/// Rename an entry, optimistically.
///
/// The cache is re-keyed right away (and a directory's contents follow);
/// everything is put back if the server refuses.
pub fn rename(entry: &Entity, name: &str) -> LocalBoxFuture<'static, Result<Reply>> {
    if let Err(err) = check_name(name).and_then(|_| entry.ensure_live("rename")) {
        return fail(err);
    }
    let Some(old_id) = entry.id() else {
        return fail(Error::MissingId);
    };
    let old_name = entry.get("name").unwrap_or(Value::Null);
    let is_dir = is_dir_attrs(&entry.attrs());

    retarget(entry, "name", Value::String(name.to_string()));
    let pending = entry.update(
        RequestOptions::json(json!({"name": name, "isDir": is_dir})).with_id(old_id),
    );
    let entry = entry.clone();

    async move {
        let result = pending.await;
        if result.is_err() {
            retarget(&entry, "name", old_name);
        }
        result
    }
    .boxed_local()
}

/// Move an entry into `dir`, optimistically.
///
/// The entry leaves `from` (its current directory listing, if known) and
/// joins `dir`'s contents at once; both moves are undone on failure.
pub fn move_to_dir(
    entry: &Entity,
    from: Option<&EntityList>,
    dir: &Entity,
) -> LocalBoxFuture<'static, Result<Reply>> {
    if let Err(err) = entry.ensure_live("move_to_dir") {
        return fail(err);
    }
    let (Some(old_id), Some(new_path)) = (entry.id(), dir.id()) else {
        return fail(Error::MissingId);
    };
    let to = match dir_contents(dir) {
        Ok(list) => list,
        Err(err) => return fail(err),
    };
    let old_path = entry.get("path").unwrap_or(Value::Null);

    if let Some(from) = from {
        from.remove(entry);
    }
    retarget(entry, "path", Value::String(new_path.clone()));
    if let Err(err) = to.add_one(entry) {
        return fail(err);
    }

    let pending = entry.update(RequestOptions::json(json!({"path": new_path})).with_id(old_id));
    let entry = entry.clone();
    let from = from.cloned();

    async move {
        let result = pending.await;
        if result.is_err() {
            to.remove(&entry);
            retarget(&entry, "path", old_path);
            if let Some(from) = from {
                if let Err(err) = from.add_one(&entry) {
                    tracing::warn!(error = %err, "failed to restore entry to its directory");
                }
            }
        }
        result
    }
    .boxed_local()
}

/// Change `key` on an entry and move it to its new cache key. Lists holding
/// the entry re-index it; directory contents follow the directory.
///
/// A failed update restores the attributes it snapshotted after the
/// optimistic retarget, so undoing is another retarget.
fn retarget(entry: &Entity, key: &str, value: Value) {
    let store = entry.context().cache().entities();
    store.remove(entry);
    let mut change = Attrs::new();
    change.insert(key.to_string(), value);
    if let Err(err) = entry.extend(change) {
        tracing::warn!(error = %err, key, "failed to retarget fs entry");
        return;
    }
    store.add(entry);

    if let Some(contents) = entry.related(CONTENTS) {
        let qs = contents_query(entry);
        contents.set_query(qs);
        let dir_id = entry.id().map(Value::String).unwrap_or(Value::Null);
        for member in contents.models() {
            retarget(&member, "path", dir_id.clone());
        }
        contents.rebuild_index();
    }
    tracing::trace!(path = %entry.path(), "fs entry retargeted");
}

/// Seed for a file-system entry from its parent directory and name.
pub fn entry_seed(dir_path: &str, name: &str, is_dir: bool) -> Seed {
    let mut attrs = Attrs::new();
    attrs.insert("path".to_string(), Value::String(dir_path.to_string()));
    attrs.insert("name".to_string(), Value::String(name.to_string()));
    if is_dir {
        attrs.insert("isDir".to_string(), Value::Bool(true));
    }
    Seed::Attrs(attrs)
}
