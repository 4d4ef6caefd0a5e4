//! Per-type strategies for resources and lists.
//!
//! A [`ResourceKind`] says how one resource type is addressed and how its
//! attributes are read; a [`ListKind`] says which entities a list holds and
//! how it creates new ones. Most resource types are config-only and use
//! [`GenericKind`] / [`GenericListKind`].

use crate::attrs::id_from_value;
use crate::{Attrs, Entity, Result};
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

/// Default attribute holding a resource's id.
pub const DEFAULT_ID_ATTRIBUTE: &str = "_id";

/// How an update response is folded back into the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// Replace all attributes with the response
    Reset,
    /// Merge the response over the current attributes
    Extend,
}

/// Strategy for one resource type.
pub trait ResourceKind: fmt::Debug {
    /// Type name, used in diagnostics and list membership checks.
    fn name(&self) -> &str;

    /// URL segment appended to the parent path.
    fn url_segment(&self) -> &str;

    fn id_attribute(&self) -> &str {
        DEFAULT_ID_ATTRIBUTE
    }

    /// Whether fetches send `If-None-Match` with the last known ETag.
    fn use_etags(&self) -> bool {
        false
    }

    /// Normalize attributes coming from a caller or the server.
    fn parse(&self, attrs: Attrs) -> Attrs {
        attrs
    }

    /// The resource id, if the attributes carry one.
    fn id(&self, attrs: &Attrs) -> Option<String> {
        attrs.get(self.id_attribute()).and_then(id_from_value)
    }

    fn set_id(&self, attrs: &mut Attrs, id: &str) {
        attrs.insert(self.id_attribute().to_string(), Value::String(id.to_string()));
    }

    fn update_merge(&self) -> Merge {
        Merge::Reset
    }

    /// Body sent with a delete when the caller supplies none.
    fn destroy_body(&self, _attrs: &Attrs) -> Option<Value> {
        None
    }
}

/// Config-driven [`ResourceKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericKind {
    name: String,
    url_segment: String,
    id_attribute: String,
    use_etags: bool,
    update_merge: Merge,
}

impl GenericKind {
    pub fn new(name: impl Into<String>, url_segment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url_segment: url_segment.into(),
            id_attribute: DEFAULT_ID_ATTRIBUTE.to_string(),
            use_etags: false,
            update_merge: Merge::Reset,
        }
    }

    pub fn with_id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.id_attribute = attribute.into();
        self
    }

    pub fn with_etags(mut self) -> Self {
        self.use_etags = true;
        self
    }

    pub fn with_update_merge(mut self, merge: Merge) -> Self {
        self.update_merge = merge;
        self
    }

    pub fn shared(self) -> Rc<dyn ResourceKind> {
        Rc::new(self)
    }
}

impl ResourceKind for GenericKind {
    fn name(&self) -> &str {
        &self.name
    }

    fn url_segment(&self) -> &str {
        &self.url_segment
    }

    fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    fn use_etags(&self) -> bool {
        self.use_etags
    }

    fn update_merge(&self) -> Merge {
        self.update_merge
    }
}

/// Strategy for one list type.
pub trait ListKind: fmt::Debug {
    fn name(&self) -> &str;

    fn url_segment(&self) -> &str;

    /// Kind used to build a member from raw attributes.
    fn member_kind(&self, attrs: &Attrs) -> Rc<dyn ResourceKind>;

    /// Whether an existing entity can be a member as-is.
    fn accepts(&self, entity: &Entity) -> bool;

    /// Id a member built from `attrs` would have.
    fn member_id(&self, attrs: &Attrs) -> Option<String> {
        self.member_kind(attrs).id(attrs)
    }

    /// Checked synchronously before anything is added or sent.
    fn validate(&self, _attrs: &Attrs) -> Result<()> {
        Ok(())
    }

    /// Whether `create` adds the placeholder before the server answers.
    fn optimistic_create(&self) -> bool {
        true
    }

    /// Final request body for a create.
    fn prepare_create(&self, body: Attrs, _query: &Attrs) -> Attrs {
        body
    }

    /// Attributes of the local placeholder for a create.
    fn placeholder_attrs(&self, body: &Attrs) -> Attrs {
        body.clone()
    }
}

/// [`ListKind`] holding a single member kind.
#[derive(Debug, Clone)]
pub struct GenericListKind {
    name: String,
    url_segment: Option<String>,
    member: Rc<dyn ResourceKind>,
}

impl GenericListKind {
    /// The list path defaults to the member's URL segment.
    pub fn new(name: impl Into<String>, member: Rc<dyn ResourceKind>) -> Self {
        Self {
            name: name.into(),
            url_segment: None,
            member,
        }
    }

    pub fn with_url_segment(mut self, segment: impl Into<String>) -> Self {
        self.url_segment = Some(segment.into());
        self
    }

    pub fn shared(self) -> Rc<dyn ListKind> {
        Rc::new(self)
    }
}

impl ListKind for GenericListKind {
    fn name(&self) -> &str {
        &self.name
    }

    fn url_segment(&self) -> &str {
        self.url_segment
            .as_deref()
            .unwrap_or_else(|| self.member.url_segment())
    }

    fn member_kind(&self, _attrs: &Attrs) -> Rc<dyn ResourceKind> {
        Rc::clone(&self.member)
    }

    fn accepts(&self, entity: &Entity) -> bool {
        entity.kind().name() == self.member.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs_of;
    use serde_json::json;

    #[test]
    fn generic_ids() {
        let kind = GenericKind::new("User", "users");
        let attrs = attrs_of(json!({"_id": "u1", "name": "a"}));
        assert_eq!(kind.id(&attrs), Some("u1".to_string()));

        let kind = GenericKind::new("Route", "routes").with_id_attribute("srcHostname");
        let mut attrs = Attrs::new();
        assert_eq!(kind.id(&attrs), None);
        kind.set_id(&mut attrs, "a.example.com");
        assert_eq!(attrs.get("srcHostname"), Some(&json!("a.example.com")));
    }

    #[test]
    fn list_segment_falls_back_to_member() {
        let member = GenericKind::new("Build", "builds").shared();
        let list = GenericListKind::new("Builds", Rc::clone(&member));
        assert_eq!(list.url_segment(), "builds");
        let list = list.with_url_segment("all-builds");
        assert_eq!(list.url_segment(), "all-builds");
        assert_eq!(list.member_id(&attrs_of(json!({"_id": 3}))), Some("3".to_string()));
    }
}
