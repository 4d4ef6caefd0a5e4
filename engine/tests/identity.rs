//! Identity cache behavior across entities and lists

use serde_json::json;
use std::rc::Rc;
use tether_engine::{
    attrs_of, Cache, Client, Context, Entity, EntityOptions, EntityStore, GenericKind,
    GenericListKind, ListKind, ListOptions, MockTransport, Parent, RawResponse, RequestOptions,
    ResourceKind, Root, Seed,
};

fn widget() -> Rc<dyn ResourceKind> {
    GenericKind::new("Widget", "widgets").shared()
}

fn widgets() -> Rc<dyn ListKind> {
    GenericListKind::new("Widgets", widget()).shared()
}

fn root_with(enabled: bool, mock: &MockTransport) -> Root {
    Root::new(Client::new(mock.clone()), Cache::new(enabled))
}

fn idle() -> MockTransport {
    MockTransport::new(|_| Ok(RawResponse::new(200, json!({}))))
}

// ============================================================================
// Entity identity
// ============================================================================

#[test]
fn reset_check_refreshes_the_cached_instance() {
    let mock = idle();
    let ctx = Context::new(Client::new(mock), Cache::new(true));
    let store = ctx.cache().entities();

    let original = Entity::new(widget(), attrs_of(json!({"_id": "1", "name": "foo"})), &EntityOptions::new(), &ctx)
        .unwrap();
    assert!(store.add(&original));

    let resolved = store
        .check_new_entity(
            widget(),
            attrs_of(json!({"_id": "1", "name": "bar"})),
            &EntityOptions::new().with_reset(true),
            &ctx,
        )
        .unwrap();

    assert!(resolved.ptr_eq(&original));
    assert_eq!(original.get("name"), Some(json!("bar")));
    assert_eq!(store.len(), 1);
}

#[test]
fn id_lookup_does_not_clobber_known_attributes() {
    let mock = idle();
    let root = root_with(true, &mock);
    let known = root
        .new_child(widget(), attrs_of(json!({"_id": "7", "name": "known"})), EntityOptions::new())
        .unwrap();

    let by_id = root.new_child(widget(), "7", EntityOptions::new()).unwrap();
    assert!(by_id.ptr_eq(&known));
    assert_eq!(known.get("name"), Some(json!("known")));
}

#[test]
fn keys_ignore_case() {
    let mock = idle();
    let root = root_with(true, &mock);
    let upper = root.new_child(widget(), "ABC", EntityOptions::new()).unwrap();
    let lower = root.new_child(widget(), "abc", EntityOptions::new()).unwrap();
    assert!(upper.ptr_eq(&lower));
}

#[test]
fn disabled_cache_hands_out_independent_objects() {
    let mock = idle();
    let root = root_with(false, &mock);
    let a = root.new_child(widget(), "1", EntityOptions::new()).unwrap();
    let b = root.new_child(widget(), "1", EntityOptions::new()).unwrap();

    assert!(!a.ptr_eq(&b));
    assert!(a.equals(&b));
    assert!(root.cache().entities().is_empty());
}

#[test]
fn no_store_entities_stay_out_of_the_cache() {
    let mock = idle();
    let root = root_with(true, &mock);
    let cached = root.new_child(widget(), "1", EntityOptions::new()).unwrap();
    let detached = root
        .new_child(widget(), "1", EntityOptions::new().no_store())
        .unwrap();

    assert!(!cached.ptr_eq(&detached));
    assert_eq!(EntityStore::key(&detached), None);
    assert_eq!(root.cache().entities().len(), 1);
}

#[test]
fn clearing_the_cache_forgets_everything() {
    let mock = idle();
    let root = root_with(true, &mock);
    let first = root.new_child(widget(), "1", EntityOptions::new()).unwrap();
    root.new_list(widgets(), vec![Seed::Id("2".into())], ListOptions::new().with_qs(Default::default()))
        .unwrap();
    assert_eq!(root.cache().entities().len(), 2);
    assert_eq!(root.cache().lists().len(), 1);

    root.cache().clear();
    assert!(root.cache().entities().is_empty());
    assert!(root.cache().lists().is_empty());

    let second = root.new_child(widget(), "1", EntityOptions::new()).unwrap();
    assert!(!second.ptr_eq(&first));
}

#[test]
fn destroyed_entities_are_replaced_on_lookup() {
    let mock = idle();
    let root = root_with(true, &mock);
    let old = root.new_child(widget(), "1", EntityOptions::new()).unwrap();
    old.dealloc(true).unwrap();
    assert!(root.cache().entities().is_empty());

    let new = root.new_child(widget(), "1", EntityOptions::new()).unwrap();
    assert!(!new.ptr_eq(&old));
    assert!(!new.is_destroyed());
}

// ============================================================================
// Fetch through aliases
// ============================================================================

#[tokio::test]
async fn fetch_by_alias_resolves_to_the_canonical_entity() {
    let mock = MockTransport::new(|request| {
        assert_eq!(request.path, "widgets/me");
        Ok(RawResponse::new(200, json!({"_id": "u-42", "name": "real"})))
    });
    let root = root_with(true, &mock);
    let canonical = root
        .new_child(widget(), attrs_of(json!({"_id": "u-42", "name": "old"})), EntityOptions::new())
        .unwrap();

    let alias = root.new_child(widget(), "me", EntityOptions::new()).unwrap();
    assert!(!alias.ptr_eq(&canonical));

    let synced = alias.fetch(RequestOptions::new()).await.unwrap();
    assert!(synced.entity.ptr_eq(&canonical));
    assert_eq!(canonical.get("name"), Some(json!("real")));
    assert!(!alias.is_destroyed());
}

// ============================================================================
// Lists
// ============================================================================

#[test]
fn lists_are_keyed_by_path_and_query() {
    let mock = idle();
    let root = root_with(true, &mock);
    let mine = ListOptions::new().with_qs(attrs_of(json!({"owner": "me", "page": 1})));
    let same = ListOptions::new().with_qs(attrs_of(json!({"page": 1, "owner": "me"})));
    let other = ListOptions::new().with_qs(attrs_of(json!({"owner": "you"})));

    let a = root.new_list(widgets(), vec![], mine).unwrap();
    let b = root.new_list(widgets(), vec![], same).unwrap();
    let c = root.new_list(widgets(), vec![], other).unwrap();

    assert!(a.ptr_eq(&b));
    assert!(!a.ptr_eq(&c));
}

#[test]
fn cached_lists_keep_members_unless_reset_is_requested() {
    let mock = idle();
    let root = root_with(true, &mock);
    let qs = attrs_of(json!({"owner": "me"}));

    let list = root
        .new_list(widgets(), vec![Seed::Id("1".into())], ListOptions::new().with_qs(qs.clone()))
        .unwrap();
    root.new_list(widgets(), vec![Seed::Id("2".into())], ListOptions::new().with_qs(qs.clone()))
        .unwrap();
    assert_eq!(list.len(), 1);
    assert!(list.get_by_id("1").is_some());

    root.new_list(
        widgets(),
        vec![Seed::Id("2".into())],
        ListOptions::new().with_qs(qs).with_reset(true),
    )
    .unwrap();
    assert_eq!(list.len(), 1);
    assert!(list.get_by_id("2").is_some());
}

#[test]
fn list_members_share_entity_identity() {
    let mock = idle();
    let root = root_with(true, &mock);
    let entity = root
        .new_child(widget(), attrs_of(json!({"_id": "1", "name": "a"})), EntityOptions::new())
        .unwrap();

    let list = root
        .new_list(
            widgets(),
            vec![Seed::Attrs(attrs_of(json!({"_id": "1", "name": "b"})))],
            ListOptions::new().with_qs(Default::default()),
        )
        .unwrap();

    let member = list.get_by_id("1").unwrap();
    assert!(member.ptr_eq(&entity));
    assert_eq!(entity.get("name"), Some(json!("b")));
}

#[tokio::test]
async fn fetch_list_returns_the_cached_list() {
    let mock = MockTransport::new(|_| Ok(RawResponse::new(200, json!([{"_id": "1"}, {"_id": "2"}]))));
    let root = root_with(true, &mock);
    let qs = attrs_of(json!({"owner": "me"}));
    let known = root
        .new_list(widgets(), vec![], ListOptions::new().with_qs(qs.clone()))
        .unwrap();

    let fetched = root.fetch_list(widgets(), qs, RequestOptions::new()).await.unwrap();
    assert!(fetched.ptr_eq(&known));
    assert_eq!(known.len(), 2);
    assert_eq!(mock.last_request().unwrap().query.get("owner"), Some(&json!("me")));
}
