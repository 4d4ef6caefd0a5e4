//! Files and directories: naming rules, rename and move with rollback

use serde_json::{json, Value};
use tether_engine::fs::{
    create_file, dir_contents, dir_kind, entry_seed, file_kind, move_to_dir, rename,
};
use tether_engine::{
    Cache, Client, Entity, EntityOptions, Error, GenericKind, Method, MockTransport, Parent,
    RawResponse, RequestOptions, Root,
};

struct Fixture {
    mock: MockTransport,
    container: Entity,
    root_dir: Entity,
}

fn fixture(status: u16, body: Value) -> Fixture {
    let mock = MockTransport::new(move |_| Ok(RawResponse::new(status, body.clone())));
    let root = Root::new(Client::new(mock.clone()), Cache::new(true));
    let container = root
        .new_child(GenericKind::new("Container", "containers").shared(), "c1", EntityOptions::new())
        .unwrap();
    let root_dir = container
        .new_child(dir_kind(), entry_seed("", "/", true), EntityOptions::new())
        .unwrap();
    Fixture {
        mock,
        container,
        root_dir,
    }
}

impl Fixture {
    fn add(&self, dir: &Entity, name: &str, is_dir: bool) -> Entity {
        let contents = dir_contents(dir).unwrap();
        contents
            .add_one(entry_seed(&dir.id().unwrap(), name, is_dir))
            .unwrap();
        let id = if is_dir {
            format!("{}{name}/", dir.id().unwrap())
        } else {
            format!("{}{name}", dir.id().unwrap())
        };
        contents.get_by_id(&id).unwrap()
    }

    fn lookup(&self, id: &str, is_dir: bool) -> Entity {
        let kind = if is_dir { dir_kind() } else { file_kind() };
        self.container
            .new_child(kind, id, EntityOptions::new())
            .unwrap()
    }
}

#[test]
fn entries_are_addressed_by_filepath() {
    let fx = fixture(200, json!({}));
    assert_eq!(fx.root_dir.id().as_deref(), Some("/"));

    let src = fx.add(&fx.root_dir, "src", true);
    let main = fx.add(&src, "main.rs", false);
    assert_eq!(src.id().as_deref(), Some("/src/"));
    assert_eq!(main.id().as_deref(), Some("/src/main.rs"));
    assert_eq!(main.path(), "containers/c1/files/src/main.rs");
    assert!(fx.lookup("/src/main.rs", false).ptr_eq(&main));
}

#[test]
fn names_with_slashes_are_rejected_before_any_request() {
    let fx = fixture(201, json!({}));
    let contents = dir_contents(&fx.root_dir).unwrap();
    contents
        .add_one(entry_seed("/", "file.txt", false))
        .unwrap();

    let err = contents.add_one(entry_seed("/", "a/b", false)).unwrap_err();
    assert_eq!(err, Error::InvalidName("a/b".into()));
    assert_eq!(contents.len(), 1);
    assert_eq!(fx.mock.request_count(), 0);
}

#[tokio::test]
async fn invalid_names_fail_create_and_rename_synchronously() {
    let fx = fixture(201, json!({}));
    let contents = dir_contents(&fx.root_dir).unwrap();
    let file = fx.add(&fx.root_dir, "file.txt", false);

    let err = create_file(&contents, "x/y").await.unwrap_err();
    assert!(matches!(err, Error::InvalidName(_)));
    let err = rename(&file, "x/y").await.unwrap_err();
    assert!(matches!(err, Error::InvalidName(_)));
    assert_eq!(fx.mock.request_count(), 0);
}

#[tokio::test]
async fn create_file_posts_into_the_directory() {
    let fx = fixture(201, json!({"path": "/", "name": "new.txt"}));
    let contents = dir_contents(&fx.root_dir).unwrap();

    let synced = create_file(&contents, "new.txt").await.unwrap();
    assert_eq!(synced.entity.id().as_deref(), Some("/new.txt"));
    assert!(contents.get_by_id("/new.txt").unwrap().ptr_eq(&synced.entity));

    let request = fx.mock.last_request().unwrap();
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.path, "containers/c1/files");
    assert_eq!(request.json, Some(json!({"name": "new.txt", "path": "/"})));
}

#[test]
fn dir_contents_is_cached_per_directory() {
    let fx = fixture(200, json!([]));
    let a = dir_contents(&fx.root_dir).unwrap();
    let b = dir_contents(&fx.root_dir).unwrap();
    assert!(a.ptr_eq(&b));
    assert_eq!(a.path(), "containers/c1/files");
    assert_eq!(a.query().get("path"), Some(&json!("/")));
}

// ============================================================================
// Rename
// ============================================================================

#[tokio::test]
async fn rename_rekeys_the_entry() {
    let fx = fixture(200, json!({}));
    let file = fx.add(&fx.root_dir, "file.txt", false);
    let contents = dir_contents(&fx.root_dir).unwrap();

    rename(&file, "b.txt").await.unwrap();

    assert_eq!(file.id().as_deref(), Some("/b.txt"));
    assert!(fx.lookup("/b.txt", false).ptr_eq(&file));
    assert!(contents.get_by_id("/b.txt").unwrap().ptr_eq(&file));
    assert!(contents.get_by_id("/file.txt").is_none());

    let request = fx.mock.last_request().unwrap();
    assert_eq!(request.method, Method::Patch);
    assert_eq!(request.path, "containers/c1/files/file.txt");
    assert_eq!(request.json, Some(json!({"name": "b.txt", "isDir": false})));
}

#[tokio::test]
async fn failed_rename_puts_everything_back() {
    let fx = fixture(409, json!({"message": "exists"}));
    let file = fx.add(&fx.root_dir, "file.txt", false);
    let contents = dir_contents(&fx.root_dir).unwrap();

    let pending = rename(&file, "b.txt");
    assert_eq!(file.id().as_deref(), Some("/b.txt"));

    let err = pending.await.unwrap_err();
    assert_eq!(err.status(), Some(409));
    assert_eq!(file.id().as_deref(), Some("/file.txt"));
    assert!(fx.lookup("/file.txt", false).ptr_eq(&file));
    assert!(!fx.lookup("/b.txt", false).ptr_eq(&file));
    assert!(contents.get_by_id("/file.txt").unwrap().ptr_eq(&file));
}

#[tokio::test]
async fn renaming_a_directory_moves_its_contents() {
    let fx = fixture(200, json!({"path": "/", "name": "lib", "isDir": true}));
    let src = fx.add(&fx.root_dir, "src", true);
    let main = fx.add(&src, "main.rs", false);
    let contents = dir_contents(&src).unwrap();

    rename(&src, "lib").await.unwrap();

    assert_eq!(src.id().as_deref(), Some("/lib/"));
    assert_eq!(main.id().as_deref(), Some("/lib/main.rs"));
    assert_eq!(contents.query().get("path"), Some(&json!("/lib/")));
    assert!(contents.get_by_id("/lib/main.rs").unwrap().ptr_eq(&main));
    assert!(fx.lookup("/lib/main.rs", false).ptr_eq(&main));
    assert!(dir_contents(&src).unwrap().ptr_eq(&contents));
}

// ============================================================================
// Move
// ============================================================================

#[tokio::test]
async fn move_to_dir_changes_membership() {
    let fx = fixture(200, json!({}));
    let file = fx.add(&fx.root_dir, "file.txt", false);
    let src = fx.add(&fx.root_dir, "src", true);
    let root_contents = dir_contents(&fx.root_dir).unwrap();

    let pending = move_to_dir(&file, Some(&root_contents), &src);
    let src_contents = dir_contents(&src).unwrap();
    assert!(root_contents.get_by_id("/file.txt").is_none());
    assert!(src_contents.get_by_id("/src/file.txt").unwrap().ptr_eq(&file));

    pending.await.unwrap();
    assert_eq!(file.id().as_deref(), Some("/src/file.txt"));
    assert!(fx.lookup("/src/file.txt", false).ptr_eq(&file));

    let request = fx.mock.last_request().unwrap();
    assert_eq!(request.path, "containers/c1/files/file.txt");
    assert_eq!(request.json, Some(json!({"path": "/src/"})));
}

#[tokio::test]
async fn failed_move_restores_both_directories() {
    let fx = fixture(404, json!({"message": "no such dir"}));
    let file = fx.add(&fx.root_dir, "file.txt", false);
    let src = fx.add(&fx.root_dir, "src", true);
    let root_contents = dir_contents(&fx.root_dir).unwrap();

    let err = move_to_dir(&file, Some(&root_contents), &src)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));

    let src_contents = dir_contents(&src).unwrap();
    assert!(src_contents.is_empty());
    assert_eq!(file.id().as_deref(), Some("/file.txt"));
    assert!(root_contents.get_by_id("/file.txt").unwrap().ptr_eq(&file));
    assert!(fx.lookup("/file.txt", false).ptr_eq(&file));
}

#[tokio::test]
async fn destroy_sends_the_entry_attributes() {
    let fx = fixture(204, Value::Null);
    let file = fx.add(&fx.root_dir, "file.txt", false);
    let contents = dir_contents(&fx.root_dir).unwrap();

    file.destroy(RequestOptions::new()).await.unwrap();
    assert!(contents.is_empty());
    let request = fx.mock.last_request().unwrap();
    assert_eq!(request.method, Method::Delete);
    assert_eq!(request.json, Some(json!({"path": "/", "name": "file.txt"})));
}
