//! Integration tests for SqliteMetadataStore
//!
//! These tests verify the IMetadataStore contract using an in-memory
//! SQLite database. Each test function creates a fresh database to
//! ensure test isolation.

use remdrive_core::domain::{
    entry::{CachedEntry, ItemVersion},
    identity::ItemId,
    path::RemotePath,
};
use remdrive_core::ports::IMetadataStore;
use remdrive_store::{SqliteMetadataStore, StorePool};

// ============================================================================
// Test helpers
// ============================================================================

/// Create a fresh in-memory store for each test
async fn setup() -> SqliteMetadataStore {
    let pool = StorePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    SqliteMetadataStore::new(pool.pool().clone())
}

fn path(s: &str) -> RemotePath {
    RemotePath::new(s.to_string()).unwrap()
}

fn entry(name: &str, container_id: &ItemId, container_path: &str, is_container: bool) -> CachedEntry {
    CachedEntry {
        id: ItemId::generate(false),
        name: name.to_string(),
        container_id: container_id.clone(),
        container_path: path(container_path),
        version: ItemVersion::from_bytes(b"1".to_vec()),
        is_container,
        anchor: 0,
    }
}

fn file(name: &str, container_id: &ItemId, container_path: &str) -> CachedEntry {
    entry(name, container_id, container_path, false)
}

fn dir(name: &str, container_id: &ItemId, container_path: &str) -> CachedEntry {
    entry(name, container_id, container_path, true)
}

/// Root with `docs/` (containing `a.txt`, `sub/`) and `sub/` containing
/// `deep.txt`. Returns (docs, a, sub, deep).
async fn seed_tree(store: &SqliteMetadataStore) -> (CachedEntry, CachedEntry, CachedEntry, CachedEntry) {
    let root = ItemId::root();
    let docs = dir("docs", &root, "/");
    store
        .replace_container(&root, &RemotePath::root(), std::slice::from_ref(&docs))
        .await
        .unwrap();

    let a = file("a.txt", &docs.id, "/docs");
    let sub = dir("sub", &docs.id, "/docs");
    store
        .replace_container(&docs.id, &path("/docs"), &[a.clone(), sub.clone()])
        .await
        .unwrap();

    let deep = file("deep.txt", &sub.id, "/docs/sub");
    store
        .replace_container(&sub.id, &path("/docs/sub"), std::slice::from_ref(&deep))
        .await
        .unwrap();

    (docs, a, sub, deep)
}

// ============================================================================
// Lookup tests
// ============================================================================

#[tokio::test]
async fn test_empty_store_lookups() {
    let store = setup().await;
    let id = ItemId::generate(false);

    assert!(store.item(&id).await.unwrap().is_none());
    assert!(store.item_by_name("x", &ItemId::root()).await.unwrap().is_none());
    assert!(store.items_in(&ItemId::root()).await.unwrap().is_empty());
    assert!(!store.is_tracked(&id).await.unwrap());
    assert!(!store.has_contents(&ItemId::root()).await.unwrap());
    assert!(store.tracked_containers().await.unwrap().is_empty());
    assert_eq!(store.highest_anchor_iteration().await.unwrap(), 0);
}

#[tokio::test]
async fn test_item_roundtrip() {
    let store = setup().await;
    let row = file("a.txt", &ItemId::root(), "/");
    store.upsert(&row).await.unwrap();

    let loaded = store.item(&row.id).await.unwrap().unwrap();
    assert_eq!(loaded, row);

    let by_name = store.item_by_name("a.txt", &ItemId::root()).await.unwrap().unwrap();
    assert_eq!(by_name.id, row.id);
    assert!(store.is_tracked(&row.id).await.unwrap());
}

#[tokio::test]
async fn test_tracked_containers() {
    let store = setup().await;
    let (docs, _, sub, _) = seed_tree(&store).await;

    let containers = store.tracked_containers().await.unwrap();
    assert_eq!(containers.len(), 3);
    assert!(containers.contains(&ItemId::root()));
    assert!(containers.contains(&docs.id));
    assert!(containers.contains(&sub.id));
}

// ============================================================================
// replace_container tests
// ============================================================================

#[tokio::test]
async fn test_replace_container_initial_fill_and_removal() {
    let store = setup().await;
    let root = ItemId::root();

    let docs = dir("docs", &root, "/");
    let a = file("a.txt", &root, "/");
    let deleted = store
        .replace_container(&root, &RemotePath::root(), &[docs.clone(), a.clone()])
        .await
        .unwrap();
    assert!(deleted.is_empty());

    let rows = store.items_in(&root).await.unwrap();
    assert_eq!(rows.len(), 2);

    // Re-listing with only a.txt reports exactly the docs deletion.
    let deleted = store
        .replace_container(&root, &RemotePath::root(), std::slice::from_ref(&a))
        .await
        .unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].id, docs.id);

    let rows = store.items_in(&root).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "a.txt");
}

#[tokio::test]
async fn test_replace_container_cascades_into_subtree() {
    let store = setup().await;
    let (docs, a, sub, deep) = seed_tree(&store).await;

    // Root re-lists without docs: the whole subtree goes, every row
    // reported.
    let deleted = store
        .replace_container(&ItemId::root(), &RemotePath::root(), &[])
        .await
        .unwrap();

    let ids: Vec<_> = deleted.iter().map(|e| e.id.clone()).collect();
    assert_eq!(deleted.len(), 4);
    assert!(ids.contains(&docs.id));
    assert!(ids.contains(&a.id));
    assert!(ids.contains(&sub.id));
    assert!(ids.contains(&deep.id));

    assert!(store.items_in(&ItemId::root()).await.unwrap().is_empty());
    assert!(store.items_in(&docs.id).await.unwrap().is_empty());
    assert!(store.items_in(&sub.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_replace_container_keeps_unrelated_rows() {
    let store = setup().await;
    let (docs, a, _, _) = seed_tree(&store).await;

    // Replacing /docs/sub's sibling set must not touch /docs itself.
    let b = file("b.txt", &docs.id, "/docs");
    store
        .replace_container(&docs.id, &path("/docs"), &[a.clone(), b])
        .await
        .unwrap();

    assert!(store.item(&docs.id).await.unwrap().is_some());
    assert_eq!(store.items_in(&ItemId::root()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_replace_container_evicts_name_collision() {
    let store = setup().await;
    let root = ItemId::root();

    let old = file("report", &root, "/");
    store
        .replace_container(&root, &RemotePath::root(), std::slice::from_ref(&old))
        .await
        .unwrap();

    // Same name arrives under a different identity (e.g. after a store
    // inconsistency); the old row loses and is reported deleted.
    let new = file("report", &root, "/");
    let deleted = store
        .replace_container(&root, &RemotePath::root(), std::slice::from_ref(&new))
        .await
        .unwrap();

    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].id, old.id);

    let rows = store.items_in(&root).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, new.id);
}

// ============================================================================
// upsert tests
// ============================================================================

#[tokio::test]
async fn test_upsert_version_update_in_place() {
    let store = setup().await;
    let mut row = file("a.txt", &ItemId::root(), "/");
    store.upsert(&row).await.unwrap();

    row.version = ItemVersion::from_bytes(b"2".to_vec());
    let deleted = store.upsert(&row).await.unwrap();
    assert!(deleted.is_empty());

    let loaded = store.item(&row.id).await.unwrap().unwrap();
    assert_eq!(loaded.version, ItemVersion::from_bytes(b"2".to_vec()));
    assert_eq!(store.items_in(&ItemId::root()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_upsert_collision_deletes_other_row() {
    let store = setup().await;
    let root = ItemId::root();
    let loser = file("name.txt", &root, "/");
    store.upsert(&loser).await.unwrap();

    let mut winner = file("other.txt", &root, "/");
    store.upsert(&winner).await.unwrap();

    // Move winner onto the loser's name.
    winner.name = "name.txt".to_string();
    let deleted = store.upsert(&winner).await.unwrap();

    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].id, loser.id);
    assert!(store.item(&loser.id).await.unwrap().is_none());

    let rows = store.items_in(&root).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, winner.id);
}

#[tokio::test]
async fn test_upsert_collision_with_container_cascades() {
    let store = setup().await;
    let (docs, a, sub, deep) = seed_tree(&store).await;

    // A file takes over the "docs" name: the container and its whole
    // subtree are reported deleted.
    let usurper = file("docs", &ItemId::root(), "/");
    let deleted = store.upsert(&usurper).await.unwrap();

    let ids: Vec<_> = deleted.iter().map(|e| e.id.clone()).collect();
    assert_eq!(deleted.len(), 4);
    assert!(ids.contains(&docs.id));
    assert!(ids.contains(&a.id));
    assert!(ids.contains(&sub.id));
    assert!(ids.contains(&deep.id));

    let rows = store.items_in(&ItemId::root()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].is_container);
}

#[tokio::test]
async fn test_upsert_rename_rewrites_descendant_paths() {
    let store = setup().await;
    let (docs, a, sub, deep) = seed_tree(&store).await;

    // Rename /docs -> /papers.
    let mut renamed = docs.clone();
    renamed.name = "papers".to_string();
    let deleted = store.upsert(&renamed).await.unwrap();
    assert!(deleted.is_empty());

    let a_row = store.item(&a.id).await.unwrap().unwrap();
    assert_eq!(a_row.container_path.as_str(), "/papers");

    let sub_row = store.item(&sub.id).await.unwrap().unwrap();
    assert_eq!(sub_row.container_path.as_str(), "/papers");

    let deep_row = store.item(&deep.id).await.unwrap().unwrap();
    assert_eq!(deep_row.container_path.as_str(), "/papers/sub");

    // Nothing became unreachable.
    assert_eq!(store.items_in(&docs.id).await.unwrap().len(), 2);
    assert_eq!(store.items_in(&sub.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_upsert_move_rewrites_descendant_paths() {
    let store = setup().await;
    let root = ItemId::root();

    let archive = dir("archive", &root, "/");
    let docs = dir("docs", &root, "/");
    store
        .replace_container(&root, &RemotePath::root(), &[archive.clone(), docs.clone()])
        .await
        .unwrap();
    let a = file("a.txt", &docs.id, "/docs");
    store
        .replace_container(&docs.id, &path("/docs"), std::slice::from_ref(&a))
        .await
        .unwrap();

    // Move /docs under /archive.
    let mut moved = docs.clone();
    moved.container_id = archive.id.clone();
    moved.container_path = path("/archive");
    store.upsert(&moved).await.unwrap();

    let a_row = store.item(&a.id).await.unwrap().unwrap();
    assert_eq!(a_row.container_path.as_str(), "/archive/docs");
    assert_eq!(store.items_in(&docs.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_upsert_prefix_sibling_untouched() {
    let store = setup().await;
    let root = ItemId::root();

    // "/doc" and "/docs" share a string prefix; renaming one must not drag
    // the other's children along.
    let doc = dir("doc", &root, "/");
    let docs = dir("docs", &root, "/");
    store
        .replace_container(&root, &RemotePath::root(), &[doc.clone(), docs.clone()])
        .await
        .unwrap();
    let inside_docs = file("x.txt", &docs.id, "/docs");
    store
        .replace_container(&docs.id, &path("/docs"), std::slice::from_ref(&inside_docs))
        .await
        .unwrap();

    let mut renamed = doc.clone();
    renamed.name = "doc2".to_string();
    store.upsert(&renamed).await.unwrap();

    let x = store.item(&inside_docs.id).await.unwrap().unwrap();
    assert_eq!(x.container_path.as_str(), "/docs");
}

// ============================================================================
// apply_change_set tests
// ============================================================================

#[tokio::test]
async fn test_apply_change_set_basic() {
    let store = setup().await;
    let root = ItemId::root();
    let stays = file("stays.txt", &root, "/");
    let goes = file("goes.txt", &root, "/");
    store
        .replace_container(&root, &RemotePath::root(), &[stays.clone(), goes.clone()])
        .await
        .unwrap();

    let created = file("new.txt", &root, "/");
    let mut updated = stays.clone();
    updated.version = ItemVersion::from_bytes(b"9".to_vec());
    updated.anchor = 5;

    let deleted = store
        .apply_change_set(
            std::slice::from_ref(&created),
            std::slice::from_ref(&updated),
            std::slice::from_ref(&goes),
        )
        .await
        .unwrap();

    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].id, goes.id);

    let rows = store.items_in(&root).await.unwrap();
    assert_eq!(rows.len(), 2);
    let stays_row = store.item(&stays.id).await.unwrap().unwrap();
    assert_eq!(stays_row.version, updated.version);
    assert_eq!(stays_row.anchor, 5);
}

#[tokio::test]
async fn test_apply_change_set_delete_before_create_same_name() {
    let store = setup().await;
    let root = ItemId::root();
    let old = file("report.txt", &root, "/");
    store.upsert(&old).await.unwrap();

    // A rename observed as delete+create of the same name within one
    // batch: deletions apply first, so uniqueness never breaks.
    let new = file("report.txt", &root, "/");
    let deleted = store
        .apply_change_set(std::slice::from_ref(&new), &[], std::slice::from_ref(&old))
        .await
        .unwrap();

    assert_eq!(deleted.len(), 1);
    let rows = store.items_in(&root).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, new.id);
}

#[tokio::test]
async fn test_apply_change_set_container_delete_cascades() {
    let store = setup().await;
    let (docs, a, sub, deep) = seed_tree(&store).await;

    let deleted = store
        .apply_change_set(&[], &[], std::slice::from_ref(&docs))
        .await
        .unwrap();

    // Container plus three descendants.
    assert_eq!(deleted.len(), 4);
    let ids: Vec<_> = deleted.iter().map(|e| e.id.clone()).collect();
    assert!(ids.contains(&a.id));
    assert!(ids.contains(&sub.id));
    assert!(ids.contains(&deep.id));
}

#[tokio::test]
async fn test_apply_change_set_missing_delete_is_noop() {
    let store = setup().await;
    let ghost = file("ghost.txt", &ItemId::root(), "/");

    let deleted = store
        .apply_change_set(&[], &[], std::slice::from_ref(&ghost))
        .await
        .unwrap();

    // The declared deletion is echoed back; nothing errored.
    assert_eq!(deleted.len(), 1);
    assert!(store.items_in(&ItemId::root()).await.unwrap().is_empty());
}

// ============================================================================
// Uniqueness invariant
// ============================================================================

#[tokio::test]
async fn test_no_duplicate_names_after_mixed_writes() {
    let store = setup().await;
    let root = ItemId::root();

    let a1 = file("a", &root, "/");
    let b = file("b", &root, "/");
    store
        .replace_container(&root, &RemotePath::root(), &[a1.clone(), b.clone()])
        .await
        .unwrap();

    // Collide on "a" through upsert, then replace again with a third set.
    let a2 = file("a", &root, "/");
    store.upsert(&a2).await.unwrap();
    let a3 = file("a", &root, "/");
    store
        .replace_container(&root, &RemotePath::root(), &[a3, b])
        .await
        .unwrap();

    let rows = store.items_in(&root).await.unwrap();
    let mut names: Vec<_> = rows.iter().map(|e| e.name.clone()).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), rows.len());
}

// ============================================================================
// Anchor bootstrap
// ============================================================================

#[tokio::test]
async fn test_highest_anchor_iteration() {
    let store = setup().await;
    let root = ItemId::root();

    let mut a = file("a", &root, "/");
    a.anchor = 3;
    let mut b = file("b", &root, "/");
    b.anchor = 7;
    store
        .replace_container(&root, &RemotePath::root(), &[a, b])
        .await
        .unwrap();

    assert_eq!(store.highest_anchor_iteration().await.unwrap(), 7);
}

#[tokio::test]
async fn test_anchor_version_present() {
    let store = setup().await;
    let version = store.anchor_version().await.unwrap();
    assert_eq!(version.len(), 4);
    assert!(version.chars().all(|c| c.is_ascii_uppercase()));
}

// ============================================================================
// Pool / schema gate
// ============================================================================

#[tokio::test]
async fn test_reopen_preserves_rows_and_version() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.db");

    let first_version;
    {
        let pool = StorePool::open(&db_path).await.unwrap();
        let store = SqliteMetadataStore::new(pool.pool().clone());
        store.upsert(&file("a.txt", &ItemId::root(), "/")).await.unwrap();
        first_version = store.anchor_version().await.unwrap();
    }

    let pool = StorePool::open(&db_path).await.unwrap();
    let store = SqliteMetadataStore::new(pool.pool().clone());
    assert_eq!(store.items_in(&ItemId::root()).await.unwrap().len(), 1);
    assert_eq!(store.anchor_version().await.unwrap(), first_version);
}

#[tokio::test]
async fn test_forced_reset_wipes_and_renews_anchor_version() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.db");

    let first_version;
    {
        let pool = StorePool::open(&db_path).await.unwrap();
        let store = SqliteMetadataStore::new(pool.pool().clone());
        store.upsert(&file("a.txt", &ItemId::root(), "/")).await.unwrap();
        first_version = store.anchor_version().await.unwrap();
    }

    let pool = StorePool::open_with_reset(&db_path, true).await.unwrap();
    let store = SqliteMetadataStore::new(pool.pool().clone());
    assert!(store.items_in(&ItemId::root()).await.unwrap().is_empty());
    assert_eq!(store.highest_anchor_iteration().await.unwrap(), 0);

    // Every anchor from the old generation is now expired.
    let renewed = store.anchor_version().await.unwrap();
    assert_eq!(renewed.len(), 4);
    assert_ne!(renewed, first_version);
}
