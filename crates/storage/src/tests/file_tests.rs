use super::*;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use shared::domain::{CatalogItem, ItemId, ItemStatus};
use tempfile::TempDir;

use crate::CatalogStore;

fn sample_catalog() -> Catalog {
    let date = NaiveDate::from_ymd_opt(2026, 2, 10).expect("date");
    Catalog::new(
        date,
        Utc::now(),
        vec![CatalogItem::new(
            ItemId::new("GSW_vs_LAL_2026-02-10"),
            json!({"matchup": "GSW @ LAL"}),
        )],
    )
    .expect("catalog")
}

fn store_in(dir: &TempDir) -> JsonFileCatalogStore {
    JsonFileCatalogStore::new(dir.path().join("pending_games.json"))
}

#[tokio::test]
async fn load_without_file_reports_not_found() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_in(&dir);
    assert!(matches!(store.load().await, Err(StoreError::NotFound)));
}

#[tokio::test]
async fn replace_creates_parent_directories_and_document() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("data").join("pending_games.json");
    let store = JsonFileCatalogStore::new(&path);

    store.replace(&sample_catalog()).await.expect("replace");
    assert!(path.exists());
}

#[tokio::test]
async fn revision_is_stable_across_loads() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_in(&dir);
    let written = store.replace(&sample_catalog()).await.expect("replace");

    let (_, first) = store.load().await.expect("first load");
    let (_, second) = store.load().await.expect("second load");
    assert_eq!(first, written);
    assert_eq!(first, second);
}

#[tokio::test]
async fn save_with_current_revision_persists_the_edit() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_in(&dir);
    store.replace(&sample_catalog()).await.expect("replace");

    let (mut catalog, revision) = store.load().await.expect("load");
    let id = ItemId::new("GSW_vs_LAL_2026-02-10");
    catalog.item_mut(&id).expect("item").begin_publishing().expect("claim");

    let next = store.save(&catalog, &revision).await.expect("save");
    assert_ne!(next, revision);

    let (reloaded, latest) = store.load().await.expect("reload");
    assert_eq!(latest, next);
    assert_eq!(reloaded.item(&id).expect("item").status, ItemStatus::Publishing);
}

#[tokio::test]
async fn save_with_stale_revision_conflicts() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_in(&dir);
    store.replace(&sample_catalog()).await.expect("replace");

    let (catalog, stale) = store.load().await.expect("load");
    store.save(&catalog, &stale).await.expect("first save");

    assert!(matches!(
        store.save(&catalog, &stale).await,
        Err(StoreError::Conflict)
    ));
}

#[tokio::test]
async fn out_of_band_edit_conflicts_like_any_writer() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_in(&dir);
    store.replace(&sample_catalog()).await.expect("replace");
    let (catalog, revision) = store.load().await.expect("load");

    // Someone edits the file directly between our load and save.
    let raw = std::fs::read_to_string(store.path()).expect("read raw");
    std::fs::write(store.path(), format!("{raw}\n")).expect("rewrite raw");

    assert!(matches!(
        store.save(&catalog, &revision).await,
        Err(StoreError::Conflict)
    ));
}

#[tokio::test]
async fn successful_save_leaves_no_work_files_behind() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_in(&dir);
    store.replace(&sample_catalog()).await.expect("replace");

    let (catalog, revision) = store.load().await.expect("load");
    store.save(&catalog, &revision).await.expect("save");

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["pending_games.json".to_string()]);
}

#[tokio::test]
async fn conflicting_save_removes_its_lock() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_in(&dir);
    store.replace(&sample_catalog()).await.expect("replace");

    let (catalog, stale) = store.load().await.expect("load");
    store.save(&catalog, &stale).await.expect("first save");
    let _ = store.save(&catalog, &stale).await;

    let lock = dir.path().join("pending_games.json.lock");
    assert!(!lock.exists(), "conflict path must release the lock");
}

#[tokio::test]
async fn corrupt_document_is_reported_as_such() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_in(&dir);
    std::fs::write(store.path(), b"{ not json").expect("write garbage");

    assert!(matches!(store.load().await, Err(StoreError::Corrupt(_))));
}

#[tokio::test]
async fn document_is_human_readable_json() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_in(&dir);
    store.replace(&sample_catalog()).await.expect("replace");

    let raw = std::fs::read_to_string(store.path()).expect("read");
    assert!(raw.contains('\n'), "document should be pretty-printed");
    assert!(raw.contains("\"status\": \"pending\""));
}
