use super::*;

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{NaiveDate, Utc};
use serde_json::json;
use shared::domain::{CatalogItem, ItemId, ItemStatus};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

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

#[derive(Clone)]
struct DocumentState {
    inner: Arc<Mutex<StoredDocument>>,
}

#[derive(Default)]
struct StoredDocument {
    body: Option<Vec<u8>>,
    version: u64,
    fail_next: bool,
    last_authorization: Option<String>,
}

fn etag(version: u64) -> String {
    format!("\"v{version}\"")
}

async fn get_document(
    State(state): State<DocumentState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let mut doc = state.inner.lock().await;
    doc.last_authorization = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    if doc.fail_next {
        doc.fail_next = false;
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    match &doc.body {
        Some(body) => (
            StatusCode::OK,
            [("etag", etag(doc.version))],
            body.clone(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn put_document(
    State(state): State<DocumentState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let mut doc = state.inner.lock().await;
    doc.last_authorization = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    if doc.fail_next {
        doc.fail_next = false;
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    if let Some(expected) = headers.get("if-match").and_then(|value| value.to_str().ok()) {
        if doc.body.is_none() {
            return StatusCode::NOT_FOUND.into_response();
        }
        if expected != etag(doc.version) {
            return StatusCode::PRECONDITION_FAILED.into_response();
        }
    }
    doc.body = Some(body.to_vec());
    doc.version += 1;
    (StatusCode::OK, [("etag", etag(doc.version))]).into_response()
}

async fn spawn_document_server() -> (url::Url, DocumentState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = DocumentState {
        inner: Arc::new(Mutex::new(StoredDocument::default())),
    };
    let app = Router::new()
        .route("/catalog.json", get(get_document).put(put_document))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let document_url = url::Url::parse(&format!("http://{addr}/catalog.json")).expect("url");
    (document_url, state)
}

#[tokio::test]
async fn missing_document_reports_not_found() {
    let (document_url, _state) = spawn_document_server().await;
    let store = HttpCatalogStore::new(document_url, None);
    assert!(matches!(store.load().await, Err(StoreError::NotFound)));
}

#[tokio::test]
async fn replace_then_load_round_trips_with_etag_revision() {
    let (document_url, _state) = spawn_document_server().await;
    let store = HttpCatalogStore::new(document_url, None);

    let written = store.replace(&sample_catalog()).await.expect("replace");
    assert_eq!(written.as_str(), "\"v1\"");

    let (catalog, revision) = store.load().await.expect("load");
    assert_eq!(revision, written);
    assert_eq!(catalog.items.len(), 1);
}

#[tokio::test]
async fn save_with_current_revision_wins_and_advances() {
    let (document_url, _state) = spawn_document_server().await;
    let store = HttpCatalogStore::new(document_url, None);
    store.replace(&sample_catalog()).await.expect("replace");

    let (mut catalog, revision) = store.load().await.expect("load");
    let id = ItemId::new("GSW_vs_LAL_2026-02-10");
    catalog.item_mut(&id).expect("item").begin_publishing().expect("claim");

    let next = store.save(&catalog, &revision).await.expect("save");
    assert_eq!(next.as_str(), "\"v2\"");

    let (reloaded, _) = store.load().await.expect("reload");
    assert_eq!(reloaded.item(&id).expect("item").status, ItemStatus::Publishing);
}

#[tokio::test]
async fn save_with_stale_revision_conflicts() {
    let (document_url, _state) = spawn_document_server().await;
    let store = HttpCatalogStore::new(document_url, None);
    store.replace(&sample_catalog()).await.expect("replace");

    let (catalog, stale) = store.load().await.expect("load");
    store.save(&catalog, &stale).await.expect("first save");

    assert!(matches!(
        store.save(&catalog, &stale).await,
        Err(StoreError::Conflict)
    ));
}

#[tokio::test]
async fn bearer_credential_is_sent_when_configured() {
    let (document_url, state) = spawn_document_server().await;
    let store = HttpCatalogStore::new(document_url, Some("catalog-token".into()));
    store.replace(&sample_catalog()).await.expect("replace");

    let auth = state.inner.lock().await.last_authorization.clone();
    assert_eq!(auth.as_deref(), Some("Bearer catalog-token"));
}

#[tokio::test]
async fn server_errors_surface_as_transport() {
    let (document_url, state) = spawn_document_server().await;
    let store = HttpCatalogStore::new(document_url, None);
    store.replace(&sample_catalog()).await.expect("replace");

    state.inner.lock().await.fail_next = true;
    assert!(matches!(store.load().await, Err(StoreError::Transport(_))));
}
