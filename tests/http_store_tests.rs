mod common;

use axum::{
    Json, Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
    routing::{get, post},
};
use common::{id, persona};
use persona_client::{
    ClientConfig, EntityCache, HttpStore, InMemoryStore, Mutation, PersonaClient, RemoteStore,
    StoreError, UniquenessValidator, ValidationState, server,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config(addr: SocketAddr) -> ClientConfig {
    ClientConfig::new(&format!("http://{addr}/")).quiescence(Duration::from_millis(20))
}

async fn spawn_backend(store: Arc<InMemoryStore>) -> HttpStore {
    let addr = spawn(server::router(store)).await;
    HttpStore::new(&config(addr)).unwrap()
}

async fn send(app: &Router, method: Method, uri: &str, payload: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match payload {
        Some(payload) => builder
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request should build");

    let response = app.clone().oneshot(request).await.expect("response expected");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should be readable");

    if body.is_empty() {
        return (status, Value::Null);
    }
    let json = serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);
    (status, json)
}

// ============================================================================
// HttpStore against the reference backend
// ============================================================================

#[tokio::test]
async fn test_crud_over_http() {
    let store = spawn_backend(Arc::new(InMemoryStore::new())).await;
    let ana = persona("12345678", "Ana", "Ruiz");
    let ana_id = id("12345678");

    assert!(store.list().await.unwrap().is_empty());
    assert_eq!(store.get(&ana_id).await, Err(StoreError::NotFound(ana_id.clone())));

    store.create(&ana).await.unwrap();
    assert_eq!(store.get(&ana_id).await.unwrap(), ana);
    assert_eq!(store.create(&ana).await, Err(StoreError::Conflict(ana_id.clone())));

    let mut renamed = ana.clone();
    renamed.name = "Anabel".into();
    store.update(&ana_id, &renamed).await.unwrap();
    assert_eq!(store.list().await.unwrap(), vec![renamed]);

    store.delete(&ana_id).await.unwrap();
    assert_eq!(store.delete(&ana_id).await, Err(StoreError::NotFound(ana_id.clone())));
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_of_missing_record_is_not_found() {
    let store = spawn_backend(Arc::new(InMemoryStore::new())).await;

    let err = store
        .update(&id("12345678"), &persona("12345678", "Ana", "Ruiz"))
        .await
        .unwrap_err();

    assert_eq!(err, StoreError::NotFound(id("12345678")));
}

#[tokio::test]
async fn test_update_with_mismatched_identifier_never_reaches_the_wire() {
    let backend = Arc::new(InMemoryStore::with_personas([persona("12345678", "Ana", "Ruiz")]));
    let store = spawn_backend(backend.clone()).await;

    let err = store
        .update(&id("12345678"), &persona("87654321", "Ana", "Ruiz"))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::IdentifierMismatch { .. }));
    assert_eq!(backend.calls(persona_client::storage::Operation::Update), 0);
}

#[tokio::test]
async fn test_duplicate_entry_code_maps_to_conflict() {
    let app = Router::new().route(
        "/api/personas/",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": {"code": "ER_DUP_ENTRY", "message": "Duplicate entry"}})),
            )
        }),
    );
    let addr = spawn(app).await;
    let store = HttpStore::new(&config(addr)).unwrap();

    let err = store.create(&persona("12345678", "Ana", "Ruiz")).await.unwrap_err();

    assert_eq!(err, StoreError::Conflict(id("12345678")));
}

#[tokio::test]
async fn test_other_failures_are_rejections() {
    let app = Router::new().route(
        "/api/personas/",
        get(|| async {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": {"code": "MAINTENANCE", "message": "back soon"}})),
            )
        }),
    );
    let addr = spawn(app).await;
    let store = HttpStore::new(&config(addr)).unwrap();

    let err = store.list().await.unwrap_err();

    assert_eq!(
        err,
        StoreError::Rejected {
            status: 503,
            message: "back soon".into(),
        }
    );
}

#[tokio::test]
async fn test_malformed_payload_is_a_decode_error() {
    let app = Router::new().route(
        "/api/personas/",
        get(|| async { Json(json!([{"identifier": "12ab", "name": "Ana"}])) }),
    );
    let addr = spawn(app).await;
    let store = HttpStore::new(&config(addr)).unwrap();

    assert!(matches!(store.list().await, Err(StoreError::Decode(_))));
}

#[tokio::test]
async fn test_unreachable_store_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let store = HttpStore::new(&config(addr)).unwrap();

    assert!(matches!(
        store.get(&id("12345678")).await,
        Err(StoreError::Transport(_))
    ));
}

// ============================================================================
// Cache and validator over HTTP
// ============================================================================

#[tokio::test]
async fn test_cache_and_validator_over_http() {
    let backend = Arc::new(InMemoryStore::with_personas([persona("12345678", "Ana", "Ruiz")]));
    let store: Arc<dyn RemoteStore> = Arc::new(spawn_backend(backend).await);
    let cache = EntityCache::open(store.clone()).await;
    assert_eq!(cache.snapshot().len(), 1);

    cache
        .mutate(Mutation::Create(persona("87654321", "Luis", "Gil")))
        .await
        .unwrap();
    assert_eq!(cache.snapshot().len(), 2);

    let validator = UniquenessValidator::new(store, Duration::from_millis(20));
    validator.check(&id("87654321"), None);
    assert_eq!(validator.resolved().await, ValidationState::Duplicate);
    validator.check(&id("11111111"), None);
    assert_eq!(validator.resolved().await, ValidationState::Available);
}

#[tokio::test]
async fn test_unreachable_probe_fails_open_over_http() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = PersonaClient::connect(config(addr)).await.unwrap();
    assert!(client.cache().snapshot().is_empty());

    let validator = client.validator();
    validator.check(&id("12345678"), None);

    assert_eq!(validator.resolved().await, ValidationState::Available);
    assert_eq!(validator.stats().probe_failures, 1);
}

// ============================================================================
// Router
// ============================================================================

fn app(store: Arc<InMemoryStore>) -> Router {
    server::router(store)
}

fn body(identifier: &str) -> Value {
    json!({
        "identifier": identifier,
        "name": "Ana",
        "surname": "Ruiz",
        "email": "ana@example.com",
        "phone": "600123456",
        "birth_date": "1990-05-17"
    })
}

#[tokio::test]
async fn test_router_create_then_get() {
    let app = app(Arc::new(InMemoryStore::new()));

    let (status, _) = send(&app, Method::POST, "/api/personas/", Some(body("12345678"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, fetched) = send(&app, Method::GET, "/api/personas/12345678", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["surname"], "Ruiz");
    assert_eq!(fetched["birth_date"], "1990-05-17");

    let (status, listed) = send(&app, Method::GET, "/api/personas", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_router_duplicate_create_reports_duplicate_entry() {
    let app = app(Arc::new(InMemoryStore::with_personas([persona("12345678", "Ana", "Ruiz")])));

    let (status, error) = send(&app, Method::POST, "/api/personas/", Some(body("12345678"))).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"]["code"], "ER_DUP_ENTRY");
}

#[tokio::test]
async fn test_router_missing_record_is_not_found() {
    let app = app(Arc::new(InMemoryStore::new()));

    let (status, error) = send(&app, Method::GET, "/api/personas/12345678", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&app, Method::DELETE, "/api/personas/12345678", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_router_rejects_malformed_path_identifier() {
    let app = app(Arc::new(InMemoryStore::new()));

    let (status, error) = send(&app, Method::GET, "/api/personas/12ab", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_router_rejects_identifier_mismatch() {
    let app = app(Arc::new(InMemoryStore::with_personas([persona("12345678", "Ana", "Ruiz")])));

    let (status, _) = send(&app, Method::PUT, "/api/personas/12345678", Some(body("87654321"))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_router_rejects_malformed_payload() {
    let store = Arc::new(InMemoryStore::new());
    let app = app(store.clone());
    let mut payload = body("12345678");
    payload["phone"] = json!("12-34");

    let (status, _) = send(&app, Method::POST, "/api/personas/", Some(payload)).await;

    assert!(status.is_client_error());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_router_rejects_unpadded_birth_date() {
    let store = Arc::new(InMemoryStore::new());
    let app = app(store.clone());
    let mut payload = body("12345678");
    payload["birth_date"] = json!("1990-5-7");

    let (status, _) = send(&app, Method::POST, "/api/personas/", Some(payload)).await;

    assert!(status.is_client_error());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_signed_birth_date_in_listing_is_a_decode_error() {
    let app = Router::new().route(
        "/api/personas/",
        get(|| async {
            Json(json!([{
                "identifier": "12345678",
                "name": "Ana",
                "surname": "Ruiz",
                "email": "ana@example.com",
                "phone": "600123456",
                "birth_date": "+1990-05-07"
            }]))
        }),
    );
    let addr = spawn(app).await;
    let store = HttpStore::new(&config(addr)).unwrap();

    assert!(matches!(store.list().await, Err(StoreError::Decode(_))));
}

#[tokio::test]
async fn test_router_update_and_delete() {
    let store = Arc::new(InMemoryStore::with_personas([persona("12345678", "Eva", "Diaz")]));
    let app = app(store.clone());

    let (status, _) = send(&app, Method::PUT, "/api/personas/12345678", Some(body("12345678"))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::DELETE, "/api/personas/12345678", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(store.is_empty().await);
}
