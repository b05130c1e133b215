//! API integration tests.
//!
//! These tests verify the complete API flow end-to-end using axum's test utilities.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use distributable_session::api::create_router;
use distributable_session::{
    DistributableSessionManager, DistributableSessionManagerFactory, InMemorySessionStore,
    ManagerConfig, SessionStore,
};

/// Helper to create a JSON request.
fn json_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");

    match body {
        Some(json) => builder.body(Body::from(json.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Helper to extract body as string.
async fn response_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&body).to_string()
}

/// Helper to extract JSON from response.
async fn response_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

fn app(config: ManagerConfig) -> (Router, Arc<DistributableSessionManager>, Arc<InMemorySessionStore>) {
    let store = Arc::new(InMemorySessionStore::new());
    let manager = DistributableSessionManagerFactory::new(Arc::clone(&store))
        .create_session_manager(config);
    (create_router(Arc::clone(&manager)), manager, store)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> axum::response::Response {
    app.clone()
        .oneshot(json_request(method, uri, body))
        .await
        .unwrap()
}

// ============================================================================
// Health & Info Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _, _) = app(ManagerConfig::default());

    let response = send(&app, Method::GET, "/health", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_text(response).await, "OK");
}

#[tokio::test]
async fn test_api_info_endpoint() {
    let (app, _, _) = app(ManagerConfig::new("shop").with_orphan_session_allowed(true));

    let response = send(&app, Method::GET, "/api/v1", None).await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["name"], "distributable-session");
    assert_eq!(json["deployment"], "shop");
    assert_eq!(json["orphan_session_allowed"], true);
    assert_eq!(json["default_timeout_secs"], 1800);
}

// ============================================================================
// Session Tests
// ============================================================================

#[tokio::test]
async fn test_create_session() {
    let (app, _, store) = app(ManagerConfig::default());

    let response = send(
        &app,
        Method::POST,
        "/api/v1/sessions",
        Some(json!({"id": "abc", "timeout_secs": 60, "attributes": {"user": "alice"}})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);

    let json = response_json(response).await;
    assert_eq!(json["id"], "abc");
    assert_eq!(json["state"], "created");
    assert_eq!(json["timeout_secs"], 60);
    assert_eq!(json["attributes"]["user"], "alice");
    assert_eq!(store.session_count(), 1);
}

#[tokio::test]
async fn test_create_generates_id() {
    let (app, _, _) = app(ManagerConfig::default());

    let response = send(&app, Method::POST, "/api/v1/sessions", Some(json!({}))).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = response_json(response).await;
    assert!(!json["id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_duplicate_conflicts() {
    let (app, _, store) = app(ManagerConfig::default());

    let body = json!({"id": "dup"});
    let first = send(&app, Method::POST, "/api/v1/sessions", Some(body.clone())).await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = send(&app, Method::POST, "/api/v1/sessions", Some(body)).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let json = response_json(second).await;
    assert_eq!(json["code"], "SESSION_ID_CONFLICT");
    assert_eq!(store.session_count(), 1);
}

#[tokio::test]
async fn test_create_invalid_id() {
    let (app, _, _) = app(ManagerConfig::default());

    let response = send(
        &app,
        Method::POST,
        "/api/v1/sessions",
        Some(json!({"id": "has space"})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert_eq!(json["code"], "INVALID_SESSION_ID");
}

#[tokio::test]
async fn test_max_sessions_returns_503() {
    let (app, manager, store) = app(ManagerConfig::default().with_max_active_sessions(Some(1)));

    let first = send(&app, Method::POST, "/api/v1/sessions", Some(json!({}))).await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = send(&app, Method::POST, "/api/v1/sessions", Some(json!({}))).await;
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = response_json(second).await;
    assert_eq!(json["code"], "MAX_SESSIONS_EXCEEDED");

    assert_eq!(manager.active_session_count(), 1);
    assert_eq!(store.session_count(), 1);
}

#[tokio::test]
async fn test_get_session() {
    let (app, _, _) = app(ManagerConfig::default());
    send(&app, Method::POST, "/api/v1/sessions", Some(json!({"id": "s1"}))).await;

    let response = send(&app, Method::GET, "/api/v1/sessions/s1", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["id"], "s1");
}

#[tokio::test]
async fn test_get_session_not_found() {
    let (app, _, _) = app(ManagerConfig::default());

    let response = send(&app, Method::GET, "/api/v1/sessions/nonexistent", None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = response_json(response).await;
    assert_eq!(json["code"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn test_delete_session_is_idempotent() {
    let (app, manager, store) = app(ManagerConfig::default());
    send(&app, Method::POST, "/api/v1/sessions", Some(json!({"id": "gone"}))).await;

    let first = send(&app, Method::DELETE, "/api/v1/sessions/gone", None).await;
    assert_eq!(first.status(), StatusCode::NO_CONTENT);

    let second = send(&app, Method::DELETE, "/api/v1/sessions/gone", None).await;
    assert_eq!(second.status(), StatusCode::NO_CONTENT);

    assert_eq!(store.session_count(), 0);
    assert_eq!(manager.active_session_count(), 0);
}

// ============================================================================
// Attribute Tests
// ============================================================================

#[tokio::test]
async fn test_put_and_delete_attribute() {
    let (app, _, _) = app(ManagerConfig::default());
    send(&app, Method::POST, "/api/v1/sessions", Some(json!({"id": "s"}))).await;

    let put = send(
        &app,
        Method::PUT,
        "/api/v1/sessions/s/attributes/cart",
        Some(json!({"items": 2})),
    )
    .await;
    assert_eq!(put.status(), StatusCode::OK);
    let json = response_json(put).await;
    assert_eq!(json["name"], "cart");
    assert_eq!(json["value"]["items"], 2);
    assert!(json.get("previous").is_none());

    let get = send(&app, Method::GET, "/api/v1/sessions/s", None).await;
    let json = response_json(get).await;
    assert_eq!(json["attributes"]["cart"]["items"], 2);

    let delete = send(&app, Method::DELETE, "/api/v1/sessions/s/attributes/cart", None).await;
    assert_eq!(delete.status(), StatusCode::OK);
    let json = response_json(delete).await;
    assert_eq!(json["previous"]["items"], 2);

    let again = send(&app, Method::DELETE, "/api/v1/sessions/s/attributes/cart", None).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
    let json = response_json(again).await;
    assert_eq!(json["code"], "ATTRIBUTE_NOT_FOUND");
}

#[tokio::test]
async fn test_put_attribute_missing_session() {
    let (app, _, store) = app(ManagerConfig::default());

    let response = send(
        &app,
        Method::PUT,
        "/api/v1/sessions/ghost/attributes/x",
        Some(json!(1)),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(store.session_count(), 0);
}

// ============================================================================
// Statistics & Settings Tests
// ============================================================================

#[tokio::test]
async fn test_statistics() {
    let (app, _, _) = app(ManagerConfig::default().with_max_active_sessions(Some(10)));
    send(&app, Method::POST, "/api/v1/sessions", Some(json!({"id": "a"}))).await;
    send(&app, Method::POST, "/api/v1/sessions", Some(json!({"id": "b"}))).await;
    send(&app, Method::DELETE, "/api/v1/sessions/a", None).await;

    let response = send(&app, Method::GET, "/api/v1/statistics", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["active_sessions"], 1);
    assert_eq!(json["highest_active_sessions"], 2);
    assert_eq!(json["max_active_sessions"], 10);
    assert_eq!(json["created_sessions"], 2);
    assert_eq!(json["expired_sessions"], 1);
    assert_eq!(json["invalidated_sessions"], 1);
}

#[tokio::test]
async fn test_statistics_disabled() {
    let (app, _, _) = app(ManagerConfig::default().with_statistics(false));

    let response = send(&app, Method::GET, "/api/v1/statistics", None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = response_json(response).await;
    assert_eq!(json["code"], "STATISTICS_DISABLED");
}

#[tokio::test]
async fn test_set_default_timeout() {
    let (app, manager, _) = app(ManagerConfig::default());

    let response = send(
        &app,
        Method::PUT,
        "/api/v1/settings/default-timeout",
        Some(json!({"timeout_secs": 90})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(manager.default_session_timeout().as_secs(), 90);

    let created = send(&app, Method::POST, "/api/v1/sessions", Some(json!({}))).await;
    let json = response_json(created).await;
    assert_eq!(json["timeout_secs"], 90);
}

#[tokio::test]
async fn test_not_found_route() {
    let (app, _, _) = app(ManagerConfig::default());

    let response = send(&app, Method::GET, "/nonexistent", None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
