use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use pairline_server::{build_state, config::ServerConfig, router};
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

async fn app() -> (TempDir, Router) {
    let dir = tempdir().unwrap();
    let state = build_state(ServerConfig::with_base_dir(dir.path()))
        .await
        .unwrap();
    (dir, router(state))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    send(app, req).await
}

async fn call_raw(app: &Router, method: Method, uri: &str, user: &str, body: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", user)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    send(app, req).await
}

async fn register(app: &Router, id: &str, name: &str) {
    let (status, body) = call(
        app,
        Method::PUT,
        "/users/me",
        Some(id),
        Some(json!({ "displayName": name, "email": format!("{}@test.com", id) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
}

/// alice asks bob, bob accepts; returns bob's edge id
async fn connect(app: &Router) -> String {
    register(app, "alice", "Alice").await;
    register(app, "bob", "Bob").await;

    let (status, _) = call(
        app,
        Method::POST,
        "/relationships/requests",
        Some("alice"),
        Some(json!({ "targetId": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, incoming) = call(app, Method::GET, "/relationships/requests", Some("bob"), None).await;
    let edge_id = incoming["data"][0]["edge_id"].as_str().unwrap().to_string();

    let (status, accepted) = call(
        app,
        Method::PUT,
        &format!("/relationships/requests/{}/accept", edge_id),
        Some("bob"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["data"]["state"], "active");
    edge_id
}

#[tokio::test]
async fn test_health_is_public() {
    let (_dir, app) = app().await;
    let (status, _) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_identity_is_unauthenticated() {
    let (_dir, app) = app().await;

    for uri in ["/conversations", "/relationships/requests", "/users/me"] {
        let (status, body) = call(&app, Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
        assert!(body.get("data").is_none());
    }
}

#[tokio::test]
async fn test_full_flow_over_http() {
    let (_dir, app) = app().await;
    let bob_edge = connect(&app).await;

    let (_, convs) = call(&app, Method::GET, "/conversations", Some("alice"), None).await;
    assert_eq!(convs["success"], true);
    let alice_edge = convs["data"][0]["edge_id"].as_str().unwrap().to_string();
    assert_eq!(convs["data"][0]["peer"]["id"], "bob");

    let (status, sent) = call(
        &app,
        Method::POST,
        &format!("/conversations/{}/messages", alice_edge),
        Some("alice"),
        Some(json!({ "content": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["data"]["recipient_user_id"], "bob");

    let (_, convs) = call(&app, Method::GET, "/conversations", Some("bob"), None).await;
    assert_eq!(convs["data"][0]["unread_count"], 1);
    assert_eq!(convs["data"][0]["last_message"]["content"], "hi");

    let read_uri = format!("/conversations/{}/read", bob_edge);
    let (_, first) = call(&app, Method::PUT, &read_uri, Some("bob"), None).await;
    assert_eq!(first["data"]["updated"], 1);
    let (_, second) = call(&app, Method::PUT, &read_uri, Some("bob"), None).await;
    assert_eq!(second["data"]["updated"], 0);

    let (_, convs) = call(&app, Method::GET, "/conversations", Some("bob"), None).await;
    assert_eq!(convs["data"][0]["unread_count"], 0);

    let (_, history) = call(
        &app,
        Method::GET,
        &format!("/conversations/{}/messages", bob_edge),
        Some("bob"),
        None,
    )
    .await;
    assert_eq!(history["data"][0]["content"], "hi");
    assert_eq!(history["data"][0]["is_read"], true);
}

#[tokio::test]
async fn test_error_statuses() {
    let (_dir, app) = app().await;
    let bob_edge = connect(&app).await;
    register(&app, "mallory", "Mallory").await;

    // Empty content
    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/conversations/{}/messages", bob_edge),
        Some("bob"),
        Some(json!({ "content": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    // Someone else's edge
    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/conversations/{}/messages", bob_edge),
        Some("mallory"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Duplicate request between already connected users
    let (status, _) = call(
        &app,
        Method::POST,
        "/relationships/requests",
        Some("bob"),
        Some(json!({ "target_id": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Unknown reference
    let (status, _) = call(
        &app,
        Method::GET,
        "/conversations/nope/messages",
        Some("bob"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Pending pair cannot talk yet
    let (_, _) = call(
        &app,
        Method::POST,
        "/relationships/requests",
        Some("mallory"),
        Some(json!({ "targetId": "alice" })),
    )
    .await;
    let (_, incoming) = call(&app, Method::GET, "/relationships/requests", Some("alice"), None).await;
    let pending = incoming["data"][0]["edge_id"].as_str().unwrap().to_string();
    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/conversations/{}/messages", pending),
        Some("alice"),
        Some(json!({ "content": "hello?" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_remove_over_http() {
    let (_dir, app) = app().await;
    let bob_edge = connect(&app).await;

    let (status, body) = call(
        &app,
        Method::DELETE,
        &format!("/relationships/{}", bob_edge),
        Some("bob"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["removed"], true);

    for user in ["alice", "bob"] {
        let (_, convs) = call(&app, Method::GET, "/conversations", Some(user), None).await;
        assert_eq!(convs["data"].as_array().unwrap().len(), 0);
        let (_, edges) = call(&app, Method::GET, "/relationships", Some(user), None).await;
        assert_eq!(edges["data"].as_array().unwrap().len(), 0);
    }
}

#[tokio::test]
async fn test_malformed_input_keeps_envelope() {
    let (_dir, app) = app().await;
    let bob_edge = connect(&app).await;

    let bad_bodies = [
        ("/relationships/requests", "{not json"),
        ("/relationships/requests", r#"{"target_id": 5}"#),
        ("/relationships/block", r#""alice""#),
    ];
    for (uri, body) in bad_bodies {
        let (status, value) = call_raw(&app, Method::POST, uri, "alice", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} {}", uri, body);
        assert_eq!(value["success"], false);
        assert!(value["error"].is_string());
    }

    // No content type at all
    let (status, value) = call(
        &app,
        Method::POST,
        &format!("/conversations/{}/messages", bob_edge),
        Some("bob"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["success"], false);

    let (status, value) = call(
        &app,
        Method::PUT,
        &format!("/conversations/{}/read?only_unread=maybe", bob_edge),
        Some("bob"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["success"], false);
    assert!(value["error"].is_string());
    assert!(value.get("data").is_none());

    let (status, value) = call(&app, Method::GET, "/relationships?state=friends", Some("bob"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["success"], false);
}
