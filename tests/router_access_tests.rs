use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use queryhub::crypto::CredentialCipher;
use queryhub::db::{ConnectionInput, Role, sqlite};
use queryhub::router::{HubState, hub_router};
use serde_json::{Value, json};
use std::{
    fs,
    path::PathBuf,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tower::ServiceExt;

const KEY: &str = "gateway-key";

struct Harness {
    app: Router,
    state: HubState,
    admin: i64,
    developer: i64,
    path: PathBuf,
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

async fn harness(tag: &str) -> Harness {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!(
        "queryhub-router-{tag}-{}-{}.sqlite",
        std::process::id(),
        nanos
    ));

    let pool = sqlite::open(&format!("sqlite:{}", path.display()))
        .await
        .expect("open metadata store");
    let cipher = CredentialCipher::from_key_bytes(&[7u8; 32]).expect("cipher");
    let state = HubState::new(pool, cipher, Arc::from(KEY), Duration::from_millis(500));

    let admin = state
        .users
        .create("Ada", "ada@example.com", Role::Administrator)
        .await
        .expect("create admin");
    let developer = state
        .users
        .create("Dev", "dev@example.com", Role::Developer)
        .await
        .expect("create developer");

    Harness {
        app: hub_router(state.clone()),
        state,
        admin,
        developer,
        path,
    }
}

/// A connection that refuses immediately: nothing listens on port 1.
async fn unreachable_connection(h: &Harness, name: &str) -> i64 {
    h.state
        .credentials
        .create(ConnectionInput {
            name: name.to_string(),
            host: "127.0.0.1".to_string(),
            port: 1,
            database_user: "root".to_string(),
            database_password: Some("hunter2".to_string()),
        })
        .await
        .expect("create connection")
}

fn request(method: &str, uri: &str, user: Option<i64>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-queryhub-key", KEY);
    if let Some(id) = user {
        builder = builder.header("x-queryhub-user", id.to_string());
    }
    match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("failed to build request")
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.expect("request failed");
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn missing_key_or_unknown_user_is_unauthenticated() {
    let h = harness("unauth").await;

    let req = Request::builder()
        .uri("/dashboard")
        .header("x-queryhub-user", h.admin.to_string())
        .body(Body::empty())
        .expect("failed to build request");
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = send(&h.app, request("GET", "/dashboard", Some(9999), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&h.app, request("GET", "/dashboard", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_refuse_developers() {
    let h = harness("admin-only").await;
    let (status, body) = send(&h.app, request("GET", "/connections", Some(h.developer), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn admin_creates_and_lists_connections_without_exposing_passwords() {
    let h = harness("crud").await;
    let payload = json!({
        "name": "primary",
        "host": "db.internal",
        "port": 3306,
        "database_user": "app",
        "database_password": "hunter2",
    });
    let (status, body) = send(&h.app, request("POST", "/connections", Some(h.admin), Some(payload))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["id"].is_i64());

    let resp = h
        .app
        .clone()
        .oneshot(request("GET", "/connections", Some(h.admin), None))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    let raw = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
    let text = std::str::from_utf8(&raw).expect("utf-8");
    assert!(text.contains(r#""name":"primary""#));
    assert!(!text.contains("hunter2"));
    assert!(!text.contains("password"));
}

#[tokio::test]
async fn invalid_connection_input_is_a_validation_error() {
    let h = harness("invalid").await;
    let payload = json!({"name": "x", "host": "h", "port": 70000, "database_user": "u"});
    let (status, body) = send(&h.app, request("POST", "/connections", Some(h.admin), Some(payload))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn developer_without_grant_is_forbidden_before_any_network_io() {
    let h = harness("no-grant").await;
    let id = unreachable_connection(&h, "secured").await;

    let uri = format!("/connections/{id}/databases");
    let (status, body) = send(&h.app, request("GET", &uri, Some(h.developer), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let uri = format!("/connections/{id}/databases/app_db/tables/users/row");
    let (status, _) = send(
        &h.app,
        request("DELETE", &uri, Some(h.developer), Some(json!({"row": {"id": 1}}))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn schema_outside_the_allow_list_is_forbidden() {
    let h = harness("allow-list").await;
    let id = unreachable_connection(&h, "reporting-server").await;

    let uri = format!("/connections/{id}/permissions");
    let (status, body) = send(
        &h.app,
        request("PATCH", &uri, Some(h.admin), Some(json!({"user_ids": [h.developer]}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["granted_user_ids"], json!([h.admin, h.developer]));

    let uri = format!("/connections/{id}/users/{}/db-permissions", h.developer);
    let (status, _) = send(
        &h.app,
        request("POST", &uri, Some(h.admin), Some(json!({"allowed_databases": ["reporting"]}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/connections/{id}/databases/app_db/tables");
    let (status, _) = send(&h.app, request("GET", &uri, Some(h.developer), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Allowed schema passes authorization and fails only on the unreachable server.
    let uri = format!("/connections/{id}/databases/reporting/tables");
    let (status, body) = send(&h.app, request("GET", &uri, Some(h.developer), None)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "CONNECTION_ERROR");
}

#[tokio::test]
async fn layout_degrades_when_the_server_is_unreachable() {
    let h = harness("layout").await;
    let id = unreachable_connection(&h, "offline").await;

    let uri = format!("/connections/{id}/databases");
    let (status, body) = send(&h.app, request("GET", &uri, Some(h.admin), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["databases"], json!([]));
    assert_eq!(body["selected_connection_id"], json!(id));
    assert!(body["layout_error"].is_string());
    assert_eq!(body["user_connections"][0]["name"], "offline");
}

#[tokio::test]
async fn row_mutations_require_a_row_payload() {
    let h = harness("row-payload").await;
    let id = unreachable_connection(&h, "rows").await;
    let uri = format!("/connections/{id}/databases/app_db/tables/users/row");
    let (status, body) = send(&h.app, request("DELETE", &uri, Some(h.admin), Some(json!({})))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn unknown_connections_are_not_found() {
    let h = harness("missing").await;
    let (status, body) = send(
        &h.app,
        request("GET", "/connections/4242/databases", Some(h.admin), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn malformed_requests_use_the_uniform_error_body() {
    let h = harness("rejections").await;
    let id = unreachable_connection(&h, "strict").await;

    let req = Request::builder()
        .method("POST")
        .uri(format!("/connections/{id}/databases/app_db/execute-sql"))
        .header("x-queryhub-key", KEY)
        .header("x-queryhub-user", h.admin.to_string())
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .expect("failed to build request");
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = send(
        &h.app,
        request("GET", "/connections/abc/databases", Some(h.admin), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let uri = format!("/connections/{id}/databases/app_db/tables/users?page=abc");
    let (status, body) = send(&h.app, request("GET", &uri, Some(h.admin), None)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["error"]["message"].is_string());
}
