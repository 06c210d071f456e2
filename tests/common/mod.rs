#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use jsonwebtoken::{EncodingKey, Header};
use serde_json::{Value, json};
use slotbook::{ServerConfig, create_app, db::Database, rate_limit::RateLimitConfig};
use tower::ServiceExt;
use url::Url;

pub const TEST_SECRET: &[u8] = b"test-jwt-secret-for-slotbook-tests";

/// Config with a fast bcrypt cost and limits high enough to never trigger.
pub fn test_config(db: Database) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: Some(TEST_SECRET.to_vec()),
        bcrypt_cost: 4,
        rate_limit: RateLimitConfig::new(1000, 1000, false),
    }
}

pub async fn create_test_app() -> (Router, Database) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    (create_app(&test_config(db.clone())), db)
}

/// App backed by a database file, so requests run on separate connections.
/// Keep the returned directory alive for the duration of the test.
pub async fn create_file_test_app() -> (Router, Database, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("slotbook.db");
    let db = Database::open(path.to_str().expect("temp path is not UTF-8"))
        .await
        .expect("Failed to open test database");
    (create_app(&test_config(db.clone())), db, dir)
}

pub async fn create_test_app_with(config: impl FnOnce(&mut ServerConfig)) -> Router {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let mut server_config = test_config(db);
    config(&mut server_config);
    create_app(&server_config)
}

/// Send a request and decode the JSON body (`Null` when empty).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, json)
}

pub struct TestUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub token: String,
    pub refresh_token: String,
}

/// Register a user and log them in.
pub async fn register_and_login(app: &Router, name: &str, email: &str) -> TestUser {
    let password = "secret123";
    let (status, created) = send(
        app,
        "POST",
        "/users",
        None,
        Some(json!({ "name": name, "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", created);

    let (status, login) = send(
        app,
        "POST",
        "/users/auth",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", login);

    TestUser {
        id: created["id"].as_str().unwrap().to_string(),
        name: name.to_string(),
        email: email.to_string(),
        password: password.to_string(),
        token: login["token"].as_str().unwrap().to_string(),
        refresh_token: login["refresh_token"].as_str().unwrap().to_string(),
    }
}

/// An access token for `subject` that expired 15 minutes ago.
pub fn expired_access_token(subject: &str, email: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = json!({
        "sub": subject,
        "email": email,
        "typ": "access",
        "iat": now - 30 * 60,
        "exp": now - 15 * 60,
    });
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET),
    )
    .unwrap()
}

/// A slot at `hour`:00 UTC tomorrow.
pub fn tomorrow_at(hour: u32) -> DateTime<Utc> {
    tomorrow().and_hms_opt(hour, 0, 0).unwrap().and_utc()
}

pub fn tomorrow() -> NaiveDate {
    (Utc::now() + Duration::days(1)).date_naive()
}

/// Start a real server on a random port.
pub async fn start_test_server() -> (tokio::task::JoinHandle<()>, Url, Database) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let (handle, addr) = slotbook::start_server(test_config(db.clone()), 0)
        .await
        .expect("Failed to start server");
    let base = Url::parse(&format!("http://{}", addr)).unwrap();
    (handle, base, db)
}
