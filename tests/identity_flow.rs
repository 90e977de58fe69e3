use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use quill::api::{
    app,
    handlers::auth::{AuthState, CredentialHasher, HasherConfig, MemoryStore, OsRngTokens},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn router(store: Arc<MemoryStore>) -> Result<Router> {
    let hasher = CredentialHasher::new(
        HasherConfig::new()
            .with_memory_kib(256)
            .with_time_cost(1)
            .with_lanes(1),
    )?;
    let state = AuthState::bootstrap(store, Arc::new(OsRngTokens), hasher, "public").await?;
    Ok(app(Arc::new(state)))
}

async fn send(app: &Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response: Response = app.clone().oneshot(request).await?;
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)?
    };
    Ok((status, value))
}

fn post(uri: &str, body: &Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body)?))?)
}

fn authed(method: &str, uri: &str, token: &str, body: Option<&Value>) -> Result<Request<Body>> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Token {token}"));
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body)?))?,
        None => builder.body(Body::empty())?,
    };
    Ok(request)
}

fn token_of(body: &Value) -> Result<String> {
    body["user"]["token"]
        .as_str()
        .map(ToString::to_string)
        .context("response carries no token")
}

async fn register(app: &Router, email: &str, password: &str) -> Result<String> {
    let (status, body) = send(
        app,
        post(
            "/api/users",
            &json!({"user": {"email": email, "username": "writer", "password": password}}),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    token_of(&body)
}

#[tokio::test]
async fn register_login_and_access_protected_route() -> Result<()> {
    let app = router(Arc::new(MemoryStore::new())).await?;
    register(&app, "a@x.com", "secret").await?;

    let (status, body) = send(
        &app,
        post(
            "/api/users/login",
            &json!({"user": {"email": "a@x.com", "password": "secret"}}),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let token = token_of(&body)?;

    let (status, body) = send(
        &app,
        post(
            "/api/users/login",
            &json!({"user": {"email": "a@x.com", "password": "wrong"}}),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["errors"]["body"][0], "email or password is invalid");

    let (status, _) = send(
        &app,
        Request::builder().uri("/api/user").body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, authed("GET", "/api/user", &token, None)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "a@x.com");
    assert_eq!(body["user"]["token"], token.as_str());
    Ok(())
}

#[tokio::test]
async fn login_replaces_registration_session() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let app = router(store.clone()).await?;
    let first = register(&app, "a@x.com", "secret").await?;

    let (_, body) = send(
        &app,
        post(
            "/api/users/login",
            &json!({"user": {"email": "a@x.com", "password": "secret"}}),
        )?,
    )
    .await?;
    let second = token_of(&body)?;
    assert_ne!(first, second);
    assert_eq!(store.session_count().await, 1);

    let (status, _) = send(&app, authed("GET", "/api/user", &first, None)?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn update_rotates_token() -> Result<()> {
    let app = router(Arc::new(MemoryStore::new())).await?;
    let token = register(&app, "a@x.com", "secret").await?;

    let (status, body) = send(
        &app,
        authed(
            "PUT",
            "/api/user",
            &token,
            Some(&json!({"user": {"bio": "new"}})),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["bio"], "new");
    let rotated = token_of(&body)?;
    assert_ne!(rotated, token);

    let (status, _) = send(&app, authed("GET", "/api/user", &token, None)?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, authed("GET", "/api/user", &rotated, None)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["bio"], "new");
    Ok(())
}

#[tokio::test]
async fn update_of_protected_field_is_rejected() -> Result<()> {
    let app = router(Arc::new(MemoryStore::new())).await?;
    let token = register(&app, "a@x.com", "secret").await?;

    let (status, body) = send(
        &app,
        authed(
            "PUT",
            "/api/user",
            &token,
            Some(&json!({"user": {"bio": "hi", "password": "x"}})),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["errors"]["body"][0],
        "no such field for user: [password]"
    );

    // Nothing changed and the session survived.
    let (status, body) = send(&app, authed("GET", "/api/user", &token, None)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["bio"], Value::Null);

    let (status, _) = send(
        &app,
        post(
            "/api/users/login",
            &json!({"user": {"email": "a@x.com", "password": "secret"}}),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn email_change_keeps_login_working() -> Result<()> {
    let app = router(Arc::new(MemoryStore::new())).await?;
    let token = register(&app, "a@x.com", "secret").await?;

    let (status, body) = send(
        &app,
        authed(
            "PUT",
            "/api/user",
            &token,
            Some(&json!({"user": {"email": "Me@X.com"}})),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "me@x.com");

    let mut token = token_of(&body)?;
    for email in ["Me@X.com", "me@x.com"] {
        let (status, body) = send(
            &app,
            post(
                "/api/users/login",
                &json!({"user": {"email": email, "password": "secret"}}),
            )?,
        )
        .await?;
        assert_eq!(status, StatusCode::OK, "login as {email}");
        token = token_of(&body)?;
    }

    let (status, body) = send(
        &app,
        authed(
            "PUT",
            "/api/user",
            &token,
            Some(&json!({"user": {"email": "not an email"}})),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"]["body"][0], "invalid email");
    Ok(())
}

#[tokio::test]
async fn type_mismatch_is_a_server_error() -> Result<()> {
    let app = router(Arc::new(MemoryStore::new())).await?;
    let token = register(&app, "a@x.com", "secret").await?;

    let (status, body) = send(
        &app,
        authed(
            "PUT",
            "/api/user",
            &token,
            Some(&json!({"user": {"username": 42}})),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["errors"]["body"][0], "internal server error");
    Ok(())
}

#[tokio::test]
async fn logout_revokes_and_is_repeatable_per_session() -> Result<()> {
    let app = router(Arc::new(MemoryStore::new())).await?;
    let token = register(&app, "a@x.com", "secret").await?;

    let (status, _) = send(&app, authed("POST", "/api/user/logout", &token, None)?).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, authed("GET", "/api/user", &token, None)?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The revoked token no longer passes the gate.
    let (status, _) = send(&app, authed("POST", "/api/user/logout", &token, None)?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn startup_fails_without_session_table() {
    let mut catalog = std::collections::BTreeMap::new();
    catalog.insert(
        "user_data".to_string(),
        vec!["id".to_string(), "email".to_string()],
    );
    let result = router(Arc::new(MemoryStore::with_catalog(catalog))).await;
    assert!(result.is_err());
}
