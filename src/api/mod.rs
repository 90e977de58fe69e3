use crate::api::handlers::{
    auth::{
        require_session, AuthState, CredentialHasher, HasherConfig, OsRngTokens, PgStore,
    },
    health, user, users,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{get, post},
    Extension, Router,
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

/// Everything the server needs before it binds.
#[derive(Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub dsn: SecretString,
    pub db_schema: String,
    pub db_max_connections: u32,
    pub hasher: HasherConfig,
}

/// Build the HTTP router over an already bootstrapped identity state.
pub fn app(state: Arc<AuthState>) -> Router {
    let protected = Router::new()
        .route(
            "/api/user",
            get(user::current_user).put(user::update_user),
        )
        .route("/api/user/logout", post(user::logout))
        .route_layer(middleware::from_fn(require_session));

    Router::new()
        .route(
            "/health",
            get(health::health)
                .head(health::health)
                .options(health::health),
        )
        .route("/api/users", post(users::registration))
        .route("/api/users/login", post(users::login))
        .merge(protected)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

/// Connect, snapshot the schema, then serve until ctrl-c.
///
/// # Errors
/// Fails before binding if the database is unreachable or the schema snapshot
/// cannot be built.
pub async fn new(config: ServerConfig) -> Result<()> {
    let store = PgStore::connect(config.dsn.expose_secret(), config.db_max_connections).await?;

    let hasher = CredentialHasher::new(config.hasher).context("Invalid hashing parameters")?;

    let state = AuthState::bootstrap(
        Arc::new(store),
        Arc::new(OsRngTokens),
        hasher,
        &config.db_schema,
    )
    .await
    .context("Failed to snapshot database schema")?;

    let app = app(Arc::new(state));

    let listener = TcpListener::bind(format!("::0:{}", config.port)).await?;

    info!("Listening on [::]:{}", config.port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
