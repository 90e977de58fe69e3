//! Authenticated self-service endpoints.
//!
//! Flow Overview:
//! 1) The gate has already resolved the bearer token into a `SessionContext`.
//! 2) Read or partially update the caller's own record.
//! 3) Rotate the token after an update; delete the session on logout.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    auth::{
        error::ErrorResponse,
        types::{LogoutResponse, UpdateUserRequest, UserResponse},
        AuthError, AuthState, Authenticated,
    },
    normalize_email,
    users::json_body,
    valid_email,
};

/// Hold a changed email to the same form registration stores and login looks up.
fn normalize_email_change(changes: &mut Map<String, Value>) -> Result<(), AuthError> {
    if let Some(email) = changes.get_mut("email") {
        let normalized = email
            .as_str()
            .map(normalize_email)
            .filter(|candidate| valid_email(candidate))
            .ok_or_else(|| AuthError::Malformed("invalid email".to_string()))?;
        *email = Value::String(normalized);
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/user",
    responses(
        (status = 200, description = "Current user with the presented token", body = UserResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorResponse),
    ),
    security(("token" = [])),
    tag = "user"
)]
#[instrument(skip_all)]
pub async fn current_user(
    state: Extension<Arc<AuthState>>,
    Authenticated(ctx): Authenticated,
) -> Result<impl IntoResponse, AuthError> {
    // A session whose user row is gone is treated as no session.
    let user = state
        .store
        .user_by_id(ctx.user_id)
        .await
        .map_err(AuthError::Store)?
        .ok_or(AuthError::SessionNotFound)?;

    Ok((StatusCode::OK, Json(UserResponse::new(user, Some(ctx.token)))))
}

#[utoipa::path(
    put,
    path = "/api/user",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Record updated, token rotated", body = UserResponse),
        (status = 400, description = "Malformed body or field not editable", body = ErrorResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorResponse),
        (status = 500, description = "Update failed", body = ErrorResponse),
    ),
    security(("token" = [])),
    tag = "user"
)]
#[instrument(skip_all)]
pub async fn update_user(
    state: Extension<Arc<AuthState>>,
    Authenticated(ctx): Authenticated,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AuthError> {
    let mut changes = json_body(payload)?.user;
    normalize_email_change(&mut changes)?;

    let user = state
        .profiles
        .apply_partial_update(ctx.user_id, changes, &state.fields)
        .await?;
    let token = state.sessions.rotate(ctx.user_id).await?;
    info!(user_id = ctx.user_id, "User record updated, session rotated");

    Ok((StatusCode::OK, Json(UserResponse::new(user, Some(token)))))
}

#[utoipa::path(
    post,
    path = "/api/user/logout",
    responses(
        (status = 200, description = "Session revoked", body = LogoutResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorResponse),
    ),
    security(("token" = [])),
    tag = "user"
)]
#[instrument(skip_all)]
pub async fn logout(
    state: Extension<Arc<AuthState>>,
    Authenticated(ctx): Authenticated,
) -> Result<impl IntoResponse, AuthError> {
    state.sessions.revoke(ctx.user_id).await?;
    Ok((
        StatusCode::OK,
        Json(LogoutResponse {
            message: "logged out".to_string(),
        }),
    ))
}
