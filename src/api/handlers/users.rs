//! Registration and login.
//!
//! Flow Overview:
//! 1) Normalize and validate the submitted email.
//! 2) Hash (registration) or verify (login) the password on the blocking pool.
//! 3) Issue a session token and return it in the user body.
//!
//! Login never says which of email or password was wrong; an unknown email
//! pays the same hashing cost as a bad password.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::{
    auth::{
        error::ErrorResponse,
        storage::{InsertOutcome, NewUser},
        types::{LoginRequest, RegistrationRequest, UserResponse},
        AuthError, AuthState,
    },
    normalize_email, valid_email,
};

/// Map axum's JSON rejection onto the error envelope.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AuthError::Malformed(rejection.body_text()))
}

#[utoipa::path(
    post,
    path = "/api/users",
    request_body = RegistrationRequest,
    responses(
        (status = 201, description = "User created, session issued", body = UserResponse),
        (status = 400, description = "Malformed body or invalid input", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn registration(
    state: Extension<Arc<AuthState>>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AuthError> {
    let request = json_body(payload)?.user;

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(AuthError::Malformed("invalid email".to_string()));
    }
    let username = request.username.trim().to_string();
    if username.is_empty() {
        return Err(AuthError::Malformed("username can't be blank".to_string()));
    }
    if request.password.is_empty() {
        return Err(AuthError::Malformed("password can't be blank".to_string()));
    }

    let (password, salt) = state.hasher.hash_new_blocking(request.password()).await?;

    let outcome = state
        .store
        .insert_user(NewUser {
            email,
            username,
            password,
            salt,
            created_at: Utc::now(),
        })
        .await
        .map_err(AuthError::Store)?;

    let user = match outcome {
        InsertOutcome::Created(user) => user,
        InsertOutcome::Conflict => {
            debug!("Registration rejected for existing email");
            return Err(AuthError::Conflict("email has already been taken".to_string()));
        }
    };

    let token = state.sessions.issue(user.id).await?;
    info!(user_id = user.id, "User registered");

    Ok((StatusCode::CREATED, Json(UserResponse::new(user, Some(token)))))
}

#[utoipa::path(
    post,
    path = "/api/users/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials accepted, session issued", body = UserResponse),
        (status = 400, description = "Malformed body", body = ErrorResponse),
        (status = 401, description = "Email or password is invalid", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn login(
    state: Extension<Arc<AuthState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AuthError> {
    let request = json_body(payload)?.user;
    let email = normalize_email(&request.email);

    let Some(user) = state
        .store
        .user_by_email(&email)
        .await
        .map_err(AuthError::Store)?
    else {
        state.hasher.decoy_blocking(request.password()).await?;
        return Err(AuthError::CredentialMismatch);
    };

    let matched = state
        .hasher
        .verify_blocking(request.password(), user.salt.clone(), user.password.clone())
        .await?;
    if !matched {
        return Err(AuthError::CredentialMismatch);
    }

    let token = state.sessions.issue(user.id).await?;
    debug!(user_id = user.id, "User logged in");

    Ok((StatusCode::OK, Json(UserResponse::new(user, Some(token)))))
}
