//! Access gate for protected routes.
//!
//! Flow: read `Authorization`, resolve the token through the session store,
//! then stash a [`SessionContext`] in the request extensions. Handlers take it
//! back out through [`Authenticated`]. Any failure stops the request with 401.

use axum::{
    async_trait,
    extract::{Extension, FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts, Extensions, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

use super::{error::AuthError, state::AuthState, storage::UserId};

const SCHEMES: [&str; 2] = ["bearer", "token"];

/// Identity resolved by the gate for the current request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    pub token: String,
    pub user_id: UserId,
}

impl SessionContext {
    /// Remove the context from `extensions`. A second call returns `None`.
    pub fn take(extensions: &mut Extensions) -> Option<Self> {
        extensions.remove::<Self>()
    }
}

/// Token from `Authorization`, with an optional `Bearer`/`Token` scheme.
#[must_use]
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    // A bare scheme carries no token.
    if SCHEMES.contains(&raw.to_ascii_lowercase().as_str()) {
        return None;
    }
    let token = match raw.split_once(' ') {
        Some((scheme, rest)) if SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) => {
            rest.trim()
        }
        _ => raw,
    };
    (!token.is_empty()).then(|| token.to_string())
}

/// `axum::middleware::from_fn` body guarding every protected route.
pub async fn require_session(
    Extension(state): Extension<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_token(request.headers()) else {
        debug!("Rejected request without session token");
        return AuthError::SessionNotFound.into_response();
    };

    match state.sessions.resolve(&token).await {
        Ok(user_id) => {
            request
                .extensions_mut()
                .insert(SessionContext { token, user_id });
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

/// Handler-side accessor for the gate's [`SessionContext`].
#[derive(Debug)]
pub struct Authenticated(pub SessionContext);

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        SessionContext::take(&mut parts.extensions)
            .map(Self)
            .ok_or(AuthError::SessionNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    #[test]
    fn extract_token_strips_known_schemes() {
        assert_eq!(extract_token(&headers("Bearer abc")), Some("abc".into()));
        assert_eq!(extract_token(&headers("bearer abc")), Some("abc".into()));
        assert_eq!(extract_token(&headers("Token abc")), Some("abc".into()));
        assert_eq!(extract_token(&headers("  abc  ")), Some("abc".into()));
    }

    #[test]
    fn extract_token_rejects_missing_or_blank() {
        assert_eq!(extract_token(&HeaderMap::new()), None);
        assert_eq!(extract_token(&headers("")), None);
        assert_eq!(extract_token(&headers("Bearer ")), None);
    }

    #[test]
    fn unknown_scheme_is_kept_verbatim() {
        assert_eq!(
            extract_token(&headers("Basic Zm9vOmJhcg==")),
            Some("Basic Zm9vOmJhcg==".into())
        );
    }

    #[test]
    fn context_is_read_once() {
        let mut extensions = Extensions::new();
        extensions.insert(SessionContext {
            token: "t".into(),
            user_id: 7,
        });
        assert_eq!(
            SessionContext::take(&mut extensions).map(|ctx| ctx.user_id),
            Some(7)
        );
        assert_eq!(SessionContext::take(&mut extensions), None);
    }
}
