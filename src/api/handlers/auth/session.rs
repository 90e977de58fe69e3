//! Session store: bearer token issue, rotation, resolution and revocation.
//!
//! Every write is a single statement keyed on `user_id`, so a user never holds
//! more than one valid token even with several processes serving traffic.

use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    error::AuthError,
    storage::{IdentityStore, SessionWrite, UserId},
    token::{hash_token, TokenGenerator},
};

/// Draws allowed when a fresh token hashes onto an existing session.
pub const MAX_TOKEN_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn IdentityStore>,
    tokens: Arc<dyn TokenGenerator>,
}

#[derive(Clone, Copy)]
enum WriteMode {
    Upsert,
    Replace,
}

impl SessionStore {
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>, tokens: Arc<dyn TokenGenerator>) -> Self {
        Self { store, tokens }
    }

    /// Issue a token for `user_id`, replacing any previous session.
    ///
    /// # Errors
    /// [`AuthError::Entropy`] if no token can be drawn, [`AuthError::Store`] on
    /// store failure or repeated collisions.
    pub async fn issue(&self, user_id: UserId) -> Result<String, AuthError> {
        self.write_token(user_id, WriteMode::Upsert).await
    }

    /// Replace the token of an existing session in place.
    ///
    /// # Errors
    /// [`AuthError::SessionNotFound`] when the user has no session row, otherwise
    /// as [`Self::issue`].
    pub async fn rotate(&self, user_id: UserId) -> Result<String, AuthError> {
        self.write_token(user_id, WriteMode::Replace).await
    }

    /// Exact-match lookup of a presented token.
    ///
    /// # Errors
    /// [`AuthError::SessionNotFound`] for an empty or unknown token,
    /// [`AuthError::Store`] if the lookup fails.
    pub async fn resolve(&self, token: &str) -> Result<UserId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::SessionNotFound);
        }
        self.store
            .user_for_token(&hash_token(token))
            .await
            .map_err(AuthError::Store)?
            .ok_or(AuthError::SessionNotFound)
    }

    /// Idempotent.
    ///
    /// # Errors
    /// [`AuthError::Store`] if the delete fails.
    pub async fn revoke(&self, user_id: UserId) -> Result<(), AuthError> {
        self.store
            .delete_session(user_id)
            .await
            .map_err(AuthError::Store)
    }

    async fn write_token(&self, user_id: UserId, mode: WriteMode) -> Result<String, AuthError> {
        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let token = self.tokens.generate()?;
            let token_hash = hash_token(&token);
            let written = match mode {
                WriteMode::Upsert => self.store.upsert_session(user_id, &token_hash).await,
                WriteMode::Replace => self.store.replace_session_token(user_id, &token_hash).await,
            }
            .map_err(AuthError::Store)?;

            match written {
                SessionWrite::Written => {
                    debug!(user_id, attempt, "Session token written");
                    return Ok(token);
                }
                SessionWrite::NotFound => return Err(AuthError::SessionNotFound),
                SessionWrite::TokenCollision => {
                    warn!(user_id, attempt, "Session token collision, drawing again");
                }
            }
        }

        Err(AuthError::Store(anyhow::anyhow!(
            "session token collided {MAX_TOKEN_ATTEMPTS} times"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::{
        memory::MemoryStore,
        storage::{InsertOutcome, NewUser},
        token::{testing::ScriptedTokens, OsRngTokens},
    };
    use anyhow::{bail, Result};
    use chrono::Utc;

    async fn seed_user(store: &MemoryStore, email: &str) -> Result<UserId> {
        let outcome = store
            .insert_user(NewUser {
                email: email.to_string(),
                username: "u".to_string(),
                password: vec![0; 32],
                salt: vec![0; 16],
                created_at: Utc::now(),
            })
            .await?;
        match outcome {
            InsertOutcome::Created(user) => Ok(user.id),
            InsertOutcome::Conflict => bail!("conflict"),
        }
    }

    #[tokio::test]
    async fn issue_then_resolve() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let user_id = seed_user(&store, "a@x.com").await?;
        let sessions = SessionStore::new(store.clone(), Arc::new(OsRngTokens));

        let token = sessions.issue(user_id).await?;
        assert_eq!(sessions.resolve(&token).await?, user_id);
        Ok(())
    }

    #[tokio::test]
    async fn rotate_invalidates_previous_token() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let user_id = seed_user(&store, "a@x.com").await?;
        let sessions = SessionStore::new(store.clone(), Arc::new(OsRngTokens));

        let old = sessions.issue(user_id).await?;
        let new = sessions.rotate(user_id).await?;
        assert_ne!(old, new);
        assert!(matches!(
            sessions.resolve(&old).await,
            Err(AuthError::SessionNotFound)
        ));
        assert_eq!(sessions.resolve(&new).await?, user_id);
        assert_eq!(store.session_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn reissue_keeps_one_row_per_user() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let user_id = seed_user(&store, "a@x.com").await?;
        let sessions = SessionStore::new(store.clone(), Arc::new(OsRngTokens));

        let first = sessions.issue(user_id).await?;
        let second = sessions.issue(user_id).await?;
        assert!(sessions.resolve(&first).await.is_err());
        assert_eq!(sessions.resolve(&second).await?, user_id);
        assert_eq!(store.session_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn rotate_without_session_is_not_found() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let user_id = seed_user(&store, "a@x.com").await?;
        let sessions = SessionStore::new(store.clone(), Arc::new(OsRngTokens));

        assert!(matches!(
            sessions.rotate(user_id).await,
            Err(AuthError::SessionNotFound)
        ));
        assert_eq!(store.session_count().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn revoke_is_idempotent() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let user_id = seed_user(&store, "a@x.com").await?;
        let sessions = SessionStore::new(store.clone(), Arc::new(OsRngTokens));

        let token = sessions.issue(user_id).await?;
        sessions.revoke(user_id).await?;
        assert!(matches!(
            sessions.resolve(&token).await,
            Err(AuthError::SessionNotFound)
        ));
        sessions.revoke(user_id).await?;
        Ok(())
    }

    #[tokio::test]
    async fn empty_and_unknown_tokens_are_unauthenticated() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let sessions = SessionStore::new(store, Arc::new(OsRngTokens));
        assert!(matches!(
            sessions.resolve("").await,
            Err(AuthError::SessionNotFound)
        ));
        assert!(matches!(
            sessions.resolve("not-a-token").await,
            Err(AuthError::SessionNotFound)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn collision_draws_a_new_token() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let a = seed_user(&store, "a@x.com").await?;
        let b = seed_user(&store, "b@x.com").await?;
        let sessions = SessionStore::new(
            store.clone(),
            Arc::new(ScriptedTokens::new(["dup", "dup", "fresh"])),
        );

        assert_eq!(sessions.issue(a).await?, "dup");
        assert_eq!(sessions.issue(b).await?, "fresh");
        assert_eq!(sessions.resolve("dup").await?, a);
        assert_eq!(sessions.resolve("fresh").await?, b);
        Ok(())
    }

    #[tokio::test]
    async fn repeated_collisions_give_up() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let a = seed_user(&store, "a@x.com").await?;
        let b = seed_user(&store, "b@x.com").await?;
        let sessions = SessionStore::new(
            store.clone(),
            Arc::new(ScriptedTokens::new(["dup", "dup", "dup", "dup", "never"])),
        );

        sessions.issue(a).await?;
        assert!(matches!(sessions.issue(b).await, Err(AuthError::Store(_))));
        assert!(matches!(
            sessions.resolve("never").await,
            Err(AuthError::SessionNotFound)
        ));
        Ok(())
    }
}
