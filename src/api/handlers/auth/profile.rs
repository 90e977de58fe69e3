//! Partial updates of the caller's own user record.
//!
//! Flow Overview:
//! 1) Reject the whole request on the first field outside the allow-list.
//! 2) Write every accepted field plus a server-side `updated_at` in one statement.
//! 3) Re-read the row and return it as the authoritative result.
//!
//! Token rotation after a successful update belongs to the caller.

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{
    error::AuthError,
    schema::EditableFields,
    storage::{FieldChange, IdentityStore, User, UserId, USER_TABLE},
};

#[derive(Clone)]
pub struct ProfileManager {
    store: Arc<dyn IdentityStore>,
}

impl ProfileManager {
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Keys are checked in request order; the first one outside the allow-list
    /// is named in the error.
    ///
    /// # Errors
    /// [`AuthError::InvalidField`] for an empty or non-allow-listed change set,
    /// with no store call made. [`AuthError::Update`] for any store failure
    /// during the write or the re-read.
    #[instrument(skip(self, changes, fields), fields(changes = changes.len()))]
    pub async fn apply_partial_update(
        &self,
        user_id: UserId,
        changes: Map<String, Value>,
        fields: &EditableFields,
    ) -> Result<User, AuthError> {
        if changes.is_empty() {
            return Err(AuthError::InvalidField("no fields to update".to_string()));
        }
        if let Some(field) = changes.keys().find(|key| !fields.allows(USER_TABLE, key)) {
            return Err(AuthError::InvalidField(format!(
                "no such field for user: [{field}]"
            )));
        }

        let updates: Vec<FieldChange> = changes
            .into_iter()
            .map(|(column, value)| FieldChange {
                column,
                value: value.into(),
            })
            .collect();

        let affected = self
            .store
            .update_user(user_id, &updates, Utc::now())
            .await
            .map_err(AuthError::Update)?;
        debug!(affected, "User record updated");

        self.store
            .user_by_id(user_id)
            .await
            .map_err(AuthError::Update)?
            .ok_or_else(|| AuthError::Update(anyhow::anyhow!("user {user_id} vanished after update")))
    }
}
