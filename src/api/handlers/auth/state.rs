//! Shared identity state, built once before the listener binds.

use std::sync::Arc;
use tracing::info;

use super::{
    error::AuthError,
    hasher::CredentialHasher,
    profile::ProfileManager,
    schema::{EditableFields, SchemaSnapshot},
    session::SessionStore,
    storage::IdentityStore,
    token::TokenGenerator,
};

pub struct AuthState {
    pub store: Arc<dyn IdentityStore>,
    pub hasher: CredentialHasher,
    pub sessions: SessionStore,
    pub profiles: ProfileManager,
    pub snapshot: SchemaSnapshot,
    pub fields: EditableFields,
}

impl AuthState {
    /// Snapshot the catalog of `db_schema` and wire the identity components.
    ///
    /// # Errors
    /// Returns [`AuthError::SchemaDiscovery`] if the snapshot cannot be built or
    /// lacks the user or session table. The process must not serve traffic then.
    pub async fn bootstrap(
        store: Arc<dyn IdentityStore>,
        tokens: Arc<dyn TokenGenerator>,
        hasher: CredentialHasher,
        db_schema: &str,
    ) -> Result<Self, AuthError> {
        let snapshot = SchemaSnapshot::build(store.as_ref(), db_schema).await?;
        let fields = EditableFields::from_snapshot(&snapshot)?;
        info!(
            version = fields.version(),
            editable = ?fields.fields(super::storage::USER_TABLE).collect::<Vec<_>>(),
            "Editable user fields resolved"
        );
        Ok(Self::with_fields(store, tokens, hasher, snapshot, fields))
    }

    /// Assemble from an already-known snapshot and allow-list.
    #[must_use]
    pub fn with_fields(
        store: Arc<dyn IdentityStore>,
        tokens: Arc<dyn TokenGenerator>,
        hasher: CredentialHasher,
        snapshot: SchemaSnapshot,
        fields: EditableFields,
    ) -> Self {
        Self {
            sessions: SessionStore::new(store.clone(), tokens),
            profiles: ProfileManager::new(store.clone()),
            store,
            hasher,
            snapshot,
            fields,
        }
    }
}
