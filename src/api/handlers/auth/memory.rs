//! In-process `IdentityStore`.
//!
//! Mirrors the constraints of `sql/schema.sql`: unique email, one session row
//! per user, unique token hash. Column writes are type-checked the way
//! Postgres would reject them, so update failures surface the same way.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::storage::{
    FieldChange, FieldValue, IdentityStore, InsertOutcome, NewUser, SessionWrite, User, UserId,
    SESSION_TABLE, USER_TABLE,
};

const USER_COLUMNS: [&str; 8] = [
    "id",
    "email",
    "created_at",
    "updated_at",
    "username",
    "bio",
    "password",
    "salt",
];
const SESSION_COLUMNS: [&str; 2] = ["session_token", "user_id"];

#[derive(Debug)]
struct Inner {
    next_id: UserId,
    users: BTreeMap<UserId, User>,
    sessions: HashMap<UserId, Vec<u8>>,
    catalog: BTreeMap<String, Vec<String>>,
    broken_table: Option<String>,
}

#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        let mut catalog = BTreeMap::new();
        catalog.insert(
            USER_TABLE.to_string(),
            USER_COLUMNS.iter().map(ToString::to_string).collect(),
        );
        catalog.insert(
            SESSION_TABLE.to_string(),
            SESSION_COLUMNS.iter().map(ToString::to_string).collect(),
        );
        Self::with_catalog(catalog)
    }

    /// Start with a custom catalog, e.g. one missing a required table.
    #[must_use]
    pub fn with_catalog(catalog: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                users: BTreeMap::new(),
                sessions: HashMap::new(),
                catalog,
                broken_table: None,
            }),
        }
    }

    /// Make column discovery fail for `table`.
    #[must_use]
    pub fn with_broken_table(self, table: &str) -> Self {
        let mut inner = self.inner.into_inner();
        inner.broken_table = Some(table.to_string());
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Number of session rows currently held.
    pub async fn session_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }
}

fn text_value(column: &str, value: &FieldValue) -> Result<String> {
    match value {
        FieldValue::Text(text) => Ok(text.clone()),
        FieldValue::Null => bail!("null value in column \"{column}\" violates not-null constraint"),
        other => bail!("column \"{column}\" is of type text but expression is {other:?}"),
    }
}

fn apply_change(user: &mut User, change: &FieldChange) -> Result<()> {
    match change.column.as_str() {
        "email" => user.email = text_value("email", &change.value)?,
        "username" => user.username = text_value("username", &change.value)?,
        "bio" => {
            user.bio = match &change.value {
                FieldValue::Null => None,
                value => Some(text_value("bio", value)?),
            }
        }
        column => bail!("column \"{column}\" can not be written by this store"),
    }
    Ok(())
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn list_tables(&self, _schema: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.catalog.keys().cloned().collect())
    }

    async fn list_columns(&self, _schema: &str, table: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        if inner.broken_table.as_deref() == Some(table) {
            bail!("permission denied for table {table}");
        }
        Ok(inner.catalog.get(table).cloned().unwrap_or_default())
    }

    async fn insert_user(&self, user: NewUser) -> Result<InsertOutcome> {
        let mut inner = self.inner.lock().await;
        if inner.users.values().any(|existing| existing.email == user.email) {
            return Ok(InsertOutcome::Conflict);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        let created = User {
            id,
            email: user.email,
            username: user.username,
            bio: None,
            password: user.password,
            salt: user.salt,
            created_at: user.created_at,
            updated_at: user.created_at,
        };
        inner.users.insert(id, created.clone());
        Ok(InsertOutcome::Created(created))
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().await;
        Ok(inner.users.values().find(|user| user.email == email).cloned())
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn update_user(
        &self,
        id: UserId,
        changes: &[FieldChange],
        updated_at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let columns = inner.catalog.get(USER_TABLE).cloned().unwrap_or_default();
        let Some(current) = inner.users.get(&id) else {
            return Ok(0);
        };

        // Work on a copy so a failing column leaves the row untouched.
        let mut updated = current.clone();
        for change in changes {
            if !columns.iter().any(|column| column == &change.column) {
                bail!("column \"{}\" of relation \"{USER_TABLE}\" does not exist", change.column);
            }
            apply_change(&mut updated, change)?;
        }
        updated.updated_at = updated_at;

        if inner
            .users
            .values()
            .any(|other| other.id != id && other.email == updated.email)
        {
            return Err(anyhow!(
                "duplicate key value violates unique constraint \"user_data_email_key\""
            ));
        }
        inner.users.insert(id, updated);
        Ok(1)
    }

    async fn upsert_session(&self, user_id: UserId, token_hash: &[u8]) -> Result<SessionWrite> {
        let mut inner = self.inner.lock().await;
        if !inner.users.contains_key(&user_id) {
            bail!("insert or update on table \"{SESSION_TABLE}\" violates foreign key constraint");
        }
        if inner
            .sessions
            .iter()
            .any(|(owner, hash)| *owner != user_id && hash.as_slice() == token_hash)
        {
            return Ok(SessionWrite::TokenCollision);
        }
        inner.sessions.insert(user_id, token_hash.to_vec());
        Ok(SessionWrite::Written)
    }

    async fn replace_session_token(
        &self,
        user_id: UserId,
        token_hash: &[u8],
    ) -> Result<SessionWrite> {
        let mut inner = self.inner.lock().await;
        if !inner.sessions.contains_key(&user_id) {
            return Ok(SessionWrite::NotFound);
        }
        if inner
            .sessions
            .iter()
            .any(|(owner, hash)| *owner != user_id && hash.as_slice() == token_hash)
        {
            return Ok(SessionWrite::TokenCollision);
        }
        inner.sessions.insert(user_id, token_hash.to_vec());
        Ok(SessionWrite::Written)
    }

    async fn user_for_token(&self, token_hash: &[u8]) -> Result<Option<UserId>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .sessions
            .iter()
            .find(|(_, hash)| hash.as_slice() == token_hash)
            .map(|(owner, _)| *owner))
    }

    async fn delete_session(&self, user_id: UserId) -> Result<()> {
        self.inner.lock().await.sessions.remove(&user_id);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
