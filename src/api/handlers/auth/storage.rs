//! Persistence seam for users, sessions and catalog introspection.
//!
//! `IdentityStore` is the narrow query interface the identity core runs on.
//! `PgStore` is the production implementation; `super::memory::MemoryStore`
//! mirrors its semantics in-process.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    Connection, PgPool, Postgres, QueryBuilder, Row,
};
use std::{fmt, time::Duration};
use tracing::{info_span, Instrument, Span};

pub type UserId = i64;

pub const USER_TABLE: &str = "user_data";
pub const SESSION_TABLE: &str = "session";

/// A persisted user row.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub bio: Option<String>,
    pub password: Vec<u8>,
    pub salt: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Digest and salt stay out of logs.
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("username", &self.username)
            .field("bio", &self.bio)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

/// Insert payload for registration. `password` is already a digest.
#[derive(Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password: Vec<u8>,
    pub salt: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum InsertOutcome {
    Created(User),
    Conflict,
}

/// Result of a session write keyed on `user_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionWrite {
    Written,
    /// Rotation found no session row for the user.
    NotFound,
    /// Another session already holds the same token hash.
    TokenCollision,
}

/// A scalar value for a partial user update.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(flag),
            Value::Number(number) => number
                .as_i64()
                .map(Self::Integer)
                .or_else(|| number.as_f64().map(Self::Float))
                .unwrap_or_else(|| Self::Text(number.to_string())),
            Value::String(text) => Self::Text(text),
            // Composite values are passed through as JSON text; the column type decides.
            other @ (Value::Array(_) | Value::Object(_)) => Self::Text(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub column: String,
    pub value: FieldValue,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Base tables of `schema`.
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>>;

    /// Column names of `schema.table`.
    async fn list_columns(&self, schema: &str, table: &str) -> Result<Vec<String>>;

    async fn insert_user(&self, user: NewUser) -> Result<InsertOutcome>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>>;

    /// Apply `changes` plus `updated_at` in one statement. Returns affected rows.
    async fn update_user(
        &self,
        id: UserId,
        changes: &[FieldChange],
        updated_at: DateTime<Utc>,
    ) -> Result<u64>;

    /// Insert the user's session or replace its token, atomically.
    async fn upsert_session(&self, user_id: UserId, token_hash: &[u8]) -> Result<SessionWrite>;

    /// Replace the token of an existing session row in place.
    async fn replace_session_token(
        &self,
        user_id: UserId,
        token_hash: &[u8],
    ) -> Result<SessionWrite>;

    async fn user_for_token(&self, token_hash: &[u8]) -> Result<Option<UserId>>;

    /// Idempotent.
    async fn delete_session(&self, user_id: UserId) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Double-quote an identifier for interpolation into SQL.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn db_span(operation: &'static str, statement: &str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

const USER_COLUMNS: &str = "id, email, username, bio, password, salt, created_at, updated_at";

/// Single `UPDATE` of the given columns plus `updated_at`, keyed on `id`.
///
/// Binds follow the order of `changes`, then `updated_at`, then `id`.
fn update_statement(
    id: UserId,
    changes: &[FieldChange],
    updated_at: DateTime<Utc>,
) -> Result<QueryBuilder<'static, Postgres>> {
    if changes.is_empty() {
        return Err(anyhow!("update without fields"));
    }

    let mut builder = QueryBuilder::<Postgres>::new(format!("UPDATE {USER_TABLE} SET "));
    let mut assignments = builder.separated(", ");
    for change in changes {
        assignments.push(quote_ident(&change.column));
        assignments.push_unseparated(" = ");
        match &change.value {
            FieldValue::Null => assignments.push_bind_unseparated(None::<String>),
            FieldValue::Text(text) => assignments.push_bind_unseparated(text.clone()),
            FieldValue::Integer(number) => assignments.push_bind_unseparated(*number),
            FieldValue::Float(number) => assignments.push_bind_unseparated(*number),
            FieldValue::Bool(flag) => assignments.push_bind_unseparated(*flag),
        };
    }
    assignments.push("updated_at = ");
    assignments.push_bind_unseparated(updated_at);
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    Ok(builder)
}

/// Insert or replace in one statement; keyed on `user_id` so a user never holds two rows.
fn upsert_session_statement() -> String {
    format!(
        "INSERT INTO {SESSION_TABLE} (session_token, user_id) VALUES ($1, $2) \
         ON CONFLICT (user_id) DO UPDATE SET session_token = EXCLUDED.session_token"
    )
}

/// In-place rotation. Never inserts.
fn rotate_session_statement() -> String {
    format!("UPDATE {SESSION_TABLE} SET session_token = $1 WHERE user_id = $2")
}

const fn rotation_outcome(rows_affected: u64) -> SessionWrite {
    if rows_affected == 0 {
        SessionWrite::NotFound
    } else {
        SessionWrite::Written
    }
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool to `dsn`.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable.
    pub async fn connect(dsn: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(max_connections)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_user(row: &PgRow) -> Result<User> {
        Ok(User {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            username: row.try_get("username")?,
            bio: row.try_get("bio")?,
            password: row.try_get("password")?,
            salt: row.try_get("salt")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn fetch_user(&self, filter: &str, bind: UserLookup<'_>) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM {USER_TABLE} WHERE {filter} = $1");
        let span = db_span("SELECT", &sql);
        let query = sqlx::query(&sql);
        let query = match bind {
            UserLookup::Id(id) => query.bind(id),
            UserLookup::Email(email) => query.bind(email),
        };
        let row = query
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .with_context(|| format!("failed to lookup user by {filter}"))?;
        row.as_ref().map(Self::row_to_user).transpose()
    }
}

enum UserLookup<'a> {
    Id(UserId),
    Email(&'a str),
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let query = r"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_type = 'BASE TABLE'
            ORDER BY table_name
        ";
        let rows = sqlx::query(query)
            .bind(schema)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to list tables")?;
        rows.iter()
            .map(|row| row.try_get("table_name").map_err(Into::into))
            .collect()
    }

    async fn list_columns(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        let query = r"
            SELECT column_name::text AS column_name
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        ";
        let rows = sqlx::query(query)
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .with_context(|| format!("failed to list columns of {table}"))?;
        rows.iter()
            .map(|row| row.try_get("column_name").map_err(Into::into))
            .collect()
    }

    async fn insert_user(&self, user: NewUser) -> Result<InsertOutcome> {
        let query = format!(
            "INSERT INTO {USER_TABLE} (email, username, password, salt, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) RETURNING {USER_COLUMNS}"
        );
        let result = sqlx::query(&query)
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.password)
            .bind(&user.salt)
            .bind(user.created_at)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await;

        match result {
            Ok(row) => Ok(InsertOutcome::Created(Self::row_to_user(&row)?)),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_user("email", UserLookup::Email(email)).await
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>> {
        self.fetch_user("id", UserLookup::Id(id)).await
    }

    async fn update_user(
        &self,
        id: UserId,
        changes: &[FieldChange],
        updated_at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut builder = update_statement(id, changes, updated_at)?;

        // Only column names and placeholders end up in the span.
        let span = db_span("UPDATE", builder.sql());
        let result = builder
            .build()
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update user")?;
        Ok(result.rows_affected())
    }

    async fn upsert_session(&self, user_id: UserId, token_hash: &[u8]) -> Result<SessionWrite> {
        let query = upsert_session_statement();
        let result = sqlx::query(&query)
            .bind(token_hash)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await;

        match result {
            Ok(_) => Ok(SessionWrite::Written),
            Err(err) if is_unique_violation(&err) => Ok(SessionWrite::TokenCollision),
            Err(err) => Err(err).context("failed to upsert session"),
        }
    }

    async fn replace_session_token(
        &self,
        user_id: UserId,
        token_hash: &[u8],
    ) -> Result<SessionWrite> {
        let query = rotate_session_statement();
        let result = sqlx::query(&query)
            .bind(token_hash)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await;

        match result {
            Ok(done) => Ok(rotation_outcome(done.rows_affected())),
            Err(err) if is_unique_violation(&err) => Ok(SessionWrite::TokenCollision),
            Err(err) => Err(err).context("failed to rotate session token"),
        }
    }

    async fn user_for_token(&self, token_hash: &[u8]) -> Result<Option<UserId>> {
        let query = format!("SELECT user_id FROM {SESSION_TABLE} WHERE session_token = $1");
        let row = sqlx::query(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup session")?;
        row.map(|row| row.try_get("user_id").map_err(Into::into))
            .transpose()
    }

    async fn delete_session(&self, user_id: UserId) -> Result<()> {
        // Logout is idempotent; it's fine if no rows are deleted.
        let query = format!("DELETE FROM {SESSION_TABLE} WHERE user_id = $1");
        sqlx::query(&query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", &query))
            .await
            .context("failed to delete session")?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }
}
