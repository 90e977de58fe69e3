//! Identity and access core.
//!
//! This module turns credentials into digests, digests into sessions, and
//! sessions into an authenticated identity for protected routes.
//!
//! ## Credentials
//!
//! Passwords are hashed with Argon2id into a raw 32-byte digest next to a
//! random 16-byte salt. Verification recomputes the digest and compares in
//! constant time. Hashing runs on the blocking pool.
//!
//! ## Sessions
//!
//! One session row per user. Tokens carry 256 bits from the OS RNG and are
//! stored as their SHA-256. Login replaces the row, a profile update rotates
//! the token in place, and logout deletes the row.
//!
//! ## Editable fields
//!
//! The catalog is read once at startup. Columns of `user_data` minus
//! `id, password, salt, created_at, updated_at` form the allow-list for
//! `PUT /api/user`. Later schema changes need a restart to show up.

pub mod error;
pub mod gate;
pub mod hasher;
pub mod memory;
pub mod profile;
pub mod schema;
pub mod session;
pub mod state;
pub mod storage;
pub mod token;
pub mod types;

pub use error::{AuthError, ErrorResponse};
pub use gate::{require_session, Authenticated, SessionContext};
pub use hasher::{CredentialHasher, HasherConfig};
pub use memory::MemoryStore;
pub use schema::{EditableFields, SchemaSnapshot};
pub use state::AuthState;
pub use storage::{IdentityStore, PgStore};
pub use token::{OsRngTokens, TokenGenerator};
