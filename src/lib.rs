//! # Quill
//!
//! `quill` is the identity and access service behind the Quill blogging API.
//! It registers users, verifies passwords, issues bearer tokens and guards the
//! authenticated `/api/user` routes.
//!
//! ## Credentials
//!
//! Passwords become raw Argon2id digests with a per-user random salt. Logins
//! recompute the digest and compare in constant time. Unknown emails and bad
//! passwords are indistinguishable to the caller, including in latency.
//!
//! ## Sessions
//!
//! Each user holds at most one session. The token is 256 bits of OS randomness
//! handed to the client once; the database keeps only its SHA-256. Updating
//! the profile rotates the token, logging out deletes it.
//!
//! ## Schema Snapshot
//!
//! At startup the service reads the Postgres catalog for the configured schema
//! and derives which `user_data` columns a client may edit. Identity and
//! credential columns are never editable. The snapshot lives for the process
//! lifetime; apply migrations with a restart. See `sql/schema.sql`.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
