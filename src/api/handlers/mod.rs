//! API handlers and shared request validation for Quill.

pub mod auth;
pub mod health;
pub mod user;
pub mod users;

use regex::Regex;

/// Lightweight email sanity check run before anything is persisted.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Trim and lowercase so lookups and the unique index agree.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
