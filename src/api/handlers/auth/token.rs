//! Session token generation and at-rest hashing.

use anyhow::Context;
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

use super::error::AuthError;

pub const TOKEN_BYTES: usize = 32;

/// Source of opaque bearer tokens.
pub trait TokenGenerator: Send + Sync {
    /// # Errors
    /// Returns [`AuthError::Entropy`] when no randomness is available.
    fn generate(&self) -> Result<String, AuthError>;
}

/// 256 bits from the OS CSPRNG, base64url without padding.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsRngTokens;

impl TokenGenerator for OsRngTokens {
    fn generate(&self) -> Result<String, AuthError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to generate session token")
            .map_err(AuthError::Entropy)?;
        Ok(Base64UrlUnpadded::encode_string(&bytes))
    }
}

/// Tokens are stored as their SHA-256; the plaintext only lives with the client.
#[must_use]
pub fn hash_token(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}
