//! Credential hashing with Argon2id.
//!
//! Digests are raw 32-byte Argon2id outputs stored next to a per-user 16-byte
//! salt. Verification recomputes the digest and compares it in constant time.

use anyhow::Context;
use argon2::{Algorithm, Argon2, Params, Version};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use super::error::AuthError;

pub const SALT_LEN: usize = 16;
pub const DIGEST_LEN: usize = 32;
const DEFAULT_TIME_COST: u32 = 1;
const DEFAULT_MEMORY_KIB: u32 = 64 * 1024;
const DEFAULT_LANES: u32 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HasherConfig {
    time_cost: u32,
    memory_kib: u32,
    lanes: u32,
}

impl HasherConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            time_cost: DEFAULT_TIME_COST,
            memory_kib: DEFAULT_MEMORY_KIB,
            lanes: DEFAULT_LANES,
        }
    }

    #[must_use]
    pub const fn with_time_cost(mut self, iterations: u32) -> Self {
        self.time_cost = iterations;
        self
    }

    #[must_use]
    pub const fn with_memory_kib(mut self, kib: u32) -> Self {
        self.memory_kib = kib;
        self
    }

    #[must_use]
    pub const fn with_lanes(mut self, lanes: u32) -> Self {
        self.lanes = lanes;
        self
    }

    #[must_use]
    pub const fn time_cost(&self) -> u32 {
        self.time_cost
    }

    #[must_use]
    pub const fn memory_kib(&self) -> u32 {
        self.memory_kib
    }

    #[must_use]
    pub const fn lanes(&self) -> u32 {
        self.lanes
    }
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives and verifies password digests.
///
/// Cheap to clone; every call builds its own `Argon2` context from the shared
/// parameters.
#[derive(Clone, Debug)]
pub struct CredentialHasher {
    params: Params,
}

impl CredentialHasher {
    /// # Errors
    /// Returns [`AuthError::Hashing`] when the cost parameters are rejected by Argon2.
    pub fn new(config: HasherConfig) -> Result<Self, AuthError> {
        let params = Params::new(
            config.memory_kib,
            config.time_cost,
            config.lanes,
            Some(DIGEST_LEN),
        )
        .map_err(|err| AuthError::Hashing(err.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Deterministic, salt-dependent digest of `plaintext`.
    ///
    /// # Errors
    /// Returns [`AuthError::Hashing`] if Argon2 rejects the input (e.g. a salt shorter than 8 bytes).
    pub fn derive_secret(&self, plaintext: &[u8], salt: &[u8]) -> Result<Vec<u8>, AuthError> {
        let mut digest = vec![0u8; DIGEST_LEN];
        self.argon2()
            .hash_password_into(plaintext, salt, &mut digest)
            .map_err(|err| AuthError::Hashing(err.to_string()))?;
        Ok(digest)
    }

    /// Recompute the digest and compare it with `expected` in constant time.
    ///
    /// A length mismatch is reported as a plain mismatch.
    ///
    /// # Errors
    /// Returns [`AuthError::Hashing`] if the digest cannot be derived.
    pub fn verify(&self, plaintext: &[u8], salt: &[u8], expected: &[u8]) -> Result<bool, AuthError> {
        let digest = self.derive_secret(plaintext, salt)?;
        Ok(bool::from(digest.as_slice().ct_eq(expected)))
    }

    /// Hash a new credential with a fresh salt. Returns `(digest, salt)`.
    ///
    /// # Errors
    /// Returns [`AuthError::Entropy`] when the OS RNG fails, or [`AuthError::Hashing`].
    pub fn hash_new(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), AuthError> {
        let salt = generate_salt(SALT_LEN)?;
        let digest = self.derive_secret(plaintext, &salt)?;
        Ok((digest, salt))
    }

    /// [`Self::hash_new`] on the blocking pool.
    ///
    /// # Errors
    /// Same as [`Self::hash_new`]; a panicked worker maps to [`AuthError::Hashing`].
    pub async fn hash_new_blocking(
        &self,
        plaintext: SecretString,
    ) -> Result<(Vec<u8>, Vec<u8>), AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash_new(plaintext.expose_secret().as_bytes()))
            .await
            .map_err(|err| AuthError::Hashing(err.to_string()))?
    }

    /// [`Self::verify`] on the blocking pool.
    ///
    /// # Errors
    /// Same as [`Self::verify`]; a panicked worker maps to [`AuthError::Hashing`].
    pub async fn verify_blocking(
        &self,
        plaintext: SecretString,
        salt: Vec<u8>,
        expected: Vec<u8>,
    ) -> Result<bool, AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || {
            hasher.verify(plaintext.expose_secret().as_bytes(), &salt, &expected)
        })
        .await
        .map_err(|err| AuthError::Hashing(err.to_string()))?
    }

    /// Burn one derivation for a login whose email is unknown, so that path
    /// costs the same as a wrong password.
    ///
    /// # Errors
    /// Only a panicked worker is reported.
    pub async fn decoy_blocking(&self, plaintext: SecretString) -> Result<(), AuthError> {
        let decoy_salt = vec![0u8; SALT_LEN];
        let decoy_digest = vec![0u8; DIGEST_LEN];
        self.verify_blocking(plaintext, decoy_salt, decoy_digest)
            .await
            .map(|_| ())
    }
}

/// Fill `size` bytes from the OS CSPRNG.
///
/// # Errors
/// Returns [`AuthError::Entropy`] if the OS refuses to provide randomness.
pub fn generate_salt(size: usize) -> Result<Vec<u8>, AuthError> {
    let mut salt = vec![0u8; size];
    OsRng
        .try_fill_bytes(&mut salt)
        .context("failed to generate salt")
        .map_err(AuthError::Entropy)?;
    Ok(salt)
}

#[cfg(test)]
pub(crate) fn cheap_hasher() -> CredentialHasher {
    match CredentialHasher::new(
        HasherConfig::new()
            .with_memory_kib(256)
            .with_time_cost(1)
            .with_lanes(1),
    ) {
        Ok(hasher) => hasher,
        Err(err) => panic!("cheap hasher params rejected: {err}"),
    }
}
