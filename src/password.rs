//! Salted Argon2 password hashing.

use std::sync::LazyLock;

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use rand::RngCore;
use tokio::task::JoinError;

use crate::db::Identity;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, thiserror::Error)]
#[error("failed to hash password: {0}")]
pub struct HashError(String);

/// Hash a plaintext password into a PHC string.
pub fn hash_password(password: &str) -> Result<String, HashError> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| HashError(e.to_string()))?;

    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| HashError(e.to_string()))?
        .to_string();
    Ok(phc)
}

/// Compare a plaintext password against an identity's stored hash.
/// Identities without a password (social sign-in) never match.
pub fn verify_password(identity: &Identity, plaintext: &str) -> bool {
    match identity.password_hash.as_deref() {
        Some(hash) => verify_hash(hash, plaintext),
        None => false,
    }
}

fn verify_hash(hash: &str, plaintext: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Stand-in hash checked when there is no real one, so a missing account
/// costs the same Argon2 run as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("lectern-dummy-password").ok());

/// Verify on the blocking pool.
///
/// An absent identity, or one without a password, is checked against a dummy
/// hash and never matches.
pub async fn verify_password_blocking(
    identity: Option<&Identity>,
    plaintext: &str,
) -> Result<bool, JoinError> {
    let hash = identity.and_then(|identity| identity.password_hash.clone());
    let plaintext = plaintext.to_string();

    tokio::task::spawn_blocking(move || match hash {
        Some(hash) => verify_hash(&hash, &plaintext),
        None => {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                verify_hash(dummy, &plaintext);
            }
            false
        }
    })
    .await
}
