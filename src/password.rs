//! Argon2id password hashing.

use std::sync::LazyLock;

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};

#[derive(Debug, thiserror::Error)]
#[error("password hashing failed: {0}")]
pub struct PasswordError(String);

/// Hash a password with a fresh random salt. Returns a PHC string.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let mut salt_bytes = [0u8; 16];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| PasswordError(e.to_string()))?;

    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError(e.to_string()))?
        .to_string();
    Ok(phc)
}

/// Check a password against a stored PHC string. An unparseable hash never matches.
pub fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("not-a-real-password").ok());

/// Build the dummy hash now so the first unknown-email login is not slower
/// than the rest.
pub fn warm_up() {
    LazyLock::force(&DUMMY_HASH);
}

/// Burn the same work as a real verification. Used when there is no user to
/// check against, so response timing does not reveal whether an email exists.
pub fn dummy_verify(password: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(hash, password);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "hunter22"));
        assert!(!verify_password(&hash, "hunter23"));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("hunter22").unwrap();
        let b = hash_password("hunter22").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_warm_up_builds_dummy_hash() {
        warm_up();
        let hash = DUMMY_HASH.as_deref().unwrap();
        assert!(verify_password(hash, "not-a-real-password"));
    }

    #[test]
    fn test_garbage_hash_never_matches() {
        assert!(!verify_password("not-a-phc-string", "anything"));
        assert!(!verify_password("", ""));
    }
}
