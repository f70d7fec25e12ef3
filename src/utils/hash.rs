// src/utils/hash.rs

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use crate::error::AppError;

/// Hashes a clear-text password with Argon2 and a random salt.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Checks `password` against a stored PHC hash string.
/// A mismatch is `Ok(false)`; only a malformed stored hash is an error.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies_only_with_the_original() {
        let hash = hash_password("Secret123").unwrap();
        assert_ne!(hash, "Secret123");
        assert!(verify_password("Secret123", &hash).unwrap());
        assert!(!verify_password("secret123", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("Secret123", "not-a-phc-string").is_err());
    }
}
