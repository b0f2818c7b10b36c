//! Credential hashing
//!
//! Argon2id via the `password-hash` PHC string format, so the salt and
//! parameters travel inside the stored hash and verification needs no
//! extra bookkeeping on the user document.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::RootlineError;

/// Hash a registration or reset password into a PHC string.
pub fn hash_password(password: &str) -> Result<String, RootlineError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| RootlineError::Auth(format!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// Check a login attempt against the stored hash. A malformed stored hash
/// is an error; a mismatch is just `false`.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, RootlineError> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| RootlineError::Auth(format!("stored password hash is malformed: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
