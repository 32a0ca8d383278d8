use pbkdf2::pbkdf2;
use rand::RngCore;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::HmacSha256;

/// Reasons a password fails the strength policy
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password must be at least 8 characters long")]
    TooShort,
    #[error("password must contain an uppercase letter")]
    NoUppercase,
    #[error("password must contain a lowercase letter")]
    NoLowercase,
    #[error("password must contain a number")]
    NoNumber,
    #[error("password must contain a special character")]
    NoSpecialChar,
}

/// Function to validate password strength
pub fn validate_password(password: &str) -> Result<(), PasswordError> {
    if password.chars().count() < 8 {
        return Err(PasswordError::TooShort);
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(PasswordError::NoUppercase);
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(PasswordError::NoLowercase);
    }
    if !password.chars().any(|c| c.is_numeric()) {
        return Err(PasswordError::NoNumber);
    }
    if !password
        .chars()
        .any(|c| "!@#$%^&*()_+-=[]{}|;:,.<>?".contains(c))
    {
        return Err(PasswordError::NoSpecialChar);
    }
    Ok(())
}

/// Generate a random 16-byte salt for PBKDF2
pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a hex-encoded 32-byte PBKDF2-HMAC-SHA256 hash of the password
pub fn hash_password(password: &str, salt: &[u8], iterations: u32) -> String {
    let mut key = vec![0u8; 32];
    pbkdf2::<HmacSha256>(password.as_bytes(), salt, iterations.max(1), &mut key);
    hex::encode(key)
}

/// Check a password against a stored hash in constant time
pub fn verify_password(password: &str, salt: &[u8], iterations: u32, stored_hash: &str) -> bool {
    let candidate = hash_password(password, salt, iterations);
    candidate.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

/// Helper function to read a password securely
pub fn read_password() -> std::io::Result<String> {
    rpassword::read_password()
}
