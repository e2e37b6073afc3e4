//! Accounts and sessions: password hashing, verification codes, session
//! tokens and the registration/login/verification workflows.

pub mod service;
pub mod token;

pub use service::{AuthError, AuthService, IssuedSession};
pub use token::{Claims, TokenCodec, TokenError, SESSION_COOKIE};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use subtle::ConstantTimeEq;

lazy_static! {
    /// Loose email shape check; deliverability is proven by the verification code
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^@\s]+@[^@\s]+\.[^@\s]+$"
    ).unwrap();

    /// Usernames: letters, digits, dot, dash and underscore
    static ref USERNAME_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._-]+$"
    ).unwrap();

    /// Verified against when no account matches a login name, so unknown and
    /// known usernames each cost one argon2 run
    static ref ABSENT_ACCOUNT_HASH: String =
        hash_password("absent-account-placeholder").unwrap_or_default();
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Spend the same argon2 work as a real check for a login name that has no
/// account. The outcome is discarded.
pub fn verify_absent_account(password: &str) {
    let _ = verify_password(password, &ABSENT_ACCOUNT_HASH);
}

/// Six-digit, zero-padded numeric code
pub fn generate_verification_code() -> String {
    let code: u32 = rand::rng().random_range(0..1_000_000);
    format!("{:06}", code)
}

/// Compare a submitted code with the stored one in constant time.
/// An empty stored code (already used) never matches.
pub fn codes_match(stored: &str, submitted: &str) -> bool {
    !stored.is_empty()
        && stored.len() == submitted.len()
        && bool::from(stored.as_bytes().ct_eq(submitted.as_bytes()))
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required".to_string());
    }
    if username.len() < 3 {
        return Err("Username is too short (min 3 characters)".to_string());
    }
    if username.len() > 64 {
        return Err("Username is too long (max 64 characters)".to_string());
    }
    if !USERNAME_REGEX.is_match(username) {
        return Err("Username may only contain letters, digits, '.', '-' and '_'".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    if password.len() > 1024 {
        return Err("Password is too long".to_string());
    }
    Ok(())
}
