//! Registration, login and email verification workflows.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::token::{TokenCodec, TokenError};
use super::{
    codes_match, generate_verification_code, hash_password, validate_email, validate_password,
    validate_username, verify_absent_account, verify_password,
};
use crate::db::{DbPool, User};
use crate::notifications::SystemEmailService;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{message}")]
    Validation { field: &'static str, message: String },
    #[error("User with such login already exists")]
    UsernameTaken,
    /// Same message whether the user is missing or the password is wrong
    #[error("Incorrect login or password")]
    InvalidCredentials,
    #[error("Invalid token: missing email claim")]
    MissingEmailClaim,
    #[error("Invalid or expired code")]
    InvalidCode,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("Failed to hash password: {0}")]
    Hashing(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// A user together with a freshly signed session token
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user: User,
    pub token: String,
}

#[derive(Clone)]
pub struct AuthService {
    db: DbPool,
    tokens: TokenCodec,
    email: Arc<SystemEmailService>,
}

impl AuthService {
    pub fn new(db: DbPool, tokens: TokenCodec, email: Arc<SystemEmailService>) -> Self {
        Self { db, tokens, email }
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    /// Create an unverified account and email it a verification code.
    ///
    /// The first account in an empty store becomes `admin`. The role is
    /// decided inside the INSERT so two concurrent first registrations cannot
    /// both become admin, and the UNIQUE index on `username` is what finally
    /// guarantees uniqueness.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<IssuedSession, AuthError> {
        let email = email.trim();
        let username = username.trim();

        validate_email(email).map_err(|message| AuthError::Validation { field: "email", message })?;
        validate_username(username)
            .map_err(|message| AuthError::Validation { field: "username", message })?;
        validate_password(password)
            .map_err(|message| AuthError::Validation { field: "password", message })?;

        info!(username = %username, "Attempt to register user");

        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.db)
            .await?;
        if existing.is_some() {
            warn!(username = %username, "Registration failed: username already exists");
            return Err(AuthError::UsernameTaken);
        }

        let password_hash =
            hash_password(password).map_err(|e| AuthError::Hashing(e.to_string()))?;
        let code = generate_verification_code();
        let id = Uuid::new_v4().to_string();

        let user: User = sqlx::query_as(
            r#"
            INSERT INTO users (id, email, username, password_hash, role, verified, verification_code)
            VALUES (?, ?, ?, ?, CASE WHEN EXISTS (SELECT 1 FROM users) THEN 'user' ELSE 'admin' END, 0, ?)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(email)
        .bind(username)
        .bind(&password_hash)
        .bind(&code)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AuthError::UsernameTaken
            }
            _ => AuthError::Database(e),
        })?;

        // Sent out-of-band; delivery failures are only logged
        let mailer = self.email.clone();
        let to = user.email.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send_verification_code(&to, &code).await {
                warn!(to = %to, error = %e, "Failed to send verification email");
            }
        });

        let token = self.tokens.issue(&user)?;

        info!(username = %user.username, role = %user.role, "User registered, verification pending");

        Ok(IssuedSession { user, token })
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedSession, AuthError> {
        let username = username.trim();
        info!(username = %username, "Attempt to login user");

        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.db)
            .await?;

        let verified = match user {
            Some(user) => verify_password(password, &user.password_hash).then_some(user),
            None => {
                verify_absent_account(password);
                None
            }
        };
        let Some(user) = verified else {
            warn!(username = %username, "Login failed: incorrect login or password");
            return Err(AuthError::InvalidCredentials);
        };

        let token = self.tokens.issue(&user)?;

        info!(username = %user.username, "User logged in");

        Ok(IssuedSession { user, token })
    }

    /// Confirm account ownership with the emailed code.
    ///
    /// The code is single-use: the UPDATE only matches while the stored code
    /// is still the one that was checked, and clears it.
    pub async fn verify_email(
        &self,
        token: Option<&str>,
        code: &str,
    ) -> Result<IssuedSession, AuthError> {
        let claims = self.tokens.verify(token)?;

        if claims.email.is_empty() {
            return Err(AuthError::MissingEmailClaim);
        }

        let user: Option<User> =
            sqlx::query_as("SELECT * FROM users WHERE email = ? AND username = ?")
                .bind(&claims.email)
                .bind(&claims.username)
                .fetch_optional(&self.db)
                .await?;

        let user = user.ok_or(AuthError::InvalidCode)?;
        let stored = user.verification_code.clone().unwrap_or_default();

        if !codes_match(&stored, code.trim()) {
            warn!(email = %claims.email, "Verification failed: invalid code");
            return Err(AuthError::InvalidCode);
        }

        let result = sqlx::query(
            "UPDATE users SET verified = 1, verification_code = NULL WHERE id = ? AND verification_code = ?",
        )
        .bind(&user.id)
        .bind(&stored)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::InvalidCode);
        }

        let user = User {
            verified: true,
            verification_code: None,
            ..user
        };
        let token = self.tokens.issue(&user)?;

        info!(username = %user.username, "User verified");

        Ok(IssuedSession { user, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmailConfig;
    use crate::db::{self, Role};

    async fn service() -> AuthService {
        let pool = db::init_memory().await.unwrap();
        AuthService::new(
            pool,
            TokenCodec::new("service-test-secret", 3600, "storefront", "storefront"),
            Arc::new(SystemEmailService::new(EmailConfig::default())),
        )
    }

    async fn stored_code(service: &AuthService, username: &str) -> Option<String> {
        sqlx::query_scalar("SELECT verification_code FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&service.db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_registrant_is_admin_then_users() {
        let service = service().await;

        let first = service.register("a@example.com", "alice", "password-1").await.unwrap();
        let second = service.register("b@example.com", "bob", "password-2").await.unwrap();
        let third = service.register("c@example.com", "carol", "password-3").await.unwrap();

        assert_eq!(first.user.role_enum(), Role::Admin);
        assert_eq!(second.user.role_enum(), Role::User);
        assert_eq!(third.user.role_enum(), Role::User);
        assert!(!first.user.verified);
    }

    #[tokio::test]
    async fn test_plaintext_password_is_not_stored() {
        let service = service().await;
        service.register("a@example.com", "alice", "hunter2-hunter2").await.unwrap();

        let hash: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE username = 'alice'")
            .fetch_one(&service.db)
            .await
            .unwrap();

        assert!(!hash.contains("hunter2"));
        assert!(verify_password("hunter2-hunter2", &hash));
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let service = service().await;
        service.register("a@example.com", "alice", "password-1").await.unwrap();

        let err = service
            .register("other@example.com", "alice", "password-2")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UsernameTaken));
    }

    #[tokio::test]
    async fn test_invalid_registration_input() {
        let service = service().await;
        let err = service.register("not-an-email", "alice", "password-1").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation { field: "email", .. }));

        let err = service.register("a@example.com", "alice", "short").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation { field: "password", .. }));
    }

    #[tokio::test]
    async fn test_registration_token_is_unverified() {
        let service = service().await;
        let session = service.register("a@example.com", "alice", "password-1").await.unwrap();

        let claims = service.tokens().verify(Some(&session.token)).unwrap();
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.email, "a@example.com");
        assert!(!claims.verified);
    }

    #[tokio::test]
    async fn test_login_success_and_generic_failures() {
        let service = service().await;
        service.register("a@example.com", "alice", "password-1").await.unwrap();

        let session = service.login("alice", "password-1").await.unwrap();
        assert_eq!(session.user.username, "alice");

        let wrong_password = service.login("alice", "password-2").await.unwrap_err();
        let unknown_user = service.login("mallory", "password-1").await.unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_user, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_unknown_username_costs_a_password_check() {
        let service = service().await;
        service.register("a@example.com", "alice", "password-1").await.unwrap();
        // Warm the placeholder hash so only the verification is timed
        let _ = service.login("nobody", "password-1").await;

        let started = std::time::Instant::now();
        let _ = service.login("alice", "password-2").await.unwrap_err();
        let known = started.elapsed();

        let started = std::time::Instant::now();
        let err = service.login("mallory", "password-2").await.unwrap_err();
        let unknown = started.elapsed();

        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(
            unknown * 4 >= known,
            "unknown user answered in {:?}, known user in {:?}",
            unknown,
            known
        );
    }

    #[tokio::test]
    async fn test_verification_is_single_use() {
        let service = service().await;
        let session = service.register("a@example.com", "alice", "password-1").await.unwrap();
        let code = stored_code(&service, "alice").await.unwrap();

        let verified = service.verify_email(Some(&session.token), &code).await.unwrap();
        assert!(verified.user.verified);
        assert!(service.tokens().verify(Some(&verified.token)).unwrap().verified);
        assert_eq!(stored_code(&service, "alice").await, None);

        let again = service.verify_email(Some(&session.token), &code).await.unwrap_err();
        assert!(matches!(again, AuthError::InvalidCode));
    }

    #[tokio::test]
    async fn test_verification_rejects_wrong_code() {
        let service = service().await;
        let session = service.register("a@example.com", "alice", "password-1").await.unwrap();
        let code = stored_code(&service, "alice").await.unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        let err = service.verify_email(Some(&session.token), wrong).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCode));
        assert_eq!(stored_code(&service, "alice").await, Some(code));
    }

    #[tokio::test]
    async fn test_verification_requires_token() {
        let service = service().await;
        let err = service.verify_email(None, "123456").await.unwrap_err();
        assert!(matches!(err, AuthError::Token(TokenError::NotFound)));

        let err = service.verify_email(Some("garbage"), "123456").await.unwrap_err();
        assert!(matches!(err, AuthError::Token(TokenError::Invalid)));
    }
}
