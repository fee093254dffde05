//! User service
//!
//! Business logic for accounts and sessions:
//! - Registration and password login
//! - Session creation, validation and logout
//! - Password reset and change, profile updates
//! - Maintenance operations used by `cleantabs-admin`

use crate::config::AuthConfig;
use crate::db::repositories::{
    AccountRepository, AuthLogRepository, SessionRepository, SqlxAccountRepository,
    SqlxAuthLogRepository, SqlxSessionRepository, SqlxUserRepository, UserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{
    normalize_email, AccountProvider, AuthEvent, AuthLog, ClientInfo, Plan, Session, User,
};
use crate::services::password::{hash_password, verify_password};
use crate::services::token::{constant_time_eq, generate_token, hash_token, TOKEN_BYTES};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// User already exists
    #[error("User already exists: {0}")]
    UserExists(String),

    /// No user with the given email
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for user registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

impl RegisterInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Input for password login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    account_repo: Arc<dyn AccountRepository>,
    session_repo: Arc<dyn SessionRepository>,
    auth_log_repo: Arc<dyn AuthLogRepository>,
    auth: AuthConfig,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        account_repo: Arc<dyn AccountRepository>,
        session_repo: Arc<dyn SessionRepository>,
        auth_log_repo: Arc<dyn AuthLogRepository>,
        auth: AuthConfig,
    ) -> Self {
        Self {
            user_repo,
            account_repo,
            session_repo,
            auth_log_repo,
            auth,
        }
    }

    /// Build the service with the SQL repositories on `pool`
    pub fn from_pool(pool: &DynDatabasePool, auth: AuthConfig) -> Self {
        Self::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxAccountRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            SqlxAuthLogRepository::boxed(pool.clone()),
            auth,
        )
    }

    pub fn auth_config(&self) -> &AuthConfig {
        &self.auth
    }

    /// Whether `user` may use the admin endpoints
    pub fn is_admin(&self, user: &User) -> bool {
        self.auth.is_admin_email(&user.email)
    }

    /// Register a credentials user.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a malformed email or a short password
    /// - `UserExists` if the email is already registered
    pub async fn register(
        &self,
        input: RegisterInput,
        client: &ClientInfo,
    ) -> Result<User, UserServiceError> {
        let email = normalize_email(&input.email);
        validate_email(&email)?;
        self.validate_password(&input.password)?;

        if self.user_repo.get_by_email(&email).await?.is_some() {
            let entry = AuthLog::new(&email, AuthEvent::Register, false)
                .with_client(client)
                .with_reason("email taken");
            self.audit(entry).await;
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let name = input.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let user = self
            .user_repo
            .create(&User::new(&email, Some(password_hash), name))
            .await
            .context("Failed to create user")?;

        self.account_repo
            .link(user.id, AccountProvider::Credentials, &user.email)
            .await
            .context("Failed to link credentials account")?;

        let entry = AuthLog::new(&email, AuthEvent::Register, true)
            .with_client(client);
        self.audit(entry).await;
        tracing::info!(user_id = user.id, "Registered new user");

        Ok(user)
    }

    /// Check credentials and open a session.
    ///
    /// Unknown emails, passwordless users and wrong passwords all produce the
    /// same `AuthenticationError`.
    pub async fn login(
        &self,
        input: LoginInput,
        client: &ClientInfo,
    ) -> Result<(User, Session), UserServiceError> {
        let email = normalize_email(&input.email);
        let invalid = || UserServiceError::AuthenticationError("Invalid email or password".to_string());

        let Some(user) = self.user_repo.get_by_email(&email).await? else {
            let entry = AuthLog::new(&email, AuthEvent::Login, false)
                .with_client(client)
                .with_reason("unknown email");
            self.audit(entry).await;
            return Err(invalid());
        };

        let valid = match user.password_hash.as_deref().filter(|h| !h.is_empty()) {
            Some(hash) => verify_password(&input.password, hash).context("Failed to verify password")?,
            None => false,
        };
        if !valid {
            let reason = if user.has_password() { "invalid password" } else { "no password set" };
            let entry = AuthLog::new(&email, AuthEvent::Login, false)
                .with_client(client)
                .with_reason(reason);
            self.audit(entry).await;
            return Err(invalid());
        }

        let session = self.create_session(user.id).await?;
        let entry = AuthLog::new(&email, AuthEvent::Login, true)
            .with_client(client);
        self.audit(entry).await;

        Ok((user, session))
    }

    /// Delete a session. Unknown tokens are not an error.
    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        if let Some(session) = self.session_repo.get_by_id(token).await? {
            if let Some(user) = self.user_repo.get_by_id(session.user_id).await? {
                self.audit(AuthLog::new(&user.email, AuthEvent::Logout, true)).await;
            }
        }

        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Open a new session for `user_id`
    pub async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let session = Session::new(generate_token(TOKEN_BYTES), user_id, self.auth.session_days);
        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(created)
    }

    /// Resolve a session token to its user.
    ///
    /// A user is returned only when the session exists and is unexpired, and
    /// its user still exists with a non-empty email. Any other session row is
    /// deleted, signing the client out.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        else {
            return Ok(None);
        };

        let user = if session.is_expired() {
            None
        } else {
            self.user_repo
                .get_by_id(session.user_id)
                .await
                .context("Failed to get user")?
                .filter(|user| !user.email.trim().is_empty())
        };

        if user.is_none() {
            tracing::debug!(user_id = session.user_id, "Dropping invalid session");
            self.session_repo
                .delete(token)
                .await
                .context("Failed to delete invalid session")?;
        }

        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self.user_repo.get_by_id(id).await.context("Failed to get user by ID")?)
    }

    /// Issue a password reset token for `email`.
    ///
    /// Returns the plaintext token, or `None` when no such user exists.
    /// Only the token digest is stored.
    pub async fn request_password_reset(&self, email: &str) -> Result<Option<String>, UserServiceError> {
        let email = normalize_email(email);
        let Some(mut user) = self.user_repo.get_by_email(&email).await? else {
            return Ok(None);
        };

        let token = generate_token(TOKEN_BYTES);
        user.reset_token_hash = Some(hash_token(&self.auth.secret, &token)?);
        user.reset_token_expires =
            Some(Utc::now() + Duration::minutes(self.auth.password_reset_ttl_minutes));
        self.user_repo
            .update(&user)
            .await
            .context("Failed to store reset token")?;

        Ok(Some(token))
    }

    /// Set a new password using a reset token. Every session of the user is
    /// revoked.
    pub async fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> Result<(), UserServiceError> {
        let email = normalize_email(email);
        let invalid = || UserServiceError::ValidationError("Invalid or expired reset token".to_string());

        let Some(mut user) = self.user_repo.get_by_email(&email).await? else {
            return Err(invalid());
        };

        let digest = hash_token(&self.auth.secret, token)?;
        let token_ok = match (&user.reset_token_hash, user.reset_token_expires) {
            (Some(stored), Some(expires)) => expires > Utc::now() && constant_time_eq(stored, &digest),
            _ => false,
        };
        if !token_ok {
            let entry = AuthLog::new(&email, AuthEvent::PasswordReset, false)
                .with_reason("bad token");
            self.audit(entry).await;
            return Err(invalid());
        }

        self.validate_password(new_password)?;
        user.password_hash = Some(hash_password(new_password).context("Failed to hash password")?);
        user.reset_token_hash = None;
        user.reset_token_expires = None;
        let user = self.user_repo.update(&user).await.context("Failed to update user")?;

        self.account_repo
            .link(user.id, AccountProvider::Credentials, &user.email)
            .await
            .context("Failed to link credentials account")?;
        let revoked = self.session_repo.delete_by_user(user.id).await?;
        tracing::info!(user_id = user.id, revoked, "Password reset");

        self.audit(AuthLog::new(&email, AuthEvent::PasswordReset, true)).await;
        Ok(())
    }

    /// Change the password of a signed-in user. Users without a password
    /// (magic-link only) may set one without supplying `current`.
    pub async fn change_password(
        &self,
        user: &User,
        current: Option<&str>,
        new_password: &str,
    ) -> Result<(), UserServiceError> {
        if let Some(hash) = user.password_hash.as_deref().filter(|h| !h.is_empty()) {
            let ok = match current {
                Some(current) => verify_password(current, hash).context("Failed to verify password")?,
                None => false,
            };
            if !ok {
                let entry = AuthLog::new(&user.email, AuthEvent::PasswordChange, false)
                    .with_reason("current password mismatch");
                self.audit(entry).await;
                return Err(UserServiceError::AuthenticationError(
                    "Current password is incorrect".to_string(),
                ));
            }
        }

        self.validate_password(new_password)?;
        let mut updated = user.clone();
        updated.password_hash = Some(hash_password(new_password).context("Failed to hash password")?);
        self.user_repo.update(&updated).await.context("Failed to update user")?;
        self.account_repo
            .link(user.id, AccountProvider::Credentials, &user.email)
            .await
            .context("Failed to link credentials account")?;

        self.audit(AuthLog::new(&user.email, AuthEvent::PasswordChange, true)).await;
        Ok(())
    }

    /// Update the display name; blank clears it
    pub async fn update_profile(&self, user: &User, name: Option<String>) -> Result<User, UserServiceError> {
        let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        if name.as_ref().is_some_and(|n| n.chars().count() > 100) {
            return Err(UserServiceError::ValidationError(
                "Name cannot exceed 100 characters".to_string(),
            ));
        }

        let mut updated = user.clone();
        updated.name = name;
        Ok(self.user_repo.update(&updated).await.context("Failed to update user")?)
    }

    // ========================================================================
    // Maintenance operations
    // ========================================================================

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_email(&normalize_email(email))
            .await
            .context("Failed to get user by email")?)
    }

    /// Create a verified credentials user directly, bypassing registration
    pub async fn create_user_direct(
        &self,
        email: &str,
        password: &str,
        name: Option<String>,
        plan: Plan,
    ) -> Result<User, UserServiceError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        self.validate_password(password)?;
        if self.user_repo.get_by_email(&email).await?.is_some() {
            return Err(UserServiceError::UserExists(email));
        }

        let mut user = User::new(&email, Some(hash_password(password)?), name);
        user.plan = plan;
        user.email_verified = Some(Utc::now());
        let user = self.user_repo.create(&user).await.context("Failed to create user")?;
        self.account_repo
            .link(user.id, AccountProvider::Credentials, &user.email)
            .await
            .context("Failed to link credentials account")?;

        Ok(user)
    }

    /// Overwrite a user's password and revoke their sessions
    pub async fn set_password(&self, email: &str, password: &str) -> Result<User, UserServiceError> {
        self.validate_password(password)?;
        let mut user = self.require_user(email).await?;
        user.password_hash = Some(hash_password(password)?);
        user.reset_token_hash = None;
        user.reset_token_expires = None;
        let user = self.user_repo.update(&user).await.context("Failed to update user")?;

        self.account_repo
            .link(user.id, AccountProvider::Credentials, &user.email)
            .await
            .context("Failed to link credentials account")?;
        self.session_repo.delete_by_user(user.id).await?;
        Ok(user)
    }

    /// Repair a user record: normalize the email, mark it verified, drop any
    /// pending reset token and make sure a password user has a credentials
    /// account.
    pub async fn fix_user(&self, email: &str) -> Result<User, UserServiceError> {
        let mut user = self.require_user(email).await?;
        user.email = normalize_email(&user.email);
        if user.email_verified.is_none() {
            user.email_verified = Some(Utc::now());
        }
        user.reset_token_hash = None;
        user.reset_token_expires = None;
        let user = self.user_repo.update(&user).await.context("Failed to update user")?;

        if user.has_password() {
            self.account_repo
                .link(user.id, AccountProvider::Credentials, &user.email)
                .await
                .context("Failed to link credentials account")?;
        }
        Ok(user)
    }

    /// Delete a user and everything they own
    pub async fn delete_user(&self, email: &str) -> Result<(), UserServiceError> {
        let user = self.require_user(email).await?;
        self.user_repo.delete(user.id).await.context("Failed to delete user")?;
        tracing::info!(user_id = user.id, "Deleted user");
        Ok(())
    }

    pub async fn list_users(&self, page: i64, per_page: i64) -> Result<(Vec<User>, i64), UserServiceError> {
        Ok(self.user_repo.list(page, per_page).await?)
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    async fn require_user(&self, email: &str) -> Result<User, UserServiceError> {
        self.find_by_email(email)
            .await?
            .ok_or_else(|| UserServiceError::UserNotFound(normalize_email(email)))
    }

    fn validate_password(&self, password: &str) -> Result<(), UserServiceError> {
        if password.chars().count() < self.auth.min_password_length {
            return Err(UserServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                self.auth.min_password_length
            )));
        }
        Ok(())
    }

    /// Audit log writes never fail the request
    async fn audit(&self, entry: AuthLog) {
        if let Err(e) = self.auth_log_repo.record(&entry).await {
            tracing::warn!("Failed to record auth event {}: {:#}", entry.event.as_str(), e);
        }
    }
}

/// Minimal email sanity check: non-empty, one `@` with text on both sides
pub fn validate_email(email: &str) -> Result<(), UserServiceError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(UserServiceError::ValidationError("Email cannot be empty".to_string()));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => Ok(()),
        _ => Err(UserServiceError::ValidationError("Invalid email format".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_service() -> (DynDatabasePool, UserService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let service = UserService::from_pool(&pool, AuthConfig::default());
        (pool, service)
    }

    async fn register(service: &UserService, email: &str) -> User {
        service
            .register(RegisterInput::new(email, "password123"), &ClientInfo::default())
            .await
            .expect("Failed to register")
    }

    // ========================================================================
    // Registration and login
    // ========================================================================

    #[tokio::test]
    async fn test_register_normalizes_email_and_links_account() {
        let (pool, service) = setup_test_service().await;

        let user = service
            .register(
                RegisterInput::new("  Alice@Example.COM ", "password123").with_name("Alice"),
                &ClientInfo::default(),
            )
            .await
            .unwrap();

        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.name.as_deref(), Some("Alice"));
        assert_eq!(user.plan, Plan::Free);

        let accounts = SqlxAccountRepository::new(pool).list_by_user(user.id).await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].provider, AccountProvider::Credentials);
    }

    #[tokio::test]
    async fn test_register_duplicate_email_fails() {
        let (_pool, service) = setup_test_service().await;
        register(&service, "dup@example.com").await;

        let result = service
            .register(RegisterInput::new("DUP@example.com", "password123"), &ClientInfo::default())
            .await;
        assert!(matches!(result, Err(UserServiceError::UserExists(_))));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (_pool, service) = setup_test_service().await;
        let client = ClientInfo::default();

        for (email, password) in [("", "password123"), ("no-at-sign", "password123"), ("a@b.c", "short")] {
            let result = service.register(RegisterInput::new(email, password), &client).await;
            assert!(
                matches!(result, Err(UserServiceError::ValidationError(_))),
                "{email:?} / {password:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_password_is_stored_hashed() {
        let (_pool, service) = setup_test_service().await;
        let user = register(&service, "hash@example.com").await;

        let stored = service.get_by_id(user.id).await.unwrap().unwrap();
        let hash = stored.password_hash.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("password123"));
    }

    #[tokio::test]
    async fn test_login_roundtrip() {
        let (_pool, service) = setup_test_service().await;
        let user = register(&service, "login@example.com").await;

        let (logged_in, session) = service
            .login(LoginInput::new("LOGIN@example.com", "password123"), &ClientInfo::default())
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);
        assert_eq!(session.id.len(), TOKEN_BYTES * 2);

        let validated = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(validated.id, user.id);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (pool, service) = setup_test_service().await;
        register(&service, "known@example.com").await;
        let client = ClientInfo::default();

        let wrong = service.login(LoginInput::new("known@example.com", "nope-nope"), &client).await;
        let unknown = service.login(LoginInput::new("ghost@example.com", "password123"), &client).await;

        match (wrong, unknown) {
            (
                Err(UserServiceError::AuthenticationError(a)),
                Err(UserServiceError::AuthenticationError(b)),
            ) => assert_eq!(a, b),
            other => panic!("unexpected results: {:?}", other),
        }

        let logs = SqlxAuthLogRepository::new(pool);
        assert_eq!(logs.count_for_email("known@example.com").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_passwordless_user_cannot_password_login() {
        let (pool, service) = setup_test_service().await;
        SqlxUserRepository::new(pool)
            .create(&User::new("magic@example.com", None, None))
            .await
            .unwrap();

        let result = service
            .login(LoginInput::new("magic@example.com", ""), &ClientInfo::default())
            .await;
        assert!(matches!(result, Err(UserServiceError::AuthenticationError(_))));
    }

    // ========================================================================
    // Session validity
    // ========================================================================

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let (_pool, service) = setup_test_service().await;
        let user = register(&service, "out@example.com").await;
        let session = service.create_session(user.id).await.unwrap();

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());

        // Logging out twice is fine
        service.logout(&session.id).await.unwrap();
        service.logout("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected_and_deleted() {
        let (pool, service) = setup_test_service().await;
        let user = register(&service, "old@example.com").await;
        let sessions = SqlxSessionRepository::new(pool);
        sessions
            .create(&Session::new("expired-token".to_string(), user.id, -1))
            .await
            .unwrap();

        assert!(service.validate_session("expired-token").await.unwrap().is_none());
        assert!(sessions.get_by_id("expired-token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_with_empty_email_is_rejected_and_deleted() {
        let (pool, service) = setup_test_service().await;
        let mut user = register(&service, "blank@example.com").await;
        let session = service.create_session(user.id).await.unwrap();

        user.email = String::new();
        SqlxUserRepository::new(pool.clone()).update(&user).await.unwrap();

        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        let sessions = SqlxSessionRepository::new(pool);
        assert!(sessions.get_by_id(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_of_deleted_user_is_rejected() {
        let (_pool, service) = setup_test_service().await;
        let user = register(&service, "gone@example.com").await;
        let session = service.create_session(user.id).await.unwrap();

        service.delete_user("gone@example.com").await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_expired_sessions() {
        let (pool, service) = setup_test_service().await;
        let user = register(&service, "clean@example.com").await;
        let sessions = SqlxSessionRepository::new(pool);
        sessions.create(&Session::new("a".to_string(), user.id, -2)).await.unwrap();
        sessions.create(&Session::new("b".to_string(), user.id, -1)).await.unwrap();
        let live = service.create_session(user.id).await.unwrap();

        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 2);
        assert!(service.validate_session(&live.id).await.unwrap().is_some());
    }

    // ========================================================================
    // Passwords
    // ========================================================================

    #[tokio::test]
    async fn test_password_reset_flow() {
        let (_pool, service) = setup_test_service().await;
        let user = register(&service, "reset@example.com").await;
        let session = service.create_session(user.id).await.unwrap();

        let token = service
            .request_password_reset("Reset@example.com")
            .await
            .unwrap()
            .expect("token for known user");

        let stored = service.get_by_id(user.id).await.unwrap().unwrap();
        assert_ne!(stored.reset_token_hash.as_deref(), Some(token.as_str()));

        let wrong = service.reset_password("reset@example.com", "bad-token", "newpassword1").await;
        assert!(matches!(wrong, Err(UserServiceError::ValidationError(_))));

        service
            .reset_password("reset@example.com", &token, "newpassword1")
            .await
            .unwrap();

        // Sessions revoked, token single-use, new password works
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        assert!(service
            .reset_password("reset@example.com", &token, "another-pass")
            .await
            .is_err());
        assert!(service
            .login(LoginInput::new("reset@example.com", "newpassword1"), &ClientInfo::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_password_reset_unknown_email() {
        let (_pool, service) = setup_test_service().await;
        assert!(service.request_password_reset("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_reset_token_is_rejected() {
        let (pool, service) = setup_test_service().await;
        register(&service, "late@example.com").await;
        let token = service.request_password_reset("late@example.com").await.unwrap().unwrap();

        let repo = SqlxUserRepository::new(pool);
        let mut user = repo.get_by_email("late@example.com").await.unwrap().unwrap();
        user.reset_token_expires = Some(Utc::now() - Duration::minutes(1));
        repo.update(&user).await.unwrap();

        let result = service.reset_password("late@example.com", &token, "newpassword1").await;
        assert!(matches!(result, Err(UserServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_change_password() {
        let (_pool, service) = setup_test_service().await;
        let user = register(&service, "change@example.com").await;

        let wrong = service.change_password(&user, Some("not-it"), "newpassword1").await;
        assert!(matches!(wrong, Err(UserServiceError::AuthenticationError(_))));

        service
            .change_password(&user, Some("password123"), "newpassword1")
            .await
            .unwrap();
        assert!(service
            .login(LoginInput::new("change@example.com", "newpassword1"), &ClientInfo::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_update_profile() {
        let (_pool, service) = setup_test_service().await;
        let user = register(&service, "name@example.com").await;

        let updated = service.update_profile(&user, Some("  Nina ".to_string())).await.unwrap();
        assert_eq!(updated.name.as_deref(), Some("Nina"));

        let cleared = service.update_profile(&updated, Some("   ".to_string())).await.unwrap();
        assert!(cleared.name.is_none());
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    #[tokio::test]
    async fn test_create_user_direct_and_fix_user() {
        let (pool, service) = setup_test_service().await;

        let user = service
            .create_user_direct("Ops@Example.com", "password123", None, Plan::Pro)
            .await
            .unwrap();
        assert_eq!(user.email, "ops@example.com");
        assert_eq!(user.plan, Plan::Pro);
        assert!(user.is_verified());

        let raw = SqlxUserRepository::new(pool.clone());
        let mut broken = User::new("fixme@example.com", Some(hash_password("password123").unwrap()), None);
        broken.reset_token_hash = Some("stale".to_string());
        let broken = raw.create(&broken).await.unwrap();

        let fixed = service.fix_user("FIXME@example.com").await.unwrap();
        assert_eq!(fixed.id, broken.id);
        assert!(fixed.is_verified());
        assert!(fixed.reset_token_hash.is_none());

        let accounts = SqlxAccountRepository::new(pool);
        assert!(accounts.has_provider(fixed.id, AccountProvider::Credentials).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_password_and_delete_user() {
        let (_pool, service) = setup_test_service().await;
        register(&service, "ops@example.com").await;

        service.set_password("ops@example.com", "brand-new-pass").await.unwrap();
        assert!(service
            .login(LoginInput::new("ops@example.com", "brand-new-pass"), &ClientInfo::default())
            .await
            .is_ok());

        service.delete_user("ops@example.com").await.unwrap();
        assert!(service.find_by_email("ops@example.com").await.unwrap().is_none());
        assert!(matches!(
            service.delete_user("ops@example.com").await,
            Err(UserServiceError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_is_admin_uses_config() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let auth = AuthConfig {
            admin_emails: vec!["Boss@Example.com".to_string()],
            ..Default::default()
        };
        let service = UserService::from_pool(&pool, auth);

        let boss = register(&service, "boss@example.com").await;
        let other = register(&service, "staff@example.com").await;
        assert!(service.is_admin(&boss));
        assert!(!service.is_admin(&other));
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@b").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("@b").is_err());
        assert!(validate_email("a@").is_err());
        assert!(validate_email("a@b@c").is_err());
    }
}
