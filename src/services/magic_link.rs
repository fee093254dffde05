//! Passwordless sign-in by email
//!
//! A request stores the HMAC digest of a fresh token and mails the link
//! `{base_url}/api/auth/magic-link/verify?token=..&email=..`. Verifying
//! consumes the token (once), creates or verifies the user and opens a
//! session.

use crate::config::AuthConfig;
use crate::db::repositories::{
    AccountRepository, AuthLogRepository, MagicLinkRepository, SqlxAccountRepository,
    SqlxAuthLogRepository, SqlxMagicLinkRepository, SqlxUserRepository, UserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{
    normalize_email, AccountProvider, AuthEvent, AuthLog, ClientInfo, MagicLinkToken, Session, User,
};
use crate::services::email::{Mailer, OutgoingEmail};
use crate::services::token::{generate_token, hash_token, TOKEN_BYTES};
use crate::services::user::{validate_email, UserService, UserServiceError};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Error types for magic link operations
#[derive(Debug, thiserror::Error)]
pub enum MagicLinkError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Token unknown, already used or expired
    #[error("Invalid or expired sign-in link")]
    InvalidToken,

    /// The email could not be sent
    #[error("Failed to send sign-in email")]
    DeliveryFailed,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<UserServiceError> for MagicLinkError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::ValidationError(msg) => MagicLinkError::ValidationError(msg),
            UserServiceError::InternalError(e) => MagicLinkError::InternalError(e),
            other => MagicLinkError::InternalError(anyhow::anyhow!(other.to_string())),
        }
    }
}

pub struct MagicLinkService {
    magic_link_repo: Arc<dyn MagicLinkRepository>,
    user_repo: Arc<dyn UserRepository>,
    account_repo: Arc<dyn AccountRepository>,
    auth_log_repo: Arc<dyn AuthLogRepository>,
    users: Arc<UserService>,
    mailer: Arc<dyn Mailer>,
    auth: AuthConfig,
}

impl MagicLinkService {
    pub fn new(
        pool: &DynDatabasePool,
        users: Arc<UserService>,
        mailer: Arc<dyn Mailer>,
        auth: AuthConfig,
    ) -> Self {
        Self {
            magic_link_repo: SqlxMagicLinkRepository::boxed(pool.clone()),
            user_repo: SqlxUserRepository::boxed(pool.clone()),
            account_repo: SqlxAccountRepository::boxed(pool.clone()),
            auth_log_repo: SqlxAuthLogRepository::boxed(pool.clone()),
            users,
            mailer,
            auth,
        }
    }

    /// Create a sign-in token for `email` and send the link.
    ///
    /// Earlier unused tokens for the same email stop working.
    pub async fn request(&self, email: &str, client: &ClientInfo) -> Result<(), MagicLinkError> {
        let email = normalize_email(email);
        validate_email(&email)?;

        self.magic_link_repo
            .delete_unused_for_email(&email)
            .await
            .context("Failed to discard old sign-in links")?;

        let token = generate_token(TOKEN_BYTES);
        let now = Utc::now();
        self.magic_link_repo
            .create(&MagicLinkToken {
                id: 0,
                email: email.clone(),
                token_hash: hash_token(&self.auth.secret, &token)?,
                ip_address: client.ip_address.clone(),
                user_agent: client.user_agent.clone(),
                expires_at: now + Duration::minutes(self.auth.magic_link_ttl_minutes),
                used_at: None,
                created_at: now,
            })
            .await
            .context("Failed to store sign-in link")?;

        let message = self.compose(&email, &token, client);
        if let Err(e) = self.mailer.send(&message).await {
            tracing::error!("Failed to send magic link to {}: {:#}", email, e);
            let entry = AuthLog::new(&email, AuthEvent::MagicLinkRequest, false)
                .with_client(client)
                .with_reason("delivery failed");
            self.audit(entry).await;
            return Err(MagicLinkError::DeliveryFailed);
        }

        let entry = AuthLog::new(&email, AuthEvent::MagicLinkRequest, true)
            .with_client(client);
        self.audit(entry).await;
        Ok(())
    }

    /// Consume a sign-in token and open a session.
    ///
    /// Unknown emails get a new verified, passwordless user.
    pub async fn verify(
        &self,
        email: &str,
        token: &str,
        client: &ClientInfo,
    ) -> Result<(User, Session), MagicLinkError> {
        let email = normalize_email(email);
        let digest = hash_token(&self.auth.secret, token)?;
        let now = Utc::now();

        let record = self
            .magic_link_repo
            .find(&email, &digest)
            .await
            .context("Failed to look up sign-in link")?;
        let consumed = match record {
            Some(record) if record.is_usable(now) => self.magic_link_repo.consume(record.id, now).await?,
            _ => false,
        };
        if !consumed {
            let entry = AuthLog::new(&email, AuthEvent::MagicLinkVerify, false)
                .with_client(client)
                .with_reason("invalid token");
            self.audit(entry).await;
            return Err(MagicLinkError::InvalidToken);
        }

        let user = match self.user_repo.get_by_email(&email).await? {
            Some(mut user) => {
                if !user.is_verified() {
                    user.email_verified = Some(now);
                    user = self.user_repo.update(&user).await.context("Failed to verify user")?;
                }
                user
            }
            None => {
                let mut user = User::new(&email, None, None);
                user.email_verified = Some(now);
                let user = self.user_repo.create(&user).await.context("Failed to create user")?;
                tracing::info!(user_id = user.id, "Created user from magic link");
                user
            }
        };

        self.account_repo
            .link(user.id, AccountProvider::Email, &user.email)
            .await
            .context("Failed to link email account")?;

        let session = self.users.create_session(user.id).await?;
        let entry = AuthLog::new(&email, AuthEvent::MagicLinkVerify, true)
            .with_client(client);
        self.audit(entry).await;

        Ok((user, session))
    }

    /// Delete expired tokens, returning how many were removed
    pub async fn cleanup_expired(&self) -> Result<u64, MagicLinkError> {
        Ok(self
            .magic_link_repo
            .delete_expired(Utc::now())
            .await
            .context("Failed to delete expired sign-in links")?)
    }

    fn compose(&self, email: &str, token: &str, client: &ClientInfo) -> OutgoingEmail {
        let link = format!(
            "{}/api/auth/magic-link/verify?token={}&email={}",
            self.auth.base_url.trim_end_matches('/'),
            token,
            urlencoding::encode(email)
        );

        let body = format!(
            "Sign in to CleanTabs by opening this link:\n\n{}\n\n\
             The link expires in {} minutes and can be used once.\n\n\
             Requested from IP {} using {}.\n\
             If you did not request this, you can ignore this email.\n",
            link,
            self.auth.magic_link_ttl_minutes,
            client.ip_address.as_deref().unwrap_or("unknown"),
            client.user_agent.as_deref().unwrap_or("an unknown browser"),
        );

        OutgoingEmail {
            to: email.to_string(),
            subject: "Your CleanTabs sign-in link".to_string(),
            body,
        }
    }

    async fn audit(&self, entry: AuthLog) {
        if let Err(e) = self.auth_log_repo.record(&entry).await {
            tracing::warn!("Failed to record auth event {}: {:#}", entry.event.as_str(), e);
        }
    }
}
