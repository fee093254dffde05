//! Authentication records: magic-link tokens, admin API keys and the
//! audit log. Only HMAC digests of secrets are ever stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pending or consumed magic-link sign-in token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagicLinkToken {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MagicLinkToken {
    /// Unused and not yet expired
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}

/// Admin API key (the plaintext key is shown once at creation)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: i64,
    pub label: String,
    /// First characters of the key, for identification in listings
    pub key_prefix: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Kind of authentication event recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEvent {
    Register,
    Login,
    Logout,
    MagicLinkRequest,
    MagicLinkVerify,
    PasswordReset,
    PasswordChange,
}

impl AuthEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEvent::Register => "register",
            AuthEvent::Login => "login",
            AuthEvent::Logout => "logout",
            AuthEvent::MagicLinkRequest => "magic_link_request",
            AuthEvent::MagicLinkVerify => "magic_link_verify",
            AuthEvent::PasswordReset => "password_reset",
            AuthEvent::PasswordChange => "password_change",
        }
    }
}

/// Security audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthLog {
    pub email: String,
    pub event: AuthEvent,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuthLog {
    pub fn new(email: &str, event: AuthEvent, success: bool) -> Self {
        Self {
            email: email.to_string(),
            event,
            ip_address: None,
            user_agent: None,
            success,
            reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_client(mut self, client: &ClientInfo) -> Self {
        self.ip_address = client.ip_address.clone();
        self.user_agent = client.user_agent.clone();
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Where an authentication request came from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Row counts reported by the admin statistics endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStats {
    pub users: i64,
    pub sites: i64,
    pub categories: i64,
    pub reminders: i64,
}
