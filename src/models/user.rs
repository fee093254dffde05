//! User and account models
//!
//! A user is identified by a lowercase email. Credential users carry an
//! argon2 password hash; users created through a magic link have none until
//! they set one. Each way of signing in is recorded as an `Account`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Registered user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Email address (unique, lowercase)
    pub email: String,
    /// Password hash (argon2), absent for passwordless users
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    /// When the email was verified
    pub email_verified: Option<DateTime<Utc>>,
    /// Display name
    pub name: Option<String>,
    /// Subscription plan
    pub plan: Plan,
    /// HMAC digest of the pending password reset token
    #[serde(skip_serializing)]
    pub reset_token_hash: Option<String>,
    /// Expiry of the pending password reset token
    #[serde(skip_serializing)]
    pub reset_token_expires: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build an unsaved user. The email is normalized here so every
    /// insert path stores the same form.
    pub fn new(email: &str, password_hash: Option<String>, name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            email: normalize_email(email),
            password_hash,
            email_verified: None,
            name,
            plan: Plan::Free,
            reset_token_hash: None,
            reset_token_expires: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.as_deref().is_some_and(|h| !h.is_empty())
    }

    pub fn is_verified(&self) -> bool {
        self.email_verified.is_some()
    }
}

/// Trim and lowercase an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Subscription plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Pro,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "pro" => Ok(Plan::Pro),
            _ => Err(anyhow::anyhow!("Invalid plan: {}", s)),
        }
    }
}

/// Sign-in method linked to a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub provider: AccountProvider,
    /// Provider-side identifier; the email for both built-in providers
    pub provider_account_id: String,
    pub created_at: DateTime<Utc>,
}

/// Authentication provider of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountProvider {
    /// Email and password
    Credentials,
    /// Magic link sent by email
    Email,
}

impl AccountProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountProvider::Credentials => "credentials",
            AccountProvider::Email => "email",
        }
    }
}

impl FromStr for AccountProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credentials" => Ok(AccountProvider::Credentials),
            "email" => Ok(AccountProvider::Email),
            _ => Err(anyhow::anyhow!("Invalid account provider: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_new_normalizes_email() {
        let user = User::new("  Alice@Example.COM ", Some("hash".to_string()), None);
        assert_eq!(user.id, 0);
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.plan, Plan::Free);
        assert!(user.has_password());
        assert!(!user.is_verified());
    }

    #[test]
    fn test_passwordless_user() {
        let user = User::new("bob@example.com", None, None);
        assert!(!user.has_password());

        let blank = User::new("carol@example.com", Some(String::new()), None);
        assert!(!blank.has_password());
    }

    #[test]
    fn test_user_serialization_hides_secrets() {
        let mut user = User::new("a@example.com", Some("secret-hash".to_string()), None);
        user.reset_token_hash = Some("digest".to_string());
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(!json.contains("digest"));
        assert!(json.contains("\"plan\":\"free\""));
    }

    #[test]
    fn test_plan_from_str() {
        assert_eq!(Plan::from_str("pro").unwrap(), Plan::Pro);
        assert_eq!(Plan::from_str("FREE").unwrap(), Plan::Free);
        assert!(Plan::from_str("enterprise").is_err());
        assert_eq!(Plan::Pro.to_string(), "pro");
    }

    #[test]
    fn test_account_provider_round_trip() {
        for provider in [AccountProvider::Credentials, AccountProvider::Email] {
            assert_eq!(AccountProvider::from_str(provider.as_str()).unwrap(), provider);
        }
        assert!(AccountProvider::from_str("github").is_err());
    }
}
