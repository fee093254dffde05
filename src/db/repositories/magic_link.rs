//! Magic-link token repository
//!
//! Tokens are looked up by their HMAC digest. Consuming a token is a single
//! conditional UPDATE so two concurrent verifications cannot both succeed.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::MagicLinkToken;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

/// Magic-link repository trait
#[async_trait]
pub trait MagicLinkRepository: Send + Sync {
    async fn create(&self, token: &MagicLinkToken) -> Result<MagicLinkToken>;

    /// Find a token by email and digest, used or not
    async fn find(&self, email: &str, token_hash: &str) -> Result<Option<MagicLinkToken>>;

    /// Mark the token used if it is still unused and unexpired at `now`.
    /// Returns false when another request got there first.
    async fn consume(&self, id: i64, now: DateTime<Utc>) -> Result<bool>;

    /// Remove tokens for `email` that were never used
    async fn delete_unused_for_email(&self, email: &str) -> Result<u64>;

    /// Remove tokens that expired before `now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

pub struct SqlxMagicLinkRepository {
    pool: DynDatabasePool,
}

impl SqlxMagicLinkRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn MagicLinkRepository> {
        Arc::new(Self::new(pool))
    }
}

macro_rules! row_to_token {
    ($row:expr) => {
        MagicLinkToken {
            id: $row.get("id"),
            email: $row.get("email"),
            token_hash: $row.get("token_hash"),
            ip_address: $row.get("ip_address"),
            user_agent: $row.get("user_agent"),
            expires_at: $row.get("expires_at"),
            used_at: $row.get("used_at"),
            created_at: $row.get("created_at"),
        }
    };
}

#[async_trait]
impl MagicLinkRepository for SqlxMagicLinkRepository {
    async fn create(&self, token: &MagicLinkToken) -> Result<MagicLinkToken> {
        const SQL: &str = "INSERT INTO magic_links \
             (email, token_hash, ip_address, user_agent, expires_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)";
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .bind(&token.email)
                .bind(&token.token_hash)
                .bind(&token.ip_address)
                .bind(&token.user_agent)
                .bind(token.expires_at)
                .bind(token.created_at)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.last_insert_rowid()),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .bind(&token.email)
                .bind(&token.token_hash)
                .bind(&token.ip_address)
                .bind(&token.user_agent)
                .bind(token.expires_at)
                .bind(token.created_at)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to store magic link token")?;

        Ok(MagicLinkToken {
            id,
            ..token.clone()
        })
    }

    async fn find(&self, email: &str, token_hash: &str) -> Result<Option<MagicLinkToken>> {
        const SQL: &str = "SELECT id, email, token_hash, ip_address, user_agent, expires_at, \
             used_at, created_at FROM magic_links WHERE email = ? AND token_hash = ?";
        let token = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .bind(email)
                .bind(token_hash)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to look up magic link token")?
                .map(|row| row_to_token!(row)),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .bind(email)
                .bind(token_hash)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to look up magic link token")?
                .map(|row| row_to_token!(row)),
        };
        Ok(token)
    }

    async fn consume(&self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        const SQL: &str = "UPDATE magic_links SET used_at = ? \
             WHERE id = ? AND used_at IS NULL AND expires_at > ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .bind(now)
                .bind(id)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected() == 1),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .bind(now)
                .bind(id)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected() == 1),
        }
        .context("Failed to consume magic link token")
    }

    async fn delete_unused_for_email(&self, email: &str) -> Result<u64> {
        const SQL: &str = "DELETE FROM magic_links WHERE email = ? AND used_at IS NULL";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .bind(email)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .bind(email)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete unused magic link tokens")
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        const SQL: &str = "DELETE FROM magic_links WHERE expires_at < ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete expired magic link tokens")
    }
}
