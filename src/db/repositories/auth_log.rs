//! Authentication audit log repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::AuthLog;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait AuthLogRepository: Send + Sync {
    async fn record(&self, entry: &AuthLog) -> Result<()>;

    /// Number of entries recorded for an email
    async fn count_for_email(&self, email: &str) -> Result<i64>;
}

pub struct SqlxAuthLogRepository {
    pool: DynDatabasePool,
}

impl SqlxAuthLogRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AuthLogRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AuthLogRepository for SqlxAuthLogRepository {
    async fn record(&self, entry: &AuthLog) -> Result<()> {
        const SQL: &str = "INSERT INTO auth_logs \
             (email, event, ip_address, user_agent, success, reason, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .bind(&entry.email)
                .bind(entry.event.as_str())
                .bind(&entry.ip_address)
                .bind(&entry.user_agent)
                .bind(entry.success)
                .bind(&entry.reason)
                .bind(entry.created_at)
                .execute(self.pool.sqlite()?)
                .await
                .map(|_| ()),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .bind(&entry.email)
                .bind(entry.event.as_str())
                .bind(&entry.ip_address)
                .bind(&entry.user_agent)
                .bind(entry.success)
                .bind(&entry.reason)
                .bind(entry.created_at)
                .execute(self.pool.mysql()?)
                .await
                .map(|_| ()),
        }
        .context("Failed to record auth log entry")
    }

    async fn count_for_email(&self, email: &str) -> Result<i64> {
        const SQL: &str = "SELECT COUNT(*) as count FROM auth_logs WHERE email = ?";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .bind(email)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count auth log entries")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .bind(email)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count auth log entries")?
                .get("count"),
        };
        Ok(count)
    }
}
