//! Account repository
//!
//! Links between users and the ways they sign in.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Account, AccountProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Account repository trait
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Link a provider to a user. Linking an already linked pair is a no-op.
    async fn link(
        &self,
        user_id: i64,
        provider: AccountProvider,
        provider_account_id: &str,
    ) -> Result<()>;

    /// All accounts of a user
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Account>>;

    /// Whether the user has an account with the given provider
    async fn has_provider(&self, user_id: i64, provider: AccountProvider) -> Result<bool>;
}

/// SQLx-based account repository implementation
pub struct SqlxAccountRepository {
    pool: DynDatabasePool,
}

impl SqlxAccountRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AccountRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AccountRepository for SqlxAccountRepository {
    async fn link(
        &self,
        user_id: i64,
        provider: AccountProvider,
        provider_account_id: &str,
    ) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                link_sqlite(self.pool.sqlite()?, user_id, provider, provider_account_id).await
            }
            DatabaseDriver::Mysql => {
                link_mysql(self.pool.mysql()?, user_id, provider, provider_account_id).await
            }
        }
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Account>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_by_user_sqlite(self.pool.sqlite()?, user_id).await,
            DatabaseDriver::Mysql => list_by_user_mysql(self.pool.mysql()?, user_id).await,
        }
    }

    async fn has_provider(&self, user_id: i64, provider: AccountProvider) -> Result<bool> {
        let accounts = self.list_by_user(user_id).await?;
        Ok(accounts.iter().any(|a| a.provider == provider))
    }
}

// SQLite implementations

async fn link_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    provider: AccountProvider,
    provider_account_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO accounts (user_id, provider, provider_account_id, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(provider.as_str())
    .bind(provider_account_id)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to link account")?;
    Ok(())
}

async fn list_by_user_sqlite(pool: &SqlitePool, user_id: i64) -> Result<Vec<Account>> {
    let rows = sqlx::query(
        "SELECT id, user_id, provider, provider_account_id, created_at
         FROM accounts WHERE user_id = ? ORDER BY id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to list accounts")?;

    rows.iter()
        .map(|row| {
            let provider: String = row.get("provider");
            Ok(Account {
                id: row.get("id"),
                user_id: row.get("user_id"),
                provider: AccountProvider::from_str(&provider)?,
                provider_account_id: row.get("provider_account_id"),
                created_at: row.get("created_at"),
            })
        })
        .collect()
}

// MySQL implementations

async fn link_mysql(
    pool: &MySqlPool,
    user_id: i64,
    provider: AccountProvider,
    provider_account_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT IGNORE INTO accounts (user_id, provider, provider_account_id, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(provider.as_str())
    .bind(provider_account_id)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to link account")?;
    Ok(())
}

async fn list_by_user_mysql(pool: &MySqlPool, user_id: i64) -> Result<Vec<Account>> {
    let rows = sqlx::query(
        "SELECT id, user_id, provider, provider_account_id, created_at
         FROM accounts WHERE user_id = ? ORDER BY id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to list accounts")?;

    rows.iter()
        .map(|row| {
            let provider: String = row.get("provider");
            Ok(Account {
                id: row.get("id"),
                user_id: row.get("user_id"),
                provider: AccountProvider::from_str(&provider)?,
                provider_account_id: row.get("provider_account_id"),
                created_at: row.get("created_at"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;

    #[tokio::test]
    async fn test_link_is_idempotent() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let user = SqlxUserRepository::new(pool.clone())
            .create(&User::new("a@example.com", None, None))
            .await
            .unwrap();
        let repo = SqlxAccountRepository::new(pool);

        assert!(!repo.has_provider(user.id, AccountProvider::Email).await.unwrap());

        repo.link(user.id, AccountProvider::Email, &user.email).await.unwrap();
        repo.link(user.id, AccountProvider::Email, &user.email).await.unwrap();
        repo.link(user.id, AccountProvider::Credentials, &user.email).await.unwrap();

        let accounts = repo.list_by_user(user.id).await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(repo.has_provider(user.id, AccountProvider::Email).await.unwrap());
        assert!(repo.has_provider(user.id, AccountProvider::Credentials).await.unwrap());
    }
}
