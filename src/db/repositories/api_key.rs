//! Admin API key repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::ApiKey;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

/// API key repository trait
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn create(&self, key: &ApiKey) -> Result<ApiKey>;

    async fn get_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>>;

    /// All keys, newest first
    async fn list(&self) -> Result<Vec<ApiKey>>;
}

pub struct SqlxApiKeyRepository {
    pool: DynDatabasePool,
}

impl SqlxApiKeyRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ApiKeyRepository> {
        Arc::new(Self::new(pool))
    }
}

const KEY_COLUMNS: &str = "id, label, key_prefix, key_hash, created_by, created_at";

macro_rules! row_to_key {
    ($row:expr) => {
        ApiKey {
            id: $row.get("id"),
            label: $row.get("label"),
            key_prefix: $row.get("key_prefix"),
            key_hash: $row.get("key_hash"),
            created_by: $row.get("created_by"),
            created_at: $row.get("created_at"),
        }
    };
}

#[async_trait]
impl ApiKeyRepository for SqlxApiKeyRepository {
    async fn create(&self, key: &ApiKey) -> Result<ApiKey> {
        const SQL: &str = "INSERT INTO api_keys (label, key_prefix, key_hash, created_by, created_at) \
             VALUES (?, ?, ?, ?, ?)";
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .bind(&key.label)
                .bind(&key.key_prefix)
                .bind(&key.key_hash)
                .bind(key.created_by)
                .bind(key.created_at)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.last_insert_rowid()),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .bind(&key.label)
                .bind(&key.key_prefix)
                .bind(&key.key_hash)
                .bind(key.created_by)
                .bind(key.created_at)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to store API key")?;

        Ok(ApiKey { id, ..key.clone() })
    }

    async fn get_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        let sql = format!("SELECT {} FROM api_keys WHERE key_hash = ?", KEY_COLUMNS);
        let key = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(key_hash)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to look up API key")?
                .map(|row| row_to_key!(row)),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(key_hash)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to look up API key")?
                .map(|row| row_to_key!(row)),
        };
        Ok(key)
    }

    async fn list(&self) -> Result<Vec<ApiKey>> {
        let sql = format!("SELECT {} FROM api_keys ORDER BY id DESC", KEY_COLUMNS);
        let keys = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list API keys")?
                .iter()
                .map(|row| row_to_key!(row))
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list API keys")?
                .iter()
                .map(|row| row_to_key!(row))
                .collect(),
        };
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Utc;

    #[tokio::test]
    async fn test_create_list_and_lookup() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let repo = SqlxApiKeyRepository::new(pool);

        for (label, hash) in [("ci", "hash-ci"), ("backup", "hash-backup")] {
            repo.create(&ApiKey {
                id: 0,
                label: label.to_string(),
                key_prefix: "ctk_abcd".to_string(),
                key_hash: hash.to_string(),
                created_by: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }

        let keys = repo.list().await.unwrap();
        assert_eq!(keys.iter().map(|k| k.label.as_str()).collect::<Vec<_>>(), vec!["backup", "ci"]);

        let found = repo.get_by_hash("hash-ci").await.unwrap().unwrap();
        assert_eq!(found.label, "ci");
        assert!(repo.get_by_hash("missing").await.unwrap().is_none());
    }
}
