//! Connection pools for the two storage backends
//!
//! Repositories hold a `DynDatabasePool` and branch on `driver()`, borrowing
//! the concrete sqlx pool through `sqlite()` / `mysql()`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions},
    sqlite::{
        SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
    },
};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{DatabaseConfig, DatabaseDriver};

/// How long a request waits for a free connection
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
/// How long SQLite retries a locked database before failing a write
const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Backend-neutral handle shared by every repository
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Run a statement that returns no rows, yielding the affected row count
    async fn execute(&self, query: &str) -> Result<u64>;

    async fn ping(&self) -> Result<()>;

    async fn close(&self);

    fn driver(&self) -> DatabaseDriver;

    fn as_sqlite(&self) -> Option<&SqlitePool>;

    fn as_mysql(&self) -> Option<&MySqlPool>;
}

impl dyn DatabasePool {
    /// Borrow the SQLite pool, failing when the backend is not SQLite
    pub fn sqlite(&self) -> Result<&SqlitePool> {
        self.as_sqlite()
            .ok_or_else(|| anyhow::anyhow!("Expected a SQLite pool, found {:?}", self.driver()))
    }

    /// Borrow the MySQL pool, failing when the backend is not MySQL
    pub fn mysql(&self) -> Result<&MySqlPool> {
        self.as_mysql()
            .ok_or_else(|| anyhow::anyhow!("Expected a MySQL pool, found {:?}", self.driver()))
    }
}

pub type DynDatabasePool = Arc<dyn DatabasePool>;

enum Database {
    Sqlite(SqlitePool),
    Mysql(MySqlPool),
}

#[async_trait]
impl DatabasePool for Database {
    async fn execute(&self, query: &str) -> Result<u64> {
        let affected = match self {
            Database::Sqlite(pool) => sqlx::query(query).execute(pool).await.map(|r| r.rows_affected()),
            Database::Mysql(pool) => sqlx::query(query).execute(pool).await.map(|r| r.rows_affected()),
        };
        affected.with_context(|| format!("Failed to execute: {}", query))
    }

    async fn ping(&self) -> Result<()> {
        let result = match self {
            Database::Sqlite(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
            Database::Mysql(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
        };
        result.context("Database ping failed")
    }

    async fn close(&self) {
        match self {
            Database::Sqlite(pool) => pool.close().await,
            Database::Mysql(pool) => pool.close().await,
        }
    }

    fn driver(&self) -> DatabaseDriver {
        match self {
            Database::Sqlite(_) => DatabaseDriver::Sqlite,
            Database::Mysql(_) => DatabaseDriver::Mysql,
        }
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        match self {
            Database::Sqlite(pool) => Some(pool),
            Database::Mysql(_) => None,
        }
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        match self {
            Database::Mysql(pool) => Some(pool),
            Database::Sqlite(_) => None,
        }
    }
}

/// Open the pool selected by `config.driver`
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let database = match config.driver {
        DatabaseDriver::Sqlite => Database::Sqlite(connect_sqlite(config).await?),
        DatabaseDriver::Mysql => Database::Mysql(connect_mysql(config).await?),
    };
    Ok(Arc::new(database))
}

/// Fresh in-memory SQLite database, private to the caller
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    create_pool(&DatabaseConfig {
        driver: DatabaseDriver::Sqlite,
        url: ":memory:".to_string(),
        ..Default::default()
    })
    .await
}

fn is_memory_url(url: &str) -> bool {
    matches!(url, ":memory:" | "sqlite::memory:" | "sqlite://:memory:")
}

/// Filesystem path of a SQLite URL (`sqlite:`, `sqlite://` or a bare path)
fn sqlite_path(url: &str) -> &Path {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    Path::new(path.split('?').next().unwrap_or(path))
}

async fn connect_sqlite(config: &DatabaseConfig) -> Result<SqlitePool> {
    let url = config.url.trim();

    if is_memory_url(url) {
        // Every connection opened from these options shares one database,
        // which lives as long as at least one connection stays open.
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        return SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await
            .context("Failed to open in-memory SQLite database");
    }

    if let Some(dir) = sqlite_path(url).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create database directory {}", dir.display()))?;
    }

    let options = if url.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid SQLite URL: {}", url))?
    } else {
        SqliteConnectOptions::new().filename(url)
    };
    let options = options
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(SQLITE_BUSY_TIMEOUT);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open SQLite database {}", url))
}

async fn connect_mysql(config: &DatabaseConfig) -> Result<MySqlPool> {
    let url = config.url.trim();
    let url = if url.starts_with("mysql://") {
        url.to_string()
    } else {
        format!("mysql://{}", url)
    };
    let options = MySqlConnectOptions::from_str(&url).context("Invalid MySQL URL")?;

    MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await
        .context("Failed to connect to MySQL")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_config(url: &str) -> DatabaseConfig {
        DatabaseConfig {
            driver: DatabaseDriver::Sqlite,
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_sqlite_path_forms() {
        assert_eq!(sqlite_path("data/cleantabs.db"), Path::new("data/cleantabs.db"));
        assert_eq!(sqlite_path("sqlite:data/cleantabs.db?mode=rwc"), Path::new("data/cleantabs.db"));
        assert_eq!(sqlite_path("sqlite:///var/lib/ct.db"), Path::new("/var/lib/ct.db"));
        assert!(is_memory_url(":memory:"));
        assert!(!is_memory_url("memory.db"));
    }

    #[tokio::test]
    async fn test_memory_pool_is_shared_between_connections() {
        let pool = create_test_pool().await.unwrap();
        assert_eq!(pool.driver(), DatabaseDriver::Sqlite);
        assert!(pool.as_mysql().is_none());

        pool.execute("CREATE TABLE scratch (id INTEGER PRIMARY KEY)").await.unwrap();
        let sqlite = pool.sqlite().unwrap();

        // Hold one connection so the next query has to use another.
        let _held = sqlite.acquire().await.unwrap();
        let affected = pool.execute("INSERT INTO scratch (id) VALUES (1)").await.unwrap();
        assert_eq!(affected, 1);
    }

    #[tokio::test]
    async fn test_test_pools_are_isolated() {
        let first = create_test_pool().await.unwrap();
        let second = create_test_pool().await.unwrap();

        first.execute("CREATE TABLE only_here (id INTEGER)").await.unwrap();
        assert!(second.execute("INSERT INTO only_here (id) VALUES (1)").await.is_err());
    }

    #[tokio::test]
    async fn test_file_pool_creates_directories_and_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cleantabs.db");

        let pool = create_pool(&sqlite_config(&path.to_string_lossy())).await.unwrap();
        pool.ping().await.unwrap();
        assert!(path.exists());

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(pool.sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(mode, "wal");
        let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(pool.sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(foreign_keys, 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_sqlite_url_form() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("url.db");

        let pool = create_pool(&sqlite_config(&format!("sqlite:{}", path.display())))
            .await
            .unwrap();
        pool.ping().await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_wrong_backend_accessor_fails() {
        let pool = create_test_pool().await.unwrap();
        let err = pool.mysql().unwrap_err();
        assert!(err.to_string().contains("MySQL"));
    }

    // Set MYSQL_TEST_URL to run against a real server
    #[tokio::test]
    #[ignore = "Requires MySQL server"]
    async fn test_mysql_pool() {
        let url = std::env::var("MYSQL_TEST_URL")
            .unwrap_or_else(|_| "mysql://root@localhost/cleantabs_test".to_string());
        let pool = create_pool(&DatabaseConfig {
            driver: DatabaseDriver::Mysql,
            url,
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(pool.driver(), DatabaseDriver::Mysql);
        pool.ping().await.unwrap();
    }
}
