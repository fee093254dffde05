//! Database layer
//!
//! Storage for users, bookmarks, categories and reminders. Two backends are
//! supported:
//! - SQLite (default, single file next to the binary)
//! - MySQL (shared deployments)
//!
//! The driver is selected from configuration and hidden behind the
//! `DatabasePool` trait, so repositories only branch on `pool.driver()`.
//!
//! # Usage
//!
//! ```ignore
//! use cleantabs::config::DatabaseConfig;
//! use cleantabs::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, DatabasePool, DynDatabasePool};
