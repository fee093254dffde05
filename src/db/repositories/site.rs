//! Site repository
//!
//! Database operations for bookmarks.
//!
//! This module provides:
//! - `SiteRepository` trait defining the interface for site data access
//! - `SqlxSiteRepository` implementing the trait for SQLite and MySQL
//!
//! Tags are stored as a JSON array in a TEXT column. The tag filter matches
//! the quoted JSON form of the tag so `rust` does not match `rustacean`.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ListParams, Site, SiteFilter, SiteStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const SITE_COLUMNS: &str = "id, user_id, url, title, description, category_id, subcategory_id, \
     tags, rating, status, reminder_enabled, reminder_interval_days, next_check, last_checked, \
     created_at, updated_at";

/// Site repository trait
#[async_trait]
pub trait SiteRepository: Send + Sync {
    async fn create(&self, site: &Site) -> Result<Site>;

    /// Get a site owned by `user_id`
    async fn get_by_id(&self, user_id: i64, id: i64) -> Result<Option<Site>>;

    async fn get_by_url(&self, user_id: i64, url: &str) -> Result<Option<Site>>;

    /// Persist every mutable column of `site`
    async fn update(&self, site: &Site) -> Result<Site>;

    async fn delete(&self, user_id: i64, id: i64) -> Result<bool>;

    /// Filtered, paginated list (newest first) with the total match count
    async fn list(
        &self,
        user_id: i64,
        filter: &SiteFilter,
        params: &ListParams,
    ) -> Result<(Vec<Site>, i64)>;

    /// Sites with an enabled reminder whose `next_check` is at or before `now`
    async fn due(&self, user_id: i64, now: DateTime<Utc>) -> Result<Vec<Site>>;

    async fn count(&self) -> Result<i64>;
}

/// SQLx-based site repository implementation
pub struct SqlxSiteRepository {
    pool: DynDatabasePool,
}

impl SqlxSiteRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SiteRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SiteRepository for SqlxSiteRepository {
    async fn create(&self, site: &Site) -> Result<Site> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_site_sqlite(self.pool.sqlite()?, site).await,
            DatabaseDriver::Mysql => create_site_mysql(self.pool.mysql()?, site).await,
        }
    }

    async fn get_by_id(&self, user_id: i64, id: i64) -> Result<Option<Site>> {
        let sql = format!("SELECT {} FROM sites WHERE id = ? AND user_id = ?", SITE_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(id)
                .bind(user_id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get site by ID")?
                .as_ref()
                .map(row_to_site_sqlite)
                .transpose(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(id)
                .bind(user_id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get site by ID")?
                .as_ref()
                .map(row_to_site_mysql)
                .transpose(),
        }
    }

    async fn get_by_url(&self, user_id: i64, url: &str) -> Result<Option<Site>> {
        let sql = format!("SELECT {} FROM sites WHERE user_id = ? AND url = ?", SITE_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(user_id)
                .bind(url)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get site by URL")?
                .as_ref()
                .map(row_to_site_sqlite)
                .transpose(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(user_id)
                .bind(url)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get site by URL")?
                .as_ref()
                .map(row_to_site_mysql)
                .transpose(),
        }
    }

    async fn update(&self, site: &Site) -> Result<Site> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_site_sqlite(self.pool.sqlite()?, site).await,
            DatabaseDriver::Mysql => update_site_mysql(self.pool.mysql()?, site).await,
        }
    }

    async fn delete(&self, user_id: i64, id: i64) -> Result<bool> {
        const SQL: &str = "DELETE FROM sites WHERE id = ? AND user_id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .bind(id)
                .bind(user_id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected() > 0),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .bind(id)
                .bind(user_id)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected() > 0),
        }
        .context("Failed to delete site")
    }

    async fn list(
        &self,
        user_id: i64,
        filter: &SiteFilter,
        params: &ListParams,
    ) -> Result<(Vec<Site>, i64)> {
        let query = FilterQuery::build(user_id, filter);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_sites_sqlite(self.pool.sqlite()?, &query, params).await,
            DatabaseDriver::Mysql => list_sites_mysql(self.pool.mysql()?, &query, params).await,
        }
    }

    async fn due(&self, user_id: i64, now: DateTime<Utc>) -> Result<Vec<Site>> {
        let sql = format!(
            "SELECT {} FROM sites WHERE user_id = ? AND reminder_enabled = 1 \
             AND next_check IS NOT NULL AND next_check <= ? ORDER BY next_check, id",
            SITE_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(user_id)
                .bind(now)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list due sites")?
                .iter()
                .map(row_to_site_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(user_id)
                .bind(now)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list due sites")?
                .iter()
                .map(row_to_site_mysql)
                .collect(),
        }
    }

    async fn count(&self) -> Result<i64> {
        const SQL: &str = "SELECT COUNT(*) as count FROM sites";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count sites")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count sites")?
                .get("count"),
        };
        Ok(count)
    }
}

/// A bind parameter for a dynamically built WHERE clause
#[derive(Debug, Clone, PartialEq)]
enum FilterValue {
    Int(i64),
    Text(String),
}

/// WHERE clause and its parameters for a `SiteFilter`
#[derive(Debug)]
struct FilterQuery {
    where_clause: String,
    values: Vec<FilterValue>,
}

impl FilterQuery {
    fn build(user_id: i64, filter: &SiteFilter) -> Self {
        let mut conditions = vec!["user_id = ?".to_string()];
        let mut values = vec![FilterValue::Int(user_id)];

        if let Some(category_id) = filter.category_id {
            conditions.push("category_id = ?".to_string());
            values.push(FilterValue::Int(category_id));
        }
        if let Some(subcategory_id) = filter.subcategory_id {
            conditions.push("subcategory_id = ?".to_string());
            values.push(FilterValue::Int(subcategory_id));
        }
        if let Some(status) = filter.status {
            conditions.push("status = ?".to_string());
            values.push(FilterValue::Text(status.as_str().to_string()));
        }
        if let Some(tag) = filter.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let quoted = serde_json::to_string(&tag.to_lowercase()).unwrap_or_default();
            conditions.push("tags LIKE ? ESCAPE '!'".to_string());
            values.push(FilterValue::Text(format!("%{}%", escape_like(&quoted))));
        }
        if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let pattern = format!("%{}%", escape_like(q));
            conditions.push("(title LIKE ? ESCAPE '!' OR url LIKE ? ESCAPE '!')".to_string());
            values.push(FilterValue::Text(pattern.clone()));
            values.push(FilterValue::Text(pattern));
        }

        Self {
            where_clause: conditions.join(" AND "),
            values,
        }
    }
}

fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '!') {
            escaped.push('!');
        }
        escaped.push(c);
    }
    escaped
}

fn serialize_tags(tags: &[String]) -> Result<String> {
    serde_json::to_string(tags).context("Failed to serialize tags")
}

fn parse_tags(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!("Ignoring malformed tags column {:?}: {}", raw, e);
        Vec::new()
    })
}

fn parse_status(raw: &str) -> Result<SiteStatus> {
    SiteStatus::parse(raw).with_context(|| format!("Invalid site status in database: {}", raw))
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_site_sqlite(pool: &SqlitePool, site: &Site) -> Result<Site> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO sites (user_id, url, title, description, category_id, subcategory_id, tags,
                           rating, status, reminder_enabled, reminder_interval_days, next_check,
                           last_checked, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(site.user_id)
    .bind(&site.url)
    .bind(&site.title)
    .bind(&site.description)
    .bind(site.category_id)
    .bind(site.subcategory_id)
    .bind(serialize_tags(&site.tags)?)
    .bind(site.rating)
    .bind(site.status.as_str())
    .bind(site.reminder_enabled)
    .bind(site.reminder_interval_days)
    .bind(site.next_check)
    .bind(site.last_checked)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create site")?;

    Ok(Site {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..site.clone()
    })
}

async fn update_site_sqlite(pool: &SqlitePool, site: &Site) -> Result<Site> {
    let now = Utc::now();
    sqlx::query(
        r#"
        UPDATE sites
        SET url = ?, title = ?, description = ?, category_id = ?, subcategory_id = ?, tags = ?,
            rating = ?, status = ?, reminder_enabled = ?, reminder_interval_days = ?,
            next_check = ?, last_checked = ?, updated_at = ?
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(&site.url)
    .bind(&site.title)
    .bind(&site.description)
    .bind(site.category_id)
    .bind(site.subcategory_id)
    .bind(serialize_tags(&site.tags)?)
    .bind(site.rating)
    .bind(site.status.as_str())
    .bind(site.reminder_enabled)
    .bind(site.reminder_interval_days)
    .bind(site.next_check)
    .bind(site.last_checked)
    .bind(now)
    .bind(site.id)
    .bind(site.user_id)
    .execute(pool)
    .await
    .context("Failed to update site")?;

    Ok(Site {
        updated_at: now,
        ..site.clone()
    })
}

async fn list_sites_sqlite(
    pool: &SqlitePool,
    query: &FilterQuery,
    params: &ListParams,
) -> Result<(Vec<Site>, i64)> {
    let count_sql = format!("SELECT COUNT(*) as count FROM sites WHERE {}", query.where_clause);
    let mut count_query = sqlx::query(&count_sql);
    for value in &query.values {
        count_query = match value {
            FilterValue::Int(v) => count_query.bind(*v),
            FilterValue::Text(v) => count_query.bind(v.as_str()),
        };
    }
    let total: i64 = count_query
        .fetch_one(pool)
        .await
        .context("Failed to count sites")?
        .get("count");

    let sql = format!(
        "SELECT {} FROM sites WHERE {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        SITE_COLUMNS, query.where_clause
    );
    let mut select = sqlx::query(&sql);
    for value in &query.values {
        select = match value {
            FilterValue::Int(v) => select.bind(*v),
            FilterValue::Text(v) => select.bind(v.as_str()),
        };
    }
    let rows = select
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list sites")?;

    let sites = rows.iter().map(row_to_site_sqlite).collect::<Result<Vec<_>>>()?;
    Ok((sites, total))
}

fn row_to_site_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Site> {
    let tags: String = row.get("tags");
    let status: String = row.get("status");
    Ok(Site {
        id: row.get("id"),
        user_id: row.get("user_id"),
        url: row.get("url"),
        title: row.get("title"),
        description: row.get("description"),
        category_id: row.get("category_id"),
        subcategory_id: row.get("subcategory_id"),
        tags: parse_tags(&tags),
        rating: row.get("rating"),
        status: parse_status(&status)?,
        reminder_enabled: row.get("reminder_enabled"),
        reminder_interval_days: row.get("reminder_interval_days"),
        next_check: row.get("next_check"),
        last_checked: row.get("last_checked"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_site_mysql(pool: &MySqlPool, site: &Site) -> Result<Site> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO sites (user_id, url, title, description, category_id, subcategory_id, tags,
                           rating, status, reminder_enabled, reminder_interval_days, next_check,
                           last_checked, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(site.user_id)
    .bind(&site.url)
    .bind(&site.title)
    .bind(&site.description)
    .bind(site.category_id)
    .bind(site.subcategory_id)
    .bind(serialize_tags(&site.tags)?)
    .bind(site.rating)
    .bind(site.status.as_str())
    .bind(site.reminder_enabled)
    .bind(site.reminder_interval_days)
    .bind(site.next_check)
    .bind(site.last_checked)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create site")?;

    Ok(Site {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..site.clone()
    })
}

async fn update_site_mysql(pool: &MySqlPool, site: &Site) -> Result<Site> {
    let now = Utc::now();
    sqlx::query(
        r#"
        UPDATE sites
        SET url = ?, title = ?, description = ?, category_id = ?, subcategory_id = ?, tags = ?,
            rating = ?, status = ?, reminder_enabled = ?, reminder_interval_days = ?,
            next_check = ?, last_checked = ?, updated_at = ?
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(&site.url)
    .bind(&site.title)
    .bind(&site.description)
    .bind(site.category_id)
    .bind(site.subcategory_id)
    .bind(serialize_tags(&site.tags)?)
    .bind(site.rating)
    .bind(site.status.as_str())
    .bind(site.reminder_enabled)
    .bind(site.reminder_interval_days)
    .bind(site.next_check)
    .bind(site.last_checked)
    .bind(now)
    .bind(site.id)
    .bind(site.user_id)
    .execute(pool)
    .await
    .context("Failed to update site")?;

    Ok(Site {
        updated_at: now,
        ..site.clone()
    })
}

async fn list_sites_mysql(
    pool: &MySqlPool,
    query: &FilterQuery,
    params: &ListParams,
) -> Result<(Vec<Site>, i64)> {
    let count_sql = format!("SELECT COUNT(*) as count FROM sites WHERE {}", query.where_clause);
    let mut count_query = sqlx::query(&count_sql);
    for value in &query.values {
        count_query = match value {
            FilterValue::Int(v) => count_query.bind(*v),
            FilterValue::Text(v) => count_query.bind(v.as_str()),
        };
    }
    let total: i64 = count_query
        .fetch_one(pool)
        .await
        .context("Failed to count sites")?
        .get("count");

    let sql = format!(
        "SELECT {} FROM sites WHERE {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        SITE_COLUMNS, query.where_clause
    );
    let mut select = sqlx::query(&sql);
    for value in &query.values {
        select = match value {
            FilterValue::Int(v) => select.bind(*v),
            FilterValue::Text(v) => select.bind(v.as_str()),
        };
    }
    let rows = select
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list sites")?;

    let sites = rows.iter().map(row_to_site_mysql).collect::<Result<Vec<_>>>()?;
    Ok((sites, total))
}

fn row_to_site_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Site> {
    let tags: String = row.get("tags");
    let status: String = row.get("status");
    Ok(Site {
        id: row.get("id"),
        user_id: row.get("user_id"),
        url: row.get("url"),
        title: row.get("title"),
        description: row.get("description"),
        category_id: row.get("category_id"),
        subcategory_id: row.get("subcategory_id"),
        tags: parse_tags(&tags),
        rating: row.get("rating"),
        status: parse_status(&status)?,
        reminder_enabled: row.get("reminder_enabled"),
        reminder_interval_days: row.get("reminder_interval_days"),
        next_check: row.get("next_check"),
        last_checked: row.get("last_checked"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
