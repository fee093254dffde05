//! Category repository
//!
//! Database operations for categories, their subcategories and the ordered
//! site lists ("items") kept inside a subcategory.
//!
//! Ownership is enforced by the queries: every category lookup is scoped to
//! a user ID, and subcategories are reached through their category.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Category, Subcategory, SubcategoryItem};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

/// Number of sites per category and per subcategory for one user
#[derive(Debug, Clone, Default)]
pub struct SiteCounts {
    pub by_category: HashMap<i64, i64>,
    pub by_subcategory: HashMap<i64, i64>,
}

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, category: &Category) -> Result<Category>;

    /// Get a category owned by `user_id`
    async fn get_by_id(&self, user_id: i64, id: i64) -> Result<Option<Category>>;

    async fn get_by_name(&self, user_id: i64, name: &str) -> Result<Option<Category>>;

    /// All categories of a user ordered by sort order, then name
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Category>>;

    async fn update(&self, category: &Category) -> Result<Category>;

    /// Delete a category; subcategories cascade and sites keep a NULL category
    async fn delete(&self, user_id: i64, id: i64) -> Result<bool>;

    async fn count(&self) -> Result<i64>;

    async fn create_subcategory(&self, subcategory: &Subcategory) -> Result<Subcategory>;

    /// Get a subcategory whose category is owned by `user_id`
    async fn get_subcategory(&self, user_id: i64, id: i64) -> Result<Option<Subcategory>>;

    async fn get_subcategory_by_name(
        &self,
        category_id: i64,
        name: &str,
    ) -> Result<Option<Subcategory>>;

    /// All subcategories across a user's categories
    async fn list_subcategories(&self, user_id: i64) -> Result<Vec<Subcategory>>;

    async fn update_subcategory(&self, subcategory: &Subcategory) -> Result<Subcategory>;

    async fn delete_subcategory(&self, id: i64) -> Result<bool>;

    async fn add_item(&self, subcategory_id: i64, site_id: i64, position: i32)
        -> Result<SubcategoryItem>;

    /// Items ordered by position
    async fn list_items(&self, subcategory_id: i64) -> Result<Vec<SubcategoryItem>>;

    async fn get_item_by_site(
        &self,
        subcategory_id: i64,
        site_id: i64,
    ) -> Result<Option<SubcategoryItem>>;

    async fn delete_item(&self, subcategory_id: i64, item_id: i64) -> Result<bool>;

    /// Site counts grouped by category and subcategory
    async fn site_counts(&self, user_id: i64) -> Result<SiteCounts>;
}

/// SQLx-based category repository implementation
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

const CATEGORY_COLUMNS: &str =
    "id, user_id, name, description, sort_order, created_at, updated_at";
const SUBCATEGORY_COLUMNS: &str = "s.id, s.category_id, s.name, s.sort_order, s.created_at";
const ITEM_COLUMNS: &str = "id, subcategory_id, site_id, position, created_at";

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_category_sqlite(self.pool.sqlite()?, category).await,
            DatabaseDriver::Mysql => create_category_mysql(self.pool.mysql()?, category).await,
        }
    }

    async fn get_by_id(&self, user_id: i64, id: i64) -> Result<Option<Category>> {
        let sql = format!(
            "SELECT {} FROM categories WHERE id = ? AND user_id = ?",
            CATEGORY_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(id)
                .bind(user_id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get category")?
                .as_ref()
                .map(row_to_category_sqlite)
                .transpose(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(id)
                .bind(user_id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get category")?
                .as_ref()
                .map(row_to_category_mysql)
                .transpose(),
        }
    }

    async fn get_by_name(&self, user_id: i64, name: &str) -> Result<Option<Category>> {
        let sql = format!(
            "SELECT {} FROM categories WHERE user_id = ? AND name = ?",
            CATEGORY_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(user_id)
                .bind(name)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get category by name")?
                .as_ref()
                .map(row_to_category_sqlite)
                .transpose(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(user_id)
                .bind(name)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get category by name")?
                .as_ref()
                .map(row_to_category_mysql)
                .transpose(),
        }
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Category>> {
        let sql = format!(
            "SELECT {} FROM categories WHERE user_id = ? ORDER BY sort_order, name",
            CATEGORY_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(user_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list categories")?
                .iter()
                .map(row_to_category_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(user_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list categories")?
                .iter()
                .map(row_to_category_mysql)
                .collect(),
        }
    }

    async fn update(&self, category: &Category) -> Result<Category> {
        const SQL: &str = "UPDATE categories SET name = ?, description = ?, sort_order = ?, \
                           updated_at = ? WHERE id = ? AND user_id = ?";
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .bind(&category.name)
                .bind(&category.description)
                .bind(category.sort_order)
                .bind(now)
                .bind(category.id)
                .bind(category.user_id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|_| ()),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .bind(&category.name)
                .bind(&category.description)
                .bind(category.sort_order)
                .bind(now)
                .bind(category.id)
                .bind(category.user_id)
                .execute(self.pool.mysql()?)
                .await
                .map(|_| ()),
        }
        .context("Failed to update category")?;

        Ok(Category {
            updated_at: now,
            ..category.clone()
        })
    }

    async fn delete(&self, user_id: i64, id: i64) -> Result<bool> {
        const SQL: &str = "DELETE FROM categories WHERE id = ? AND user_id = ?";
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
        .context("Failed to delete category")
    }

    async fn count(&self) -> Result<i64> {
        const SQL: &str = "SELECT COUNT(*) as count FROM categories";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count categories")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count categories")?
                .get("count"),
        };
        Ok(count)
    }

    async fn create_subcategory(&self, subcategory: &Subcategory) -> Result<Subcategory> {
        const SQL: &str =
            "INSERT INTO subcategories (category_id, name, sort_order, created_at) VALUES (?, ?, ?, ?)";
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .bind(subcategory.category_id)
                .bind(&subcategory.name)
                .bind(subcategory.sort_order)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.last_insert_rowid()),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .bind(subcategory.category_id)
                .bind(&subcategory.name)
                .bind(subcategory.sort_order)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create subcategory")?;

        Ok(Subcategory {
            id,
            created_at: now,
            ..subcategory.clone()
        })
    }

    async fn get_subcategory(&self, user_id: i64, id: i64) -> Result<Option<Subcategory>> {
        let sql = format!(
            "SELECT {} FROM subcategories s JOIN categories c ON c.id = s.category_id \
             WHERE s.id = ? AND c.user_id = ?",
            SUBCATEGORY_COLUMNS
        );
        let subcategory = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(id)
                .bind(user_id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get subcategory")?
                .as_ref()
                .map(row_to_subcategory_sqlite),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(id)
                .bind(user_id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get subcategory")?
                .as_ref()
                .map(row_to_subcategory_mysql),
        };
        Ok(subcategory)
    }

    async fn get_subcategory_by_name(
        &self,
        category_id: i64,
        name: &str,
    ) -> Result<Option<Subcategory>> {
        let sql = format!(
            "SELECT {} FROM subcategories s WHERE s.category_id = ? AND s.name = ?",
            SUBCATEGORY_COLUMNS
        );
        let subcategory = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(category_id)
                .bind(name)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get subcategory by name")?
                .as_ref()
                .map(row_to_subcategory_sqlite),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(category_id)
                .bind(name)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get subcategory by name")?
                .as_ref()
                .map(row_to_subcategory_mysql),
        };
        Ok(subcategory)
    }

    async fn list_subcategories(&self, user_id: i64) -> Result<Vec<Subcategory>> {
        let sql = format!(
            "SELECT {} FROM subcategories s JOIN categories c ON c.id = s.category_id \
             WHERE c.user_id = ? ORDER BY s.sort_order, s.name",
            SUBCATEGORY_COLUMNS
        );
        let subcategories = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(user_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list subcategories")?
                .iter()
                .map(row_to_subcategory_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(user_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list subcategories")?
                .iter()
                .map(row_to_subcategory_mysql)
                .collect(),
        };
        Ok(subcategories)
    }

    async fn update_subcategory(&self, subcategory: &Subcategory) -> Result<Subcategory> {
        const SQL: &str = "UPDATE subcategories SET name = ?, sort_order = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .bind(&subcategory.name)
                .bind(subcategory.sort_order)
                .bind(subcategory.id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|_| ()),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .bind(&subcategory.name)
                .bind(subcategory.sort_order)
                .bind(subcategory.id)
                .execute(self.pool.mysql()?)
                .await
                .map(|_| ()),
        }
        .context("Failed to update subcategory")?;

        Ok(subcategory.clone())
    }

    async fn delete_subcategory(&self, id: i64) -> Result<bool> {
        const SQL: &str = "DELETE FROM subcategories WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected() > 0),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected() > 0),
        }
        .context("Failed to delete subcategory")
    }

    async fn add_item(
        &self,
        subcategory_id: i64,
        site_id: i64,
        position: i32,
    ) -> Result<SubcategoryItem> {
        const SQL: &str = "INSERT INTO subcategory_items (subcategory_id, site_id, position, created_at) \
                           VALUES (?, ?, ?, ?)";
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .bind(subcategory_id)
                .bind(site_id)
                .bind(position)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.last_insert_rowid()),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .bind(subcategory_id)
                .bind(site_id)
                .bind(position)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to add subcategory item")?;

        Ok(SubcategoryItem {
            id,
            subcategory_id,
            site_id,
            position,
            created_at: now,
        })
    }

    async fn list_items(&self, subcategory_id: i64) -> Result<Vec<SubcategoryItem>> {
        let sql = format!(
            "SELECT {} FROM subcategory_items WHERE subcategory_id = ? ORDER BY position, id",
            ITEM_COLUMNS
        );
        let items = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(subcategory_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list subcategory items")?
                .iter()
                .map(row_to_item_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(subcategory_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list subcategory items")?
                .iter()
                .map(row_to_item_mysql)
                .collect(),
        };
        Ok(items)
    }

    async fn get_item_by_site(
        &self,
        subcategory_id: i64,
        site_id: i64,
    ) -> Result<Option<SubcategoryItem>> {
        let items = self.list_items(subcategory_id).await?;
        Ok(items.into_iter().find(|item| item.site_id == site_id))
    }

    async fn delete_item(&self, subcategory_id: i64, item_id: i64) -> Result<bool> {
        const SQL: &str = "DELETE FROM subcategory_items WHERE id = ? AND subcategory_id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .bind(item_id)
                .bind(subcategory_id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected() > 0),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .bind(item_id)
                .bind(subcategory_id)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected() > 0),
        }
        .context("Failed to delete subcategory item")
    }

    async fn site_counts(&self, user_id: i64) -> Result<SiteCounts> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => site_counts_sqlite(self.pool.sqlite()?, user_id).await,
            DatabaseDriver::Mysql => site_counts_mysql(self.pool.mysql()?, user_id).await,
        }
    }
}

const COUNT_BY_CATEGORY: &str = "SELECT category_id as group_id, COUNT(*) as count FROM sites \
     WHERE user_id = ? AND category_id IS NOT NULL GROUP BY category_id";
const COUNT_BY_SUBCATEGORY: &str = "SELECT subcategory_id as group_id, COUNT(*) as count FROM sites \
     WHERE user_id = ? AND subcategory_id IS NOT NULL GROUP BY subcategory_id";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_category_sqlite(pool: &SqlitePool, category: &Category) -> Result<Category> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO categories (user_id, name, description, sort_order, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(category.user_id)
    .bind(&category.name)
    .bind(&category.description)
    .bind(category.sort_order)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create category")?;

    Ok(Category {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..category.clone()
    })
}

async fn site_counts_sqlite(pool: &SqlitePool, user_id: i64) -> Result<SiteCounts> {
    let mut counts = SiteCounts::default();
    for row in sqlx::query(COUNT_BY_CATEGORY)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to count sites by category")?
    {
        counts.by_category.insert(row.get("group_id"), row.get("count"));
    }
    for row in sqlx::query(COUNT_BY_SUBCATEGORY)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to count sites by subcategory")?
    {
        counts.by_subcategory.insert(row.get("group_id"), row.get("count"));
    }
    Ok(counts)
}

fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Category> {
    Ok(Category {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        description: row.get("description"),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_subcategory_sqlite(row: &sqlx::sqlite::SqliteRow) -> Subcategory {
    Subcategory {
        id: row.get("id"),
        category_id: row.get("category_id"),
        name: row.get("name"),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
    }
}

fn row_to_item_sqlite(row: &sqlx::sqlite::SqliteRow) -> SubcategoryItem {
    SubcategoryItem {
        id: row.get("id"),
        subcategory_id: row.get("subcategory_id"),
        site_id: row.get("site_id"),
        position: row.get("position"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_category_mysql(pool: &MySqlPool, category: &Category) -> Result<Category> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO categories (user_id, name, description, sort_order, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(category.user_id)
    .bind(&category.name)
    .bind(&category.description)
    .bind(category.sort_order)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create category")?;

    Ok(Category {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..category.clone()
    })
}

async fn site_counts_mysql(pool: &MySqlPool, user_id: i64) -> Result<SiteCounts> {
    let mut counts = SiteCounts::default();
    for row in sqlx::query(COUNT_BY_CATEGORY)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to count sites by category")?
    {
        counts.by_category.insert(row.get("group_id"), row.get("count"));
    }
    for row in sqlx::query(COUNT_BY_SUBCATEGORY)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to count sites by subcategory")?
    {
        counts.by_subcategory.insert(row.get("group_id"), row.get("count"));
    }
    Ok(counts)
}

fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Category> {
    Ok(Category {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        description: row.get("description"),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_subcategory_mysql(row: &sqlx::mysql::MySqlRow) -> Subcategory {
    Subcategory {
        id: row.get("id"),
        category_id: row.get("category_id"),
        name: row.get("name"),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
    }
}

fn row_to_item_mysql(row: &sqlx::mysql::MySqlRow) -> SubcategoryItem {
    SubcategoryItem {
        id: row.get("id"),
        subcategory_id: row.get("subcategory_id"),
        site_id: row.get("site_id"),
        position: row.get("position"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxCategoryRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user = SqlxUserRepository::new(pool.clone())
            .create(&User::new("cat@example.com", None, None))
            .await
            .unwrap();
        let repo = SqlxCategoryRepository::new(pool.clone());
        (pool, repo, user.id)
    }

    fn new_subcategory(category_id: i64, name: &str) -> Subcategory {
        Subcategory {
            id: 0,
            category_id,
            name: name.to_string(),
            sort_order: 0,
            created_at: Utc::now(),
        }
    }

    async fn insert_site(pool: &DynDatabasePool, user_id: i64, url: &str, category_id: i64) -> i64 {
        sqlx::query("INSERT INTO sites (user_id, url, title, category_id) VALUES (?, ?, ?, ?)")
            .bind(user_id)
            .bind(url)
            .bind(url)
            .bind(category_id)
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap()
            .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_category_crud() {
        let (_pool, repo, user_id) = setup_test_repo().await;

        let created = repo
            .create(&Category::new(user_id, "News".to_string(), Some("daily".to_string()), 1))
            .await
            .unwrap();
        assert!(created.id > 0);

        let mut fetched = repo.get_by_id(user_id, created.id).await.unwrap().unwrap();
        assert_eq!(fetched.description.as_deref(), Some("daily"));
        assert!(repo.get_by_id(user_id + 1, created.id).await.unwrap().is_none());

        fetched.name = "Headlines".to_string();
        repo.update(&fetched).await.unwrap();
        assert!(repo.get_by_name(user_id, "Headlines").await.unwrap().is_some());
        assert!(repo.get_by_name(user_id, "News").await.unwrap().is_none());

        assert!(repo.delete(user_id, created.id).await.unwrap());
        assert!(!repo.delete(user_id, created.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_orders_by_sort_order() {
        let (_pool, repo, user_id) = setup_test_repo().await;
        repo.create(&Category::new(user_id, "B".to_string(), None, 2)).await.unwrap();
        repo.create(&Category::new(user_id, "A".to_string(), None, 2)).await.unwrap();
        repo.create(&Category::new(user_id, "Z".to_string(), None, 0)).await.unwrap();

        let names: Vec<String> = repo
            .list_by_user(user_id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Z", "A", "B"]);
        assert_eq!(repo.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_subcategories_cascade_with_category() {
        let (_pool, repo, user_id) = setup_test_repo().await;
        let category = repo
            .create(&Category::new(user_id, "Dev".to_string(), None, 0))
            .await
            .unwrap();
        let sub = repo
            .create_subcategory(&new_subcategory(category.id, "Rust"))
            .await
            .unwrap();

        assert!(repo.get_subcategory(user_id, sub.id).await.unwrap().is_some());
        assert!(repo.get_subcategory(user_id + 1, sub.id).await.unwrap().is_none());
        assert!(repo
            .get_subcategory_by_name(category.id, "Rust")
            .await
            .unwrap()
            .is_some());
        assert!(repo
            .create_subcategory(&new_subcategory(category.id, "Rust"))
            .await
            .is_err());

        repo.delete(user_id, category.id).await.unwrap();
        assert!(repo.list_subcategories(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_items_and_site_counts() {
        let (pool, repo, user_id) = setup_test_repo().await;
        let category = repo
            .create(&Category::new(user_id, "Tools".to_string(), None, 0))
            .await
            .unwrap();
        let sub = repo
            .create_subcategory(&new_subcategory(category.id, "CLI"))
            .await
            .unwrap();
        let first = insert_site(&pool, user_id, "https://a.example", category.id).await;
        let second = insert_site(&pool, user_id, "https://b.example", category.id).await;

        repo.add_item(sub.id, second, 1).await.unwrap();
        let item = repo.add_item(sub.id, first, 0).await.unwrap();
        assert!(repo.add_item(sub.id, first, 5).await.is_err());

        let items = repo.list_items(sub.id).await.unwrap();
        assert_eq!(items.iter().map(|i| i.site_id).collect::<Vec<_>>(), vec![first, second]);
        assert!(repo.get_item_by_site(sub.id, first).await.unwrap().is_some());

        let counts = repo.site_counts(user_id).await.unwrap();
        assert_eq!(counts.by_category.get(&category.id), Some(&2));

        assert!(repo.delete_item(sub.id, item.id).await.unwrap());
        assert_eq!(repo.list_items(sub.id).await.unwrap().len(), 1);
    }
}
