//! Reminder repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Reminder;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const REMINDER_COLUMNS: &str =
    "id, user_id, site_id, title, note, due_at, completed, completed_at, created_at";

/// Reminder repository trait
#[async_trait]
pub trait ReminderRepository: Send + Sync {
    async fn create(&self, reminder: &Reminder) -> Result<Reminder>;

    /// Get a reminder owned by `user_id`
    async fn get_by_id(&self, user_id: i64, id: i64) -> Result<Option<Reminder>>;

    /// Reminders of a user ordered by due date, optionally filtered by state
    async fn list(&self, user_id: i64, completed: Option<bool>) -> Result<Vec<Reminder>>;

    async fn update(&self, reminder: &Reminder) -> Result<Reminder>;

    async fn delete(&self, user_id: i64, id: i64) -> Result<bool>;

    async fn count(&self) -> Result<i64>;
}

/// SQLx-based reminder repository implementation
pub struct SqlxReminderRepository {
    pool: DynDatabasePool,
}

impl SqlxReminderRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ReminderRepository> {
        Arc::new(Self::new(pool))
    }
}

macro_rules! row_to_reminder {
    ($row:expr) => {
        Reminder {
            id: $row.get("id"),
            user_id: $row.get("user_id"),
            site_id: $row.get("site_id"),
            title: $row.get("title"),
            note: $row.get("note"),
            due_at: $row.get("due_at"),
            completed: $row.get("completed"),
            completed_at: $row.get("completed_at"),
            created_at: $row.get("created_at"),
        }
    };
}

#[async_trait]
impl ReminderRepository for SqlxReminderRepository {
    async fn create(&self, reminder: &Reminder) -> Result<Reminder> {
        const SQL: &str = "INSERT INTO reminders \
             (user_id, site_id, title, note, due_at, completed, completed_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)";
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .bind(reminder.user_id)
                .bind(reminder.site_id)
                .bind(&reminder.title)
                .bind(&reminder.note)
                .bind(reminder.due_at)
                .bind(reminder.completed)
                .bind(reminder.completed_at)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.last_insert_rowid()),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .bind(reminder.user_id)
                .bind(reminder.site_id)
                .bind(&reminder.title)
                .bind(&reminder.note)
                .bind(reminder.due_at)
                .bind(reminder.completed)
                .bind(reminder.completed_at)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create reminder")?;

        Ok(Reminder {
            id,
            created_at: now,
            ..reminder.clone()
        })
    }

    async fn get_by_id(&self, user_id: i64, id: i64) -> Result<Option<Reminder>> {
        let sql = format!(
            "SELECT {} FROM reminders WHERE id = ? AND user_id = ?",
            REMINDER_COLUMNS
        );
        let reminder = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(id)
                .bind(user_id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get reminder")?
                .map(|row| row_to_reminder!(row)),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(id)
                .bind(user_id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get reminder")?
                .map(|row| row_to_reminder!(row)),
        };
        Ok(reminder)
    }

    async fn list(&self, user_id: i64, completed: Option<bool>) -> Result<Vec<Reminder>> {
        let state_filter = match completed {
            Some(true) => " AND completed = 1",
            Some(false) => " AND completed = 0",
            None => "",
        };
        let sql = format!(
            "SELECT {} FROM reminders WHERE user_id = ?{} ORDER BY due_at, id",
            REMINDER_COLUMNS, state_filter
        );
        let reminders = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(user_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list reminders")?
                .iter()
                .map(|row| row_to_reminder!(row))
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(user_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list reminders")?
                .iter()
                .map(|row| row_to_reminder!(row))
                .collect(),
        };
        Ok(reminders)
    }

    async fn update(&self, reminder: &Reminder) -> Result<Reminder> {
        const SQL: &str = "UPDATE reminders SET site_id = ?, title = ?, note = ?, due_at = ?, \
             completed = ?, completed_at = ? WHERE id = ? AND user_id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .bind(reminder.site_id)
                .bind(&reminder.title)
                .bind(&reminder.note)
                .bind(reminder.due_at)
                .bind(reminder.completed)
                .bind(reminder.completed_at)
                .bind(reminder.id)
                .bind(reminder.user_id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|_| ()),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .bind(reminder.site_id)
                .bind(&reminder.title)
                .bind(&reminder.note)
                .bind(reminder.due_at)
                .bind(reminder.completed)
                .bind(reminder.completed_at)
                .bind(reminder.id)
                .bind(reminder.user_id)
                .execute(self.pool.mysql()?)
                .await
                .map(|_| ()),
        }
        .context("Failed to update reminder")?;

        Ok(reminder.clone())
    }

    async fn delete(&self, user_id: i64, id: i64) -> Result<bool> {
        const SQL: &str = "DELETE FROM reminders WHERE id = ? AND user_id = ?";
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
        .context("Failed to delete reminder")
    }

    async fn count(&self) -> Result<i64> {
        const SQL: &str = "SELECT COUNT(*) as count FROM reminders";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count reminders")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count reminders")?
                .get("count"),
        };
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;
    use chrono::{DateTime, Duration};

    async fn setup_test_repo() -> (SqlxReminderRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user = SqlxUserRepository::new(pool.clone())
            .create(&User::new("rem@example.com", None, None))
            .await
            .unwrap();
        (SqlxReminderRepository::new(pool), user.id)
    }

    fn reminder(user_id: i64, title: &str, due_at: DateTime<Utc>) -> Reminder {
        Reminder {
            id: 0,
            user_id,
            site_id: None,
            title: title.to_string(),
            note: None,
            due_at,
            completed: false,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_reminder_lifecycle() {
        let (repo, user_id) = setup_test_repo().await;
        let now = Utc::now();

        let mut created = repo.create(&reminder(user_id, "Backup", now)).await.unwrap();
        assert!(created.id > 0);

        created.completed = true;
        created.completed_at = Some(now);
        repo.update(&created).await.unwrap();

        let fetched = repo.get_by_id(user_id, created.id).await.unwrap().unwrap();
        assert!(fetched.completed);
        assert!(fetched.completed_at.is_some());
        assert!(repo.get_by_id(user_id + 1, created.id).await.unwrap().is_none());

        assert!(repo.delete(user_id, created.id).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_by_state_ordered_by_due_date() {
        let (repo, user_id) = setup_test_repo().await;
        let now = Utc::now();

        repo.create(&reminder(user_id, "Later", now + Duration::days(2))).await.unwrap();
        repo.create(&reminder(user_id, "Soon", now + Duration::hours(1))).await.unwrap();
        let mut done = reminder(user_id, "Done", now);
        done.completed = true;
        repo.create(&done).await.unwrap();

        let open: Vec<String> = repo
            .list(user_id, Some(false))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(open, vec!["Soon", "Later"]);

        assert_eq!(repo.list(user_id, Some(true)).await.unwrap().len(), 1);
        assert_eq!(repo.list(user_id, None).await.unwrap().len(), 3);
    }
}
