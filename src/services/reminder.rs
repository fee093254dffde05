//! Reminder service
//!
//! Dated to-dos owned by a user, optionally pointing at one of their sites.

use crate::db::repositories::{
    ReminderRepository, SiteRepository, SqlxReminderRepository, SqlxSiteRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{CreateReminderInput, Reminder, UpdateReminderInput};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

const MAX_TITLE_LENGTH: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum ReminderServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ReminderService {
    repo: Arc<dyn ReminderRepository>,
    site_repo: Arc<dyn SiteRepository>,
}

impl ReminderService {
    pub fn new(repo: Arc<dyn ReminderRepository>, site_repo: Arc<dyn SiteRepository>) -> Self {
        Self { repo, site_repo }
    }

    pub fn from_pool(pool: &DynDatabasePool) -> Self {
        Self::new(
            SqlxReminderRepository::boxed(pool.clone()),
            SqlxSiteRepository::boxed(pool.clone()),
        )
    }

    pub async fn create(
        &self,
        user_id: i64,
        input: CreateReminderInput,
    ) -> Result<Reminder, ReminderServiceError> {
        let title = validate_title(&input.title)?;
        if let Some(site_id) = input.site_id {
            self.check_site(user_id, site_id).await?;
        }

        let reminder = Reminder {
            id: 0,
            user_id,
            site_id: input.site_id,
            title,
            note: clean_optional(input.note),
            due_at: input.due_at,
            completed: false,
            completed_at: None,
            created_at: Utc::now(),
        };
        Ok(self.repo.create(&reminder).await.context("Failed to create reminder")?)
    }

    pub async fn get(&self, user_id: i64, id: i64) -> Result<Reminder, ReminderServiceError> {
        self.repo
            .get_by_id(user_id, id)
            .await
            .context("Failed to get reminder")?
            .ok_or_else(|| ReminderServiceError::NotFound(format!("reminder {}", id)))
    }

    /// Reminders ordered by due date; `completed` narrows to open or done
    pub async fn list(
        &self,
        user_id: i64,
        completed: Option<bool>,
    ) -> Result<Vec<Reminder>, ReminderServiceError> {
        Ok(self
            .repo
            .list(user_id, completed)
            .await
            .context("Failed to list reminders")?)
    }

    pub async fn update(
        &self,
        user_id: i64,
        id: i64,
        input: UpdateReminderInput,
    ) -> Result<Reminder, ReminderServiceError> {
        let mut reminder = self.get(user_id, id).await?;

        if let Some(title) = input.title {
            reminder.title = validate_title(&title)?;
        }
        if let Some(note) = input.note {
            reminder.note = clean_optional(Some(note));
        }
        if let Some(due_at) = input.due_at {
            reminder.due_at = due_at;
        }
        if let Some(site_id) = input.site_id {
            if let Some(site_id) = site_id {
                self.check_site(user_id, site_id).await?;
            }
            reminder.site_id = site_id;
        }

        Ok(self.repo.update(&reminder).await.context("Failed to update reminder")?)
    }

    pub async fn delete(&self, user_id: i64, id: i64) -> Result<(), ReminderServiceError> {
        if !self.repo.delete(user_id, id).await.context("Failed to delete reminder")? {
            return Err(ReminderServiceError::NotFound(format!("reminder {}", id)));
        }
        Ok(())
    }

    /// Mark done. Completing twice keeps the first completion time.
    pub async fn complete(&self, user_id: i64, id: i64) -> Result<Reminder, ReminderServiceError> {
        let mut reminder = self.get(user_id, id).await?;
        if reminder.completed {
            return Ok(reminder);
        }
        reminder.completed = true;
        reminder.completed_at = Some(Utc::now());
        Ok(self.repo.update(&reminder).await.context("Failed to complete reminder")?)
    }

    pub async fn reopen(&self, user_id: i64, id: i64) -> Result<Reminder, ReminderServiceError> {
        let mut reminder = self.get(user_id, id).await?;
        reminder.completed = false;
        reminder.completed_at = None;
        Ok(self.repo.update(&reminder).await.context("Failed to reopen reminder")?)
    }

    async fn check_site(&self, user_id: i64, site_id: i64) -> Result<(), ReminderServiceError> {
        match self.site_repo.get_by_id(user_id, site_id).await? {
            Some(_) => Ok(()),
            None => Err(ReminderServiceError::NotFound(format!("site {}", site_id))),
        }
    }
}

fn validate_title(title: &str) -> Result<String, ReminderServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ReminderServiceError::ValidationError("Title cannot be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ReminderServiceError::ValidationError(format!(
            "Title cannot exceed {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(title.to_string())
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Site, SiteStatus, User, DEFAULT_REMINDER_INTERVAL_DAYS};
    use chrono::Duration;

    async fn setup() -> (DynDatabasePool, ReminderService, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user = SqlxUserRepository::new(pool.clone())
            .create(&User::new("todo@example.com", None, None))
            .await
            .unwrap();
        (pool.clone(), ReminderService::from_pool(&pool), user.id)
    }

    async fn insert_site(pool: &DynDatabasePool, user_id: i64) -> i64 {
        let now = Utc::now();
        SqlxSiteRepository::new(pool.clone())
            .create(&Site {
                id: 0,
                user_id,
                url: format!("https://u{}.example", user_id),
                title: "Site".to_string(),
                description: None,
                category_id: None,
                subcategory_id: None,
                tags: vec![],
                rating: None,
                status: SiteStatus::Active,
                reminder_enabled: false,
                reminder_interval_days: DEFAULT_REMINDER_INTERVAL_DAYS,
                next_check: None,
                last_checked: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
            .id
    }

    fn input(title: &str, days: i64) -> CreateReminderInput {
        CreateReminderInput {
            title: title.to_string(),
            note: None,
            due_at: Utc::now() + Duration::days(days),
            site_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_validates_title() {
        let (_pool, service, user_id) = setup().await;
        let result = service.create(user_id, input("   ", 1)).await;
        assert!(matches!(result, Err(ReminderServiceError::ValidationError(_))));

        let reminder = service.create(user_id, input(" Renew domain ", 1)).await.unwrap();
        assert_eq!(reminder.title, "Renew domain");
        assert!(!reminder.completed);
    }

    #[tokio::test]
    async fn test_complete_and_reopen() {
        let (_pool, service, user_id) = setup().await;
        let reminder = service.create(user_id, input("Read", 1)).await.unwrap();

        let done = service.complete(user_id, reminder.id).await.unwrap();
        assert!(done.completed);
        let completed_at = done.completed_at.unwrap();

        let again = service.complete(user_id, reminder.id).await.unwrap();
        assert_eq!(
            again.completed_at.map(|t| t.timestamp_millis()),
            Some(completed_at.timestamp_millis())
        );

        assert_eq!(service.list(user_id, Some(true)).await.unwrap().len(), 1);
        assert!(service.list(user_id, Some(false)).await.unwrap().is_empty());

        let open = service.reopen(user_id, reminder.id).await.unwrap();
        assert!(!open.completed);
        assert!(open.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_list_ordered_by_due_date() {
        let (_pool, service, user_id) = setup().await;
        service.create(user_id, input("later", 5)).await.unwrap();
        service.create(user_id, input("sooner", 1)).await.unwrap();

        let titles: Vec<String> = service
            .list(user_id, None)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["sooner", "later"]);
    }

    #[tokio::test]
    async fn test_site_link_must_be_owned() {
        let (pool, service, user_id) = setup().await;
        let other = SqlxUserRepository::new(pool.clone())
            .create(&User::new("other@example.com", None, None))
            .await
            .unwrap();
        let mine = insert_site(&pool, user_id).await;
        let theirs = insert_site(&pool, other.id).await;

        let linked = service
            .create(user_id, CreateReminderInput {
                site_id: Some(mine),
                ..input("Check site", 1)
            })
            .await
            .unwrap();
        assert_eq!(linked.site_id, Some(mine));

        let foreign = service
            .create(user_id, CreateReminderInput {
                site_id: Some(theirs),
                ..input("Sneaky", 1)
            })
            .await;
        assert!(matches!(foreign, Err(ReminderServiceError::NotFound(_))));

        let unlinked = service
            .update(user_id, linked.id, UpdateReminderInput {
                site_id: Some(None),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(unlinked.site_id, None);
        assert_eq!(service.get(user_id, linked.id).await.unwrap().site_id, None);

        let relinked = service
            .update(user_id, linked.id, UpdateReminderInput {
                site_id: Some(Some(mine)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(relinked.site_id, Some(mine));
    }

    #[tokio::test]
    async fn test_update_and_delete_are_scoped_to_owner() {
        let (pool, service, user_id) = setup().await;
        let other = SqlxUserRepository::new(pool)
            .create(&User::new("other@example.com", None, None))
            .await
            .unwrap();
        let reminder = service.create(user_id, input("Mine", 1)).await.unwrap();

        assert!(matches!(
            service.update(other.id, reminder.id, UpdateReminderInput::default()).await,
            Err(ReminderServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.delete(other.id, reminder.id).await,
            Err(ReminderServiceError::NotFound(_))
        ));

        let updated = service
            .update(user_id, reminder.id, UpdateReminderInput {
                title: Some("Still mine".to_string()),
                note: Some("with a note".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.title, "Still mine");
        assert_eq!(updated.note.as_deref(), Some("with a note"));

        service.delete(user_id, reminder.id).await.unwrap();
        assert!(service.list(user_id, None).await.unwrap().is_empty());
    }
}
