//! Site service
//!
//! Implements business logic for bookmarks:
//! - URL validation and per-user uniqueness
//! - Tag normalization and rating bounds
//! - Category/subcategory ownership checks
//! - Revisit reminder scheduling (`due`, `mark_checked`)

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{
    CategoryRepository, SiteRepository, SqlxCategoryRepository, SqlxSiteRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{
    CreateSiteInput, ListParams, PagedResult, Site, SiteFilter, UpdateSiteInput,
    DEFAULT_REMINDER_INTERVAL_DAYS,
};
use crate::services::category::tree_cache_key;
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Longest URL accepted (the column is VARCHAR(700))
pub const MAX_URL_LENGTH: usize = 700;
/// Most tags a site may carry
pub const MAX_TAGS: usize = 20;
const MAX_TAG_LENGTH: usize = 50;
const MAX_TITLE_LENGTH: usize = 300;

/// Error types for site service operations
#[derive(Debug, thiserror::Error)]
pub enum SiteServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The user already saved this URL
    #[error("Site already saved: {0}")]
    DuplicateUrl(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Site service for managing a user's bookmarks
pub struct SiteService {
    repo: Arc<dyn SiteRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    cache: Arc<Cache>,
}

impl SiteService {
    pub fn new(
        repo: Arc<dyn SiteRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            repo,
            category_repo,
            cache,
        }
    }

    pub fn from_pool(pool: &DynDatabasePool, cache: Arc<Cache>) -> Self {
        Self::new(
            SqlxSiteRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
            cache,
        )
    }

    /// Save a new site.
    ///
    /// # Errors
    /// - `ValidationError` for a bad URL, rating, tag list or interval, or a
    ///   subcategory outside the chosen category
    /// - `NotFound` if the category or subcategory is not the user's
    /// - `DuplicateUrl` if the user already saved the URL
    pub async fn create(&self, user_id: i64, input: CreateSiteInput) -> Result<Site, SiteServiceError> {
        let url = validate_url(&input.url)?;
        if self.repo.get_by_url(user_id, &url).await?.is_some() {
            return Err(SiteServiceError::DuplicateUrl(url));
        }

        let (category_id, subcategory_id) = self
            .check_placement(user_id, input.category_id, input.subcategory_id)
            .await?;
        let interval = validate_interval(input.reminder_interval_days)?;
        let now = Utc::now();

        let title = match clean_optional(input.title) {
            Some(title) => validate_title(title)?,
            None => host_of(&url).to_string(),
        };

        let site = Site {
            id: 0,
            user_id,
            title,
            description: clean_optional(input.description),
            category_id,
            subcategory_id,
            tags: normalize_tags(&input.tags)?,
            rating: validate_rating(input.rating)?,
            status: input.status.unwrap_or_default(),
            reminder_enabled: input.reminder_enabled,
            reminder_interval_days: interval,
            next_check: input.reminder_enabled.then(|| now + Duration::days(interval as i64)),
            last_checked: None,
            created_at: now,
            updated_at: now,
            url,
        };

        let created = self.repo.create(&site).await.context("Failed to create site")?;
        self.invalidate_tree(user_id).await;
        Ok(created)
    }

    pub async fn get(&self, user_id: i64, id: i64) -> Result<Site, SiteServiceError> {
        self.repo
            .get_by_id(user_id, id)
            .await
            .context("Failed to get site")?
            .ok_or_else(|| SiteServiceError::NotFound(format!("site {}", id)))
    }

    /// Apply a partial update. Enabling the reminder schedules the next
    /// check if none is pending; disabling it clears the schedule.
    pub async fn update(
        &self,
        user_id: i64,
        id: i64,
        input: UpdateSiteInput,
    ) -> Result<Site, SiteServiceError> {
        let mut site = self.get(user_id, id).await?;
        if !input.has_changes() {
            return Ok(site);
        }

        if let Some(url) = input.url {
            let url = validate_url(&url)?;
            if url != site.url {
                if let Some(existing) = self.repo.get_by_url(user_id, &url).await? {
                    if existing.id != id {
                        return Err(SiteServiceError::DuplicateUrl(url));
                    }
                }
            }
            site.url = url;
        }
        if let Some(title) = input.title {
            site.title = match clean_optional(Some(title)) {
                Some(title) => validate_title(title)?,
                None => host_of(&site.url).to_string(),
            };
        }
        if let Some(description) = input.description {
            site.description = clean_optional(description);
        }
        if input.category_id.is_some() || input.subcategory_id.is_some() {
            let category_id = input.category_id.unwrap_or(site.category_id);
            // Moving to another category drops a subcategory that no longer fits
            let subcategory_id = match input.subcategory_id {
                Some(subcategory_id) => subcategory_id,
                None if category_id == site.category_id => site.subcategory_id,
                None => None,
            };
            (site.category_id, site.subcategory_id) =
                self.check_placement(user_id, category_id, subcategory_id).await?;
        }
        if let Some(tags) = input.tags {
            site.tags = normalize_tags(&tags)?;
        }
        if let Some(rating) = input.rating {
            site.rating = validate_rating(rating)?;
        }
        if let Some(status) = input.status {
            site.status = status;
        }
        if let Some(days) = input.reminder_interval_days {
            site.reminder_interval_days = validate_interval(Some(days))?;
        }
        if let Some(enabled) = input.reminder_enabled {
            site.reminder_enabled = enabled;
        }
        schedule(&mut site, Utc::now());

        let updated = self.repo.update(&site).await.context("Failed to update site")?;
        self.invalidate_tree(user_id).await;
        Ok(updated)
    }

    pub async fn delete(&self, user_id: i64, id: i64) -> Result<(), SiteServiceError> {
        if !self.repo.delete(user_id, id).await.context("Failed to delete site")? {
            return Err(SiteServiceError::NotFound(format!("site {}", id)));
        }
        self.invalidate_tree(user_id).await;
        Ok(())
    }

    /// Filtered page of the user's sites, newest first
    pub async fn list(
        &self,
        user_id: i64,
        mut filter: SiteFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Site>, SiteServiceError> {
        filter.tag = filter.tag.as_deref().map(normalize_tag).filter(|t| !t.is_empty());
        filter.q = clean_optional(filter.q);

        let (items, total) = self
            .repo
            .list(user_id, &filter, params)
            .await
            .context("Failed to list sites")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Enabled reminders with `next_check <= now`, soonest first
    pub async fn due(&self, user_id: i64, now: DateTime<Utc>) -> Result<Vec<Site>, SiteServiceError> {
        Ok(self.repo.due(user_id, now).await.context("Failed to list due sites")?)
    }

    /// Record a revisit: `last_checked` becomes now and, while the reminder
    /// is enabled, the next check moves one interval ahead.
    pub async fn mark_checked(&self, user_id: i64, id: i64) -> Result<Site, SiteServiceError> {
        let mut site = self.get(user_id, id).await?;
        let now = Utc::now();
        site.last_checked = Some(now);
        if site.reminder_enabled {
            site.next_check = Some(now + Duration::days(site.reminder_interval_days as i64));
        }
        Ok(self.repo.update(&site).await.context("Failed to update site")?)
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    /// Resolve the category/subcategory pair for a site owned by `user_id`.
    /// A lone subcategory implies its category.
    async fn check_placement(
        &self,
        user_id: i64,
        category_id: Option<i64>,
        subcategory_id: Option<i64>,
    ) -> Result<(Option<i64>, Option<i64>), SiteServiceError> {
        if let Some(category_id) = category_id {
            if self.category_repo.get_by_id(user_id, category_id).await?.is_none() {
                return Err(SiteServiceError::NotFound(format!("category {}", category_id)));
            }
        }

        let Some(subcategory_id) = subcategory_id else {
            return Ok((category_id, None));
        };
        let subcategory = self
            .category_repo
            .get_subcategory(user_id, subcategory_id)
            .await?
            .ok_or_else(|| SiteServiceError::NotFound(format!("subcategory {}", subcategory_id)))?;

        match category_id {
            Some(category_id) if category_id != subcategory.category_id => Err(
                SiteServiceError::ValidationError("Subcategory does not belong to the category".to_string()),
            ),
            _ => Ok((Some(subcategory.category_id), Some(subcategory.id))),
        }
    }

    async fn invalidate_tree(&self, user_id: i64) {
        if let Err(e) = self.cache.delete(&tree_cache_key(user_id)).await {
            tracing::warn!("Failed to invalidate category cache: {:#}", e);
        }
    }
}

/// Keep `next_check` consistent with the reminder flag
fn schedule(site: &mut Site, now: DateTime<Utc>) {
    if !site.reminder_enabled {
        site.next_check = None;
    } else if site.next_check.is_none() {
        site.next_check = Some(now + Duration::days(site.reminder_interval_days as i64));
    }
}

/// Trim and check a URL: `http` or `https` with a non-empty host
pub fn validate_url(raw: &str) -> Result<String, SiteServiceError> {
    let url = raw.trim();
    let invalid = || SiteServiceError::ValidationError("URL must be an absolute http(s) URL".to_string());

    if url.len() > MAX_URL_LENGTH {
        return Err(SiteServiceError::ValidationError(format!(
            "URL cannot exceed {} characters",
            MAX_URL_LENGTH
        )));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let (scheme, rest) = url.split_once("://").ok_or_else(invalid)?;
    if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
        return Err(invalid());
    }

    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = if host_port.starts_with('[') {
        host_port.split_once(']').map_or("", |(h, _)| h.trim_start_matches('['))
    } else {
        host_port.split(':').next().unwrap_or_default()
    };
    if host.is_empty() {
        return Err(invalid());
    }

    Ok(url.to_string())
}

/// Host part of an already validated URL, used as a fallback title
fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    authority.rsplit_once('@').map_or(authority, |(_, h)| h)
}

fn normalize_tag(tag: &str) -> String {
    tag.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Trim, lowercase and dedupe tags, keeping first-seen order
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>, SiteServiceError> {
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags.iter().map(|t| normalize_tag(t)).filter(|t| !t.is_empty()) {
        if tag.chars().count() > MAX_TAG_LENGTH {
            return Err(SiteServiceError::ValidationError(format!(
                "Tags cannot exceed {} characters",
                MAX_TAG_LENGTH
            )));
        }
        if !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }

    if normalized.len() > MAX_TAGS {
        return Err(SiteServiceError::ValidationError(format!(
            "A site can have at most {} tags",
            MAX_TAGS
        )));
    }
    Ok(normalized)
}

pub fn validate_rating(rating: Option<i32>) -> Result<Option<i32>, SiteServiceError> {
    match rating {
        Some(r) if !(1..=5).contains(&r) => Err(SiteServiceError::ValidationError(
            "Rating must be between 1 and 5".to_string(),
        )),
        other => Ok(other),
    }
}

fn validate_interval(days: Option<i32>) -> Result<i32, SiteServiceError> {
    let days = days.unwrap_or(DEFAULT_REMINDER_INTERVAL_DAYS);
    if !(1..=365).contains(&days) {
        return Err(SiteServiceError::ValidationError(
            "Reminder interval must be between 1 and 365 days".to_string(),
        ));
    }
    Ok(days)
}

fn validate_title(title: String) -> Result<String, SiteServiceError> {
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(SiteServiceError::ValidationError(format!(
            "Title cannot exceed {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(title)
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Category, SiteStatus, Subcategory, User};
    use proptest::prelude::*;

    struct Fixture {
        pool: DynDatabasePool,
        service: SiteService,
        user_id: i64,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user = SqlxUserRepository::new(pool.clone())
            .create(&User::new("sites@example.com", None, None))
            .await
            .unwrap();
        let service = SiteService::from_pool(&pool, create_cache(&CacheConfig::default()));
        Fixture {
            pool,
            service,
            user_id: user.id,
        }
    }

    async fn category(pool: &DynDatabasePool, user_id: i64, name: &str) -> Category {
        SqlxCategoryRepository::new(pool.clone())
            .create(&Category::new(user_id, name.to_string(), None, 0))
            .await
            .unwrap()
    }

    async fn subcategory(pool: &DynDatabasePool, category_id: i64, name: &str) -> Subcategory {
        SqlxCategoryRepository::new(pool.clone())
            .create_subcategory(&Subcategory {
                id: 0,
                category_id,
                name: name.to_string(),
                sort_order: 0,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    fn input(url: &str) -> CreateSiteInput {
        CreateSiteInput {
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_defaults() {
        let f = setup().await;
        let site = f
            .service
            .create(f.user_id, CreateSiteInput {
                tags: vec![" Rust ".to_string(), "rust".to_string(), "".to_string(), "Web  Dev".to_string()],
                ..input("  https://docs.rs/tokio  ")
            })
            .await
            .unwrap();

        assert_eq!(site.url, "https://docs.rs/tokio");
        assert_eq!(site.title, "docs.rs");
        assert_eq!(site.tags, vec!["rust", "web dev"]);
        assert_eq!(site.status, SiteStatus::Active);
        assert!(!site.reminder_enabled);
        assert!(site.next_check.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_url_rejected_per_user() {
        let f = setup().await;
        f.service.create(f.user_id, input("https://example.com")).await.unwrap();

        let duplicate = f.service.create(f.user_id, input("https://example.com")).await;
        assert!(matches!(duplicate, Err(SiteServiceError::DuplicateUrl(_))));

        let other = SqlxUserRepository::new(f.pool.clone())
            .create(&User::new("other@example.com", None, None))
            .await
            .unwrap();
        assert!(f.service.create(other.id, input("https://example.com")).await.is_ok());
    }

    #[tokio::test]
    async fn test_rating_bounds() {
        let f = setup().await;
        for rating in [0, 6, -1] {
            let result = f
                .service
                .create(f.user_id, CreateSiteInput {
                    rating: Some(rating),
                    ..input("https://rated.example")
                })
                .await;
            assert!(matches!(result, Err(SiteServiceError::ValidationError(_))));
        }

        let site = f
            .service
            .create(f.user_id, CreateSiteInput {
                rating: Some(5),
                ..input("https://rated.example")
            })
            .await
            .unwrap();
        assert_eq!(site.rating, Some(5));

        let cleared = f
            .service
            .update(f.user_id, site.id, UpdateSiteInput {
                rating: Some(None),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(cleared.rating, None);
    }

    #[tokio::test]
    async fn test_placement_checks() {
        let f = setup().await;
        let dev = category(&f.pool, f.user_id, "Dev").await;
        let news = category(&f.pool, f.user_id, "News").await;
        let rust = subcategory(&f.pool, dev.id, "Rust").await;

        // Lone subcategory implies its category
        let site = f
            .service
            .create(f.user_id, CreateSiteInput {
                subcategory_id: Some(rust.id),
                ..input("https://a.example")
            })
            .await
            .unwrap();
        assert_eq!(site.category_id, Some(dev.id));
        assert_eq!(site.subcategory_id, Some(rust.id));

        let mismatch = f
            .service
            .create(f.user_id, CreateSiteInput {
                category_id: Some(news.id),
                subcategory_id: Some(rust.id),
                ..input("https://b.example")
            })
            .await;
        assert!(matches!(mismatch, Err(SiteServiceError::ValidationError(_))));

        // Moving category drops the old subcategory
        let moved = f
            .service
            .update(f.user_id, site.id, UpdateSiteInput {
                category_id: Some(Some(news.id)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(moved.category_id, Some(news.id));
        assert_eq!(moved.subcategory_id, None);
    }

    #[tokio::test]
    async fn test_foreign_category_is_not_found() {
        let f = setup().await;
        let other = SqlxUserRepository::new(f.pool.clone())
            .create(&User::new("other@example.com", None, None))
            .await
            .unwrap();
        let theirs = category(&f.pool, other.id, "Theirs").await;

        let result = f
            .service
            .create(f.user_id, CreateSiteInput {
                category_id: Some(theirs.id),
                ..input("https://a.example")
            })
            .await;
        assert!(matches!(result, Err(SiteServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reminder_scheduling() {
        let f = setup().await;
        let before = Utc::now();
        let site = f
            .service
            .create(f.user_id, CreateSiteInput {
                reminder_enabled: true,
                reminder_interval_days: Some(3),
                ..input("https://remind.example")
            })
            .await
            .unwrap();
        let next = site.next_check.unwrap();
        assert!(next >= before + Duration::days(3));
        assert!(next <= Utc::now() + Duration::days(3));

        let off = f
            .service
            .update(f.user_id, site.id, UpdateSiteInput {
                reminder_enabled: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(off.next_check.is_none());

        let bad = f
            .service
            .update(f.user_id, site.id, UpdateSiteInput {
                reminder_interval_days: Some(366),
                ..Default::default()
            })
            .await;
        assert!(matches!(bad, Err(SiteServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_due_and_mark_checked() {
        let f = setup().await;
        let due = f
            .service
            .create(f.user_id, CreateSiteInput {
                reminder_enabled: true,
                reminder_interval_days: Some(1),
                ..input("https://due.example")
            })
            .await
            .unwrap();
        f.service
            .create(f.user_id, CreateSiteInput {
                reminder_enabled: true,
                reminder_interval_days: Some(30),
                ..input("https://later.example")
            })
            .await
            .unwrap();
        f.service.create(f.user_id, input("https://never.example")).await.unwrap();

        let in_two_days = Utc::now() + Duration::days(2);
        let listed = f.service.due(f.user_id, in_two_days).await.unwrap();
        assert_eq!(listed.iter().map(|s| s.id).collect::<Vec<_>>(), vec![due.id]);
        assert!(listed.iter().all(|s| s.is_due(in_two_days)));

        let checked = f.service.mark_checked(f.user_id, due.id).await.unwrap();
        assert!(checked.last_checked.is_some());
        assert!(checked.next_check.unwrap() > due.next_check.unwrap());
        assert!(f.service.due(f.user_id, Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_by_normalized_tag() {
        let f = setup().await;
        f.service
            .create(f.user_id, CreateSiteInput {
                tags: vec!["Rust".to_string()],
                ..input("https://one.example")
            })
            .await
            .unwrap();
        f.service.create(f.user_id, input("https://two.example")).await.unwrap();

        let filter = SiteFilter {
            tag: Some("  RUST ".to_string()),
            ..Default::default()
        };
        let page = f.service.list(f.user_id, filter, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].url, "https://one.example");

        let all = f
            .service
            .list(f.user_id, SiteFilter::default(), &ListParams::new(1, 1))
            .await
            .unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.items.len(), 1);
        assert!(all.has_next());
    }

    #[tokio::test]
    async fn test_delete_and_missing() {
        let f = setup().await;
        let site = f.service.create(f.user_id, input("https://gone.example")).await.unwrap();
        f.service.delete(f.user_id, site.id).await.unwrap();
        assert!(matches!(
            f.service.get(f.user_id, site.id).await,
            Err(SiteServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.delete(f.user_id, site.id).await,
            Err(SiteServiceError::NotFound(_))
        ));
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("HTTP://example.com:8080/path?q=1#x").is_ok());
        assert!(validate_url("https://user:pw@example.com/").is_ok());
        assert!(validate_url("https://[::1]:3000/").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("example.com").is_err());
        assert!(validate_url("https://").is_err());
        assert!(validate_url("https:///path").is_err());
        assert!(validate_url("https://exa mple.com").is_err());
        assert!(validate_url(&format!("https://example.com/{}", "a".repeat(700))).is_err());
    }

    #[test]
    fn test_too_many_tags() {
        let tags: Vec<String> = (0..21).map(|i| format!("tag{}", i)).collect();
        assert!(normalize_tags(&tags).is_err());
        assert_eq!(normalize_tags(&tags[..20]).unwrap().len(), 20);
    }

    proptest! {
        #[test]
        fn prop_normalized_tags_are_clean(tags in proptest::collection::vec("[ a-zA-Z]{0,8}", 0..20)) {
            let normalized = normalize_tags(&tags).unwrap();
            for tag in &normalized {
                prop_assert!(!tag.is_empty());
                prop_assert_eq!(tag, &tag.to_lowercase());
                prop_assert_eq!(tag.trim(), tag.as_str());
            }
            let mut deduped = normalized.clone();
            deduped.sort();
            deduped.dedup();
            prop_assert_eq!(deduped.len(), normalized.len());
        }

        #[test]
        fn prop_rating_accepts_only_one_to_five(rating in -10i32..20) {
            prop_assert_eq!(validate_rating(Some(rating)).is_ok(), (1..=5).contains(&rating));
        }
    }
}
