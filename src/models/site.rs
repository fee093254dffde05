//! Site (bookmark) model
//!
//! This module provides:
//! - `Site` entity, a saved URL with tags, rating and revisit reminder
//! - `SiteStatus` enum
//! - Input and filter types for the site endpoints
//! - Pagination types shared by list queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Default days between revisits when a reminder is enabled
pub const DEFAULT_REMINDER_INTERVAL_DAYS: i32 = 7;

/// Bookmark entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    /// Unique identifier
    pub id: i64,
    /// Owner
    pub user_id: i64,
    /// Absolute http(s) URL, unique per user
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    /// Normalized tags (lowercase, deduplicated)
    pub tags: Vec<String>,
    /// 1 to 5
    pub rating: Option<i32>,
    pub status: SiteStatus,
    /// Whether the site should be revisited periodically
    pub reminder_enabled: bool,
    pub reminder_interval_days: i32,
    /// When the next revisit is due
    pub next_check: Option<DateTime<Utc>>,
    /// When the site was last marked as checked
    pub last_checked: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Site {
    /// Whether the revisit reminder is due at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.reminder_enabled && self.next_check.is_some_and(|next| next <= now)
    }
}

/// Bookmark lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    #[default]
    Active,
    Archived,
    /// The URL no longer resolves
    Broken,
}

impl SiteStatus {
    /// Convert status to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStatus::Active => "active",
            SiteStatus::Archived => "archived",
            SiteStatus::Broken => "broken",
        }
    }

    /// Parse status from database string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(SiteStatus::Active),
            "archived" => Some(SiteStatus::Archived),
            "broken" => Some(SiteStatus::Broken),
            _ => None,
        }
    }
}

impl std::fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for creating a site
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSiteInput {
    pub url: String,
    /// Defaults to the URL host when empty
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub subcategory_id: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub rating: Option<i32>,
    #[serde(default)]
    pub status: Option<SiteStatus>,
    #[serde(default)]
    pub reminder_enabled: bool,
    #[serde(default)]
    pub reminder_interval_days: Option<i32>,
}

/// Input for updating a site.
///
/// Nullable columns use `Option<Option<T>>`: a missing key leaves the value
/// alone, an explicit `null` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSiteInput {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub category_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub subcategory_id: Option<Option<i64>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub rating: Option<Option<i32>>,
    #[serde(default)]
    pub status: Option<SiteStatus>,
    #[serde(default)]
    pub reminder_enabled: Option<bool>,
    #[serde(default)]
    pub reminder_interval_days: Option<i32>,
}

impl UpdateSiteInput {
    pub fn has_changes(&self) -> bool {
        self.url.is_some()
            || self.title.is_some()
            || self.description.is_some()
            || self.category_id.is_some()
            || self.subcategory_id.is_some()
            || self.tags.is_some()
            || self.rating.is_some()
            || self.status.is_some()
            || self.reminder_enabled.is_some()
            || self.reminder_interval_days.is_some()
    }
}

/// Distinguishes an explicit `null` (`Some(None)`) from a missing key
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Filters for `GET /api/sites`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteFilter {
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub status: Option<SiteStatus>,
    /// Exact (normalized) tag
    pub tag: Option<String>,
    /// Substring matched against title and URL
    pub q: Option<String>,
}

/// Pagination parameters for list queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 50,
        }
    }
}

impl ListParams {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 200),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Paginated result container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 {
            return 0;
        }
        (self.total.max(0) as u64).div_ceil(self.per_page as u64) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn site() -> Site {
        let now = Utc::now();
        Site {
            id: 1,
            user_id: 1,
            url: "https://example.com".to_string(),
            title: "Example".to_string(),
            description: None,
            category_id: None,
            subcategory_id: None,
            tags: vec![],
            rating: None,
            status: SiteStatus::Active,
            reminder_enabled: true,
            reminder_interval_days: DEFAULT_REMINDER_INTERVAL_DAYS,
            next_check: Some(now - Duration::hours(1)),
            last_checked: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        let mut s = site();
        assert!(s.is_due(now));

        s.next_check = Some(now + Duration::days(1));
        assert!(!s.is_due(now));

        s.next_check = Some(now - Duration::days(1));
        s.reminder_enabled = false;
        assert!(!s.is_due(now));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(SiteStatus::parse("Archived"), Some(SiteStatus::Archived));
        assert_eq!(SiteStatus::parse("broken"), Some(SiteStatus::Broken));
        assert_eq!(SiteStatus::parse("deleted"), None);
    }

    #[test]
    fn test_update_input_distinguishes_null_from_missing() {
        let input: UpdateSiteInput =
            serde_json::from_str(r#"{"category_id": null, "title": "New"}"#).unwrap();
        assert_eq!(input.category_id, Some(None));
        assert_eq!(input.rating, None);
        assert_eq!(input.title.as_deref(), Some("New"));
        assert!(input.has_changes());

        let input: UpdateSiteInput = serde_json::from_str(r#"{"rating": 4}"#).unwrap();
        assert_eq!(input.rating, Some(Some(4)));

        let empty: UpdateSiteInput = serde_json::from_str("{}").unwrap();
        assert!(!empty.has_changes());
    }

    #[test]
    fn test_list_params() {
        let params = ListParams::new(0, 1000);
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 200);
        assert_eq!(params.offset(), 0);

        let params = ListParams::new(3, 20);
        assert_eq!(params.offset(), 40);
        assert_eq!(params.limit(), 20);
    }

    #[test]
    fn test_paged_result_pages() {
        let params = ListParams::new(1, 10);
        let result: PagedResult<i32> = PagedResult::new(vec![1, 2], 25, &params);
        assert_eq!(result.total_pages(), 3);
        assert!(result.has_next());

        let empty: PagedResult<i32> = PagedResult::new(vec![], 0, &params);
        assert_eq!(empty.total_pages(), 0);
        assert!(!empty.has_next());
    }
}
