//! Reminder model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A dated to-do, optionally about one of the user's sites
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: i64,
    pub user_id: i64,
    pub site_id: Option<i64>,
    pub title: String,
    pub note: Option<String>,
    pub due_at: DateTime<Utc>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.due_at <= now
    }
}

/// Input for creating a reminder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReminderInput {
    pub title: String,
    #[serde(default)]
    pub note: Option<String>,
    pub due_at: DateTime<Utc>,
    #[serde(default)]
    pub site_id: Option<i64>,
}

/// Input for updating a reminder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateReminderInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    /// `null` unlinks the reminder from its site
    #[serde(default, deserialize_with = "super::site::double_option")]
    pub site_id: Option<Option<i64>>,
}
