//! Admin service
//!
//! Row counts for the dashboard, admin API keys and process statistics.
//! Admin identity comes from `auth.admin_emails`.

use crate::config::AuthConfig;
use crate::db::repositories::{
    ApiKeyRepository, CategoryRepository, ReminderRepository, SiteRepository,
    SqlxApiKeyRepository, SqlxCategoryRepository, SqlxReminderRepository, SqlxSiteRepository,
    SqlxUserRepository, UserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{AdminStats, ApiKey, User};
use crate::services::token::{constant_time_eq, generate_token, hash_token};
use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use sysinfo::{Pid, System};

/// Prefix of every admin API key
pub const API_KEY_PREFIX: &str = "ctk_";
const API_KEY_BYTES: usize = 32;
/// Hex characters of the key kept in clear for identification
const KEY_PREFIX_LEN: usize = 8;
const MAX_LABEL_LENGTH: usize = 100;

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Request Statistics
// ============================================================================

/// Request counters updated by the stats middleware (lock free)
pub struct RequestStats {
    total_requests: AtomicU64,
    total_response_time_us: AtomicU64,
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a request with its response time
    pub fn record(&self, duration_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Average response time in microseconds
    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.total_response_time_us.load(Ordering::Relaxed) as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Process and host statistics
#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub version: String,
    /// Resident memory of this process in bytes
    pub memory_bytes: u64,
    pub memory_formatted: String,
    pub system_total_memory: u64,
    pub system_used_memory: u64,
    pub os_name: String,
    pub uptime_seconds: u64,
    pub uptime_formatted: String,
    pub total_requests: u64,
    pub avg_response_time_ms: f64,
}

/// A freshly generated key. `key` is the only copy of the secret.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedKey {
    pub key: String,
    pub prefix: String,
    #[serde(flatten)]
    pub record: ApiKey,
}

#[derive(Debug, thiserror::Error)]
pub enum AdminServiceError {
    #[error("Admin access required")]
    Forbidden,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct AdminService {
    user_repo: Arc<dyn UserRepository>,
    site_repo: Arc<dyn SiteRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    reminder_repo: Arc<dyn ReminderRepository>,
    api_key_repo: Arc<dyn ApiKeyRepository>,
    request_stats: Arc<RequestStats>,
    auth: AuthConfig,
}

impl AdminService {
    pub fn new(pool: &DynDatabasePool, auth: AuthConfig, request_stats: Arc<RequestStats>) -> Self {
        Self {
            user_repo: SqlxUserRepository::boxed(pool.clone()),
            site_repo: SqlxSiteRepository::boxed(pool.clone()),
            category_repo: SqlxCategoryRepository::boxed(pool.clone()),
            reminder_repo: SqlxReminderRepository::boxed(pool.clone()),
            api_key_repo: SqlxApiKeyRepository::boxed(pool.clone()),
            request_stats,
            auth,
        }
    }

    pub fn is_admin(&self, user: &User) -> bool {
        self.auth.is_admin_email(&user.email)
    }

    /// Totals across all users. The four counts run concurrently and the
    /// first failure fails the whole call.
    pub async fn stats(&self) -> Result<AdminStats, AdminServiceError> {
        let (users, sites, categories, reminders) = futures::try_join!(
            self.user_repo.count(),
            self.site_repo.count(),
            self.category_repo.count(),
            self.reminder_repo.count(),
        )
        .context("Failed to collect admin statistics")?;

        Ok(AdminStats {
            users,
            sites,
            categories,
            reminders,
        })
    }

    /// Create an admin API key `ctk_<64 hex>` on behalf of `admin`.
    /// Only its digest and a short prefix are stored.
    pub async fn generate_key(
        &self,
        admin: &User,
        label: Option<String>,
    ) -> Result<GeneratedKey, AdminServiceError> {
        if !self.is_admin(admin) {
            return Err(AdminServiceError::Forbidden);
        }

        let label = label
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "Admin key".to_string());
        if label.chars().count() > MAX_LABEL_LENGTH {
            return Err(AdminServiceError::ValidationError(format!(
                "Label cannot exceed {} characters",
                MAX_LABEL_LENGTH
            )));
        }

        let secret = generate_token(API_KEY_BYTES);
        let prefix = secret[..KEY_PREFIX_LEN].to_string();
        let key = format!("{}{}", API_KEY_PREFIX, secret);

        let record = self
            .api_key_repo
            .create(&ApiKey {
                id: 0,
                label,
                key_prefix: prefix.clone(),
                key_hash: hash_token(&self.auth.secret, &key)?,
                created_by: Some(admin.id),
                created_at: Utc::now(),
            })
            .await
            .context("Failed to store API key")?;
        tracing::info!(admin_id = admin.id, key_id = record.id, "Generated admin API key");

        Ok(GeneratedKey { key, prefix, record })
    }

    pub async fn list_keys(&self) -> Result<Vec<ApiKey>, AdminServiceError> {
        Ok(self.api_key_repo.list().await.context("Failed to list API keys")?)
    }

    /// Look up the stored record of a plaintext key
    pub async fn verify_key(&self, key: &str) -> Result<Option<ApiKey>, AdminServiceError> {
        if !key.starts_with(API_KEY_PREFIX) {
            return Ok(None);
        }
        let digest = hash_token(&self.auth.secret, key)?;
        let record = self
            .api_key_repo
            .get_by_hash(&digest)
            .await
            .context("Failed to look up API key")?;
        Ok(record.filter(|r| constant_time_eq(&r.key_hash, &digest)))
    }

    /// Memory, uptime and request statistics of this process
    pub fn system_stats(&self) -> SystemStats {
        let mut sys = System::new_all();
        sys.refresh_all();

        let memory_bytes = sys
            .process(Pid::from_u32(std::process::id()))
            .map(|p| p.memory())
            .unwrap_or(0);
        let uptime_seconds = self.request_stats.uptime_seconds();

        SystemStats {
            version: APP_VERSION.to_string(),
            memory_bytes,
            memory_formatted: format_bytes(memory_bytes),
            system_total_memory: sys.total_memory(),
            system_used_memory: sys.used_memory(),
            os_name: System::name().unwrap_or_else(|| "Unknown".to_string()),
            uptime_seconds,
            uptime_formatted: format_uptime(uptime_seconds),
            total_requests: self.request_stats.total_requests(),
            avg_response_time_ms: self.request_stats.avg_response_time_us() / 1000.0,
        }
    }
}

fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match bytes {
        b if b >= GB => format!("{:.2} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.2} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.2} KB", b as f64 / KB as f64),
        b => format!("{} B", b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Category, CreateReminderInput};
    use crate::services::reminder::ReminderService;

    async fn setup() -> (DynDatabasePool, AdminService, User) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let admin = SqlxUserRepository::new(pool.clone())
            .create(&User::new("root@example.com", None, None))
            .await
            .unwrap();
        let auth = AuthConfig {
            admin_emails: vec!["ROOT@example.com".to_string()],
            ..Default::default()
        };
        let service = AdminService::new(&pool, auth, Arc::new(RequestStats::new()));
        (pool, service, admin)
    }

    #[tokio::test]
    async fn test_stats_counts_everything() {
        let (pool, service, admin) = setup().await;
        assert_eq!(
            service.stats().await.unwrap(),
            AdminStats {
                users: 1,
                ..Default::default()
            }
        );

        SqlxCategoryRepository::new(pool.clone())
            .create(&Category::new(admin.id, "Dev".to_string(), None, 0))
            .await
            .unwrap();
        ReminderService::from_pool(&pool)
            .create(admin.id, CreateReminderInput {
                title: "Audit".to_string(),
                note: None,
                due_at: Utc::now(),
                site_id: None,
            })
            .await
            .unwrap();

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.users, 1);
        assert_eq!(stats.categories, 1);
        assert_eq!(stats.reminders, 1);
        assert_eq!(stats.sites, 0);
    }

    #[tokio::test]
    async fn test_generate_and_verify_key() {
        let (_pool, service, admin) = setup().await;

        let generated = service.generate_key(&admin, Some(" CI ".to_string())).await.unwrap();
        assert!(generated.key.starts_with("ctk_"));
        assert_eq!(generated.key.len(), 4 + 64);
        assert_eq!(generated.prefix.len(), KEY_PREFIX_LEN);
        assert!(generated.key[4..].starts_with(&generated.prefix));
        assert_eq!(generated.record.label, "CI");
        assert_ne!(generated.record.key_hash, generated.key);

        let found = service.verify_key(&generated.key).await.unwrap().unwrap();
        assert_eq!(found.id, generated.record.id);
        assert!(service.verify_key("ctk_nope").await.unwrap().is_none());
        assert!(service.verify_key("plain").await.unwrap().is_none());

        let keys = service.list_keys().await.unwrap();
        assert_eq!(keys.len(), 1);
        let json = serde_json::to_value(&keys[0]).unwrap();
        assert!(json.get("key_hash").is_none());
    }

    #[tokio::test]
    async fn test_generate_key_requires_admin() {
        let (pool, service, _admin) = setup().await;
        let user = SqlxUserRepository::new(pool)
            .create(&User::new("user@example.com", None, None))
            .await
            .unwrap();

        assert!(matches!(
            service.generate_key(&user, None).await,
            Err(AdminServiceError::Forbidden)
        ));
    }

    #[test]
    fn test_request_stats() {
        let stats = RequestStats::new();
        assert_eq!(stats.avg_response_time_us(), 0.0);
        stats.record(1000);
        stats.record(3000);
        assert_eq!(stats.total_requests(), 2);
        assert_eq!(stats.avg_response_time_us(), 2000.0);
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(3 * 3600 + 5 * 60), "3h 5m");
        assert_eq!(format_uptime(2 * 86400 + 60), "2d 0h 1m");
    }
}
