//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one entity.

pub mod account;
pub mod api_key;
pub mod auth_log;
pub mod category;
pub mod magic_link;
pub mod reminder;
pub mod session;
pub mod site;
pub mod user;

pub use account::{AccountRepository, SqlxAccountRepository};
pub use api_key::{ApiKeyRepository, SqlxApiKeyRepository};
pub use auth_log::{AuthLogRepository, SqlxAuthLogRepository};
pub use category::{CategoryRepository, SiteCounts, SqlxCategoryRepository};
pub use magic_link::{MagicLinkRepository, SqlxMagicLinkRepository};
pub use reminder::{ReminderRepository, SqlxReminderRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use site::{SiteRepository, SqlxSiteRepository};
pub use user::{SqlxUserRepository, UserRepository};
