//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They:
//! - Enforce business rules and validation
//! - Scope every query to the owning user
//! - Keep the category cache coherent with writes

pub mod admin;
pub mod category;
pub mod email;
pub mod magic_link;
pub mod password;
pub mod rate_limiter;
pub mod reminder;
pub mod site;
pub mod token;
pub mod user;

pub use admin::{AdminService, AdminServiceError, GeneratedKey, RequestStats, SystemStats};
pub use category::{CategoryService, CategoryServiceError};
pub use email::{create_mailer, LogMailer, Mailer, OutgoingEmail, SmtpMailer};
pub use magic_link::{MagicLinkError, MagicLinkService};
pub use password::{hash_password, verify_password};
pub use rate_limiter::AuthRateLimiter;
pub use reminder::{ReminderService, ReminderServiceError};
pub use site::{SiteService, SiteServiceError};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
