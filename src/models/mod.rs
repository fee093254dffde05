//! Data models
//!
//! Database entities (User, Account, Session, Category, Subcategory, Site,
//! Reminder, MagicLinkToken, ApiKey, AuthLog) and the request inputs built
//! from them.

mod auth;
mod category;
mod reminder;
mod session;
mod site;
mod user;

pub use auth::{AdminStats, ApiKey, AuthEvent, AuthLog, ClientInfo, MagicLinkToken};
pub use category::{
    AddItemInput, Category, CategoryTree, CreateCategoryInput, Subcategory, SubcategoryInput,
    SubcategoryItem, SubcategoryNode, UpdateCategoryInput,
};
pub use reminder::{CreateReminderInput, Reminder, UpdateReminderInput};
pub use session::Session;
pub use site::{
    CreateSiteInput, ListParams, PagedResult, Site, SiteFilter, SiteStatus, UpdateSiteInput,
    DEFAULT_REMINDER_INTERVAL_DAYS,
};
pub use user::{normalize_email, Account, AccountProvider, Plan, User};
