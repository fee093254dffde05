//! Category model
//!
//! Categories are owned by a single user and hold one level of
//! subcategories. A subcategory can pin sites in a fixed order through
//! `SubcategoryItem` rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level grouping of a user's sites
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    /// Unique identifier
    pub id: i64,
    /// Owner
    pub user_id: i64,
    /// Category name (unique per user)
    pub name: String,
    /// Category description
    pub description: Option<String>,
    /// Display position
    pub sort_order: i32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn new(user_id: i64, name: String, description: Option<String>, sort_order: i32) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            user_id,
            name,
            description,
            sort_order,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Second-level grouping inside a category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subcategory {
    pub id: i64,
    pub category_id: i64,
    /// Name (unique within the category)
    pub name: String,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

/// A site placed into a subcategory at a given position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubcategoryItem {
    pub id: i64,
    pub subcategory_id: i64,
    pub site_id: i64,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// Subcategory with the number of sites filed under it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubcategoryNode {
    #[serde(flatten)]
    pub subcategory: Subcategory,
    pub site_count: i64,
}

/// Category with nested subcategories, as returned by `GET /api/categories`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTree {
    #[serde(flatten)]
    pub category: Category,
    pub site_count: i64,
    pub subcategories: Vec<SubcategoryNode>,
}

impl CategoryTree {
    pub fn find_subcategory(&self, id: i64) -> Option<&Subcategory> {
        self.subcategories
            .iter()
            .map(|node| &node.subcategory)
            .find(|s| s.id == id)
    }
}

/// Input for creating a category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCategoryInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i32>,
}

/// Input for updating a category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCategoryInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i32>,
}

impl UpdateCategoryInput {
    pub fn has_changes(&self) -> bool {
        self.name.is_some() || self.description.is_some() || self.sort_order.is_some()
    }
}

/// Input for creating or renaming a subcategory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubcategoryInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i32>,
}

/// Input for placing a site into a subcategory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddItemInput {
    pub site_id: i64,
    /// Appended after the last item when omitted
    #[serde(default)]
    pub position: Option<i32>,
}
