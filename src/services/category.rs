//! Category service
//!
//! Implements business logic for a user's categories:
//! - Create, update, delete categories and their subcategories
//! - Name uniqueness (per user for categories, per category for subcategories)
//! - Placing sites into subcategories at a position
//! - The cached category tree with site counts

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{
    CategoryRepository, SiteRepository, SqlxCategoryRepository, SqlxSiteRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{
    AddItemInput, Category, CategoryTree, CreateCategoryInput, Subcategory, SubcategoryInput,
    SubcategoryItem, SubcategoryNode, UpdateCategoryInput,
};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

const MAX_NAME_LENGTH: usize = 100;

/// Cache key of a user's category tree
pub fn tree_cache_key(user_id: i64) -> String {
    format!("categories:{}", user_id)
}

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    /// Name already used by a sibling
    #[error("Name already exists: {0}")]
    DuplicateName(String),

    /// Site already placed in the subcategory
    #[error("Site {0} is already in this subcategory")]
    DuplicateItem(i64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Category service for managing a user's categories
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    site_repo: Arc<dyn SiteRepository>,
    cache: Arc<Cache>,
}

impl CategoryService {
    pub fn new(
        repo: Arc<dyn CategoryRepository>,
        site_repo: Arc<dyn SiteRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            repo,
            site_repo,
            cache,
        }
    }

    pub fn from_pool(pool: &DynDatabasePool, cache: Arc<Cache>) -> Self {
        Self::new(
            SqlxCategoryRepository::boxed(pool.clone()),
            SqlxSiteRepository::boxed(pool.clone()),
            cache,
        )
    }

    /// Categories with nested subcategories and site counts, ordered by
    /// `sort_order`. Served from cache until the next write.
    pub async fn tree(&self, user_id: i64) -> Result<Vec<CategoryTree>, CategoryServiceError> {
        let key = tree_cache_key(user_id);
        if let Some(tree) = self.cache.get::<Vec<CategoryTree>>(&key).await.ok().flatten() {
            return Ok(tree);
        }

        let categories = self.repo.list_by_user(user_id).await.context("Failed to list categories")?;
        let subcategories = self
            .repo
            .list_subcategories(user_id)
            .await
            .context("Failed to list subcategories")?;
        let counts = self.repo.site_counts(user_id).await.context("Failed to count sites")?;

        let tree: Vec<CategoryTree> = categories
            .into_iter()
            .map(|category| {
                let subcategories = subcategories
                    .iter()
                    .filter(|s| s.category_id == category.id)
                    .map(|s| SubcategoryNode {
                        site_count: counts.by_subcategory.get(&s.id).copied().unwrap_or(0),
                        subcategory: s.clone(),
                    })
                    .collect();
                CategoryTree {
                    site_count: counts.by_category.get(&category.id).copied().unwrap_or(0),
                    category,
                    subcategories,
                }
            })
            .collect();

        if let Err(e) = self.cache.set(&key, &tree, self.cache.default_ttl()).await {
            tracing::warn!("Failed to cache category tree: {:#}", e);
        }
        Ok(tree)
    }

    /// Create a category.
    ///
    /// # Errors
    /// - `ValidationError` for an empty or overlong name
    /// - `DuplicateName` if the user already has a category with that name
    pub async fn create(
        &self,
        user_id: i64,
        input: CreateCategoryInput,
    ) -> Result<Category, CategoryServiceError> {
        let name = validate_name(&input.name)?;
        if self.repo.get_by_name(user_id, &name).await?.is_some() {
            return Err(CategoryServiceError::DuplicateName(name));
        }

        let category = Category::new(
            user_id,
            name,
            clean_optional(input.description),
            input.sort_order.unwrap_or(0),
        );
        let created = self.repo.create(&category).await.context("Failed to create category")?;

        self.invalidate(user_id).await;
        Ok(created)
    }

    pub async fn get(&self, user_id: i64, id: i64) -> Result<Category, CategoryServiceError> {
        self.repo
            .get_by_id(user_id, id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| CategoryServiceError::NotFound(format!("category {}", id)))
    }

    pub async fn update(
        &self,
        user_id: i64,
        id: i64,
        input: UpdateCategoryInput,
    ) -> Result<Category, CategoryServiceError> {
        let mut category = self.get(user_id, id).await?;
        if !input.has_changes() {
            return Ok(category);
        }

        if let Some(name) = input.name {
            let name = validate_name(&name)?;
            if name != category.name {
                if let Some(existing) = self.repo.get_by_name(user_id, &name).await? {
                    if existing.id != id {
                        return Err(CategoryServiceError::DuplicateName(name));
                    }
                }
            }
            category.name = name;
        }
        if let Some(description) = input.description {
            category.description = clean_optional(Some(description));
        }
        if let Some(sort_order) = input.sort_order {
            category.sort_order = sort_order;
        }

        let updated = self.repo.update(&category).await.context("Failed to update category")?;
        self.invalidate(user_id).await;
        Ok(updated)
    }

    /// Delete a category with its subcategories. Its sites stay, uncategorized.
    pub async fn delete(&self, user_id: i64, id: i64) -> Result<(), CategoryServiceError> {
        if !self.repo.delete(user_id, id).await.context("Failed to delete category")? {
            return Err(CategoryServiceError::NotFound(format!("category {}", id)));
        }
        self.invalidate(user_id).await;
        Ok(())
    }

    // ========================================================================
    // Subcategories
    // ========================================================================

    pub async fn create_subcategory(
        &self,
        user_id: i64,
        category_id: i64,
        input: SubcategoryInput,
    ) -> Result<Subcategory, CategoryServiceError> {
        let category = self.get(user_id, category_id).await?;
        let name = validate_name(input.name.as_deref().unwrap_or_default())?;
        if self.repo.get_subcategory_by_name(category.id, &name).await?.is_some() {
            return Err(CategoryServiceError::DuplicateName(name));
        }

        let subcategory = Subcategory {
            id: 0,
            category_id: category.id,
            name,
            sort_order: input.sort_order.unwrap_or(0),
            created_at: Utc::now(),
        };
        let created = self
            .repo
            .create_subcategory(&subcategory)
            .await
            .context("Failed to create subcategory")?;

        self.invalidate(user_id).await;
        Ok(created)
    }

    pub async fn get_subcategory(&self, user_id: i64, id: i64) -> Result<Subcategory, CategoryServiceError> {
        self.repo
            .get_subcategory(user_id, id)
            .await
            .context("Failed to get subcategory")?
            .ok_or_else(|| CategoryServiceError::NotFound(format!("subcategory {}", id)))
    }

    pub async fn update_subcategory(
        &self,
        user_id: i64,
        id: i64,
        input: SubcategoryInput,
    ) -> Result<Subcategory, CategoryServiceError> {
        let mut subcategory = self.get_subcategory(user_id, id).await?;

        if let Some(name) = input.name {
            let name = validate_name(&name)?;
            if name != subcategory.name {
                if let Some(existing) = self
                    .repo
                    .get_subcategory_by_name(subcategory.category_id, &name)
                    .await?
                {
                    if existing.id != id {
                        return Err(CategoryServiceError::DuplicateName(name));
                    }
                }
            }
            subcategory.name = name;
        }
        if let Some(sort_order) = input.sort_order {
            subcategory.sort_order = sort_order;
        }

        let updated = self
            .repo
            .update_subcategory(&subcategory)
            .await
            .context("Failed to update subcategory")?;
        self.invalidate(user_id).await;
        Ok(updated)
    }

    pub async fn delete_subcategory(&self, user_id: i64, id: i64) -> Result<(), CategoryServiceError> {
        let subcategory = self.get_subcategory(user_id, id).await?;
        self.repo
            .delete_subcategory(subcategory.id)
            .await
            .context("Failed to delete subcategory")?;
        self.invalidate(user_id).await;
        Ok(())
    }

    // ========================================================================
    // Subcategory items
    // ========================================================================

    pub async fn list_items(
        &self,
        user_id: i64,
        subcategory_id: i64,
    ) -> Result<Vec<SubcategoryItem>, CategoryServiceError> {
        let subcategory = self.get_subcategory(user_id, subcategory_id).await?;
        Ok(self
            .repo
            .list_items(subcategory.id)
            .await
            .context("Failed to list subcategory items")?)
    }

    /// Place one of the user's sites into a subcategory. Without a position
    /// the site goes after the current last item.
    pub async fn add_item(
        &self,
        user_id: i64,
        subcategory_id: i64,
        input: AddItemInput,
    ) -> Result<SubcategoryItem, CategoryServiceError> {
        let subcategory = self.get_subcategory(user_id, subcategory_id).await?;
        if self
            .site_repo
            .get_by_id(user_id, input.site_id)
            .await
            .context("Failed to get site")?
            .is_none()
        {
            return Err(CategoryServiceError::NotFound(format!("site {}", input.site_id)));
        }
        if self
            .repo
            .get_item_by_site(subcategory.id, input.site_id)
            .await?
            .is_some()
        {
            return Err(CategoryServiceError::DuplicateItem(input.site_id));
        }

        let position = match input.position {
            Some(position) if position < 0 => {
                return Err(CategoryServiceError::ValidationError(
                    "Position cannot be negative".to_string(),
                ))
            }
            Some(position) => position,
            None => self
                .repo
                .list_items(subcategory.id)
                .await?
                .iter()
                .map(|item| item.position + 1)
                .max()
                .unwrap_or(0),
        };

        let item = self
            .repo
            .add_item(subcategory.id, input.site_id, position)
            .await
            .context("Failed to add subcategory item")?;
        self.invalidate(user_id).await;
        Ok(item)
    }

    pub async fn delete_item(
        &self,
        user_id: i64,
        subcategory_id: i64,
        item_id: i64,
    ) -> Result<(), CategoryServiceError> {
        let subcategory = self.get_subcategory(user_id, subcategory_id).await?;
        if !self
            .repo
            .delete_item(subcategory.id, item_id)
            .await
            .context("Failed to delete subcategory item")?
        {
            return Err(CategoryServiceError::NotFound(format!("item {}", item_id)));
        }
        self.invalidate(user_id).await;
        Ok(())
    }

    /// Drop the cached tree of `user_id`
    pub async fn invalidate(&self, user_id: i64) {
        if let Err(e) = self.cache.delete(&tree_cache_key(user_id)).await {
            tracing::warn!("Failed to invalidate category cache: {:#}", e);
        }
    }
}

fn validate_name(name: &str) -> Result<String, CategoryServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CategoryServiceError::ValidationError("Name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(CategoryServiceError::ValidationError(format!(
            "Name cannot exceed {} characters",
            MAX_NAME_LENGTH
        )));
    }
    Ok(name.to_string())
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
