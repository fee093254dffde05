//! Category API endpoints
//!
//! - GET /api/categories - Category tree with site counts
//! - POST /api/categories - Create a category
//! - PUT/DELETE /api/categories/{id}
//! - POST /api/categories/{id}/subcategories - Create a subcategory
//! - PUT/DELETE /api/subcategories/{id}
//! - GET/POST /api/subcategories/{id}/items - Sites placed in a subcategory
//! - DELETE /api/subcategories/{id}/items/{item_id}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    AddItemInput, Category, CategoryTree, CreateCategoryInput, Subcategory, SubcategoryInput,
    SubcategoryItem, UpdateCategoryInput,
};

/// Response for category tree
#[derive(Debug, Serialize)]
pub struct CategoryTreeResponse {
    pub categories: Vec<CategoryTree>,
}

/// Build the category and subcategory router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(get_tree).post(create_category))
        .route("/categories/{id}", put(update_category).delete(delete_category))
        .route("/categories/{id}/subcategories", post(create_subcategory))
        .route(
            "/subcategories/{id}",
            put(update_subcategory).delete(delete_subcategory),
        )
        .route("/subcategories/{id}/items", get(list_items).post(add_item))
        .route("/subcategories/{id}/items/{item_id}", delete(delete_item))
}

/// GET /api/categories
async fn get_tree(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<CategoryTreeResponse>, ApiError> {
    let categories = state.category_service.tree(user.0.id).await?;
    Ok(Json(CategoryTreeResponse { categories }))
}

/// POST /api/categories
async fn create_category(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateCategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.category_service.create(user.0.id, body).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /api/categories/{id}
async fn update_category(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCategoryInput>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.update(user.0.id, id, body).await?))
}

/// DELETE /api/categories/{id}
///
/// Subcategories go with it; sites stay, unassigned.
async fn delete_category(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.category_service.delete(user.0.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/categories/{id}/subcategories
async fn create_subcategory(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(category_id): Path<i64>,
    Json(body): Json<SubcategoryInput>,
) -> Result<(StatusCode, Json<Subcategory>), ApiError> {
    let subcategory = state
        .category_service
        .create_subcategory(user.0.id, category_id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(subcategory)))
}

/// PUT /api/subcategories/{id}
async fn update_subcategory(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<SubcategoryInput>,
) -> Result<Json<Subcategory>, ApiError> {
    Ok(Json(
        state
            .category_service
            .update_subcategory(user.0.id, id, body)
            .await?,
    ))
}

/// DELETE /api/subcategories/{id}
async fn delete_subcategory(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.category_service.delete_subcategory(user.0.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/subcategories/{id}/items
async fn list_items(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<SubcategoryItem>>, ApiError> {
    Ok(Json(state.category_service.list_items(user.0.id, id).await?))
}

/// POST /api/subcategories/{id}/items
async fn add_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<AddItemInput>,
) -> Result<(StatusCode, Json<SubcategoryItem>), ApiError> {
    let item = state.category_service.add_item(user.0.id, id, body).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// DELETE /api/subcategories/{id}/items/{item_id}
async fn delete_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((id, item_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state.category_service.delete_item(user.0.id, id, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
