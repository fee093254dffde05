//! Site (bookmark) API endpoints
//!
//! - GET /api/sites - Filtered, paginated list
//! - POST /api/sites - Save a site
//! - GET /api/sites/due - Sites whose revisit reminder is due
//! - GET/PUT/DELETE /api/sites/{id}
//! - POST /api/sites/{id}/check - Record a revisit

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::common::{default_page, default_per_page, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreateSiteInput, ListParams, Site, SiteFilter, SiteStatus, UpdateSiteInput};

/// Query parameters for `GET /api/sites`
#[derive(Debug, Deserialize)]
pub struct ListSitesQuery {
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub status: Option<SiteStatus>,
    pub tag: Option<String>,
    pub q: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl ListSitesQuery {
    fn into_parts(self) -> (SiteFilter, ListParams) {
        let params = PaginationQuery {
            page: self.page,
            per_page: self.per_page,
        }
        .into();
        let filter = SiteFilter {
            category_id: self.category_id,
            subcategory_id: self.subcategory_id,
            status: self.status,
            tag: self.tag,
            q: self.q,
        };
        (filter, params)
    }
}

/// Response for a page of sites
#[derive(Debug, Serialize)]
pub struct SiteListResponse {
    pub sites: Vec<Site>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

/// Build the sites router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sites", get(list_sites).post(create_site))
        .route("/sites/due", get(due_sites))
        .route("/sites/{id}", get(get_site).put(update_site).delete(delete_site))
        .route("/sites/{id}/check", post(check_site))
}

/// GET /api/sites
async fn list_sites(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListSitesQuery>,
) -> Result<Json<SiteListResponse>, ApiError> {
    let (filter, params) = query.into_parts();
    let result = state.site_service.list(user.0.id, filter, &params).await?;

    Ok(Json(SiteListResponse {
        total_pages: result.total_pages(),
        sites: result.items,
        total: result.total,
        page: result.page,
        per_page: result.per_page,
    }))
}

/// POST /api/sites
async fn create_site(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateSiteInput>,
) -> Result<(StatusCode, Json<Site>), ApiError> {
    let site = state.site_service.create(user.0.id, body).await?;
    Ok((StatusCode::CREATED, Json(site)))
}

/// GET /api/sites/due
async fn due_sites(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Site>>, ApiError> {
    Ok(Json(state.site_service.due(user.0.id, Utc::now()).await?))
}

/// GET /api/sites/{id}
async fn get_site(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Site>, ApiError> {
    Ok(Json(state.site_service.get(user.0.id, id).await?))
}

/// PUT /api/sites/{id}
async fn update_site(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateSiteInput>,
) -> Result<Json<Site>, ApiError> {
    Ok(Json(state.site_service.update(user.0.id, id, body).await?))
}

/// DELETE /api/sites/{id}
async fn delete_site(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.site_service.delete(user.0.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sites/{id}/check
async fn check_site(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Site>, ApiError> {
    Ok(Json(state.site_service.mark_checked(user.0.id, id).await?))
}
