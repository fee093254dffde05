//! Admin API endpoints
//!
//! Every route here sits behind `require_admin`:
//! - POST /api/admin/generate-key - Create an admin API key (session only)
//! - GET /api/admin/keys - Key listing without secrets
//! - GET /api/admin/stats - User, site, category and reminder totals
//! - GET /api/admin/system - Process and host statistics

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{AdminStats, ApiKey};
use crate::services::{GeneratedKey, SystemStats};

#[derive(Debug, Default, Deserialize)]
pub struct GenerateKeyRequest {
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateKeyResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub key: GeneratedKey,
}

/// Build the admin router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate-key", post(generate_key))
        .route("/keys", get(list_keys))
        .route("/stats", get(get_stats))
        .route("/system", get(get_system_stats))
}

/// POST /api/admin/generate-key
///
/// The body is optional; `{"label": "..."}` names the key.
async fn generate_key(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Bytes,
) -> Result<Json<GenerateKeyResponse>, ApiError> {
    let request: GenerateKeyRequest = if body.iter().all(u8::is_ascii_whitespace) {
        GenerateKeyRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::validation_error(format!("Invalid request body: {}", e)))?
    };
    let key = state.admin_service.generate_key(&user.0, request.label).await?;

    Ok(Json(GenerateKeyResponse {
        success: true,
        message: "API key generated. Store it now, it will not be shown again".to_string(),
        key,
    }))
}

/// GET /api/admin/keys
async fn list_keys(State(state): State<AppState>) -> Result<Json<Vec<ApiKey>>, ApiError> {
    Ok(Json(state.admin_service.list_keys().await?))
}

/// GET /api/admin/stats
async fn get_stats(State(state): State<AppState>) -> Result<Json<AdminStats>, ApiError> {
    Ok(Json(state.admin_service.stats().await?))
}

/// GET /api/admin/system
///
/// sysinfo scans the process table, so it runs off the async workers.
async fn get_system_stats(State(state): State<AppState>) -> Result<Json<SystemStats>, ApiError> {
    let admin = state.admin_service.clone();
    let stats = tokio::task::spawn_blocking(move || admin.system_stats())
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(stats))
}
