//! API layer - HTTP handlers and routing
//!
//! Everything is served under `/api`:
//! - Auth endpoints (credentials, magic link, password reset)
//! - Site, category and reminder endpoints (signed-in users)
//! - Admin endpoints (admin session or API key)
//! - Health check

pub mod admin;
pub mod auth;
pub mod categories;
pub mod common;
pub mod middleware;
pub mod reminders;
pub mod sites;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the API router (mounted at `/api`)
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes resolve their own caller (session or API key)
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_admin,
        ));

    // Protected routes (need a session)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .merge(sites::router())
        .merge(categories::router())
        .merge(reminders::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::public_router())
        .merge(admin_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .nest("/api", build_api_router(state.clone()))
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}

/// CORS for the configured frontend origin, with cookies allowed.
/// `*` opens the API to any origin without credentials.
fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::COOKIE,
            header::HeaderName::from_static(middleware::API_KEY_HEADER),
        ]);

    if origin.trim() == "*" {
        return cors.allow_origin(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin).allow_credentials(true),
        Err(e) => {
            tracing::warn!("Invalid CORS origin {:?}, cross-origin requests disabled: {}", origin, e);
            cors
        }
    }
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.pool.ping().await.map_err(ApiError::internal)?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
