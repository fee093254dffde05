//! Reminder API endpoints
//!
//! - GET /api/reminders?completed=true|false
//! - POST /api/reminders
//! - GET/PUT/DELETE /api/reminders/{id}
//! - POST /api/reminders/{id}/complete
//! - POST /api/reminders/{id}/reopen

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreateReminderInput, Reminder, UpdateReminderInput};

#[derive(Debug, Deserialize)]
pub struct ListRemindersQuery {
    pub completed: Option<bool>,
}

/// Build the reminders router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reminders", get(list_reminders).post(create_reminder))
        .route(
            "/reminders/{id}",
            get(get_reminder).put(update_reminder).delete(delete_reminder),
        )
        .route("/reminders/{id}/complete", post(complete_reminder))
        .route("/reminders/{id}/reopen", post(reopen_reminder))
}

async fn list_reminders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListRemindersQuery>,
) -> Result<Json<Vec<Reminder>>, ApiError> {
    Ok(Json(
        state
            .reminder_service
            .list(user.0.id, query.completed)
            .await?,
    ))
}

async fn create_reminder(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateReminderInput>,
) -> Result<(StatusCode, Json<Reminder>), ApiError> {
    let reminder = state.reminder_service.create(user.0.id, body).await?;
    Ok((StatusCode::CREATED, Json(reminder)))
}

async fn get_reminder(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Reminder>, ApiError> {
    Ok(Json(state.reminder_service.get(user.0.id, id).await?))
}

async fn update_reminder(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateReminderInput>,
) -> Result<Json<Reminder>, ApiError> {
    Ok(Json(state.reminder_service.update(user.0.id, id, body).await?))
}

async fn delete_reminder(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.reminder_service.delete(user.0.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/reminders/{id}/complete
async fn complete_reminder(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Reminder>, ApiError> {
    Ok(Json(state.reminder_service.complete(user.0.id, id).await?))
}

/// POST /api/reminders/{id}/reopen
async fn reopen_reminder(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Reminder>, ApiError> {
    Ok(Json(state.reminder_service.reopen(user.0.id, id).await?))
}
