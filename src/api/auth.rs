//! Authentication API endpoints
//!
//! - POST /api/auth/register - Credentials registration
//! - POST /api/auth/login - Credentials login
//! - POST /api/auth/logout - End the session and clear the cookie
//! - POST /api/auth/simple-logout - Clear the cookie only
//! - POST /api/auth/magic-link - Email a sign-in link
//! - GET /api/auth/magic-link/verify - Consume a sign-in link
//! - GET /api/auth/session - Report the current session
//! - GET /api/auth/me - Current user
//! - PUT /api/auth/profile - Update display name
//! - PUT /api/auth/password - Change password
//! - POST /api/auth/password-reset - Email a reset token
//! - POST /api/auth/password-reset/confirm - Set a new password with a reset token

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{
    clear_session_cookie, extract_session_token, session_cookie, ApiError, AppState,
    AuthenticatedUser, Client,
};
use crate::models::{normalize_email, Plan, Session, User};
use crate::services::user::{LoginInput, RegisterInput, UserServiceError};
use crate::services::OutgoingEmail;

/// Request body for registration
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Request body for login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body carrying only an email
#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

/// Query of the link sent by email
#[derive(Debug, Deserialize)]
pub struct VerifyMagicLinkQuery {
    pub email: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    /// Omitted by users who signed up with a magic link and have no password yet
    #[serde(default)]
    pub current_password: Option<String>,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmResetRequest {
    pub email: String,
    pub token: String,
    pub new_password: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

/// User as returned to clients
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub plan: Plan,
    pub email_verified: Option<DateTime<Utc>>,
    pub has_password: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl UserResponse {
    pub fn new(user: User, is_admin: bool) -> Self {
        Self {
            has_password: user.has_password(),
            id: user.id,
            email: user.email,
            name: user.name,
            plan: user.plan,
            email_verified: user.email_verified,
            is_admin,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserResponse>,
}

/// Generic acknowledgement
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/simple-logout", post(simple_logout))
        .route("/magic-link", post(request_magic_link))
        .route("/magic-link/verify", get(verify_magic_link))
        .route("/session", get(get_session))
        .route("/password-reset", post(request_password_reset))
        .route("/password-reset/confirm", post(confirm_password_reset))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_current_user))
        .route("/profile", put(update_profile))
        .route("/password", put(change_password))
}

/// Count an auth request against the caller's IP
async fn check_ip_limit(state: &AppState, client: &Client) -> Result<(), ApiError> {
    if let Some(ip) = client.ip() {
        if state.rate_limiter.is_ip_limited(ip).await {
            tracing::warn!(%ip, "Auth request rate limit exceeded");
            return Err(ApiError::rate_limited(
                "Too many requests, please try again later",
                60,
            ));
        }
        state.rate_limiter.record_ip_request(ip).await;
    }
    Ok(())
}

/// Response carrying the session cookie
fn signed_in(
    state: &AppState,
    status: StatusCode,
    user: User,
    session: Session,
) -> Result<impl IntoResponse, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, session_cookie(state.auth(), &session.id)?);
    let is_admin = state.user_service.is_admin(&user);

    Ok((
        status,
        headers,
        Json(AuthResponse {
            user: UserResponse::new(user, is_admin),
            token: session.id,
        }),
    ))
}

fn cleared_cookie(state: &AppState) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, clear_session_cookie(state.auth())?);
    Ok(headers)
}

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    client: Client,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_ip_limit(&state, &client).await?;

    let mut input = RegisterInput::new(body.email, body.password);
    if let Some(name) = body.name {
        input = input.with_name(name);
    }
    let user = state.user_service.register(input, &client.info).await?;
    let session = state.user_service.create_session(user.id).await?;

    signed_in(&state, StatusCode::CREATED, user, session)
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    client: Client,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_ip_limit(&state, &client).await?;

    let email = normalize_email(&body.email);
    if state.rate_limiter.is_email_limited(&email).await {
        tracing::warn!(email = %email, "Too many failed logins");
        return Err(ApiError::rate_limited(
            "Too many failed login attempts, please try again in 15 minutes",
            900,
        ));
    }

    let (user, session) = match state
        .user_service
        .login(LoginInput::new(email.clone(), body.password), &client.info)
        .await
    {
        Ok(pair) => pair,
        Err(e @ UserServiceError::AuthenticationError(_)) => {
            state.rate_limiter.record_failed_login(&email).await;
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    state.rate_limiter.clear_failed_logins(&email).await;

    signed_in(&state, StatusCode::OK, user, session)
}

/// POST /api/auth/logout
///
/// Deletes the session when one is presented. Succeeds either way.
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = extract_session_token(&headers, &state.auth().cookie_name) {
        if let Err(e) = state.user_service.logout(&token).await {
            tracing::warn!("Failed to delete session on logout: {}", e);
        }
    }

    Ok((cleared_cookie(&state)?, MessageResponse::ok("Logged out")))
}

/// POST /api/auth/simple-logout
async fn simple_logout(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok((cleared_cookie(&state)?, MessageResponse::ok("Logged out")))
}

/// POST /api/auth/magic-link
async fn request_magic_link(
    State(state): State<AppState>,
    client: Client,
    Json(body): Json<EmailRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_ip_limit(&state, &client).await?;

    let email = normalize_email(&body.email);
    if !state.rate_limiter.try_magic_link(&email).await {
        return Err(ApiError::rate_limited(
            "Too many sign-in links requested, please try again in 10 minutes",
            600,
        ));
    }

    state.magic_link_service.request(&email, &client.info).await?;
    Ok(MessageResponse::ok("Check your email for a sign-in link"))
}

/// GET /api/auth/magic-link/verify?email=..&token=..
async fn verify_magic_link(
    State(state): State<AppState>,
    client: Client,
    Query(query): Query<VerifyMagicLinkQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, session) = state
        .magic_link_service
        .verify(&query.email, &query.token, &client.info)
        .await?;

    signed_in(&state, StatusCode::OK, user, session)
}

/// GET /api/auth/session
///
/// An invalid or expired session also clears the cookie.
async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let Some(token) = extract_session_token(&headers, &state.auth().cookie_name) else {
        return Ok((
            HeaderMap::new(),
            Json(SessionResponse {
                authenticated: false,
                user: None,
            }),
        ));
    };

    match state.user_service.validate_session(&token).await? {
        Some(user) => {
            let is_admin = state.user_service.is_admin(&user);
            Ok((
                HeaderMap::new(),
                Json(SessionResponse {
                    authenticated: true,
                    user: Some(UserResponse::new(user, is_admin)),
                }),
            ))
        }
        None => Ok((
            cleared_cookie(&state)?,
            Json(SessionResponse {
                authenticated: false,
                user: None,
            }),
        )),
    }
}

/// GET /api/auth/me
async fn get_current_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Json<UserResponse> {
    let is_admin = state.user_service.is_admin(&user.0);
    Json(UserResponse::new(user.0, is_admin))
}

/// PUT /api/auth/profile
async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let updated = state.user_service.update_profile(&user.0, body.name).await?;
    let is_admin = state.user_service.is_admin(&updated);
    Ok(Json(UserResponse::new(updated, is_admin)))
}

/// PUT /api/auth/password
async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .user_service
        .change_password(&user.0, body.current_password.as_deref(), &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/auth/password-reset
///
/// Answers the same way whether or not the email is registered.
async fn request_password_reset(
    State(state): State<AppState>,
    client: Client,
    Json(body): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    check_ip_limit(&state, &client).await?;

    let email = normalize_email(&body.email);
    if let Some(token) = state.user_service.request_password_reset(&email).await? {
        let message = reset_email(&state, &email, &token);
        if let Err(e) = state.mailer.send(&message).await {
            tracing::warn!("Failed to send password reset email to {}: {:#}", email, e);
        }
    }

    Ok(MessageResponse::ok(
        "If that email is registered, a reset link is on its way",
    ))
}

/// POST /api/auth/password-reset/confirm
async fn confirm_password_reset(
    State(state): State<AppState>,
    client: Client,
    Json(body): Json<ConfirmResetRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    check_ip_limit(&state, &client).await?;

    state
        .user_service
        .reset_password(&body.email, &body.token, &body.new_password)
        .await?;
    Ok(MessageResponse::ok("Password updated, please sign in again"))
}

fn reset_email(state: &AppState, email: &str, token: &str) -> OutgoingEmail {
    let auth = state.auth();
    let link = format!(
        "{}/reset-password?token={}&email={}",
        auth.base_url.trim_end_matches('/'),
        token,
        urlencoding::encode(email)
    );

    OutgoingEmail {
        to: email.to_string(),
        subject: "Reset your CleanTabs password".to_string(),
        body: format!(
            "Someone asked to reset the password for this account.\n\n\
             Open this link to choose a new one:\n\n{}\n\n\
             The link expires in {} minutes. If it wasn't you, ignore this email.",
            link, auth.password_reset_ttl_minutes
        ),
    }
}
