//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error envelope and service error mapping
//! - Authentication (session cookie or bearer token)
//! - Authorization for the admin routes (admin session or API key)
//! - Request statistics

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::create_cache;
use crate::config::{AuthConfig, Config};
use crate::db::DynDatabasePool;
use crate::models::{ClientInfo, User};
use crate::services::{
    AdminService, AdminServiceError, AuthRateLimiter, CategoryService, CategoryServiceError,
    MagicLinkError, MagicLinkService, Mailer, ReminderService, ReminderServiceError, RequestStats,
    SiteService, SiteServiceError, UserService, UserServiceError,
};

/// Header carrying an admin API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub magic_link_service: Arc<MagicLinkService>,
    pub category_service: Arc<CategoryService>,
    pub site_service: Arc<SiteService>,
    pub reminder_service: Arc<ReminderService>,
    pub admin_service: Arc<AdminService>,
    pub rate_limiter: Arc<AuthRateLimiter>,
    pub request_stats: Arc<RequestStats>,
    pub mailer: Arc<dyn Mailer>,
    /// Whether proxy headers identify the client for rate limiting
    pub trust_proxy: bool,
}

impl AppState {
    /// Wire every service onto one pool. The category tree cache is shared
    /// by the category and site services so site writes can invalidate it.
    pub fn new(pool: DynDatabasePool, config: &Config, mailer: Arc<dyn Mailer>) -> Self {
        let cache = create_cache(&config.cache);
        let request_stats = Arc::new(RequestStats::new());
        let user_service = Arc::new(UserService::from_pool(&pool, config.auth.clone()));

        Self {
            magic_link_service: Arc::new(MagicLinkService::new(
                &pool,
                user_service.clone(),
                mailer.clone(),
                config.auth.clone(),
            )),
            category_service: Arc::new(CategoryService::from_pool(&pool, cache.clone())),
            site_service: Arc::new(SiteService::from_pool(&pool, cache)),
            reminder_service: Arc::new(ReminderService::from_pool(&pool)),
            admin_service: Arc::new(AdminService::new(
                &pool,
                config.auth.clone(),
                request_stats.clone(),
            )),
            rate_limiter: Arc::new(AuthRateLimiter::new()),
            request_stats,
            user_service,
            mailer,
            pool,
            trust_proxy: config.server.trust_proxy,
        }
    }

    pub fn auth(&self) -> &AuthConfig {
        self.user_service.auth_config()
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Caller address and user agent
///
/// `info` is what gets written to the audit log and into emails. `addr` is
/// the address auth requests are counted against: the socket peer, or the
/// forwarded address when `server.trust_proxy` is set.
#[derive(Debug, Clone, Default)]
pub struct Client {
    pub info: ClientInfo,
    pub addr: Option<IpAddr>,
}

impl Client {
    pub fn from_parts(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy: bool) -> Self {
        let info = client_info(headers, peer);
        let addr = if trust_proxy {
            info.ip_address
                .as_deref()
                .and_then(|ip| ip.parse().ok())
                .or(peer)
        } else {
            peer
        };
        Self { info, addr }
    }

    /// Address to rate-limit on
    pub fn ip(&self) -> Option<IpAddr> {
        self.addr
    }
}

impl FromRequestParts<AppState> for Client {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(Client::from_parts(&parts.headers, peer, state.trust_proxy))
    }
}

/// Build client info from proxy headers, falling back to the peer address
pub fn client_info(headers: &HeaderMap, peer: Option<IpAddr>) -> ClientInfo {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty())
    };

    ClientInfo {
        ip_address: forwarded
            .or_else(real_ip)
            .or_else(|| peer.map(|ip| ip.to_string())),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(String::from),
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::with_details(
            "RATE_LIMIT",
            message,
            serde_json::json!({ "retry_after": retry_after_secs }),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the cause and answer with a generic message
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {:#}", cause);
        Self::internal_error("Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::UserNotFound(msg) => ApiError::not_found(msg),
            UserServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<MagicLinkError> for ApiError {
    fn from(e: MagicLinkError) -> Self {
        match e {
            MagicLinkError::ValidationError(msg) => ApiError::validation_error(msg),
            MagicLinkError::InvalidToken => ApiError::validation_error(e.to_string()),
            MagicLinkError::DeliveryFailed => ApiError::internal_error(e.to_string()),
            MagicLinkError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<CategoryServiceError> for ApiError {
    fn from(e: CategoryServiceError) -> Self {
        match e {
            CategoryServiceError::DuplicateName(_) | CategoryServiceError::DuplicateItem(_) => {
                ApiError::conflict(e.to_string())
            }
            CategoryServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            CategoryServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CategoryServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<SiteServiceError> for ApiError {
    fn from(e: SiteServiceError) -> Self {
        match e {
            SiteServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            SiteServiceError::DuplicateUrl(_) => ApiError::conflict(e.to_string()),
            SiteServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            SiteServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<ReminderServiceError> for ApiError {
    fn from(e: ReminderServiceError) -> Self {
        match e {
            ReminderServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ReminderServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            ReminderServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<AdminServiceError> for ApiError {
    fn from(e: AdminServiceError) -> Self {
        match e {
            AdminServiceError::Forbidden => ApiError::forbidden(e.to_string()),
            AdminServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            AdminServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

// ============================================================================
// Session cookie
// ============================================================================

/// Extract the session token, preferring `Authorization: Bearer` over the cookie
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    for cookie_header in headers.get_all(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Some((name, value)) = cookie.trim().split_once('=') {
                    if name == cookie_name && !value.is_empty() {
                        return Some(value.to_string());
                    }
                }
            }
        }
    }

    None
}

/// `Set-Cookie` value that stores the session token
pub fn session_cookie(auth: &AuthConfig, token: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        auth.cookie_name,
        token,
        auth.session_max_age()
    ))
    .map_err(ApiError::internal)
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_session_cookie(auth: &AuthConfig) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        auth.cookie_name
    ))
    .map_err(ApiError::internal)
}

// ============================================================================
// Middleware
// ============================================================================

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers(), &state.auth().cookie_name)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Admin authorization middleware
///
/// Accepts a session whose user is listed in `auth.admin_emails`, or a valid
/// admin API key in `X-Api-Key`. An admin session wins when both are sent, so
/// routes that act on behalf of a user still see `AuthenticatedUser`.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|k| k.trim().to_string());

    let session_user = match extract_session_token(request.headers(), &state.auth().cookie_name) {
        Some(token) => state.user_service.validate_session(&token).await?,
        None => None,
    };

    if let Some(user) = session_user {
        if state.admin_service.is_admin(&user) {
            request.extensions_mut().insert(AuthenticatedUser(user));
            return Ok(next.run(request).await);
        }
        if api_key.is_none() {
            return Err(ApiError::forbidden("Admin privileges required"));
        }
    }

    let key = api_key.ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
    match state.admin_service.verify_key(&key).await? {
        Some(api_key) => {
            tracing::debug!(key_prefix = %api_key.key_prefix, "Admin request via API key");
            Ok(next.run(request).await)
        }
        None => Err(ApiError::unauthorized("Invalid API key")),
    }
}

/// Request statistics middleware
///
/// Records request count and response time for `/api/admin/system`.
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    state.request_stats.record(start.elapsed().as_micros() as u64);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    const COOKIE: &str = "cleantabs_session";

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut request = Request::builder().uri("/test");
        for (name, value) in pairs {
            request = request.header(name, *value);
        }
        request.body(()).unwrap().headers().clone()
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let h = headers(&[(header::AUTHORIZATION, "Bearer test-token-123")]);
        assert_eq!(extract_session_token(&h, COOKIE), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let h = headers(&[(header::COOKIE, "theme=dark; cleantabs_session=abc; other=1")]);
        assert_eq!(extract_session_token(&h, COOKIE), Some("abc".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let h = headers(&[
            (header::AUTHORIZATION, "Bearer bearer-token"),
            (header::COOKIE, "cleantabs_session=cookie-token"),
        ]);
        assert_eq!(extract_session_token(&h, COOKIE), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_ignores_other_cookies() {
        let h = headers(&[(header::COOKIE, "session=nope; cleantabs_session=")]);
        assert!(extract_session_token(&h, COOKIE).is_none());
    }

    #[test]
    fn test_extract_session_token_invalid_bearer() {
        let h = headers(&[(header::AUTHORIZATION, "Basic invalid")]);
        assert!(extract_session_token(&h, COOKIE).is_none());
    }

    #[test]
    fn test_client_info_prefers_forwarded_header() {
        let h = headers(&[
            (header::HeaderName::from_static("x-forwarded-for"), "203.0.113.9, 10.0.0.1"),
            (header::HeaderName::from_static("x-real-ip"), "10.0.0.2"),
            (header::USER_AGENT, "curl/8"),
        ]);
        let info = client_info(&h, Some("127.0.0.1".parse().unwrap()));
        assert_eq!(info.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(info.user_agent.as_deref(), Some("curl/8"));
    }

    #[test]
    fn test_client_info_falls_back_to_peer() {
        let info = client_info(&HeaderMap::new(), Some("127.0.0.1".parse().unwrap()));
        assert_eq!(info.ip_address.as_deref(), Some("127.0.0.1"));
        assert!(info.user_agent.is_none());
    }

    #[test]
    fn test_client_rate_limit_address_ignores_forwarded_headers() {
        let peer: IpAddr = "192.0.2.7".parse().unwrap();
        for forwarded in ["garbage", "203.0.113.9"] {
            let h = headers(&[(header::HeaderName::from_static("x-forwarded-for"), forwarded)]);
            let client = Client::from_parts(&h, Some(peer), false);
            assert_eq!(client.ip(), Some(peer));
            assert_eq!(client.info.ip_address.as_deref(), Some(forwarded));
        }
    }

    #[test]
    fn test_client_trusts_proxy_when_configured() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        let h = headers(&[(header::HeaderName::from_static("x-forwarded-for"), "203.0.113.9")]);
        let client = Client::from_parts(&h, Some(peer), true);
        assert_eq!(client.ip(), Some("203.0.113.9".parse::<IpAddr>().unwrap()));

        let h = headers(&[(header::HeaderName::from_static("x-forwarded-for"), "garbage")]);
        assert_eq!(Client::from_parts(&h, Some(peer), true).ip(), Some(peer));
    }

    #[test]
    fn test_cookie_values() {
        let auth = AuthConfig::default();
        let set = session_cookie(&auth, "tok").unwrap();
        let set = set.to_str().unwrap();
        assert!(set.starts_with(&format!("{}=tok;", auth.cookie_name)));
        assert!(set.contains("HttpOnly"));
        assert!(set.contains(&format!("Max-Age={}", auth.session_max_age())));

        let cleared = clear_session_cookie(&auth).unwrap();
        assert!(cleared.to_str().unwrap().contains("Max-Age=0"));
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ApiError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (ApiError::forbidden("x"), StatusCode::FORBIDDEN),
            (ApiError::not_found("x"), StatusCode::NOT_FOUND),
            (ApiError::validation_error("x"), StatusCode::BAD_REQUEST),
            (ApiError::conflict("x"), StatusCode::CONFLICT),
            (ApiError::rate_limited("x", 60), StatusCode::TOO_MANY_REQUESTS),
            (ApiError::internal_error("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_internal_errors_hide_cause() {
        let error: ApiError =
            UserServiceError::InternalError(anyhow::anyhow!("db password leaked")).into();
        assert_eq!(error.error.code, "INTERNAL_ERROR");
        assert!(!error.error.message.contains("leaked"));
    }
}
