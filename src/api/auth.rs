//! Authentication API endpoints
//!
//! Handles HTTP requests for user authentication:
//! - POST /api/v1/auth/register - Registration (multipart, optional avatar)
//! - POST /api/v1/auth/login - Login, token returned in the `jwt` header
//! - POST /api/v1/auth/logout - Logout
//! - GET /api/v1/auth/me - Get current user

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::net::IpAddr;

use crate::api::middleware::{extract_session_token, ApiError, AppState, AuthenticatedUser, SESSION_HEADER};
use crate::api::responses::{MessageResponse, UserResponse};
use crate::models::{AvatarUpload, LoginInput, RegisterInput};
use crate::services::rate_limiter::{FAILED_LOGIN_WINDOW_MINUTES, IP_WINDOW_MINUTES};
use crate::services::UserServiceError;

/// Room for the text fields next to the avatar
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build public auth routes (no auth required)
pub fn public_router(max_file_size: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/register", post(register).layer(DefaultBodyLimit::max(body_limit)))
        .route("/login", post(login))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
}

/// POST /api/v1/auth/register
///
/// Fields `username`, `email` and `password` are text parts; `avatar` is an
/// optional file part. Unknown parts are ignored.
async fn register(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut input = RegisterInput::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "avatar" {
            // A part without a file name is an empty file input
            let file_name = match field.file_name() {
                Some(file_name) if !file_name.is_empty() => file_name.to_string(),
                _ => continue,
            };
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::field_error("avatar", format!("Failed to read file: {}", e)))?;
            input.avatar = Some(AvatarUpload {
                file_name,
                content_type,
                data: data.to_vec(),
            });
            continue;
        }

        let slot = match name.as_str() {
            "username" => &mut input.username,
            "email" => &mut input.email,
            "password" => &mut input.password,
            _ => continue,
        };
        let value = field
            .text()
            .await
            .map_err(|e| ApiError::field_error(&name, format!("Invalid form field: {}", e)))?;
        *slot = Some(value);
    }

    let user = state.user_service.register(input).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// POST /api/v1/auth/login
///
/// Requests are limited per client IP, failed attempts per email.
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<LoginInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = body.map_err(|e| ApiError::validation_error(e.body_text()))?;

    if let Some(ip) = extract_ip_address(&headers) {
        if state.rate_limiter.is_ip_limited(ip).await {
            tracing::warn!(%ip, "Login rate limit exceeded");
            return Err(ApiError::rate_limited(
                "Too many requests, try again later",
                (IP_WINDOW_MINUTES * 60) as u64,
            ));
        }
        state.rate_limiter.record_ip_request(ip).await;
    }

    // Same normalization as the login lookup, so padding or case cannot reset the count
    let email = input
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .unwrap_or_default();
    if !email.is_empty() && state.rate_limiter.is_email_limited(&email).await {
        return Err(ApiError::rate_limited(
            "Too many failed login attempts, try again later",
            (FAILED_LOGIN_WINDOW_MINUTES * 60) as u64,
        ));
    }

    let (session, user) = match state.user_service.login(input).await {
        Ok(opened) => opened,
        Err(e) => {
            if matches!(e, UserServiceError::AuthenticationError(_)) {
                state.rate_limiter.record_failed_attempt(&email).await;
            }
            return Err(e.into());
        }
    };
    state.rate_limiter.clear_email(&email).await;

    let token = HeaderValue::from_str(&session.id)
        .map_err(|_| ApiError::internal_error("Session token is not a valid header value"))?;
    let mut response_headers = HeaderMap::new();
    response_headers.insert(HeaderName::from_static(SESSION_HEADER), token);

    Ok((response_headers, Json(UserResponse::from(user))))
}

/// POST /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    state.user_service.logout(&token).await?;
    Ok(Json(MessageResponse::success()))
}

/// GET /api/v1/auth/me
async fn get_current_user(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}

/// Client address from proxy headers
fn extract_ip_address(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next());
    let real_ip = headers.get("x-real-ip").and_then(|h| h.to_str().ok());

    forwarded
        .or(real_ip)
        .and_then(|ip| ip.trim().parse().ok())
}
