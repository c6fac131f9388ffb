//! API middleware
//!
//! Contains middleware for:
//! - Authentication (session token from the `jwt` header)
//! - Authorization (admin-only routes)
//!
//! It also holds the shared application state and the JSON error envelope
//! every handler returns.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{Config, UploadConfig};
use crate::db::repositories::{
    SqlxPageRepository, SqlxPostRepository, SqlxSessionRepository, SqlxTagRepository,
    SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    AvatarStore, ContentError, LoginRateLimiter, PageService, PostService, RelationshipError,
    RelationshipService, TagService, UserService, UserServiceError,
};

/// Request header carrying the session token
pub const SESSION_HEADER: &str = "jwt";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub relationship_service: Arc<RelationshipService>,
    pub page_service: Arc<PageService>,
    pub post_service: Arc<PostService>,
    pub tag_service: Arc<TagService>,
    pub rate_limiter: Arc<LoginRateLimiter>,
    pub upload_config: Arc<UploadConfig>,
}

impl AppState {
    /// Wire repositories and services over one pool
    pub fn build(pool: DynDatabasePool, config: &Config, avatar_store: Arc<dyn AvatarStore>) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let page_repo = SqlxPageRepository::boxed(pool.clone());
        let post_repo = SqlxPostRepository::boxed(pool.clone());
        let tag_repo = SqlxTagRepository::boxed(pool);

        let user_service = UserService::new(user_repo.clone(), session_repo, avatar_store)
            .with_session_days(config.auth.session_days);
        let page_service = Arc::new(PageService::new(page_repo.clone(), user_repo.clone()));

        Self {
            user_service: Arc::new(user_service),
            relationship_service: Arc::new(RelationshipService::new(page_repo, user_repo)),
            post_service: Arc::new(PostService::new(page_service.clone(), post_repo)),
            tag_service: Arc::new(TagService::new(page_service.clone(), tag_repo)),
            page_service,
            rate_limiter: Arc::new(LoginRateLimiter::new()),
            upload_config: Arc::new(config.upload.clone()),
        }
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

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

    /// Validation error pinned to a single request field
    pub fn field_error(field: &str, message: impl Into<String>) -> Self {
        Self::with_details(
            "VALIDATION_ERROR",
            message,
            serde_json::json!({ "field": field }),
        )
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: u64) -> Self {
        Self::with_details(
            "RATE_LIMIT",
            message,
            serde_json::json!({ "retry_after": retry_after }),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the cause and hide it from the client
    fn internal(err: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:#}", err);
        Self::internal_error("Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

// ============================================================================
// Service error mapping
// ============================================================================

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => Self::unauthorized(msg),
            UserServiceError::ValidationError { field, message } => Self::field_error(field, message),
            UserServiceError::UserExists(msg) => Self::conflict(msg),
            UserServiceError::UsernameNotFound(username) => {
                Self::not_found(format!("User '{}' not found", username))
            }
            UserServiceError::Forbidden(msg) => Self::forbidden(msg),
            UserServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<RelationshipError> for ApiError {
    fn from(err: RelationshipError) -> Self {
        match err {
            RelationshipError::SelfFollow => Self::field_error("username", "You cannot follow yourself"),
            RelationshipError::Forbidden(msg) => Self::forbidden(msg),
            RelationshipError::UserNotFound(username) => Self::with_details(
                "NOT_FOUND",
                format!("User '{}' not found", username),
                serde_json::json!({ "username": username }),
            ),
            RelationshipError::PageNotFound => Self::not_found("Page not found"),
            RelationshipError::ValidationError { field, message } => Self::field_error(field, message),
            RelationshipError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<ContentError> for ApiError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::NotFound(what) => Self::not_found(format!("{} not found", what)),
            ContentError::Forbidden(msg) => Self::forbidden(msg),
            ContentError::ValidationError { field, message } => Self::field_error(field, message),
            ContentError::InternalError(e) => Self::internal(e),
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Extract session token: `jwt` header first, then `Authorization: Bearer`
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(SESSION_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(token.to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

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
