//! API layer - HTTP handlers and routing
//!
//! All endpoints live under `/api/v1`:
//! - Auth endpoints (register, login, logout, me)
//! - User search and the admin block toggle
//! - Follower endpoints for the caller's own page
//! - Pages, with their posts and tags nested below them
//!
//! Uploaded avatars are served from the upload directory.

pub mod auth;
pub mod followers;
pub mod middleware;
pub mod pages;
pub mod posts;
pub mod responses;
pub mod tags;
pub mod users;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .nest("/admin/users", users::admin_router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need auth but not admin)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/users", users::router())
        .nest("/followers", followers::router())
        .nest("/pages", pages::router())
        .nest("/pages/{page_id}/posts", posts::router())
        .nest("/pages/{page_id}/tags", tags::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .nest("/auth", auth::public_router(state.upload_config.max_file_size))
        .merge(admin_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors_allow_origin(cors_origin))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(middleware::SESSION_HEADER),
        ])
        .expose_headers([HeaderName::from_static(middleware::SESSION_HEADER)]);

    let uploads = ServeDir::new(&state.upload_config.path);
    let uploads_prefix = match state.upload_config.public_prefix.trim_end_matches('/') {
        "" => "/uploads".to_string(),
        prefix if prefix.starts_with('/') => prefix.to_string(),
        prefix => format!("/{}", prefix),
    };

    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .nest_service(&uploads_prefix, uploads)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `*` allows any origin; an unparsable origin falls back to the same
fn cors_allow_origin(origin: &str) -> AllowOrigin {
    if origin == "*" {
        return AllowOrigin::any();
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            tracing::warn!("Invalid CORS origin {:?}, allowing any origin", origin);
            AllowOrigin::any()
        }
    }
}
