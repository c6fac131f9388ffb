//! User API endpoints
//!
//! - GET /api/v1/users?search=q - Case-insensitive username search
//! - PUT /api/v1/admin/users/block - Toggle the blocked flag (admin)

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{render, UserResponse, UserSummary};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(search_users))
}

/// Routes mounted under `/admin/users`
pub fn admin_router() -> Router<AppState> {
    Router::new().route("/block", put(toggle_block))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub search: String,
}

#[derive(Serialize)]
struct UsersResponse {
    users: Vec<UserSummary>,
}

#[derive(Debug, Deserialize)]
pub struct BlockRequest {
    pub username: Option<String>,
}

async fn search_users(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<UsersResponse>, ApiError> {
    let users = state.user_service.search(&query.search).await?;
    Ok(Json(UsersResponse { users: render(users) }))
}

async fn toggle_block(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Result<Json<BlockRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::validation_error(e.body_text()))?;
    let username = body.username.unwrap_or_default();

    let updated = state.user_service.toggle_block(&user.0, &username).await?;
    Ok(Json(updated.into()))
}
