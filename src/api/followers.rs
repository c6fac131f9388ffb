//! Follower API endpoints
//!
//! Every route works on the caller's own page, except `POST /requests`,
//! which targets the page of another user.
//!
//! - GET /api/v1/followers - Followers of my page
//! - GET /api/v1/followers/requests - Pending follow requests
//! - POST /api/v1/followers/requests - Follow `username` (or ask to)
//! - PUT /api/v1/followers/requests - Accept requests from `usernames`
//! - DELETE /api/v1/followers/requests - Reject requests from `usernames`

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{FollowResponse, RelationshipResponse};
use crate::services::FollowAction;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_followers)).route(
        "/requests",
        get(list_follow_requests)
            .post(send_follow_request)
            .put(accept_follow_requests)
            .delete(reject_follow_requests),
    )
}

#[derive(Debug, Deserialize)]
pub struct FollowRequest {
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UsernamesRequest {
    #[serde(default)]
    pub usernames: Vec<String>,
}

async fn list_followers(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<RelationshipResponse>, ApiError> {
    run(&state, &user, FollowAction::ListFollowers, &[]).await
}

async fn list_follow_requests(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<RelationshipResponse>, ApiError> {
    run(&state, &user, FollowAction::ListFollowRequests, &[]).await
}

async fn accept_follow_requests(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Result<Json<UsernamesRequest>, JsonRejection>,
) -> Result<Json<RelationshipResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::validation_error(e.body_text()))?;
    run(&state, &user, FollowAction::AcceptRequests, &body.usernames).await
}

async fn reject_follow_requests(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Result<Json<UsernamesRequest>, JsonRejection>,
) -> Result<Json<RelationshipResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::validation_error(e.body_text()))?;
    run(&state, &user, FollowAction::RejectRequests, &body.usernames).await
}

async fn run(
    state: &AppState,
    user: &AuthenticatedUser,
    action: FollowAction,
    usernames: &[String],
) -> Result<Json<RelationshipResponse>, ApiError> {
    let users = state
        .relationship_service
        .apply(&user.0, action, usernames)
        .await?;
    Ok(Json(RelationshipResponse::new(action.view(), users)))
}

async fn send_follow_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Result<Json<FollowRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<FollowResponse>), ApiError> {
    let Json(body) = body.map_err(|e| ApiError::validation_error(e.body_text()))?;
    let username = body.username.unwrap_or_default();

    let status = state
        .relationship_service
        .send_follow_request(&user.0, &username)
        .await?;
    Ok((StatusCode::CREATED, Json(FollowResponse { status })))
}
