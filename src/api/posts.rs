//! Post API endpoints, nested under `/pages/{page_id}/posts`

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{render, PostResponse};
use crate::models::{CreatePostInput, UpdatePostInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_posts).post(create_post))
        .route("/{id}", get(get_post).put(update_post).delete(delete_post))
}

#[derive(Serialize)]
struct PostsResponse {
    posts: Vec<PostResponse>,
}

async fn list_posts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(page_id): Path<i64>,
) -> Result<Json<PostsResponse>, ApiError> {
    let posts = state.post_service.list(&user.0, page_id).await?;
    Ok(Json(PostsResponse { posts: render(posts) }))
}

async fn create_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(page_id): Path<i64>,
    body: Result<Json<CreatePostInput>, JsonRejection>,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    let Json(input) = body.map_err(|e| ApiError::validation_error(e.body_text()))?;
    let post = state.post_service.create(&user.0, page_id, input).await?;
    Ok((StatusCode::CREATED, Json(post.into())))
}

async fn get_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((page_id, id)): Path<(i64, i64)>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = state.post_service.get(&user.0, page_id, id).await?;
    Ok(Json(post.into()))
}

async fn update_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((page_id, id)): Path<(i64, i64)>,
    body: Result<Json<UpdatePostInput>, JsonRejection>,
) -> Result<Json<PostResponse>, ApiError> {
    let Json(input) = body.map_err(|e| ApiError::validation_error(e.body_text()))?;
    let post = state.post_service.update(&user.0, page_id, id, input).await?;
    Ok(Json(post.into()))
}

async fn delete_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((page_id, id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state.post_service.delete(&user.0, page_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
