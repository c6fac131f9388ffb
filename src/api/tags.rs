//! Tag API endpoints, nested under `/pages/{page_id}/tags`

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{render, TagResponse};
use crate::models::AttachTagInput;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags).post(attach_tag))
        .route("/{tag_id}", delete(detach_tag))
}

#[derive(Serialize)]
struct TagsResponse {
    tags: Vec<TagResponse>,
}

async fn list_tags(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(page_id): Path<i64>,
) -> Result<Json<TagsResponse>, ApiError> {
    let tags = state.tag_service.list(&user.0, page_id).await?;
    Ok(Json(TagsResponse { tags: render(tags) }))
}

async fn attach_tag(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(page_id): Path<i64>,
    body: Result<Json<AttachTagInput>, JsonRejection>,
) -> Result<(StatusCode, Json<TagResponse>), ApiError> {
    let Json(input) = body.map_err(|e| ApiError::validation_error(e.body_text()))?;
    let tag = state.tag_service.attach(&user.0, page_id, &input.name).await?;
    Ok((StatusCode::CREATED, Json(tag.into())))
}

async fn detach_tag(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((page_id, tag_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state.tag_service.detach(&user.0, page_id, tag_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
