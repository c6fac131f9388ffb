//! Pages API endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{render, PageResponse};
use crate::models::UpdatePageInput;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_pages))
        .route("/{page_id}", get(get_page).put(update_page))
}

#[derive(Serialize)]
struct PagesResponse {
    pages: Vec<PageResponse>,
}

async fn list_pages(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<PagesResponse>, ApiError> {
    let pages = state.page_service.list(&user.0).await?;
    Ok(Json(PagesResponse { pages: render(pages) }))
}

async fn get_page(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<PageResponse>, ApiError> {
    let page = state.page_service.get(&user.0, id).await?;
    Ok(Json(page.into()))
}

async fn update_page(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    body: Result<Json<UpdatePageInput>, JsonRejection>,
) -> Result<Json<PageResponse>, ApiError> {
    let Json(input) = body.map_err(|e| ApiError::validation_error(e.body_text()))?;
    let page = state.page_service.update(&user.0, id, input).await?;
    Ok(Json(page.into()))
}
