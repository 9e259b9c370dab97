//! Library browsing and editing endpoints

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::error::ApiResult;
use super::state::AppState;
use crate::generation::mime_for;
use crate::library::{ComicDetails, ComicSummary, COVER_FILE};

#[derive(Debug, Deserialize)]
pub struct DetailParams {
    /// Chapter whose pages are listed
    pub chapter: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateComic {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameChapter {
    pub new_name: String,
}

/// GET /api/comics
pub async fn list_comics(State(state): State<AppState>) -> ApiResult<Json<Vec<ComicSummary>>> {
    Ok(Json(state.catalog.list_comics()?))
}

/// GET /api/comics/{hash}?chapter=
pub async fn comic_details(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    Query(params): Query<DetailParams>,
) -> ApiResult<Json<ComicDetails>> {
    let details = state
        .catalog
        .comic_details(&hash, params.chapter.as_deref())?;
    Ok(Json(details))
}

/// PATCH /api/comics/{hash}
pub async fn update_comic(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    Json(body): Json<UpdateComic>,
) -> ApiResult<impl IntoResponse> {
    state.catalog.update_name(&hash, &body.name)?;
    Ok(Json(json!({ "hash": hash, "name": body.name.trim() })))
}

/// DELETE /api/comics/{hash}
pub async fn delete_comic(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> ApiResult<StatusCode> {
    state.catalog.delete_comic(&hash).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/comics/{hash}/chapters/{chapter}
pub async fn delete_chapter(
    State(state): State<AppState>,
    Path((hash, chapter)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.catalog.delete_chapter(&hash, &chapter).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/comics/{hash}/chapters/{chapter}/rename
pub async fn rename_chapter(
    State(state): State<AppState>,
    Path((hash, chapter)): Path<(String, String)>,
    Json(body): Json<RenameChapter>,
) -> ApiResult<impl IntoResponse> {
    state
        .catalog
        .rename_chapter(&hash, &chapter, &body.new_name)
        .await?;
    Ok(Json(json!({ "hash": hash, "chapter": body.new_name })))
}

/// GET /api/comics/{hash}/cover
pub async fn cover(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state.catalog.cover(&hash)?;
    Ok(([(header::CONTENT_TYPE, mime_for(COVER_FILE))], bytes))
}

/// GET /api/comics/{hash}/pages/{chapter}/{image}
pub async fn page_image(
    State(state): State<AppState>,
    Path((hash, chapter, image)): Path<(String, String, String)>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state.catalog.page_image(&hash, &chapter, &image)?;
    Ok(([(header::CONTENT_TYPE, mime_for(&image))], bytes))
}
