//! Task, streaming, search and service endpoints

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tracing::{info, warn};

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::indexing::{AlreadyStaged, StagedArchive};
use crate::metrics;
use crate::search::ComicMatch;
use crate::tasks::TaskView;

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    /// Display name; derived from the archive when absent
    pub name: Option<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub task_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Accept a zip archive and queue it for processing.
///
/// POST /api/comics?name=&filename=
pub async fn upload_comic(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("empty upload".to_string()));
    }
    let file_name = params.filename.as_deref().unwrap_or("upload.zip");
    let staged = StagedArchive::new(&state.config.library.upload_dir, file_name)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if state.store().contains(&staged.task_id) {
        return Err(ApiError::Conflict(format!(
            "task {} already exists",
            staged.task_id
        )));
    }

    if let Err(e) = staged.write(&body) {
        return Err(match e.downcast_ref::<AlreadyStaged>() {
            Some(_) => ApiError::Conflict(format!("task {} already exists", staged.task_id)),
            None => e.into(),
        });
    }
    let path = staged.path.clone();
    let name = params.name;
    let job = tokio::task::spawn_blocking(move || staged.into_job(name.as_deref()))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let job = match job {
        Ok(job) => job,
        Err(e) => {
            if let Err(remove_err) = std::fs::remove_file(&path) {
                warn!("Failed to remove rejected upload {:?}: {}", path, remove_err);
            }
            return Err(ApiError::BadRequest(format!("unreadable archive: {:#}", e)));
        }
    };

    let task_id = job.task_id.clone();
    info!(task_id = %task_id, comic = %job.comic_name, bytes = body.len(), "Upload accepted");
    if !state.queue.submit(job) {
        return Err(ApiError::Conflict(format!("task {} already exists", task_id)));
    }

    Ok((StatusCode::ACCEPTED, Json(UploadResponse { task_id })))
}

/// Every known task, newest first.
///
/// GET /api/processing-status
pub async fn processing_status(State(state): State<AppState>) -> Json<Vec<TaskView>> {
    Json(state.store().list_all())
}

/// Live model output of a task as server-sent events.
///
/// GET /stream-ai/{task_id}
pub async fn stream_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(task_id = %task_id, "Stream subscriber connected");

    let events = state.publisher.subscribe(&task_id).map(|message| {
        let event = match message.event_name() {
            Some(name) => Event::default().event(name),
            None => Event::default(),
        };
        Ok(event.data(message.to_sse_data()))
    });

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(state.config.stream.keep_alive_secs))
            .text("heartbeat"),
    )
}

/// Comics ranked against a free-text query.
///
/// GET /api/search?query=&k=
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<ComicMatch>>> {
    let k = params.k.unwrap_or(state.config.search.default_limit);
    if k == 0 {
        return Err(ApiError::BadRequest("k must be positive".to_string()));
    }
    let results = state.search.search(&params.query, k).await?;
    Ok(Json(results))
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus metrics endpoint.
///
/// GET /metrics
pub async fn metrics_handler() -> impl IntoResponse {
    let output = metrics::gather_metrics();
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], output)
}
