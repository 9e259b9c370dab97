//! Route table

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use super::state::AppState;
use super::{comics, handlers};

/// Build the router for every HTTP endpoint
pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.config.server.max_upload_bytes();

    Router::new()
        // Ingestion and task progress
        .route(
            "/api/comics",
            get(comics::list_comics)
                .post(handlers::upload_comic)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/processing-status", get(handlers::processing_status))
        .route("/stream-ai/{task_id}", get(handlers::stream_task))
        .route("/api/search", get(handlers::search))
        // Library
        .route(
            "/api/comics/{hash}",
            get(comics::comic_details)
                .patch(comics::update_comic)
                .delete(comics::delete_comic),
        )
        .route("/api/comics/{hash}/cover", get(comics::cover))
        .route(
            "/api/comics/{hash}/chapters/{chapter}",
            axum::routing::delete(comics::delete_chapter),
        )
        .route(
            "/api/comics/{hash}/chapters/{chapter}/rename",
            post(comics::rename_chapter),
        )
        .route(
            "/api/comics/{hash}/pages/{chapter}/{image}",
            get(comics::page_image),
        )
        // Health and metrics
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(state)
}
