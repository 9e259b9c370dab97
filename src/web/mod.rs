//! HTTP surface: uploads, task status, live streams, search and the comic library.

pub mod comics;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

use anyhow::{Context, Result};
use std::future::Future;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// HTTP server bound to the configured host and port
pub struct WebServer {
    state: AppState,
}

impl WebServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Serve until `shutdown` resolves.
    pub async fn start<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!(
            "{}:{}",
            self.state.config.server.host, self.state.config.server.port
        );

        // Browser frontends are served from another origin
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = create_router(self.state).layer(cors);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;
        info!("Listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .with_context(|| "Web server failed")?;

        info!("Web server stopped");
        Ok(())
    }
}
