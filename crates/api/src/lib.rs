//! `api` crate: HTTP REST API layer.
//!
//! Exposes:
//!   GET    /templates
//!   POST   /templates
//!   POST   /templates/compile
//!   GET    /templates/{id}
//!   PUT    /templates/{id}
//!   DELETE /templates/{id}
//!   GET    /processes
//!   POST   /processes
//!   GET    /processes/{id}
//!   POST   /processes/{id}/tasks/{task_id}/start|complete|skip
//!   POST   /processes/{id}/stop
//!   POST   /processes/{id}/resume
//!   GET    /assignees/progress
//!   GET    /healthz

mod error;
mod handlers;

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::ApiError;
pub use handlers::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route(
            "/templates",
            get(handlers::templates::list).post(handlers::templates::create),
        )
        .route("/templates/compile", post(handlers::templates::compile))
        .route(
            "/templates/:id",
            get(handlers::templates::get)
                .put(handlers::templates::update)
                .delete(handlers::templates::delete),
        )
        .route(
            "/processes",
            get(handlers::processes::list).post(handlers::processes::start),
        )
        .route("/processes/:id", get(handlers::processes::get))
        .route(
            "/processes/:id/tasks/:task_id/start",
            post(handlers::processes::start_task),
        )
        .route(
            "/processes/:id/tasks/:task_id/complete",
            post(handlers::processes::complete_task),
        )
        .route(
            "/processes/:id/tasks/:task_id/skip",
            post(handlers::processes::skip_task),
        )
        .route("/processes/:id/stop", post(handlers::processes::stop))
        .route("/processes/:id/resume", post(handlers::processes::resume))
        .route("/assignees/progress", get(handlers::processes::assignee_progress))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `bind` until Ctrl-C.
pub async fn serve(bind: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "process engine API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}

#[cfg(test)]
mod tests;
