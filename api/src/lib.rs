//! HTTP/SSE shell around the review kernel.
//!
//! Deliberately thin: one route starting a session and streaming its
//! events, one health probe. All review logic lives in `review-kernel`.

pub mod error_handler;
pub mod routes;

use axum::Router;
use axum::routing::{get, post};
use tracing::info;

use error_handler::{AppError, AppResult};
use routes::health_route::health_route;
use routes::review_route::review_route;

fn build_router() -> Router {
    Router::new()
        .route("/health", get(health_route))
        .route("/review", post(review_route))
}

/// Bind and serve until the process is stopped.
pub async fn start() -> AppResult<()> {
    let bind = std::env::var("REVIEW_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(AppError::Bind)?;
    info!(%bind, "review API listening");
    axum::serve(listener, build_router())
        .await
        .map_err(AppError::Server)
}
