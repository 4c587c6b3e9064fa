use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recorder control
        .route("/recorder", get(handlers::get_recorder))
        .route("/recorder/start", post(handlers::start_recording))
        .route("/recorder/stop", post(handlers::stop_recording))
        // Stored chunks with their verdicts
        .route("/chunks", get(handlers::list_chunks))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
