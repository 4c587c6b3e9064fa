use super::state::AppState;
use crate::error::RecorderError;
use crate::session::RecorderSnapshot;
use crate::store::ChunkView;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: RecorderError,
    pub message: String,
}

fn error_status(error: &RecorderError) -> StatusCode {
    match error {
        RecorderError::PermissionDenied => StatusCode::FORBIDDEN,
        RecorderError::ConfigurationFailed(_) | RecorderError::EncodeFailure(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /recorder
pub async fn get_recorder(State(state): State<AppState>) -> Json<RecorderSnapshot> {
    Json(state.recorder.snapshot())
}

/// POST /recorder/start
pub async fn start_recording(State(state): State<AppState>) -> impl IntoResponse {
    info!("Start requested over HTTP");

    match state.recorder.start().await {
        Ok(()) => (StatusCode::OK, Json(state.recorder.snapshot())).into_response(),
        Err(e) => {
            error!("Failed to start recording: {}", e);
            (
                error_status(&e),
                Json(ErrorResponse {
                    message: e.to_string(),
                    error: e,
                }),
            )
                .into_response()
        }
    }
}

/// POST /recorder/stop
pub async fn stop_recording(State(state): State<AppState>) -> Json<RecorderSnapshot> {
    info!("Stop requested over HTTP");
    state.recorder.stop().await;
    Json(state.recorder.snapshot())
}

/// GET /chunks
pub async fn list_chunks(State(state): State<AppState>) -> Json<Vec<ChunkView>> {
    Json(state.recorder.snapshot().chunks)
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
