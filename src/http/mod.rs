//! HTTP API for controlling and observing the recorder
//!
//! - GET /health - Health check
//! - GET /recorder - Current state, last error and chunk list
//! - POST /recorder/start - Request permission and start recording
//! - POST /recorder/stop - Stop recording
//! - GET /chunks - Stored chunks, oldest first

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
