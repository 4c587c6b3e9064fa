use serde::Serialize;
use thiserror::Error;

/// Session-level errors surfaced to observers.
///
/// Classification faults never appear here: every classification tier
/// resolves to a verdict inside the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RecorderError {
    #[error("microphone access has been denied; enable recording permissions in settings")]
    PermissionDenied,

    #[error("recording failed to start: {0}")]
    ConfigurationFailed(String),

    #[error("recording ended unexpectedly: {0}")]
    EncodeFailure(String),
}

impl RecorderError {
    pub fn configuration(err: impl std::fmt::Display) -> Self {
        Self::ConfigurationFailed(err.to_string())
    }

    pub fn encode(err: impl std::fmt::Display) -> Self {
        Self::EncodeFailure(err.to_string())
    }
}
