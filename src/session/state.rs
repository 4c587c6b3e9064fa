use serde::Serialize;
use uuid::Uuid;

use crate::error::RecorderError;
use crate::store::ChunkView;

/// Recorder lifecycle as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum RecorderState {
    Idle,
    AwaitingPermission,
    Recording,
    Stopping,
    /// Transient: published once, then the recorder returns to `Idle`
    Failed(RecorderError),
}

/// Everything an observer needs to render the recorder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecorderSnapshot {
    pub state: RecorderState,
    pub last_error: Option<RecorderError>,
    pub session_id: Option<Uuid>,
    /// Oldest first
    pub chunks: Vec<ChunkView>,
}

impl RecorderSnapshot {
    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    pub fn is_idle(&self) -> bool {
        self.state == RecorderState::Idle
    }

    pub fn pending_classifications(&self) -> usize {
        self.chunks.iter().filter(|c| c.verdict.is_pending()).count()
    }
}
