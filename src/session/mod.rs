//! Recording session control
//!
//! This module provides the `SessionController` that:
//! - Gates recording on microphone (and speech) permission
//! - Drives chunk rotation while holding a background-execution lease
//! - Feeds finalized chunks to the classification pipeline
//! - Publishes state, the last error and the chunk list to observers

mod config;
mod controller;
mod host;
mod state;

pub use config::SessionConfig;
pub use controller::{Collaborators, SessionController};
pub use host::{
    AudioSessionHost, LoggingAudioSession, PermissionProvider, SessionCategory, SessionOptions,
    StaticPermissions,
};
pub use state::{RecorderSnapshot, RecorderState};
