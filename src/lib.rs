pub mod audio;
pub mod classify;
pub mod config;
pub mod error;
pub mod http;
pub mod lease;
pub mod recording;
pub mod session;
pub mod store;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioCodec, AudioFile, AudioFrame,
    AudioSource, CaptureDevice, CaptureSettings, RecordOutcome, WavCaptureDevice,
};
pub use classify::{
    ClassificationChain, ClassificationPipeline, ClassificationStrategy, SoundClassifier,
    SpeechAuthorization, SpeechRecognizer,
};
pub use config::Config;
pub use error::RecorderError;
pub use http::{create_router, AppState};
pub use lease::{BackgroundHost, Lease, LeaseManager, ProcessHost};
pub use recording::RotationEngine;
pub use session::{Collaborators, RecorderSnapshot, RecorderState, SessionConfig, SessionController};
pub use store::{AudioChunk, ChunkStore, ClassificationVerdict};
