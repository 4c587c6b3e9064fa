use std::path::PathBuf;
use std::time::Duration;

use crate::audio::CaptureSettings;
use crate::classify::ClassificationConfig;

/// Runtime configuration for a recorder
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory holding chunk artifacts, created on first use
    pub chunks_dir: PathBuf,

    /// Nominal length of each chunk
    /// Default: 30 seconds
    pub chunk_duration: Duration,

    /// Device format (44.1kHz mono AAC by default)
    pub capture: CaptureSettings,

    pub classification: ClassificationConfig,

    /// Label passed to the host when requesting background time
    pub lease_label: String,

    /// How long `stop()` waits for the last chunk to finalize
    pub stop_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunks_dir: PathBuf::from("Chunks"),
            chunk_duration: Duration::from_secs(30),
            capture: CaptureSettings::default(),
            classification: ClassificationConfig::default(),
            lease_label: "BackgroundAudioRecording".to_string(),
            stop_grace: Duration::from_secs(5),
        }
    }
}
