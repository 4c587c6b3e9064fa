use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::oneshot;

/// Encoder used for chunk artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    /// MPEG-4 AAC in an `.m4a` container
    Aac,
    /// 16-bit linear PCM in a `.wav` container
    Pcm16,
}

impl AudioCodec {
    pub fn extension(self) -> &'static str {
        match self {
            AudioCodec::Aac => "m4a",
            AudioCodec::Pcm16 => "wav",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderQuality {
    Low,
    Medium,
    High,
    Max,
}

/// Settings handed to the capture device before each session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub codec: AudioCodec,
    pub quality: EncoderQuality,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            codec: AudioCodec::Aac,
            quality: EncoderQuality::High,
        }
    }
}

/// How a single record-for-duration operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The target was written and finalized
    Finished,
    /// Encoding failed mid-chunk; the artifact is not trustworthy
    Failed(String),
}

/// One-shot completion for a chunk that has started recording.
pub type RecordCompletion = oneshot::Receiver<RecordOutcome>;

/// Recording hardware/encoder abstraction.
///
/// A device has at most one outstanding `record_for` at a time. The
/// completion fires exactly once per started chunk, including when the
/// chunk is cut short by `stop()`.
#[async_trait::async_trait]
pub trait CaptureDevice: Send {
    /// Apply capture settings; called at the start of every session
    async fn configure(&mut self, settings: &CaptureSettings) -> Result<()>;

    /// Begin recording into `target` for exactly `duration`
    ///
    /// An `Err` means the chunk never started.
    async fn record_for(&mut self, duration: Duration, target: &Path) -> Result<RecordCompletion>;

    /// Cut the chunk in progress short, finalizing it
    async fn stop(&mut self) -> Result<()>;

    /// Get device name for logging
    fn name(&self) -> &str;
}
