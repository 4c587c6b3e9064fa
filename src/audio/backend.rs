use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::file::AudioFile;
use super::resample::{RateConverter, DEFAULT_CHUNK};

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Sample rate frames are delivered at
    pub target_sample_rate: u32,
    /// Channel count frames are delivered with (1 = mono)
    pub target_channels: u16,
    /// Buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 44100,
            target_channels: 1,
            buffer_duration_ms: 100,
        }
    }
}

/// Source of live audio frames feeding a capture device.
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Replay an audio file in real time, looping at the end
    File(PathBuf),
    /// Digital silence
    Silence,
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    pub fn create(source: AudioSource, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        let backend = match source {
            AudioSource::File(path) => ReplayBackend::from_file(&path, config)?,
            AudioSource::Silence => ReplayBackend::silence(config),
        };
        Ok(Box::new(backend))
    }
}

/// Plays a fixed mono PCM buffer as a live stream, paced by the wall clock.
pub struct ReplayBackend {
    name: String,
    config: AudioBackendConfig,
    samples: Arc<Vec<i16>>,
    task: Option<JoinHandle<()>>,
}

impl ReplayBackend {
    pub fn from_file(path: &std::path::Path, config: AudioBackendConfig) -> Result<Self> {
        let audio = AudioFile::open(path)
            .with_context(|| format!("Failed to load replay source {}", path.display()))?;

        let mono = audio.mono_samples();
        let resampled = RateConverter::new(audio.sample_rate, config.target_sample_rate, DEFAULT_CHUNK)?
            .convert(&mono)?;
        let samples: Vec<i16> = resampled
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect();

        info!(
            "Replay backend loaded {} ({:.1}s at {}Hz)",
            path.display(),
            samples.len() as f64 / config.target_sample_rate as f64,
            config.target_sample_rate
        );

        Ok(Self {
            name: format!("replay:{}", path.display()),
            config,
            samples: Arc::new(samples),
            task: None,
        })
    }

    pub fn silence(config: AudioBackendConfig) -> Self {
        let frame_len = frame_len(&config);
        Self {
            name: "silence".to_string(),
            config,
            samples: Arc::new(vec![0; frame_len]),
            task: None,
        }
    }
}

fn frame_len(config: &AudioBackendConfig) -> usize {
    (config.target_sample_rate as u64 * config.buffer_duration_ms / 1000).max(1) as usize
}

#[async_trait::async_trait]
impl AudioBackend for ReplayBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.task.is_some() {
            anyhow::bail!("Already capturing");
        }
        if self.samples.is_empty() {
            anyhow::bail!("Replay source {} contains no audio", self.name);
        }

        let (tx, rx) = mpsc::channel(100);
        let samples = Arc::clone(&self.samples);
        let config = self.config.clone();
        let name = self.name.clone();

        self.task = Some(tokio::spawn(async move {
            let per_frame = frame_len(&config);
            let channels = config.target_channels.max(1) as usize;
            let mut ticker =
                tokio::time::interval(Duration::from_millis(config.buffer_duration_ms.max(1)));
            let mut cursor = 0usize;
            let mut timestamp_ms = 0u64;

            loop {
                ticker.tick().await;

                let mut frame = Vec::with_capacity(per_frame * channels);
                for _ in 0..per_frame {
                    let sample = samples[cursor];
                    cursor = (cursor + 1) % samples.len();
                    frame.extend(std::iter::repeat(sample).take(channels));
                }

                let frame = AudioFrame {
                    samples: frame,
                    sample_rate: config.target_sample_rate,
                    channels: config.target_channels,
                    timestamp_ms,
                };
                timestamp_ms += config.buffer_duration_ms;

                if tx.send(frame).await.is_err() {
                    debug!("Replay backend {} receiver dropped", name);
                    break;
                }
            }
        }));

        info!("Replay backend {} started", self.name);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Replay backend {} stopped", self.name);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
