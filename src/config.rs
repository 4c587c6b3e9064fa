use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{AudioCodec, CaptureSettings, EncoderQuality};
use crate::classify::{ClassificationConfig, SpeechAuthorization};
use crate::session::SessionConfig;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub recorder: RecorderConfig,
    pub classification: ClassificationConfig,
    pub lease: LeaseConfig,
    pub permissions: PermissionConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "hearhear".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub chunks_dir: String,
    pub chunk_duration_secs: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub codec: AudioCodec,
    pub quality: EncoderQuality,
    pub stop_grace_secs: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        let capture = CaptureSettings::default();
        Self {
            chunks_dir: "~/.hearhear/Chunks".to_string(),
            chunk_duration_secs: 30,
            sample_rate: capture.sample_rate,
            channels: capture.channels,
            // The bundled capture device writes WAV
            codec: AudioCodec::Pcm16,
            quality: capture.quality,
            stop_grace_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    pub label: String,
    /// Host-imposed cap on background time; unlimited when absent
    pub max_duration_secs: Option<u64>,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            label: "BackgroundAudioRecording".to_string(),
            max_duration_secs: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    pub microphone: bool,
    pub speech: SpeechAuthorization,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            microphone: true,
            speech: SpeechAuthorization::NotDetermined,
        }
    }
}

impl Config {
    /// Load `path` (any format the `config` crate knows, extension optional)
    /// with `HEARHEAR`-prefixed environment overrides. A missing file yields
    /// defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("HEARHEAR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn chunks_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.recorder.chunks_dir).as_ref())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            chunks_dir: self.chunks_dir(),
            chunk_duration: Duration::from_secs(self.recorder.chunk_duration_secs.max(1)),
            capture: CaptureSettings {
                sample_rate: self.recorder.sample_rate,
                channels: self.recorder.channels,
                codec: self.recorder.codec,
                quality: self.recorder.quality,
            },
            classification: self.classification.clone(),
            lease_label: self.lease.label.clone(),
            stop_grace: Duration::from_secs(self.recorder.stop_grace_secs),
        }
    }
}
