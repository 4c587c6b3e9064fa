use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::classify::SpeechAuthorization;

/// Host permission prompts. Requests may suspend until the user answers.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn request_microphone(&self) -> bool;

    async fn request_speech_authorization(&self) -> SpeechAuthorization;
}

/// Answers every request from fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticPermissions {
    pub microphone: bool,
    pub speech: SpeechAuthorization,
}

impl StaticPermissions {
    pub fn new(microphone: bool, speech: SpeechAuthorization) -> Self {
        Self { microphone, speech }
    }
}

#[async_trait]
impl PermissionProvider for StaticPermissions {
    async fn request_microphone(&self) -> bool {
        self.microphone
    }

    async fn request_speech_authorization(&self) -> SpeechAuthorization {
        self.speech
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCategory {
    /// Record while remaining compatible with playback from other apps
    PlayAndRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub category: SessionCategory,
    pub default_to_speaker: bool,
    pub allow_bluetooth: bool,
}

impl SessionOptions {
    pub fn play_and_record() -> Self {
        Self {
            category: SessionCategory::PlayAndRecord,
            default_to_speaker: true,
            allow_bluetooth: true,
        }
    }
}

/// Platform audio session (routing/category) control.
pub trait AudioSessionHost: Send + Sync {
    fn activate(&self, options: &SessionOptions) -> Result<()>;

    /// Deactivate, letting other apps resume their audio
    fn deactivate(&self);
}

/// Audio session for hosts without routing control; only tracks and logs.
#[derive(Debug, Default)]
pub struct LoggingAudioSession {
    active: AtomicBool,
}

impl LoggingAudioSession {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl AudioSessionHost for LoggingAudioSession {
    fn activate(&self, options: &SessionOptions) -> Result<()> {
        info!("Audio session activated: {:?}", options);
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn deactivate(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            info!("Audio session deactivated");
        }
    }
}
