use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::strategy::{ClassificationStrategy, SpeechAuthorization, SpeechAuthorizationCell};
use crate::store::ClassificationVerdict;

/// Speech-to-text engine used by the transcript tier.
#[async_trait::async_trait]
pub trait SpeechRecognizer: Send + Sync {
    fn is_available(&self) -> bool;

    /// Transcribe `chunk`, sending every partial/final transcript as it appears
    async fn transcribe(&self, chunk: &Path, transcripts: mpsc::UnboundedSender<String>)
        -> Result<()>;
}

/// Tier 1: speech is present if the recognizer ever produced text.
pub struct TranscriptStrategy {
    recognizer: Arc<dyn SpeechRecognizer>,
    authorization: SpeechAuthorizationCell,
    timeout: Duration,
}

impl TranscriptStrategy {
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        authorization: SpeechAuthorizationCell,
        timeout: Duration,
    ) -> Self {
        Self {
            recognizer,
            authorization,
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl ClassificationStrategy for TranscriptStrategy {
    fn name(&self) -> &'static str {
        "transcript"
    }

    fn requires_speech_authorization(&self) -> bool {
        true
    }

    async fn classify(&self, chunk: &Path) -> ClassificationVerdict {
        if self.authorization.get() != Some(&SpeechAuthorization::Granted) {
            debug!("Speech recognition not authorized; skipping transcript tier");
            return ClassificationVerdict::Inconclusive;
        }
        if !self.recognizer.is_available() {
            debug!("Speech recognizer unavailable; skipping transcript tier");
            return ClassificationVerdict::Inconclusive;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = tokio::time::timeout(self.timeout, self.recognizer.transcribe(chunk, tx)).await;

        let mut heard_speech = false;
        while let Ok(text) = rx.try_recv() {
            if !text.trim().is_empty() {
                heard_speech = true;
            }
        }

        match outcome {
            _ if heard_speech => ClassificationVerdict::SpeechPresent,
            Ok(Ok(())) => ClassificationVerdict::SpeechAbsent,
            Ok(Err(e)) => {
                warn!("Transcription of {} failed: {:#}", chunk.display(), e);
                ClassificationVerdict::Inconclusive
            }
            Err(_) => {
                warn!(
                    "Transcription of {} timed out after {:?}",
                    chunk.display(),
                    self.timeout
                );
                ClassificationVerdict::Inconclusive
            }
        }
    }
}
