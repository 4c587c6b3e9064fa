use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use super::strategy::ClassificationStrategy;
use crate::store::ClassificationVerdict;

pub const SPEECH_LABEL: &str = "speech";

/// A single label/confidence pair emitted by a sound classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundObservation {
    pub label: String,
    pub confidence: f32,
}

/// General-purpose audio event classifier.
#[async_trait::async_trait]
pub trait SoundClassifier: Send + Sync {
    /// Analyze `chunk`, sending observations for each analysis window
    async fn analyze(
        &self,
        chunk: &Path,
        observations: mpsc::UnboundedSender<SoundObservation>,
    ) -> Result<()>;
}

/// Tier 2: peak "speech" confidence across the whole chunk.
pub struct SoundClassifierStrategy {
    classifier: Arc<dyn SoundClassifier>,
    threshold: f32,
}

impl SoundClassifierStrategy {
    pub fn new(classifier: Arc<dyn SoundClassifier>, threshold: f32) -> Self {
        Self {
            classifier,
            threshold,
        }
    }
}

#[async_trait::async_trait]
impl ClassificationStrategy for SoundClassifierStrategy {
    fn name(&self) -> &'static str {
        "sound-classifier"
    }

    async fn classify(&self, chunk: &Path) -> ClassificationVerdict {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = self.classifier.analyze(chunk, tx).await;

        if let Err(e) = result {
            warn!("Sound classification of {} failed: {:#}", chunk.display(), e);
            return ClassificationVerdict::SpeechAbsent;
        }

        let mut peak = 0.0f32;
        while let Ok(observation) = rx.try_recv() {
            if observation.label.eq_ignore_ascii_case(SPEECH_LABEL) {
                peak = peak.max(observation.confidence);
            }
        }

        if peak >= self.threshold {
            ClassificationVerdict::SpeechPresent
        } else {
            ClassificationVerdict::SpeechAbsent
        }
    }
}
