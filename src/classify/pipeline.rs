use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use super::energy::EnergyStrategy;
use super::sound::{SoundClassifier, SoundClassifierStrategy};
use super::strategy::{ClassificationStrategy, SpeechAuthorizationCell};
use super::transcript::{SpeechRecognizer, TranscriptStrategy};
use crate::store::ClassificationVerdict;

/// Tunables for the standard three-tier chain.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub transcript_timeout_secs: u64,
    pub speech_confidence_threshold: f32,
    pub energy_threshold: f32,
    pub max_concurrent_jobs: usize,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            transcript_timeout_secs: 15,
            speech_confidence_threshold: 0.5,
            energy_threshold: super::energy::DEFAULT_ENERGY_THRESHOLD,
            max_concurrent_jobs: 2,
        }
    }
}

/// Ordered fallback of strategies; the first definitive verdict wins.
pub struct ClassificationChain {
    tiers: Vec<Arc<dyn ClassificationStrategy>>,
}

impl ClassificationChain {
    pub fn new(tiers: Vec<Arc<dyn ClassificationStrategy>>) -> Self {
        Self { tiers }
    }

    /// Transcript, then sound classifier, then energy; absent engines are left out.
    pub fn standard(
        recognizer: Option<Arc<dyn SpeechRecognizer>>,
        classifier: Option<Arc<dyn SoundClassifier>>,
        authorization: SpeechAuthorizationCell,
        config: &ClassificationConfig,
    ) -> Self {
        let mut tiers: Vec<Arc<dyn ClassificationStrategy>> = Vec::new();
        if let Some(recognizer) = recognizer {
            tiers.push(Arc::new(TranscriptStrategy::new(
                recognizer,
                authorization,
                Duration::from_secs(config.transcript_timeout_secs),
            )));
        }
        if let Some(classifier) = classifier {
            tiers.push(Arc::new(SoundClassifierStrategy::new(
                classifier,
                config.speech_confidence_threshold,
            )));
        }
        tiers.push(Arc::new(EnergyStrategy::new(config.energy_threshold)));

        Self::new(tiers)
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    pub fn requires_speech_authorization(&self) -> bool {
        self.tiers.iter().any(|t| t.requires_speech_authorization())
    }

    pub async fn classify(&self, chunk: &Path) -> ClassificationVerdict {
        for tier in &self.tiers {
            let verdict = tier.classify(chunk).await;
            debug!("Tier {} on {}: {:?}", tier.name(), chunk.display(), verdict);
            if verdict.is_definitive() {
                return verdict;
            }
        }
        ClassificationVerdict::Inconclusive
    }
}

/// Verdict for one chunk, delivered back to the coordination context.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub index: usize,
    pub location: PathBuf,
    pub verdict: ClassificationVerdict,
}

/// Runs one classification job per chunk off the capture path.
///
/// Jobs for different chunks run concurrently up to the configured limit;
/// results are unordered.
#[derive(Clone)]
pub struct ClassificationPipeline {
    chain: Arc<ClassificationChain>,
    permits: Arc<Semaphore>,
    results: mpsc::UnboundedSender<ClassificationResult>,
}

impl ClassificationPipeline {
    pub fn new(
        chain: ClassificationChain,
        max_concurrent_jobs: usize,
        results: mpsc::UnboundedSender<ClassificationResult>,
    ) -> Self {
        info!(
            "Classification pipeline ready: tiers {:?}, {} concurrent job(s)",
            chain.tier_names(),
            max_concurrent_jobs.max(1)
        );
        Self {
            chain: Arc::new(chain),
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            results,
        }
    }

    pub fn chain(&self) -> &ClassificationChain {
        &self.chain
    }

    /// Schedule classification of the chunk at store `index`; never blocks.
    pub fn submit(&self, index: usize, location: PathBuf) {
        let chain = Arc::clone(&self.chain);
        let permits = Arc::clone(&self.permits);
        let results = self.results.clone();

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };

            let verdict = chain.classify(&location).await;
            if results
                .send(ClassificationResult {
                    index,
                    location,
                    verdict,
                })
                .is_err()
            {
                warn!("Classification result for chunk {} had no receiver", index);
            }
        });
    }
}
