//! Last-resort tier: RMS amplitude over the whole chunk.

use std::path::Path;
use tracing::{debug, warn};

use super::strategy::ClassificationStrategy;
use crate::audio::AudioFile;
use crate::store::ClassificationVerdict;

pub const DEFAULT_ENERGY_THRESHOLD: f32 = 0.01;

#[derive(Debug, Clone)]
pub struct EnergyStrategy {
    /// RMS on a [-1, 1] scale above which speech is assumed
    threshold: f32,
}

impl EnergyStrategy {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for EnergyStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_ENERGY_THRESHOLD)
    }
}

/// Root-mean-square of a sample slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

#[async_trait::async_trait]
impl ClassificationStrategy for EnergyStrategy {
    fn name(&self) -> &'static str {
        "energy"
    }

    async fn classify(&self, chunk: &Path) -> ClassificationVerdict {
        let path = chunk.to_path_buf();
        let decoded = tokio::task::spawn_blocking(move || {
            AudioFile::open(&path).map(|audio| rms(&audio.mono_samples()))
        })
        .await;

        match decoded {
            Ok(Ok(level)) => {
                debug!("Chunk {} RMS {:.5}", chunk.display(), level);
                if level > self.threshold {
                    ClassificationVerdict::SpeechPresent
                } else {
                    ClassificationVerdict::SpeechAbsent
                }
            }
            Ok(Err(e)) => {
                warn!("Could not decode {}: {:#}", chunk.display(), e);
                ClassificationVerdict::SpeechAbsent
            }
            Err(e) => {
                warn!("Energy analysis of {} panicked: {}", chunk.display(), e);
                ClassificationVerdict::SpeechAbsent
            }
        }
    }
}
