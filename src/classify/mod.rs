//! Speech-presence classification of finalized chunks.
//!
//! Tiers run strictly top-down inside one job: transcript, sound classifier,
//! energy threshold. A tier is consulted only when every tier above it was
//! unavailable or inconclusive.

mod energy;
mod pipeline;
mod sound;
mod strategy;
mod transcript;

pub use energy::{rms, EnergyStrategy, DEFAULT_ENERGY_THRESHOLD};
pub use pipeline::{ClassificationChain, ClassificationConfig, ClassificationPipeline, ClassificationResult};
pub use sound::{SoundClassifier, SoundClassifierStrategy, SoundObservation, SPEECH_LABEL};
pub use strategy::{ClassificationStrategy, SpeechAuthorization, SpeechAuthorizationCell};
pub use transcript::{SpeechRecognizer, TranscriptStrategy};
