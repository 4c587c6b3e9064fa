use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use crate::store::ClassificationVerdict;

/// One tier of the speech-presence fallback chain.
///
/// Returning [`ClassificationVerdict::Inconclusive`] hands the chunk to the
/// next tier. Strategies never fail: faults resolve to a verdict here.
#[async_trait::async_trait]
pub trait ClassificationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this tier needs speech-recognition authorization
    fn requires_speech_authorization(&self) -> bool {
        false
    }

    async fn classify(&self, chunk: &Path) -> ClassificationVerdict;
}

/// Host answer to a speech-recognition authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechAuthorization {
    Granted,
    Denied,
    NotDetermined,
}

/// Process-wide speech authorization, settled at most once.
pub type SpeechAuthorizationCell = Arc<OnceLock<SpeechAuthorization>>;
