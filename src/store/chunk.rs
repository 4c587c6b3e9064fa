use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const FILE_PREFIX: &str = "chunk_";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3fZ";

/// Speech-presence outcome attached to a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationVerdict {
    Pending,
    SpeechPresent,
    SpeechAbsent,
    /// No tier could decide; displayed as absent
    Inconclusive,
}

impl ClassificationVerdict {
    pub fn is_pending(self) -> bool {
        self == ClassificationVerdict::Pending
    }

    pub fn is_definitive(self) -> bool {
        matches!(
            self,
            ClassificationVerdict::SpeechPresent | ClassificationVerdict::SpeechAbsent
        )
    }

    pub fn shows_speech(self) -> bool {
        self == ClassificationVerdict::SpeechPresent
    }
}

/// One finalized, contiguous segment of captured audio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioChunk {
    /// 1-based index within the recording session (0 if unknown)
    pub sequence_index: u32,
    pub location: PathBuf,
    /// When capture of this chunk began
    pub created_at: DateTime<Utc>,
    pub duration_target: Duration,
    pub classification: ClassificationVerdict,
}

impl AudioChunk {
    pub fn new(
        sequence_index: u32,
        location: PathBuf,
        created_at: DateTime<Utc>,
        duration_target: Duration,
    ) -> Self {
        Self {
            sequence_index,
            location,
            created_at,
            duration_target,
            classification: ClassificationVerdict::Pending,
        }
    }
}

/// `chunk_<ISO-8601 UTC, colons as dashes>_<sequence>.<ext>`
pub fn chunk_file_name(created_at: DateTime<Utc>, sequence_index: u32, extension: &str) -> String {
    format!(
        "{}{}_{}.{}",
        FILE_PREFIX,
        created_at.format(TIMESTAMP_FORMAT),
        sequence_index,
        extension
    )
}

/// Recover `(created_at, sequence_index)` from a chunk file name.
pub fn parse_chunk_file_name(path: &Path) -> Option<(DateTime<Utc>, u32)> {
    let stem = path.file_stem()?.to_str()?;
    let rest = stem.strip_prefix(FILE_PREFIX)?;
    let (timestamp, sequence) = rest.rsplit_once('_')?;

    let created_at = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .ok()?
        .and_utc();
    let sequence = sequence.parse().ok()?;

    Some((created_at, sequence))
}
