use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use super::chunk::{chunk_file_name, parse_chunk_file_name, AudioChunk, ClassificationVerdict};

/// Observer-facing view of one chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkView {
    pub sequence: u32,
    pub location: PathBuf,
    pub created_at: DateTime<Utc>,
    pub verdict: ClassificationVerdict,
}

impl From<&AudioChunk> for ChunkView {
    fn from(chunk: &AudioChunk) -> Self {
        Self {
            sequence: chunk.sequence_index,
            location: chunk.location.clone(),
            created_at: chunk.created_at,
            verdict: chunk.classification,
        }
    }
}

/// Ordered registry of chunk artifacts on durable storage.
///
/// Entries are never reordered or removed; the only mutation after an entry
/// exists is its single `Pending -> decided` classification.
#[derive(Debug)]
pub struct ChunkStore {
    dir: PathBuf,
    extension: String,
    duration_target: Duration,
    chunks: Vec<AudioChunk>,
}

impl ChunkStore {
    /// Create the storage directory if needed and discover existing chunks.
    pub fn open(
        dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        duration_target: Duration,
    ) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create chunk directory {}", dir.display()))?;

        let mut store = Self {
            dir,
            extension: extension.into(),
            duration_target,
            chunks: Vec::new(),
        };
        store.load_existing()?;

        Ok(store)
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Enumerate persisted artifacts, oldest modification time first.
    ///
    /// Returns the store indices of newly discovered chunks, all `Pending`.
    /// Locations already present are skipped.
    pub fn load_existing(&mut self) -> Result<Vec<usize>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read chunk directory {}", self.dir.display()))?;

        let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();

            if !self.is_chunk_artifact(&path) {
                debug!("Ignoring non-chunk file {}", path.display());
                continue;
            }

            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((modified, path));
        }

        found.sort_by(|(a_time, a_path), (b_time, b_path)| {
            a_time.cmp(b_time).then_with(|| a_path.cmp(b_path))
        });

        let mut loaded = Vec::new();
        for (modified, path) in found {
            if self.contains(&path) {
                continue;
            }

            let (created_at, sequence_index) = parse_chunk_file_name(&path)
                .unwrap_or_else(|| (DateTime::<Utc>::from(modified), 0));
            self.chunks.push(AudioChunk::new(
                sequence_index,
                path,
                created_at,
                self.duration_target,
            ));
            loaded.push(self.chunks.len() - 1);
        }

        info!(
            "Discovered {} existing chunk(s) in {}",
            loaded.len(),
            self.dir.display()
        );

        Ok(loaded)
    }

    fn is_chunk_artifact(&self, path: &Path) -> bool {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(true, |n| n.starts_with('.'));
        let matches_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension));

        !hidden && matches_extension && path.is_file()
    }

    /// Deterministic location for a new chunk.
    pub fn location_for(&self, created_at: DateTime<Utc>, sequence_index: u32) -> PathBuf {
        self.dir
            .join(chunk_file_name(created_at, sequence_index, &self.extension))
    }

    /// Append a finalized chunk; returns its store index.
    ///
    /// A chunk whose location is already registered is rejected.
    pub fn append(&mut self, chunk: AudioChunk) -> Option<usize> {
        if self.contains(&chunk.location) {
            warn!(
                "Chunk {} already registered; ignoring duplicate",
                chunk.location.display()
            );
            return None;
        }

        debug!(
            "Appending chunk {} ({})",
            chunk.sequence_index,
            chunk.location.display()
        );
        self.chunks.push(chunk);
        Some(self.chunks.len() - 1)
    }

    /// Record the verdict for one entry; returns whether anything changed.
    ///
    /// Missing entries and entries that are no longer `Pending` are left alone.
    pub fn set_classification(&mut self, index: usize, verdict: ClassificationVerdict) -> bool {
        let Some(chunk) = self.chunks.get_mut(index) else {
            warn!("Classification for unknown chunk index {} dropped", index);
            return false;
        };

        if !chunk.classification.is_pending() {
            warn!(
                "Chunk {} already classified as {:?}; ignoring {:?}",
                chunk.location.display(),
                chunk.classification,
                verdict
            );
            return false;
        }
        if verdict.is_pending() {
            return false;
        }

        info!(
            "Chunk {} classified: {:?}",
            chunk.location.display(),
            verdict
        );
        chunk.classification = verdict;
        true
    }

    pub fn contains(&self, location: &Path) -> bool {
        self.chunks.iter().any(|c| c.location == location)
    }

    pub fn get(&self, index: usize) -> Option<&AudioChunk> {
        self.chunks.get(index)
    }

    pub fn chunks(&self) -> &[AudioChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn views(&self) -> Vec<ChunkView> {
        self.chunks.iter().map(ChunkView::from).collect()
    }
}
