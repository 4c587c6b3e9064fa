use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio::{CaptureDevice, CaptureSettings, RecordOutcome};
use crate::classify::ClassificationPipeline;
use crate::error::RecorderError;
use crate::store::{AudioChunk, ChunkStore};

/// Device completion for one chunk, tagged so stale deliveries can be told apart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkCompletion {
    pub session: Uuid,
    pub sequence: u32,
    pub outcome: RecordOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Starting,
    /// Recording the chunk with this sequence index
    Recording(u32),
    /// Waiting for the last chunk to finalize
    Stopping,
}

/// What the engine did with a completion.
#[derive(Debug, Clone, PartialEq)]
pub enum NextStep {
    /// Completion belonged to no in-flight chunk
    Ignored,
    /// Chunk appended and the next one started with this sequence index
    Rotated(u32),
    /// Chunk appended after a stop request; engine is idle
    Halted,
    /// Session aborted; engine is idle
    Failed(RecorderError),
}

struct InFlight {
    sequence: u32,
    location: PathBuf,
    created_at: DateTime<Utc>,
}

/// Chunk rotation state machine.
///
/// The next chunk starts from inside the completion handling of the previous
/// one, so boundaries follow the device rather than a wall-clock timer.
pub struct RotationEngine {
    device: Box<dyn CaptureDevice>,
    settings: CaptureSettings,
    chunk_duration: Duration,
    completions: mpsc::UnboundedSender<ChunkCompletion>,
    state: EngineState,
    session: Option<Uuid>,
    counter: u32,
    in_flight: Option<InFlight>,
}

impl RotationEngine {
    pub fn new(
        device: Box<dyn CaptureDevice>,
        settings: CaptureSettings,
        chunk_duration: Duration,
        completions: mpsc::UnboundedSender<ChunkCompletion>,
    ) -> Self {
        Self {
            device,
            settings,
            chunk_duration,
            completions,
            state: EngineState::Idle,
            session: None,
            counter: 0,
            in_flight: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn session(&self) -> Option<Uuid> {
        self.session
    }

    /// Configure the device and begin chunk 1 of a new session.
    pub async fn start(&mut self, session: Uuid, store: &ChunkStore) -> Result<(), RecorderError> {
        if self.state != EngineState::Idle {
            return Err(RecorderError::configuration("rotation engine is already running"));
        }

        self.state = EngineState::Starting;
        self.session = Some(session);
        self.counter = 0;

        if let Err(e) = self.device.configure(&self.settings).await {
            self.reset();
            return Err(RecorderError::configuration(format!("{e:#}")));
        }

        if let Err(e) = self.start_next(store).await {
            self.halt().await;
            return Err(RecorderError::configuration(format!("{e:#}")));
        }

        info!(
            "Rotation started for session {} ({}s chunks via {})",
            session,
            self.chunk_duration.as_secs_f64(),
            self.device.name()
        );
        Ok(())
    }

    async fn start_next(&mut self, store: &ChunkStore) -> Result<u32> {
        let session = self.session.context("No active recording session")?;
        let sequence = self.counter + 1;
        let created_at = Utc::now();
        let location = store.location_for(created_at, sequence);

        let completion = self
            .device
            .record_for(self.chunk_duration, &location)
            .await
            .with_context(|| format!("Unable to start chunk {}", sequence))?;

        self.counter = sequence;
        self.state = EngineState::Recording(sequence);
        self.in_flight = Some(InFlight {
            sequence,
            location: location.clone(),
            created_at,
        });

        let completions = self.completions.clone();
        tokio::spawn(async move {
            let outcome = completion.await.unwrap_or_else(|_| {
                RecordOutcome::Failed("capture device dropped the chunk".to_string())
            });
            let _ = completions.send(ChunkCompletion {
                session,
                sequence,
                outcome,
            });
        });

        debug!("Chunk {} recording to {}", sequence, location.display());
        Ok(sequence)
    }

    /// Handle the device finishing a chunk.
    ///
    /// A finalized chunk is appended to `store` and submitted to `pipeline`
    /// before the next chunk is started.
    pub async fn on_completion(
        &mut self,
        completion: ChunkCompletion,
        store: &mut ChunkStore,
        pipeline: &ClassificationPipeline,
    ) -> NextStep {
        let expected = self.session == Some(completion.session)
            && self
                .in_flight
                .as_ref()
                .is_some_and(|f| f.sequence == completion.sequence);
        if !expected {
            debug!(
                "Ignoring stale completion for chunk {} of session {}",
                completion.sequence, completion.session
            );
            return NextStep::Ignored;
        }
        let Some(finished) = self.in_flight.take() else {
            return NextStep::Ignored;
        };

        if let RecordOutcome::Failed(detail) = completion.outcome {
            error!("Chunk {} failed to encode: {}", finished.sequence, detail);
            self.halt().await;
            return NextStep::Failed(RecorderError::EncodeFailure(detail));
        }

        info!(
            "Chunk {} finalized: {}",
            finished.sequence,
            finished.location.display()
        );
        let chunk = AudioChunk::new(
            finished.sequence,
            finished.location.clone(),
            finished.created_at,
            self.chunk_duration,
        );
        if let Some(index) = store.append(chunk) {
            pipeline.submit(index, finished.location);
        }

        if self.state == EngineState::Stopping {
            self.reset();
            return NextStep::Halted;
        }

        match self.start_next(store).await {
            Ok(next) => NextStep::Rotated(next),
            Err(e) => {
                error!("Rotation failed: {:#}", e);
                self.halt().await;
                NextStep::Failed(RecorderError::encode(format!("{e:#}")))
            }
        }
    }

    /// Stop after the chunk in progress; returns true if one is still finalizing.
    pub async fn request_stop(&mut self) -> bool {
        if self.state == EngineState::Idle {
            return false;
        }
        if self.in_flight.is_none() {
            self.reset();
            return false;
        }

        self.state = EngineState::Stopping;
        if let Err(e) = self.device.stop().await {
            warn!("Capture device failed to stop cleanly: {:#}", e);
        }
        self.in_flight.is_some()
    }

    /// Stop immediately and disown any chunk in progress.
    pub async fn abort(&mut self) {
        if self.state != EngineState::Idle {
            self.halt().await;
        }
    }

    async fn halt(&mut self) {
        self.reset();
        if let Err(e) = self.device.stop().await {
            warn!("Capture device failed to stop cleanly: {:#}", e);
        }
    }

    fn reset(&mut self) {
        self.state = EngineState::Idle;
        self.session = None;
        self.in_flight = None;
    }
}
