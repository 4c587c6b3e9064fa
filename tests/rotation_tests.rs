// Rotation engine driven directly, without the session controller

mod common;

use anyhow::{Context, Result};
use common::DeviceControl;
use hearhear::audio::{AudioCodec, CaptureSettings, RecordOutcome};
use hearhear::classify::{ClassificationChain, ClassificationPipeline, ClassificationResult};
use hearhear::recording::{ChunkCompletion, EngineState, NextStep, RotationEngine};
use hearhear::store::ChunkStore;
use hearhear::RecorderError;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

const CHUNK: Duration = Duration::from_secs(30);

struct Rig {
    engine: RotationEngine,
    device: DeviceControl,
    store: ChunkStore,
    pipeline: ClassificationPipeline,
    completions: mpsc::UnboundedReceiver<ChunkCompletion>,
    _results: mpsc::UnboundedReceiver<ClassificationResult>,
    _dir: TempDir,
}

impl Rig {
    fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let device = DeviceControl::default();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (results_tx, results) = mpsc::unbounded_channel();
        let settings = CaptureSettings {
            codec: AudioCodec::Pcm16,
            ..CaptureSettings::default()
        };

        Ok(Self {
            engine: RotationEngine::new(device.device(), settings, CHUNK, completions_tx),
            device,
            store: ChunkStore::open(dir.path(), "wav", CHUNK)?,
            pipeline: ClassificationPipeline::new(ClassificationChain::new(vec![]), 1, results_tx),
            completions,
            _results: results,
            _dir: dir,
        })
    }

    /// Wait for the device's completion and hand it to the engine.
    async fn deliver(&mut self) -> Result<NextStep> {
        let completion = self
            .completions
            .recv()
            .await
            .context("completion channel closed")?;
        Ok(self
            .engine
            .on_completion(completion, &mut self.store, &self.pipeline)
            .await)
    }
}

#[tokio::test]
async fn test_engine_walks_through_its_states() -> Result<()> {
    let mut rig = Rig::new()?;
    assert_eq!(rig.engine.state(), EngineState::Idle);

    rig.engine.start(Uuid::new_v4(), &rig.store).await?;
    assert_eq!(rig.engine.state(), EngineState::Recording(1));

    assert!(rig.device.complete(RecordOutcome::Finished));
    assert_eq!(rig.deliver().await?, NextStep::Rotated(2));
    assert_eq!(rig.engine.state(), EngineState::Recording(2));
    assert_eq!(rig.store.len(), 1);

    // The scripted device finalizes the chunk in progress on stop
    assert!(rig.engine.request_stop().await);
    assert_eq!(rig.engine.state(), EngineState::Stopping);

    assert_eq!(rig.deliver().await?, NextStep::Halted);
    assert_eq!(rig.engine.state(), EngineState::Idle);
    assert_eq!(rig.engine.session(), None);
    assert_eq!(rig.store.len(), 2);
    assert_eq!(rig.device.started(), 2);
    Ok(())
}

#[tokio::test]
async fn test_engine_rejects_second_start() -> Result<()> {
    let mut rig = Rig::new()?;
    rig.engine.start(Uuid::new_v4(), &rig.store).await?;

    let again = rig.engine.start(Uuid::new_v4(), &rig.store).await;

    assert!(again.is_err());
    assert_eq!(rig.engine.state(), EngineState::Recording(1));
    assert_eq!(rig.device.configured(), 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_chunk_returns_engine_to_idle() -> Result<()> {
    let mut rig = Rig::new()?;
    rig.engine.start(Uuid::new_v4(), &rig.store).await?;

    assert!(rig.device.complete(RecordOutcome::Failed("disk full".into())));

    assert_eq!(
        rig.deliver().await?,
        NextStep::Failed(RecorderError::EncodeFailure("disk full".into()))
    );
    assert_eq!(rig.engine.state(), EngineState::Idle);
    assert!(rig.store.is_empty());
    assert_eq!(rig.device.stops(), 1);
    Ok(())
}

#[tokio::test]
async fn test_completion_from_old_session_is_ignored() -> Result<()> {
    let mut rig = Rig::new()?;
    let session = Uuid::new_v4();
    rig.engine.start(session, &rig.store).await?;

    let stale = ChunkCompletion {
        session: Uuid::new_v4(),
        sequence: 1,
        outcome: RecordOutcome::Finished,
    };
    let step = rig
        .engine
        .on_completion(stale, &mut rig.store, &rig.pipeline)
        .await;

    assert_eq!(step, NextStep::Ignored);
    assert_eq!(rig.engine.state(), EngineState::Recording(1));
    assert_eq!(rig.engine.session(), Some(session));
    assert!(rig.store.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_configuration_leaves_engine_idle() -> Result<()> {
    let mut rig = Rig::new()?;
    rig.device.fail_configure();

    let result = rig.engine.start(Uuid::new_v4(), &rig.store).await;

    assert!(matches!(result, Err(RecorderError::ConfigurationFailed(_))));
    assert_eq!(rig.engine.state(), EngineState::Idle);
    assert_eq!(rig.device.started(), 0);
    Ok(())
}
