use anyhow::Result;
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::config::SessionConfig;
use super::host::{AudioSessionHost, PermissionProvider, SessionOptions};
use super::state::{RecorderSnapshot, RecorderState};
use crate::audio::CaptureDevice;
use crate::classify::{
    ClassificationChain, ClassificationPipeline, ClassificationResult, SoundClassifier,
    SpeechAuthorizationCell, SpeechRecognizer,
};
use crate::error::RecorderError;
use crate::lease::{BackgroundHost, Lease, LeaseManager};
use crate::recording::{ChunkCompletion, NextStep, RotationEngine};
use crate::store::ChunkStore;

/// External collaborators the recorder is wired to.
pub struct Collaborators {
    pub device: Box<dyn CaptureDevice>,
    pub permissions: Arc<dyn PermissionProvider>,
    pub audio_session: Arc<dyn AudioSessionHost>,
    pub host: Arc<dyn BackgroundHost>,
    /// Enables the transcript tier
    pub recognizer: Option<Arc<dyn SpeechRecognizer>>,
    /// Enables the sound-classifier tier
    pub sound_classifier: Option<Arc<dyn SoundClassifier>>,
}

type StartReply = oneshot::Sender<Result<(), RecorderError>>;

enum Command {
    Start { reply: StartReply },
    Stop { reply: oneshot::Sender<()> },
    PermissionResolved { microphone: bool },
    StopGraceElapsed { session: Uuid },
}

/// Public handle to the recorder.
///
/// All state lives on a single coordination task; this handle only sends it
/// messages and reads published snapshots.
#[derive(Clone)]
pub struct SessionController {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<RecorderSnapshot>,
}

impl SessionController {
    /// Open the chunk store, schedule classification of discovered chunks and
    /// start the coordination task. Must be called inside a tokio runtime.
    pub fn spawn(config: SessionConfig, parts: Collaborators) -> Result<Self> {
        let store = ChunkStore::open(
            &config.chunks_dir,
            config.capture.codec.extension(),
            config.chunk_duration,
        )?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (expiries_tx, expiries_rx) = mpsc::unbounded_channel();

        let speech_authorization: SpeechAuthorizationCell = Arc::new(OnceLock::new());
        let chain = ClassificationChain::standard(
            parts.recognizer,
            parts.sound_classifier,
            Arc::clone(&speech_authorization),
            &config.classification,
        );
        let pipeline = ClassificationPipeline::new(
            chain,
            config.classification.max_concurrent_jobs,
            results_tx,
        );
        for (index, chunk) in store.chunks().iter().enumerate() {
            pipeline.submit(index, chunk.location.clone());
        }

        let engine = RotationEngine::new(
            parts.device,
            config.capture.clone(),
            config.chunk_duration,
            completions_tx,
        );

        let initial = RecorderSnapshot {
            state: RecorderState::Idle,
            last_error: None,
            session_id: None,
            chunks: store.views(),
        };
        let (snapshots_tx, snapshots_rx) = watch::channel(initial);

        let coordinator = Coordinator {
            leases: LeaseManager::new(parts.host, config.lease_label.clone()),
            config,
            store,
            engine,
            pipeline,
            lease: None,
            permissions: parts.permissions,
            audio_session: parts.audio_session,
            speech_authorization,
            state: RecorderState::Idle,
            last_error: None,
            pending_starts: Vec::new(),
            pending_stops: Vec::new(),
            commands: commands_tx.clone(),
            expiries: expiries_tx,
            snapshots: snapshots_tx,
        };
        tokio::spawn(coordinator.run(Inbox {
            commands: commands_rx,
            completions: completions_rx,
            results: results_rx,
            expiries: expiries_rx,
        }));

        Ok(Self {
            commands: commands_tx,
            snapshots: snapshots_rx,
        })
    }

    /// Request permission and begin recording.
    ///
    /// Resolves once recording is running or the attempt failed; a no-op
    /// while already recording.
    pub async fn start(&self) -> Result<(), RecorderError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Start { reply })
            .map_err(|_| RecorderError::configuration("recorder has shut down"))?;
        rx.await
            .map_err(|_| RecorderError::configuration("recorder has shut down"))?
    }

    /// Stop recording; resolves once the recorder is idle.
    ///
    /// A stop issued while a previous stop is still finalizing waits for
    /// that one. Otherwise a no-op unless recording.
    pub async fn stop(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Stop { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn snapshot(&self) -> RecorderSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecorderSnapshot> {
        self.snapshots.clone()
    }

    /// Wait for the first published snapshot matching `predicate`.
    pub async fn wait_until(
        &self,
        predicate: impl FnMut(&RecorderSnapshot) -> bool,
    ) -> RecorderSnapshot {
        let mut rx = self.snapshots.clone();
        let matched = rx.wait_for(predicate).await.map(|s| s.clone());
        matched.unwrap_or_else(|_| self.snapshot())
    }
}

struct Inbox {
    commands: mpsc::UnboundedReceiver<Command>,
    completions: mpsc::UnboundedReceiver<ChunkCompletion>,
    results: mpsc::UnboundedReceiver<ClassificationResult>,
    expiries: mpsc::UnboundedReceiver<Uuid>,
}

/// Owner of all observable recorder state.
struct Coordinator {
    config: SessionConfig,
    store: ChunkStore,
    engine: RotationEngine,
    pipeline: ClassificationPipeline,
    leases: LeaseManager,
    lease: Option<Lease>,
    permissions: Arc<dyn PermissionProvider>,
    audio_session: Arc<dyn AudioSessionHost>,
    speech_authorization: SpeechAuthorizationCell,
    state: RecorderState,
    last_error: Option<RecorderError>,
    pending_starts: Vec<StartReply>,
    pending_stops: Vec<oneshot::Sender<()>>,
    commands: mpsc::UnboundedSender<Command>,
    expiries: mpsc::UnboundedSender<Uuid>,
    snapshots: watch::Sender<RecorderSnapshot>,
}

impl Coordinator {
    async fn run(mut self, mut inbox: Inbox) {
        info!("Recorder ready: {} chunk(s) on disk", self.store.len());

        loop {
            tokio::select! {
                Some(command) = inbox.commands.recv() => self.handle(command).await,
                Some(completion) = inbox.completions.recv() => self.on_chunk_completion(completion).await,
                Some(result) = inbox.results.recv() => self.on_classified(result),
                Some(session) = inbox.expiries.recv() => self.on_lease_expired(session).await,
                else => break,
            }
            self.publish();
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Start { reply } => self.on_start(reply),
            Command::Stop { reply } => match self.state {
                RecorderState::Recording => {
                    self.pending_stops.push(reply);
                    self.begin_stop().await;
                }
                // Joins the stop already in progress
                RecorderState::Stopping => self.pending_stops.push(reply),
                _ => {
                    let _ = reply.send(());
                }
            },
            Command::PermissionResolved { microphone } => self.on_permission(microphone).await,
            Command::StopGraceElapsed { session } => {
                if self.state == RecorderState::Stopping && self.engine.session() == Some(session) {
                    warn!(
                        "Last chunk of session {} did not finalize within {:?}; forcing idle",
                        session, self.config.stop_grace
                    );
                    self.engine.abort().await;
                    self.finish_stop();
                }
            }
        }
    }

    fn on_start(&mut self, reply: StartReply) {
        match self.state {
            RecorderState::Recording => {
                let _ = reply.send(Ok(()));
                return;
            }
            RecorderState::AwaitingPermission => {
                self.pending_starts.push(reply);
                return;
            }
            RecorderState::Stopping => {
                let _ = reply.send(Err(RecorderError::configuration(
                    "previous recording is still stopping",
                )));
                return;
            }
            RecorderState::Idle | RecorderState::Failed(_) => {}
        }

        self.last_error = None;
        self.state = RecorderState::AwaitingPermission;
        self.pending_starts.push(reply);

        let permissions = Arc::clone(&self.permissions);
        let authorization = Arc::clone(&self.speech_authorization);
        let wants_speech = self.pipeline.chain().requires_speech_authorization();
        let commands = self.commands.clone();

        tokio::spawn(async move {
            let microphone = permissions.request_microphone().await;
            if microphone && wants_speech && authorization.get().is_none() {
                let answer = permissions.request_speech_authorization().await;
                info!("Speech recognition authorization: {:?}", answer);
                let _ = authorization.set(answer);
            }
            let _ = commands.send(Command::PermissionResolved { microphone });
        });
    }

    async fn on_permission(&mut self, microphone: bool) {
        if self.state != RecorderState::AwaitingPermission {
            return;
        }
        if !microphone {
            self.fail(RecorderError::PermissionDenied);
            return;
        }

        match self.begin_recording().await {
            Ok(()) => {
                self.publish();
                for reply in self.pending_starts.drain(..) {
                    let _ = reply.send(Ok(()));
                }
            }
            Err(e) => self.fail(e),
        }
    }

    async fn begin_recording(&mut self) -> Result<(), RecorderError> {
        self.audio_session
            .activate(&SessionOptions::play_and_record())
            .map_err(|e| RecorderError::configuration(format!("{e:#}")))?;

        let session = Uuid::new_v4();
        let expiries = self.expiries.clone();
        let lease = match self.leases.acquire(move || {
            let _ = expiries.send(session);
        }) {
            Ok(lease) => lease,
            Err(e) => {
                self.audio_session.deactivate();
                return Err(RecorderError::configuration(format!("{e:#}")));
            }
        };

        if let Err(e) = self.engine.start(session, &self.store).await {
            self.leases.release(lease);
            self.audio_session.deactivate();
            return Err(e);
        }

        self.lease = Some(lease);
        self.state = RecorderState::Recording;
        info!("Recording session {} started", session);
        Ok(())
    }

    async fn on_chunk_completion(&mut self, completion: ChunkCompletion) {
        let step = self
            .engine
            .on_completion(completion, &mut self.store, &self.pipeline)
            .await;

        match step {
            NextStep::Ignored | NextStep::Rotated(_) => {}
            NextStep::Halted => self.finish_stop(),
            NextStep::Failed(e) => {
                self.release_session();
                self.fail(e);
            }
        }
    }

    fn on_classified(&mut self, result: ClassificationResult) {
        let matches = self
            .store
            .get(result.index)
            .is_some_and(|c| c.location == result.location);
        if !matches {
            warn!(
                "Classification for {} does not match store entry {}; dropped",
                result.location.display(),
                result.index
            );
            return;
        }
        self.store.set_classification(result.index, result.verdict);
    }

    async fn on_lease_expired(&mut self, session: Uuid) {
        if self.state != RecorderState::Recording || self.engine.session() != Some(session) {
            return;
        }
        warn!("Background time for session {} expired; stopping", session);
        self.begin_stop().await;
    }

    async fn begin_stop(&mut self) {
        let session = self.engine.session();
        info!("Stopping recording session {:?}", session);
        self.state = RecorderState::Stopping;

        let finalizing = self.engine.request_stop().await;
        self.release_session();

        match session {
            Some(session) if finalizing => {
                let commands = self.commands.clone();
                let grace = self.config.stop_grace;
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    let _ = commands.send(Command::StopGraceElapsed { session });
                });
            }
            _ => self.finish_stop(),
        }
    }

    fn finish_stop(&mut self) {
        info!("Recording stopped; {} chunk(s) stored", self.store.len());
        self.state = RecorderState::Idle;
        self.publish();
        for reply in self.pending_stops.drain(..) {
            let _ = reply.send(());
        }
    }

    fn release_session(&mut self) {
        if let Some(lease) = self.lease.take() {
            self.leases.release(lease);
        }
        self.audio_session.deactivate();
    }

    fn fail(&mut self, error: RecorderError) {
        error!("Recording failed: {}", error);
        self.last_error = Some(error.clone());
        self.state = RecorderState::Failed(error.clone());
        self.publish();

        self.state = RecorderState::Idle;
        self.publish();
        for reply in self.pending_starts.drain(..) {
            let _ = reply.send(Err(error.clone()));
        }
        for reply in self.pending_stops.drain(..) {
            let _ = reply.send(());
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(RecorderSnapshot {
            state: self.state.clone(),
            last_error: self.last_error.clone(),
            session_id: self.engine.session(),
            chunks: self.store.views(),
        });
    }
}
