use anyhow::{anyhow, bail, Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::AudioFrame;
use super::device::{AudioCodec, CaptureDevice, CaptureSettings, RecordCompletion, RecordOutcome};

/// Audio kept between two chunks so rotation loses no samples.
const PREROLL: Duration = Duration::from_secs(1);

enum DeviceCommand {
    Configure {
        settings: CaptureSettings,
        ack: oneshot::Sender<()>,
    },
    Record {
        target: PathBuf,
        duration: Duration,
        started: oneshot::Sender<Result<RecordCompletion>>,
    },
    Stop {
        ack: oneshot::Sender<()>,
    },
}

/// Capture device writing 16-bit PCM WAV chunks from a live frame stream.
///
/// Chunk length is measured in samples, not wall-clock time, so slow
/// scheduling never shortens or stretches a chunk.
pub struct WavCaptureDevice {
    commands: mpsc::Sender<DeviceCommand>,
    worker: JoinHandle<()>,
}

impl WavCaptureDevice {
    pub fn new(frames: mpsc::Receiver<AudioFrame>) -> Self {
        let (tx, rx) = mpsc::channel(8);
        let worker = tokio::spawn(Worker::new(frames, rx).run());
        Self {
            commands: tx,
            worker,
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> DeviceCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| anyhow!("WAV capture worker has exited"))?;
        rx.await.context("WAV capture worker dropped the request")
    }
}

impl Drop for WavCaptureDevice {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[async_trait::async_trait]
impl CaptureDevice for WavCaptureDevice {
    async fn configure(&mut self, settings: &CaptureSettings) -> Result<()> {
        if settings.codec != AudioCodec::Pcm16 {
            bail!("WAV capture cannot encode {:?}", settings.codec);
        }
        if settings.sample_rate == 0 || settings.channels == 0 {
            bail!(
                "Invalid capture format: {}Hz, {} channels",
                settings.sample_rate,
                settings.channels
            );
        }

        let settings = settings.clone();
        self.request(|ack| DeviceCommand::Configure { settings, ack })
            .await
    }

    async fn record_for(&mut self, duration: Duration, target: &Path) -> Result<RecordCompletion> {
        let target = target.to_path_buf();
        self.request(|started| DeviceCommand::Record {
            target,
            duration,
            started,
        })
        .await?
    }

    async fn stop(&mut self) -> Result<()> {
        self.request(|ack| DeviceCommand::Stop { ack }).await
    }

    fn name(&self) -> &str {
        "wav"
    }
}

struct Worker {
    frames: mpsc::Receiver<AudioFrame>,
    commands: mpsc::Receiver<DeviceCommand>,
    settings: Option<CaptureSettings>,
    active: Option<ActiveChunk>,
    carry: Vec<i16>,
    source_open: bool,
}

impl Worker {
    fn new(frames: mpsc::Receiver<AudioFrame>, commands: mpsc::Receiver<DeviceCommand>) -> Self {
        Self {
            frames,
            commands,
            settings: None,
            active: None,
            carry: Vec::new(),
            source_open: true,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                frame = self.frames.recv(), if self.source_open => match frame {
                    Some(frame) => self.on_frame(frame),
                    None => self.on_source_closed(),
                },
            }
        }

        if let Some(chunk) = self.active.take() {
            chunk.finish();
        }
    }

    fn handle(&mut self, command: DeviceCommand) {
        match command {
            DeviceCommand::Configure { settings, ack } => {
                debug!(
                    "WAV capture configured: {}Hz, {} channels",
                    settings.sample_rate, settings.channels
                );
                self.settings = Some(settings);
                self.carry.clear();
                let _ = ack.send(());
            }
            DeviceCommand::Record {
                target,
                duration,
                started,
            } => {
                let _ = started.send(self.begin(target, duration));
            }
            DeviceCommand::Stop { ack } => {
                if let Some(chunk) = self.active.take() {
                    info!("Stopping WAV capture mid-chunk: {}", chunk.writer.path.display());
                    chunk.finish();
                }
                self.carry.clear();
                let _ = ack.send(());
            }
        }
    }

    fn begin(&mut self, target: PathBuf, duration: Duration) -> Result<RecordCompletion> {
        if self.active.is_some() {
            bail!("A chunk is already recording");
        }
        let settings = self
            .settings
            .as_ref()
            .context("Capture device is not configured")?;
        if !self.source_open {
            bail!("Audio source has closed");
        }

        let frames = (duration.as_secs_f64() * settings.sample_rate as f64).round() as u64;
        let writer = ChunkWriter::create(target, settings)?;
        let (done_tx, done_rx) = oneshot::channel();

        self.active = Some(ActiveChunk {
            writer,
            remaining: frames * settings.channels as u64,
            done: done_tx,
        });

        let carry = std::mem::take(&mut self.carry);
        if !carry.is_empty() {
            self.write(&carry);
        }

        Ok(done_rx)
    }

    fn on_frame(&mut self, frame: AudioFrame) {
        let Some(settings) = &self.settings else {
            return;
        };

        if frame.sample_rate != settings.sample_rate || frame.channels != settings.channels {
            let detail = format!(
                "frame format {}Hz/{}ch does not match capture format {}Hz/{}ch",
                frame.sample_rate, frame.channels, settings.sample_rate, settings.channels
            );
            match self.active.take() {
                Some(chunk) => chunk.fail(detail),
                None => debug!("Dropping idle frame: {}", detail),
            }
            return;
        }

        if self.active.is_some() {
            self.write(&frame.samples);
        } else {
            let cap = (PREROLL.as_secs_f64() * settings.sample_rate as f64) as usize
                * settings.channels as usize;
            self.carry.extend_from_slice(&frame.samples);
            if self.carry.len() > cap {
                let excess = self.carry.len() - cap;
                self.carry.drain(..excess);
            }
        }
    }

    fn write(&mut self, samples: &[i16]) {
        let Some(chunk) = self.active.as_mut() else {
            return;
        };

        match chunk.feed(samples) {
            Ok(consumed) => {
                if chunk.remaining == 0 {
                    self.carry.extend_from_slice(&samples[consumed..]);
                    if let Some(chunk) = self.active.take() {
                        chunk.finish();
                    }
                }
            }
            Err(e) => {
                if let Some(chunk) = self.active.take() {
                    chunk.fail(format!("{e:#}"));
                }
            }
        }
    }

    fn on_source_closed(&mut self) {
        warn!("Audio source closed; no further chunks can start");
        self.source_open = false;
        if let Some(chunk) = self.active.take() {
            chunk.finish();
        }
    }
}

struct ActiveChunk {
    writer: ChunkWriter,
    /// Interleaved samples still needed to reach the target duration
    remaining: u64,
    done: oneshot::Sender<RecordOutcome>,
}

impl ActiveChunk {
    /// Write as much of `samples` as fits; returns how many were consumed.
    fn feed(&mut self, samples: &[i16]) -> Result<usize> {
        let take = samples.len().min(self.remaining as usize);
        self.writer.write_samples(&samples[..take])?;
        self.remaining -= take as u64;
        Ok(take)
    }

    fn finish(self) {
        let path = self.writer.path.clone();
        let outcome = match self.writer.finish() {
            Ok(sample_count) => {
                info!("Chunk written: {} ({} samples)", path.display(), sample_count);
                RecordOutcome::Finished
            }
            Err(e) => RecordOutcome::Failed(format!("{e:#}")),
        };
        let _ = self.done.send(outcome);
    }

    fn fail(self, detail: String) {
        warn!("Chunk {} failed: {}", self.writer.path.display(), detail);
        self.writer.discard();
        let _ = self.done.send(RecordOutcome::Failed(detail));
    }
}

/// Writes a single chunk to disk as WAV file.
///
/// Samples go to a `.partial` sibling that the chunk store never lists; the
/// file only takes its final name once finalized, so a failed or interrupted
/// chunk can never be mistaken for a complete one.
struct ChunkWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
    staging: PathBuf,
    sample_count: u64,
}

impl ChunkWriter {
    fn create(path: PathBuf, settings: &CaptureSettings) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: settings.channels,
            sample_rate: settings.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let staging = staging_path(&path);
        let writer = hound::WavWriter::create(&staging, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", staging))?;

        Ok(Self {
            writer: Some(writer),
            path,
            staging,
            sample_count: 0,
        })
    }

    fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            for &sample in samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            self.sample_count += samples.len() as u64;
        }

        Ok(())
    }

    fn finish(mut self) -> Result<u64> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
            fs::rename(&self.staging, &self.path).with_context(|| {
                format!("Failed to move {:?} into place", self.staging)
            })?;
        }

        Ok(self.sample_count)
    }

    /// Throw the partial recording away.
    fn discard(mut self) {
        self.remove_staging();
    }

    fn remove_staging(&mut self) {
        if let Some(writer) = self.writer.take() {
            drop(writer);
            if let Err(e) = fs::remove_file(&self.staging) {
                warn!("Failed to remove partial chunk {:?}: {}", self.staging, e);
            }
        }
    }
}

impl Drop for ChunkWriter {
    fn drop(&mut self) {
        self.remove_staging();
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}
