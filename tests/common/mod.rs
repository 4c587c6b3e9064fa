// Shared fakes for integration tests: a scripted capture device, a manual
// background host, counting permissions and WAV fixture helpers.

#![allow(dead_code)]

use anyhow::{bail, Result};
use hearhear::audio::{CaptureDevice, CaptureSettings, RecordCompletion, RecordOutcome};
use hearhear::classify::{SpeechAuthorization, SpeechRecognizer};
use hearhear::lease::{BackgroundHost, ExpiryCallback, LeaseToken};
use hearhear::session::PermissionProvider;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

// ============================================================================
// WAV fixtures
// ============================================================================

pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32, channels: u16) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// One second of digital silence at 16kHz mono.
pub fn write_silent_wav(path: &Path) -> Result<()> {
    write_wav(path, &vec![0i16; 16_000], 16_000, 1)
}

/// One second of a 440Hz tone at half scale, 16kHz mono.
pub fn write_tone_wav(path: &Path) -> Result<()> {
    let samples: Vec<i16> = (0..16_000)
        .map(|i| {
            let t = i as f32 / 16_000.0;
            ((t * 440.0 * std::f32::consts::TAU).sin() * 0.5 * i16::MAX as f32) as i16
        })
        .collect();
    write_wav(path, &samples, 16_000, 1)
}

pub fn read_wav(path: &Path) -> Result<Vec<i16>> {
    let reader = hound::WavReader::open(path)?;
    Ok(reader.into_samples::<i16>().collect::<Result<Vec<_>, _>>()?)
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

// ============================================================================
// Scripted capture device
// ============================================================================

#[derive(Default)]
struct DeviceLog {
    configured: usize,
    targets: Vec<PathBuf>,
    pending: VecDeque<oneshot::Sender<RecordOutcome>>,
    stops: usize,
    refuse_after: Option<usize>,
    fail_configure: bool,
    ignore_stop: bool,
}

/// Test-side handle controlling a [`ScriptedDevice`].
#[derive(Clone, Default)]
pub struct DeviceControl(Arc<Mutex<DeviceLog>>);

impl DeviceControl {
    pub fn device(&self) -> Box<dyn CaptureDevice> {
        Box::new(ScriptedDevice {
            control: self.clone(),
        })
    }

    /// Deliver `outcome` for the chunk currently recording.
    pub fn complete(&self, outcome: RecordOutcome) -> bool {
        let pending = self.0.lock().unwrap().pending.pop_front();
        match pending {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn started(&self) -> usize {
        self.0.lock().unwrap().targets.len()
    }

    pub fn targets(&self) -> Vec<PathBuf> {
        self.0.lock().unwrap().targets.clone()
    }

    pub fn current_target(&self) -> Option<PathBuf> {
        self.0.lock().unwrap().targets.last().cloned()
    }

    pub fn configured(&self) -> usize {
        self.0.lock().unwrap().configured
    }

    pub fn stops(&self) -> usize {
        self.0.lock().unwrap().stops
    }

    /// Refuse to start any chunk beyond the first `n`.
    pub fn refuse_after(&self, n: usize) {
        self.0.lock().unwrap().refuse_after = Some(n);
    }

    pub fn fail_configure(&self) {
        self.0.lock().unwrap().fail_configure = true;
    }

    /// Make `stop()` leave the chunk in progress unfinished.
    pub fn ignore_stop(&self) {
        self.0.lock().unwrap().ignore_stop = true;
    }
}

/// Capture device whose completions are fired by the test.
///
/// `stop()` finalizes the chunk in progress successfully, like a real
/// recorder cut short.
pub struct ScriptedDevice {
    control: DeviceControl,
}

#[async_trait::async_trait]
impl CaptureDevice for ScriptedDevice {
    async fn configure(&mut self, _settings: &CaptureSettings) -> Result<()> {
        let mut log = self.control.0.lock().unwrap();
        if log.fail_configure {
            bail!("audio hardware unavailable");
        }
        log.configured += 1;
        Ok(())
    }

    async fn record_for(&mut self, _duration: Duration, target: &Path) -> Result<RecordCompletion> {
        let mut log = self.control.0.lock().unwrap();
        if log.refuse_after.is_some_and(|n| log.targets.len() >= n) {
            bail!("device busy");
        }
        if !log.pending.is_empty() {
            bail!("already recording");
        }

        let (tx, rx) = oneshot::channel();
        log.targets.push(target.to_path_buf());
        log.pending.push_back(tx);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        let mut log = self.control.0.lock().unwrap();
        log.stops += 1;
        if !log.ignore_stop {
            if let Some(tx) = log.pending.pop_front() {
                let _ = tx.send(RecordOutcome::Finished);
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Manual background host
// ============================================================================

#[derive(Default)]
struct HostLog {
    next: u64,
    active: HashSet<LeaseToken>,
    ended: Vec<LeaseToken>,
    callbacks: HashMap<LeaseToken, ExpiryCallback>,
}

/// Background host whose expiries are triggered by the test.
#[derive(Default)]
pub struct ManualHost {
    log: Mutex<HostLog>,
}

impl ManualHost {
    pub fn active(&self) -> usize {
        self.log.lock().unwrap().active.len()
    }

    pub fn ended(&self) -> usize {
        self.log.lock().unwrap().ended.len()
    }

    pub fn begun(&self) -> u64 {
        self.log.lock().unwrap().next
    }

    /// Revoke every outstanding lease, running expiry callbacks.
    pub fn expire_all(&self) {
        let callbacks: Vec<ExpiryCallback> = {
            let mut log = self.log.lock().unwrap();
            log.callbacks.drain().map(|(_, cb)| cb).collect()
        };
        for callback in callbacks {
            callback();
        }
    }
}

impl BackgroundHost for ManualHost {
    fn begin_lease(&self, _label: &str) -> Result<LeaseToken> {
        let mut log = self.log.lock().unwrap();
        log.next += 1;
        let token = LeaseToken(log.next);
        log.active.insert(token);
        Ok(token)
    }

    fn end_lease(&self, token: LeaseToken) {
        let mut log = self.log.lock().unwrap();
        log.active.remove(&token);
        log.callbacks.remove(&token);
        log.ended.push(token);
    }

    fn on_expiry(&self, token: LeaseToken, callback: ExpiryCallback) {
        self.log.lock().unwrap().callbacks.insert(token, callback);
    }
}

// ============================================================================
// Permissions
// ============================================================================

pub struct CountingPermissions {
    pub microphone: AtomicBool,
    pub speech: SpeechAuthorization,
    pub microphone_requests: AtomicUsize,
    pub speech_requests: AtomicUsize,
}

impl CountingPermissions {
    pub fn new(microphone: bool, speech: SpeechAuthorization) -> Self {
        Self {
            microphone: AtomicBool::new(microphone),
            speech,
            microphone_requests: AtomicUsize::new(0),
            speech_requests: AtomicUsize::new(0),
        }
    }

    pub fn allow_microphone(&self, allowed: bool) {
        self.microphone.store(allowed, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl PermissionProvider for CountingPermissions {
    async fn request_microphone(&self) -> bool {
        self.microphone_requests.fetch_add(1, Ordering::SeqCst);
        self.microphone.load(Ordering::SeqCst)
    }

    async fn request_speech_authorization(&self) -> SpeechAuthorization {
        self.speech_requests.fetch_add(1, Ordering::SeqCst);
        self.speech
    }
}

// ============================================================================
// Speech recognizer
// ============================================================================

/// Recognizer replaying canned transcripts, then optionally failing or hanging.
pub struct FakeRecognizer {
    pub available: bool,
    pub transcripts: Vec<String>,
    pub fail: bool,
    pub hang: bool,
    pub calls: AtomicUsize,
}

impl FakeRecognizer {
    pub fn saying(transcripts: &[&str]) -> Self {
        Self {
            available: true,
            transcripts: transcripts.iter().map(|s| s.to_string()).collect(),
            fail: false,
            hang: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SpeechRecognizer for FakeRecognizer {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn transcribe(&self, _chunk: &Path, transcripts: mpsc::UnboundedSender<String>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for text in &self.transcripts {
            let _ = transcripts.send(text.clone());
        }
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail {
            bail!("recognition service unavailable");
        }
        Ok(())
    }
}
