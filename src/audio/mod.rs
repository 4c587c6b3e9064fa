pub mod backend;
pub mod device;
pub mod file;
pub mod resample;
pub mod wav;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, ReplayBackend};
pub use device::{AudioCodec, CaptureDevice, CaptureSettings, EncoderQuality, RecordCompletion, RecordOutcome};
pub use file::AudioFile;
pub use resample::RateConverter;
pub use wav::WavCaptureDevice;
