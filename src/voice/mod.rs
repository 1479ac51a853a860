//! Voice pipeline: capture, segmentation, wake-word monitoring, and
//! speech recognition sessions

pub mod capture;
pub mod detector;
pub mod device;
pub mod recognition;
pub mod stt;
pub mod wake;

pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav, spawn_mic_capture};
pub use detector::{SegmentEvent, SpeechSegmenter, calculate_energy};
pub use device::{AudioArbiter, CaptureSpawner, DeviceLease, ListenerKind, SampleStream};
pub use recognition::{
    EngineEvent, HttpSpeechEngine, RecognitionEvent, RecognitionSessionManager, SpeechEngine,
};
pub use stt::SttClient;
pub use wake::{PhraseWakeEngine, WakeEvent, WakeWordEngine, WakeWordMonitor};
