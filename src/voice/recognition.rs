//! Speech recognition session management
//!
//! Owns one speech-to-text session at a time. The vendor engine reports
//! partial/final text and numeric error codes; this layer classifies codes
//! into recoverable vs fatal, retries recoverable ones by cancelling and
//! restarting the cycle (invisible to the caller), and auto-restarts after
//! every final result for continuous dictation.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::capture::{SAMPLE_RATE, samples_to_wav};
use super::detector::{SegmentEvent, SpeechSegmenter};
use super::device::{AudioArbiter, DeviceLease, ListenerKind};
use super::stt::SttClient;
use crate::{Error, Result};

/// Engine error code: network or upstream service failure (fatal)
pub const CODE_NETWORK: i32 = 2;

/// Engine error code: audio capture failure (fatal)
pub const CODE_AUDIO: i32 = 3;

/// Engine error code: no speech within the listening window (recoverable)
pub const CODE_SPEECH_TIMEOUT: i32 = 6;

/// Engine error code: speech detected but nothing recognized (recoverable)
pub const CODE_NO_MATCH: i32 = 7;

/// Classify an engine error code
#[must_use]
pub const fn is_recoverable(code: i32) -> bool {
    matches!(code, CODE_SPEECH_TIMEOUT | CODE_NO_MATCH)
}

/// Event emitted to the session consumer
///
/// Ephemeral: consumed immediately, never persisted. `RecoverableError` is
/// handled inside the manager and never reaches the consumer channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Partial(String),
    Final(String),
    RecoverableError(i32),
    FatalError(i32),
}

/// Raw callback from the speech engine: zero or more partials, then one
/// final text or one numeric error code per cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Partial(String),
    Final(String),
    Error(i32),
}

/// Vendor speech-to-text engine contract
#[async_trait]
pub trait SpeechEngine: Send + 'static {
    /// Run one recognition cycle over the leased audio stream, delivering
    /// callbacks on `events` until a final result or error ends the cycle.
    /// The engine owns the sender; the channel closing marks the cycle done.
    async fn run_cycle(&mut self, audio: &mut DeviceLease, events: mpsc::Sender<EngineEvent>);
}

/// Owns the live recognition session; at most one per process
pub struct RecognitionSessionManager {
    engine: Option<Box<dyn SpeechEngine>>,
    arbiter: Arc<AudioArbiter>,
    task: Option<JoinHandle<Box<dyn SpeechEngine>>>,
    cancel: Option<watch::Sender<bool>>,
}

impl RecognitionSessionManager {
    /// Create a manager over the given engine
    #[must_use]
    pub fn new(engine: Box<dyn SpeechEngine>, arbiter: Arc<AudioArbiter>) -> Self {
        Self {
            engine: Some(engine),
            arbiter,
            task: None,
            cancel: None,
        }
    }

    /// Whether a session task is currently live
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Open a session and start emitting [`RecognitionEvent`]s
    ///
    /// If a session is already live it is stopped first; there is exactly one
    /// live session per process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceBusy`] if another listener holds the microphone.
    pub async fn start(&mut self, events: mpsc::Sender<RecognitionEvent>) -> Result<()> {
        self.stop().await;

        let mut engine = self
            .engine
            .take()
            .ok_or(Error::AlreadyRunning("recognizer"))?;

        let mut lease = match self.arbiter.try_acquire(ListenerKind::Recognizer) {
            Ok(lease) => lease,
            Err(e) => {
                self.engine = Some(engine);
                return Err(e);
            }
        };
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        self.cancel = Some(cancel_tx);

        let task = tokio::spawn(async move {
            tracing::info!("recognition session opened");

            'session: loop {
                match run_one_cycle(engine.as_mut(), &mut lease, &mut cancel_rx, &events).await {
                    CycleOutcome::Restart => {}
                    CycleOutcome::End => break 'session,
                }
            }

            // Release the device before the session task resolves
            drop(lease);
            tracing::info!("recognition session closed");
            engine
        });

        self.task = Some(task);
        Ok(())
    }

    /// Tear down the session and release the audio resource
    ///
    /// Safe to call multiple times; the device is released before this call
    /// returns.
    pub async fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(true);
        }
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(engine) => self.engine = Some(engine),
                Err(e) => tracing::error!(error = %e, "recognition task panicked"),
            }
        }
    }
}

/// What the session loop should do after a cycle
enum CycleOutcome {
    /// Start the next cycle (after a final result or a recoverable error)
    Restart,
    /// End the session (cancelled, fatal error, or audio stream gone)
    End,
}

/// Drive a single engine cycle, forwarding events to the consumer
async fn run_one_cycle(
    engine: &mut dyn SpeechEngine,
    lease: &mut DeviceLease,
    cancel_rx: &mut watch::Receiver<bool>,
    events: &mpsc::Sender<RecognitionEvent>,
) -> CycleOutcome {
    let (engine_tx, mut engine_rx) = mpsc::channel::<EngineEvent>(16);

    let cycle = engine.run_cycle(lease, engine_tx);
    tokio::pin!(cycle);

    let mut cycle_done = false;
    // Last terminal event of the cycle decides restart vs end
    let mut terminal: Option<EngineEvent> = None;

    loop {
        tokio::select! {
            _ = cancel_rx.changed() => {
                tracing::debug!("recognition cycle cancelled");
                return CycleOutcome::End;
            }
            () = &mut cycle, if !cycle_done => {
                cycle_done = true;
            }
            event = engine_rx.recv() => {
                let Some(event) = event else {
                    // Cycle over and channel drained
                    break;
                };
                match event {
                    EngineEvent::Partial(text) => {
                        if events.send(RecognitionEvent::Partial(text)).await.is_err() {
                            tracing::warn!("recognition consumer gone");
                            return CycleOutcome::End;
                        }
                    }
                    EngineEvent::Final(text) => {
                        if events.send(RecognitionEvent::Final(text.clone())).await.is_err() {
                            tracing::warn!("recognition consumer gone");
                            return CycleOutcome::End;
                        }
                        terminal = Some(EngineEvent::Final(text));
                    }
                    EngineEvent::Error(code) => {
                        terminal = Some(EngineEvent::Error(code));
                    }
                }
            }
        }
    }

    match terminal {
        // Continuous dictation: listen again after each final result
        Some(EngineEvent::Final(_)) => CycleOutcome::Restart,
        Some(EngineEvent::Error(code)) if is_recoverable(code) => {
            // The session's own retry; the consumer never sees this
            tracing::debug!(code, "recoverable recognizer error, restarting cycle");
            CycleOutcome::Restart
        }
        Some(EngineEvent::Error(code)) => {
            tracing::error!(code, "fatal recognizer error");
            let _ = events.send(RecognitionEvent::FatalError(code)).await;
            CycleOutcome::End
        }
        Some(EngineEvent::Partial(_)) | None => {
            tracing::warn!("recognition cycle ended without terminal event");
            CycleOutcome::End
        }
    }
}

/// Production engine: energy-gated utterance segmentation plus HTTP STT
///
/// One cycle covers one utterance: a silent window yields error code 6, an
/// empty transcript yields code 7, a transport failure yields code 2.
pub struct HttpSpeechEngine {
    segmenter: SpeechSegmenter,
    stt: Arc<SttClient>,
}

impl HttpSpeechEngine {
    #[must_use]
    pub fn new(stt: Arc<SttClient>) -> Self {
        Self {
            segmenter: SpeechSegmenter::new(),
            stt,
        }
    }
}

#[async_trait]
impl SpeechEngine for HttpSpeechEngine {
    async fn run_cycle(&mut self, audio: &mut DeviceLease, events: mpsc::Sender<EngineEvent>) {
        self.segmenter.reset();

        loop {
            let Some(chunk) = audio.next_chunk().await else {
                let _ = events.send(EngineEvent::Error(CODE_AUDIO)).await;
                return;
            };

            match self.segmenter.feed(&chunk) {
                SegmentEvent::Pending => {}
                SegmentEvent::TimedOut => {
                    let _ = events.send(EngineEvent::Error(CODE_SPEECH_TIMEOUT)).await;
                    return;
                }
                SegmentEvent::Segment(segment) => {
                    let event = match samples_to_wav(&segment, SAMPLE_RATE) {
                        Ok(wav) => match self.stt.transcribe(wav).await {
                            Ok(text) if text.is_empty() => EngineEvent::Error(CODE_NO_MATCH),
                            Ok(text) => EngineEvent::Final(text),
                            Err(e) => {
                                tracing::warn!(error = %e, "utterance transcription failed");
                                EngineEvent::Error(CODE_NETWORK)
                            }
                        },
                        Err(e) => {
                            tracing::error!(error = %e, "WAV encoding failed");
                            EngineEvent::Error(CODE_AUDIO)
                        }
                    };
                    let _ = events.send(event).await;
                    return;
                }
            }
        }
    }
}
