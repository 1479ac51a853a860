//! Wake-word monitoring
//!
//! Continuously samples the microphone and fires exactly one notification per
//! detected wake phrase; the monitor does not auto-rearm and must be
//! explicitly restarted. A runtime engine or capture failure is reported once
//! on the same channel, so the consumer decides whether to retry. The vendor
//! detection engine sits behind [`WakeWordEngine`]; the default production
//! engine is hybrid: local energy-gated segmentation plus remote
//! transcription and a phrase substring check.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::capture::{SAMPLE_RATE, samples_to_wav};
use super::detector::{SegmentEvent, SpeechSegmenter};
use super::device::{AudioArbiter, ListenerKind};
use super::stt::SttClient;
use crate::{Error, Result};

/// Notification from the monitor task; exactly one per started monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeEvent {
    /// Wake phrase observed; the monitor has stopped listening
    Detected,
    /// The monitor terminated without a detection (engine or capture failure)
    Terminated(String),
}

/// Vendor wake-word engine contract
///
/// The engine exposes no confidence score or payload to this layer: it either
/// has seen the phrase in the audio fed so far, or it has not.
#[async_trait]
pub trait WakeWordEngine: Send + 'static {
    /// Prepare the engine; failure is reported once and terminates the monitor
    fn init(&mut self) -> Result<()>;

    /// Feed a chunk of samples; resolves true once the wake phrase is observed
    async fn feed(&mut self, samples: &[f32]) -> Result<bool>;
}

/// Monitors the microphone for the wake phrase
pub struct WakeWordMonitor {
    engine: Option<Box<dyn WakeWordEngine>>,
    arbiter: Arc<AudioArbiter>,
    task: Option<JoinHandle<Box<dyn WakeWordEngine>>>,
    cancel: Option<watch::Sender<bool>>,
}

impl WakeWordMonitor {
    /// Create a monitor over the given engine
    #[must_use]
    pub fn new(engine: Box<dyn WakeWordEngine>, arbiter: Arc<AudioArbiter>) -> Self {
        Self {
            engine: Some(engine),
            arbiter,
            task: None,
            cancel: None,
        }
    }

    /// Whether a detection task is currently live
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Start continuous sampling on a dedicated task
    ///
    /// Fires exactly one [`WakeEvent`] on `notify` (`Detected`, or
    /// `Terminated` if the engine or capture side fails), then stops.
    /// Restarting requires an explicit [`stop`](Self::stop) first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if the monitor is live,
    /// [`Error::DeviceBusy`] if another listener holds the microphone, or the
    /// engine's init error.
    pub async fn start(&mut self, notify: mpsc::Sender<WakeEvent>) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyRunning("wake-monitor"));
        }
        self.reap().await;

        let mut engine = self
            .engine
            .take()
            .ok_or(Error::AlreadyRunning("wake-monitor"))?;

        if let Err(e) = engine.init() {
            tracing::error!(error = %e, "wake engine init failed");
            self.engine = Some(engine);
            return Err(e);
        }

        let mut lease = match self.arbiter.try_acquire(ListenerKind::WakeMonitor) {
            Ok(lease) => lease,
            Err(e) => {
                self.engine = Some(engine);
                return Err(e);
            }
        };
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        self.cancel = Some(cancel_tx);

        let task = tokio::spawn(async move {
            tracing::info!("wake monitor listening");
            loop {
                tokio::select! {
                    _ = cancel_rx.changed() => {
                        tracing::debug!("wake monitor cancelled");
                        break;
                    }
                    chunk = lease.next_chunk() => {
                        let Some(chunk) = chunk else {
                            tracing::warn!("capture stream ended, wake monitor stopping");
                            let _ = notify
                                .send(WakeEvent::Terminated("capture stream ended".to_string()))
                                .await;
                            break;
                        };
                        match engine.feed(&chunk).await {
                            Ok(true) => {
                                tracing::info!("wake phrase detected");
                                if notify.send(WakeEvent::Detected).await.is_err() {
                                    tracing::warn!("wake notification dropped, no receiver");
                                }
                                break;
                            }
                            Ok(false) => {}
                            Err(e) => {
                                tracing::error!(error = %e, "wake engine error, monitor terminated");
                                let _ = notify.send(WakeEvent::Terminated(e.to_string())).await;
                                break;
                            }
                        }
                    }
                }
            }
            // Lease drops here, releasing the device before the task resolves
            drop(lease);
            engine
        });

        self.task = Some(task);
        Ok(())
    }

    /// Stop the monitor and release the audio resource
    ///
    /// Idempotent: stopping an already-stopped monitor is a no-op. The device
    /// is released before this call returns.
    pub async fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(true);
        }
        self.reap().await;
    }

    /// Await a finished or cancelled task and reclaim the engine
    async fn reap(&mut self) {
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(engine) => self.engine = Some(engine),
                Err(e) => tracing::error!(error = %e, "wake monitor task panicked"),
            }
        }
    }
}

/// Hybrid wake engine: energy segmentation plus remote phrase verification
pub struct PhraseWakeEngine {
    phrase: String,
    segmenter: SpeechSegmenter,
    stt: Arc<SttClient>,
}

impl PhraseWakeEngine {
    /// Create an engine for the given wake phrase
    #[must_use]
    pub fn new(phrase: &str, stt: Arc<SttClient>) -> Self {
        Self {
            phrase: phrase.trim().to_lowercase(),
            segmenter: SpeechSegmenter::new(),
            stt,
        }
    }
}

#[async_trait]
impl WakeWordEngine for PhraseWakeEngine {
    fn init(&mut self) -> Result<()> {
        if self.phrase.is_empty() {
            return Err(Error::WakeWord("wake phrase must not be empty".to_string()));
        }
        self.segmenter.reset();
        Ok(())
    }

    async fn feed(&mut self, samples: &[f32]) -> Result<bool> {
        match self.segmenter.feed(samples) {
            SegmentEvent::Pending | SegmentEvent::TimedOut => Ok(false),
            SegmentEvent::Segment(segment) => {
                let wav = samples_to_wav(&segment, SAMPLE_RATE)?;
                match self.stt.transcribe(wav).await {
                    Ok(text) => {
                        let detected = text.to_lowercase().contains(&self.phrase);
                        if detected {
                            tracing::info!(phrase = %self.phrase, transcript = %text, "wake phrase matched");
                        }
                        Ok(detected)
                    }
                    Err(e) => {
                        // Transient verification failure: keep listening
                        tracing::warn!(error = %e, "wake phrase verification failed");
                        Ok(false)
                    }
                }
            }
        }
    }
}
