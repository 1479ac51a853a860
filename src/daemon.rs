//! Assistant daemon
//!
//! Wires the pipeline together and runs the coordinating loop: wake
//! notifications, recognition events, and lifecycle signals all land here, on
//! one task, so state transitions apply in arrival order. The audio handoff
//! is always stop-then-start, sequenced by this loop and announced on the bus.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::auth::{SERVICE_TOKEN, TokenStore};
use crate::bus::{EventBus, Signal};
use crate::config::Config;
use crate::intent::{DispatchOutcome, HttpClassifier, IntentDispatcher};
use crate::mail::{InboxSummary, MailClient};
use crate::state::{MessageKind, StateMachine, TranscriptOutcome};
use crate::voice::{
    AudioArbiter, HttpSpeechEngine, PhraseWakeEngine, RecognitionEvent,
    RecognitionSessionManager, SttClient, WakeEvent, WakeWordMonitor, spawn_mic_capture,
};
use crate::Result;

/// Greeting shown when the conversation dialog opens
const GREETING: &str = "I'm listening. What would you like to do?";

/// Channel depth for wake notifications
const WAKE_CHANNEL_DEPTH: usize = 4;

/// Channel depth for recognition events
const RECOGNITION_CHANNEL_DEPTH: usize = 32;

/// The hark assistant daemon
pub struct Daemon {
    config: Config,
    state: Arc<StateMachine>,
    bus: EventBus,
    monitor: WakeWordMonitor,
    recognizer: RecognitionSessionManager,
    dispatcher: IntentDispatcher,
}

impl Daemon {
    /// Build the production daemon from configuration
    ///
    /// The service token is a precondition: without it no remote call would
    /// succeed, so startup fails before any listener is created.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MissingAuthToken`] if the service token is absent, or
    /// a configuration error from any client constructor.
    pub fn new(config: Config) -> Result<Self> {
        let token = TokenStore::new(&config.data_dir).get(SERVICE_TOKEN)?;

        let stt = Arc::new(SttClient::new(
            config.voice.stt_url.clone(),
            config.voice.stt_model.clone(),
            token.clone(),
        )?);

        let arbiter = Arc::new(AudioArbiter::new(Box::new(spawn_mic_capture)));

        let monitor = WakeWordMonitor::new(
            Box::new(PhraseWakeEngine::new(&config.wake_phrase, Arc::clone(&stt))),
            Arc::clone(&arbiter),
        );
        let recognizer =
            RecognitionSessionManager::new(Box::new(HttpSpeechEngine::new(stt)), arbiter);

        let dispatcher = IntentDispatcher::new(
            Box::new(HttpClassifier::new(
                config.services.classifier_url.clone(),
                token.clone(),
            )?),
            Box::new(MailClient::new(config.services.mail_url.clone(), token)?),
        );

        let state = Arc::new(StateMachine::new(
            config.user_blocklist.clone(),
            config.assistant_blocklist.clone(),
        ));

        Ok(Self {
            config,
            state,
            bus: EventBus::new(),
            monitor,
            recognizer,
            dispatcher,
        })
    }

    /// Observable state handle
    #[must_use]
    pub fn state(&self) -> Arc<StateMachine> {
        Arc::clone(&self.state)
    }

    /// Bus handle for external lifecycle signals
    #[must_use]
    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// Run the daemon until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the wake monitor cannot start.
    pub async fn run(&mut self) -> Result<()> {
        if !self.config.voice.enabled {
            tracing::warn!("voice input disabled, daemon idles until interrupted");
            tokio::signal::ctrl_c().await?;
            return Ok(());
        }

        let (wake_tx, mut wake_rx) = mpsc::channel(WAKE_CHANNEL_DEPTH);
        let (rec_tx, mut rec_rx) = mpsc::channel(RECOGNITION_CHANNEL_DEPTH);
        let mut signals = self.bus.subscribe();

        self.state.arm_wake();
        self.monitor.start(wake_tx.clone()).await?;
        tracing::info!(wake_phrase = %self.config.wake_phrase, "hark is listening");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupt received, shutting down");
                    break;
                }
                Some(event) = wake_rx.recv() => match event {
                    WakeEvent::Detected => self.handle_wake(&rec_tx, &wake_tx).await,
                    WakeEvent::Terminated(reason) => self.handle_wake_loss(&reason, &wake_tx).await,
                },
                Some(event) = rec_rx.recv() => {
                    self.handle_recognition_event(event, &rec_tx, &wake_tx).await;
                }
                signal = signals.recv() => {
                    if let Ok(signal) = signal {
                        self.handle_signal(signal, &wake_tx).await;
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Wake phrase fired: hand the microphone from the monitor to a session
    async fn handle_wake(
        &mut self,
        rec_tx: &mpsc::Sender<RecognitionEvent>,
        wake_tx: &mpsc::Sender<WakeEvent>,
    ) {
        if !self.state.wake_detected() {
            return;
        }
        let _ = self.bus.emit(Signal::WakeDetected);

        if !self.state.snapshot().dialog_open {
            self.state.open_dialog(GREETING);
        }

        // Stop-then-start: the monitor's lease is released before the
        // session acquires the device
        self.monitor.stop().await;
        if let Err(e) = self.recognizer.start(rec_tx.clone()).await {
            tracing::error!(error = %e, "failed to start recognition session");
            self.state.session_failed(&e.to_string());
            self.restore_wake_baseline(wake_tx).await;
        }
    }

    /// The wake monitor died without a detection: surface it and rearm
    async fn handle_wake_loss(&mut self, reason: &str, wake_tx: &mpsc::Sender<WakeEvent>) {
        tracing::error!(reason, "wake monitor terminated");
        self.state.session_failed(reason);

        // Reclaim the finished task, then one restart attempt; a second
        // failure surfaces the same way and stays visible in last_error
        self.monitor.stop().await;
        if let Err(e) = self.monitor.start(wake_tx.clone()).await {
            tracing::error!(error = %e, "wake monitor restart failed");
        }
    }

    /// One recognition event from the live session
    async fn handle_recognition_event(
        &mut self,
        event: RecognitionEvent,
        rec_tx: &mpsc::Sender<RecognitionEvent>,
        wake_tx: &mpsc::Sender<WakeEvent>,
    ) {
        match event {
            RecognitionEvent::Partial(text) => self.state.partial_transcript(&text),
            RecognitionEvent::Final(text) => match self.state.final_transcript(&text) {
                TranscriptOutcome::Accepted(message_id) => {
                    // One outstanding dispatch at most: the session stops
                    // before the classifier round-trip begins
                    self.recognizer.stop().await;
                    let _ = self.bus.emit(Signal::StopSpeechRecognition);
                    self.run_dispatch(&text, message_id, rec_tx, wake_tx).await;
                }
                TranscriptOutcome::Filtered | TranscriptOutcome::Ignored => {}
            },
            RecognitionEvent::RecoverableError(code) => {
                // The session manager retries these internally
                tracing::debug!(code, "recoverable recognition error observed");
            }
            RecognitionEvent::FatalError(code) => {
                self.recognizer.stop().await;
                self.state
                    .session_failed(&format!("speech recognition error {code}"));
                self.restore_wake_baseline(wake_tx).await;
            }
        }
    }

    /// Dispatch an accepted utterance and fold the outcome back into state
    async fn run_dispatch(
        &mut self,
        utterance: &str,
        message_id: uuid::Uuid,
        rec_tx: &mpsc::Sender<RecognitionEvent>,
        wake_tx: &mpsc::Sender<WakeEvent>,
    ) {
        match self.dispatcher.dispatch(utterance).await {
            Ok(DispatchOutcome::ShowError(suggestion)) => {
                // Unrecognized instruction: user-visible, retry by speaking
                let _ = self.state.mark_failed(message_id);
                self.state.dispatch_failed(&suggestion);
                self.resume_listening(rec_tx, wake_tx).await;
            }
            Ok(outcome) => {
                let _ = self.state.mark_delivered(message_id);
                let (reply, kind) = describe_outcome(&outcome);
                let _ = self.state.dispatch_succeeded(&reply, kind);
                self.restore_wake_baseline(wake_tx).await;
            }
            Err(e) => {
                let _ = self.state.mark_failed(message_id);
                self.state.dispatch_failed(&e.to_string());
                self.resume_listening(rec_tx, wake_tx).await;
            }
        }
    }

    /// Externally-emitted lifecycle signals
    async fn handle_signal(&mut self, signal: Signal, wake_tx: &mpsc::Sender<WakeEvent>) {
        match signal {
            // Emitted by this loop itself after handling inline
            Signal::WakeDetected => {}
            Signal::StopSpeechRecognition => self.recognizer.stop().await,
            Signal::RestoreWakeWord => {
                if !self.monitor.is_running() {
                    self.state.arm_wake();
                    if let Err(e) = self.monitor.start(wake_tx.clone()).await {
                        tracing::error!(error = %e, "failed to restore wake monitor");
                    }
                }
            }
        }
    }

    /// Return to the wake-listening baseline after a completed exchange
    async fn restore_wake_baseline(&mut self, wake_tx: &mpsc::Sender<WakeEvent>) {
        self.recognizer.stop().await;
        let _ = self.bus.emit(Signal::RestoreWakeWord);
        if !self.monitor.is_running() {
            if let Err(e) = self.monitor.start(wake_tx.clone()).await {
                tracing::error!(error = %e, "failed to restart wake monitor");
            }
        }
    }

    /// Reopen the recognition session so the user can retry by speaking
    async fn resume_listening(
        &mut self,
        rec_tx: &mpsc::Sender<RecognitionEvent>,
        wake_tx: &mpsc::Sender<WakeEvent>,
    ) {
        if let Err(e) = self.recognizer.start(rec_tx.clone()).await {
            tracing::error!(error = %e, "failed to resume recognition, falling back to wake");
            self.state.session_failed(&e.to_string());
            self.restore_wake_baseline(wake_tx).await;
        }
    }

    /// Close the dialog surface
    ///
    /// Clears the conversation history, then broadcasts
    /// [`Signal::StopSpeechRecognition`] and [`Signal::RestoreWakeWord`] so
    /// every listener converges on the wake-listening baseline. Any live
    /// recognition session is torn down before the state resets.
    pub async fn close_dialog(&mut self) {
        self.recognizer.stop().await;
        self.state.close_dialog();
        let _ = self.bus.emit(Signal::StopSpeechRecognition);
        let _ = self.bus.emit(Signal::RestoreWakeWord);
    }

    async fn shutdown(&mut self) {
        self.recognizer.stop().await;
        self.monitor.stop().await;
        tracing::info!("daemon stopped");
    }
}

/// Render a dispatch outcome as the assistant's conversational reply
fn describe_outcome(outcome: &DispatchOutcome) -> (String, MessageKind) {
    match outcome {
        DispatchOutcome::ScreenChanged(screen) => {
            (format!("Opened {}.", screen.name()), MessageKind::Text)
        }
        DispatchOutcome::DraftCreated(handle) | DispatchOutcome::DraftUpdated(handle) => {
            let recipient = handle.recipient.as_deref().unwrap_or("(no recipient)");
            let subject = handle.subject.as_deref().unwrap_or("(no subject)");
            let body = handle.body.as_deref().unwrap_or("");
            (
                format!("To: {recipient}\nSubject: {subject}\n\n{body}"),
                MessageKind::StructuredDraft,
            )
        }
        DispatchOutcome::DraftSent { .. } => ("Your message is on its way.".to_string(), MessageKind::Text),
        DispatchOutcome::InboxLoaded(messages) => {
            (summarize_inbox(messages), MessageKind::Text)
        }
        DispatchOutcome::ShowSchedulePicker => {
            ("Opening the schedule picker.".to_string(), MessageKind::Text)
        }
        DispatchOutcome::ShowChat => ("Opening chat.".to_string(), MessageKind::Text),
        DispatchOutcome::ShowError(suggestion) => (suggestion.clone(), MessageKind::Text),
    }
}

fn summarize_inbox(messages: &[InboxSummary]) -> String {
    if messages.is_empty() {
        return "Your inbox is empty.".to_string();
    }

    let mut summary = format!("You have {} messages.", messages.len());
    for message in messages.iter().take(5) {
        summary.push_str(&format!("\n{}: {}", message.from, message.subject));
    }
    summary
}
