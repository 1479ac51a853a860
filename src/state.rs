//! Conversation state machine
//!
//! The single source of truth for the current listening mode, message history,
//! and delivery status. All mutations funnel through one update function that
//! swaps a copy-on-write snapshot under a mutex: updates are serialized in
//! arrival order and atomic with respect to readers, who hold cheap
//! `Arc<ConversationState>` snapshots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Listening mode of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Nothing is listening
    Idle,
    /// Wake-word monitor holds the microphone
    WakeListening,
    /// Recognition session holds the microphone
    SpeechListening,
    /// A final transcript is being dispatched; one outstanding dispatch at most
    Processing,
}

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    User,
    Assistant,
}

/// What a message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Plain conversational text
    Text,
    /// A structured draft summary
    StructuredDraft,
    /// System status (greetings, notices)
    SystemStatus,
}

/// Delivery status of a message
///
/// Only `Sent -> Delivered` and `Sent -> Failed` transitions are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    None,
    Sent,
    Delivered,
    Failed,
}

/// One message in the conversation history
///
/// Immutable once created except for `delivery_status`.
#[derive(Debug, Clone)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub content: String,
    pub origin: Origin,
    /// Process-monotonic sequence number; total order over all messages
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub kind: MessageKind,
    pub delivery_status: DeliveryStatus,
}

/// Full conversation snapshot
#[derive(Debug, Clone)]
pub struct ConversationState {
    /// Insertion-ordered, append-only within a session
    pub messages: Vec<ConversationMessage>,
    pub mode: Mode,
    /// Live transcript buffer (partials land here)
    pub input_buffer: String,
    /// Whether the dialog surface showing history is open
    pub dialog_open: bool,
    /// Whether the wake monitor is armed
    pub wake_word_armed: bool,
    /// Last user-visible error, cleared on the next successful dispatch
    pub last_error: Option<String>,
}

impl ConversationState {
    fn initial() -> Self {
        Self {
            messages: Vec::new(),
            mode: Mode::Idle,
            input_buffer: String::new(),
            dialog_open: false,
            wake_word_armed: false,
            last_error: None,
        }
    }
}

/// Outcome of submitting a final transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptOutcome {
    /// A user message was appended; machine is in `Processing`
    Accepted(Uuid),
    /// Transcript matched the blocklist; no message, back to `SpeechListening`
    Filtered,
    /// Machine was not in `SpeechListening`; event ignored
    Ignored,
}

/// Serializes every state mutation and hands out immutable snapshots
pub struct StateMachine {
    snapshot: Mutex<Arc<ConversationState>>,
    seq: AtomicU64,
    user_blocklist: Vec<String>,
    assistant_blocklist: Vec<String>,
}

impl StateMachine {
    /// Create a machine with the given suppression blocklists
    #[must_use]
    pub fn new(user_blocklist: Vec<String>, assistant_blocklist: Vec<String>) -> Self {
        Self {
            snapshot: Mutex::new(Arc::new(ConversationState::initial())),
            seq: AtomicU64::new(0),
            user_blocklist: lowercase_all(user_blocklist),
            assistant_blocklist: lowercase_all(assistant_blocklist),
        }
    }

    /// Current state snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<ConversationState> {
        let guard = self
            .snapshot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Apply one atomic update: clone, mutate, swap
    fn update<R>(&self, f: impl FnOnce(&mut ConversationState) -> R) -> R {
        let mut guard = self
            .snapshot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut next = (**guard).clone();
        let result = f(&mut next);
        *guard = Arc::new(next);
        result
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn make_message(
        &self,
        content: &str,
        origin: Origin,
        kind: MessageKind,
        delivery_status: DeliveryStatus,
    ) -> ConversationMessage {
        ConversationMessage {
            id: Uuid::new_v4(),
            content: content.to_string(),
            origin,
            seq: self.next_seq(),
            created_at: Utc::now(),
            kind,
            delivery_status,
        }
    }

    /// Arm wake listening (from idle or after teardown)
    pub fn arm_wake(&self) {
        self.update(|s| {
            s.mode = Mode::WakeListening;
            s.wake_word_armed = true;
        });
        tracing::debug!("mode -> wake-listening");
    }

    /// Wake phrase detected: move to speech listening, clear the buffer
    ///
    /// Returns false (and changes nothing) if the machine was not wake-listening.
    #[must_use]
    pub fn wake_detected(&self) -> bool {
        let applied = self.update(|s| {
            if s.mode != Mode::WakeListening {
                return false;
            }
            s.mode = Mode::SpeechListening;
            s.wake_word_armed = false;
            s.input_buffer.clear();
            true
        });

        if applied {
            tracing::info!("wake detected, mode -> speech-listening");
        } else {
            tracing::warn!("wake detection ignored outside wake-listening");
        }
        applied
    }

    /// Partial transcript: refresh the live input buffer
    ///
    /// Ignored outside `SpeechListening`; partials never append messages.
    pub fn partial_transcript(&self, text: &str) {
        self.update(|s| {
            if s.mode == Mode::SpeechListening {
                s.input_buffer = text.to_string();
            }
        });
    }

    /// Final transcript: append exactly one user message unless filtered
    #[must_use]
    pub fn final_transcript(&self, text: &str) -> TranscriptOutcome {
        if is_blocked(text, &self.user_blocklist) {
            tracing::debug!(transcript = text, "transcript filtered by blocklist");
            // Fall back to speech listening; no message is created
            self.update(|s| {
                if s.mode == Mode::SpeechListening {
                    s.input_buffer.clear();
                }
            });
            return TranscriptOutcome::Filtered;
        }

        let message = self.make_message(text, Origin::User, MessageKind::Text, DeliveryStatus::Sent);
        let id = message.id;

        let applied = self.update(|s| {
            if s.mode != Mode::SpeechListening {
                return false;
            }
            s.input_buffer = text.to_string();
            s.messages.push(message);
            s.mode = Mode::Processing;
            true
        });

        if applied {
            tracing::info!(transcript = text, "final transcript accepted, mode -> processing");
            TranscriptOutcome::Accepted(id)
        } else {
            tracing::warn!("final transcript ignored outside speech-listening");
            TranscriptOutcome::Ignored
        }
    }

    /// Dispatch succeeded: append the assistant reply (unless suppressed),
    /// reset the buffer, return to wake listening
    ///
    /// Returns the appended message id, or `None` if the reply was suppressed.
    #[must_use]
    pub fn dispatch_succeeded(&self, reply: &str, kind: MessageKind) -> Option<Uuid> {
        let suppressed = is_blocked(reply, &self.assistant_blocklist);
        let message = if suppressed {
            tracing::debug!(reply, "assistant reply suppressed by blocklist");
            None
        } else {
            Some(self.make_message(reply, Origin::Assistant, kind, DeliveryStatus::None))
        };
        let id = message.as_ref().map(|m| m.id);

        self.update(|s| {
            if let Some(message) = message {
                s.messages.push(message);
            }
            s.input_buffer.clear();
            s.last_error = None;
            s.mode = Mode::WakeListening;
            s.wake_word_armed = true;
        });

        tracing::debug!("dispatch complete, mode -> wake-listening");
        id
    }

    /// Fatal recognition failure: surface it once, fall back to the wake baseline
    pub fn session_failed(&self, error: &str) {
        self.update(|s| {
            s.last_error = Some(error.to_string());
            s.input_buffer.clear();
            s.mode = Mode::WakeListening;
            s.wake_word_armed = true;
        });
        tracing::warn!(error, "recognition session failed, mode -> wake-listening");
    }

    /// Dispatch failed: surface the error, stay ready for a spoken retry
    pub fn dispatch_failed(&self, error: &str) {
        self.update(|s| {
            s.last_error = Some(error.to_string());
            s.mode = Mode::SpeechListening;
        });
        tracing::warn!(error, "dispatch failed, mode -> speech-listening");
    }

    /// Open the dialog surface: history resets, one system greeting appears
    pub fn open_dialog(&self, greeting: &str) {
        let message =
            self.make_message(greeting, Origin::Assistant, MessageKind::SystemStatus, DeliveryStatus::None);
        self.update(|s| {
            s.messages.clear();
            s.messages.push(message);
            s.dialog_open = true;
        });
        tracing::info!("dialog opened");
    }

    /// Close the dialog surface: history resets, baseline restored
    ///
    /// The caller broadcasts `StopSpeechRecognition` / `RestoreWakeWord` over
    /// the bus so transient listeners converge on the wake baseline.
    pub fn close_dialog(&self) {
        self.update(|s| {
            s.messages.clear();
            s.dialog_open = false;
            s.input_buffer.clear();
            s.last_error = None;
            s.mode = Mode::WakeListening;
            s.wake_word_armed = true;
        });
        tracing::info!("dialog closed, baseline restored");
    }

    /// Transition a message `Sent -> Delivered`
    ///
    /// Returns false if the message is unknown or not in `Sent`.
    #[must_use]
    pub fn mark_delivered(&self, id: Uuid) -> bool {
        self.set_delivery(id, DeliveryStatus::Delivered)
    }

    /// Transition a message `Sent -> Failed`
    ///
    /// Returns false if the message is unknown or not in `Sent`.
    #[must_use]
    pub fn mark_failed(&self, id: Uuid) -> bool {
        self.set_delivery(id, DeliveryStatus::Failed)
    }

    fn set_delivery(&self, id: Uuid, status: DeliveryStatus) -> bool {
        let applied = self.update(|s| {
            let Some(message) = s.messages.iter_mut().find(|m| m.id == id) else {
                return false;
            };
            if message.delivery_status != DeliveryStatus::Sent {
                return false;
            }
            message.delivery_status = status;
            true
        });

        if !applied {
            tracing::warn!(%id, ?status, "illegal delivery transition ignored");
        }
        applied
    }
}

fn lowercase_all(list: Vec<String>) -> Vec<String> {
    list.into_iter().map(|s| s.to_lowercase()).collect()
}

/// Case-insensitive substring match against a blocklist
fn is_blocked(text: &str, blocklist: &[String]) -> bool {
    let normalized = text.to_lowercase();
    blocklist.iter().any(|phrase| normalized.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> StateMachine {
        StateMachine::new(
            vec!["no speech detected".to_string(), "speech timeout".to_string()],
            vec!["done!".to_string()],
        )
    }

    fn machine_in_speech_listening() -> StateMachine {
        let m = machine();
        m.arm_wake();
        assert!(m.wake_detected());
        m
    }

    #[test]
    fn wake_detection_requires_wake_listening() {
        let m = machine();
        assert!(!m.wake_detected());
        m.arm_wake();
        assert!(m.wake_detected());
        assert_eq!(m.snapshot().mode, Mode::SpeechListening);
    }

    #[test]
    fn partials_never_append_messages() {
        let m = machine_in_speech_listening();
        m.partial_transcript("send an em");
        m.partial_transcript("send an email to");
        assert!(m.snapshot().messages.is_empty());
        assert_eq!(m.snapshot().input_buffer, "send an email to");
    }

    #[test]
    fn final_appends_exactly_one_user_message() {
        let m = machine_in_speech_listening();
        m.partial_transcript("send an em");
        let outcome = m.final_transcript("send an email to John");
        assert!(matches!(outcome, TranscriptOutcome::Accepted(_)));

        let snap = m.snapshot();
        assert_eq!(snap.messages.len(), 1);
        assert_eq!(snap.messages[0].origin, Origin::User);
        assert_eq!(snap.messages[0].delivery_status, DeliveryStatus::Sent);
        assert_eq!(snap.mode, Mode::Processing);
    }

    #[test]
    fn blocklisted_transcript_never_mutates_messages() {
        let m = machine_in_speech_listening();
        for phrase in ["no speech detected", "No Speech Detected", "NO SPEECH DETECTED"] {
            assert_eq!(m.final_transcript(phrase), TranscriptOutcome::Filtered);
        }
        let snap = m.snapshot();
        assert!(snap.messages.is_empty());
        assert_eq!(snap.mode, Mode::SpeechListening);
    }

    #[test]
    fn dispatch_success_returns_to_wake_listening() {
        let m = machine_in_speech_listening();
        let _ = m.final_transcript("check my inbox");

        let id = m.dispatch_succeeded("You have 3 new messages", MessageKind::Text);
        assert!(id.is_some());

        let snap = m.snapshot();
        assert_eq!(snap.mode, Mode::WakeListening);
        assert!(snap.wake_word_armed);
        assert!(snap.input_buffer.is_empty());
        assert_eq!(snap.messages.len(), 2);
        assert_eq!(snap.messages[1].origin, Origin::Assistant);
    }

    #[test]
    fn suppressed_assistant_reply_still_transitions() {
        let m = machine_in_speech_listening();
        let _ = m.final_transcript("send it");

        assert!(m.dispatch_succeeded("Done!", MessageKind::Text).is_none());
        let snap = m.snapshot();
        assert_eq!(snap.messages.len(), 1); // only the user message
        assert_eq!(snap.mode, Mode::WakeListening);
    }

    #[test]
    fn dispatch_failure_surfaces_error_and_allows_retry() {
        let m = machine_in_speech_listening();
        let _ = m.final_transcript("send an email");
        m.dispatch_failed("classifier unreachable");

        let snap = m.snapshot();
        assert_eq!(snap.mode, Mode::SpeechListening);
        assert_eq!(snap.last_error.as_deref(), Some("classifier unreachable"));

        // A successful retry clears the error
        let _ = m.final_transcript("send an email");
        let _ = m.dispatch_succeeded("Sent", MessageKind::Text);
        assert!(m.snapshot().last_error.is_none());
    }

    #[test]
    fn session_failure_falls_back_to_wake_baseline() {
        let m = machine_in_speech_listening();
        m.session_failed("speech recognition error 3");

        let snap = m.snapshot();
        assert_eq!(snap.mode, Mode::WakeListening);
        assert!(snap.wake_word_armed);
        assert_eq!(snap.last_error.as_deref(), Some("speech recognition error 3"));
    }

    #[test]
    fn dialog_open_resets_history_with_greeting() {
        let m = machine_in_speech_listening();
        let _ = m.final_transcript("hello");
        let _ = m.dispatch_succeeded("hi there", MessageKind::Text);

        m.open_dialog("How can I help?");
        let snap = m.snapshot();
        assert!(snap.dialog_open);
        assert_eq!(snap.messages.len(), 1);
        assert_eq!(snap.messages[0].kind, MessageKind::SystemStatus);
    }

    #[test]
    fn dialog_close_restores_baseline() {
        let m = machine_in_speech_listening();
        m.open_dialog("hi");
        m.close_dialog();

        let snap = m.snapshot();
        assert!(!snap.dialog_open);
        assert!(snap.messages.is_empty());
        assert_eq!(snap.mode, Mode::WakeListening);
        assert!(snap.wake_word_armed);
    }

    #[test]
    fn delivery_status_only_moves_from_sent() {
        let m = machine_in_speech_listening();
        let TranscriptOutcome::Accepted(id) = m.final_transcript("send it") else {
            panic!("transcript not accepted");
        };

        assert!(m.mark_delivered(id));
        // Delivered is terminal
        assert!(!m.mark_failed(id));
        assert_eq!(
            m.snapshot().messages[0].delivery_status,
            DeliveryStatus::Delivered
        );

        // Assistant messages start at None and cannot move
        let reply = m.dispatch_succeeded("ok", MessageKind::Text).unwrap();
        assert!(!m.mark_delivered(reply));
    }

    #[test]
    fn seq_is_monotonic_across_messages() {
        let m = machine_in_speech_listening();
        let _ = m.final_transcript("one");
        let _ = m.dispatch_succeeded("two", MessageKind::Text);

        let snap = m.snapshot();
        assert!(snap.messages[0].seq < snap.messages[1].seq);
    }

    #[test]
    fn snapshots_are_immutable_views() {
        let m = machine_in_speech_listening();
        let before = m.snapshot();
        let _ = m.final_transcript("hello");
        // The earlier snapshot is unaffected by later updates
        assert!(before.messages.is_empty());
        assert_eq!(m.snapshot().messages.len(), 1);
    }
}
