//! Lifecycle signal bus
//!
//! Decouples the always-on wake monitor from short-lived recognition sessions
//! with named, payload-less signals. Delivery is best-effort and at-most-once
//! per emission: a signal emitted while no listener is subscribed is lost.
//! That is acceptable because the conversation state machine is the durable
//! source of truth; signals only nudge transient listeners toward its mode.

use tokio::sync::broadcast;

/// Bus channel capacity; laggy subscribers drop the oldest signal
const BUS_CAPACITY: usize = 16;

/// Named lifecycle signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Wake phrase observed; the monitor is done and recognition should start
    WakeDetected,
    /// Tear down any live recognition session
    StopSpeechRecognition,
    /// Return to the wake-listening baseline
    RestoreWakeWord,
}

impl Signal {
    /// Wire name of the signal
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::WakeDetected => "wake-detected",
            Self::StopSpeechRecognition => "stop-speech-recognition",
            Self::RestoreWakeWord => "restore-wake-word",
        }
    }
}

/// Fire-and-forget signal bus
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Signal>,
}

impl EventBus {
    /// Create a new bus
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Subscribe to signals emitted after this call
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.tx.subscribe()
    }

    /// Emit a signal to all current subscribers (best-effort)
    ///
    /// Returns the number of subscribers the signal reached; zero means the
    /// emission was lost, which is not an error.
    #[must_use = "zero receivers means the signal was lost"]
    pub fn emit(&self, signal: Signal) -> usize {
        match self.tx.send(signal) {
            Ok(n) => {
                tracing::debug!(signal = signal.name(), receivers = n, "signal emitted");
                n
            }
            Err(_) => {
                tracing::debug!(signal = signal.name(), "signal emitted with no listeners");
                0
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
