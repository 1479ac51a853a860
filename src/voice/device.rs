//! Audio input device arbitration
//!
//! The microphone is the single most contended resource in the pipeline: at
//! most one of the wake monitor and the recognition session may hold it.
//! Ownership transfer is explicit (stop one listener, then start the other)
//! and this arbiter enforces it with a mutex-guarded current-owner token and
//! an RAII lease that releases the device on drop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::{Error, Result};

/// Sample chunk channel depth between the capture side and a listener
const SAMPLE_CHANNEL_DEPTH: usize = 32;

/// Who may hold the audio input device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    WakeMonitor,
    Recognizer,
}

impl ListenerKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::WakeMonitor => "wake-monitor",
            Self::Recognizer => "recognizer",
        }
    }
}

/// Stream of sample chunks from the capture side, plus its stop flag
#[derive(Debug)]
pub struct SampleStream {
    rx: mpsc::Receiver<Vec<f32>>,
    stop: Arc<AtomicBool>,
}

impl SampleStream {
    /// Build a stream; the capture side keeps the sender and polls the flag
    #[must_use]
    pub fn channel() -> (mpsc::Sender<Vec<f32>>, Arc<AtomicBool>, Self) {
        let (tx, rx) = mpsc::channel(SAMPLE_CHANNEL_DEPTH);
        let stop = Arc::new(AtomicBool::new(false));
        let stream = Self {
            rx,
            stop: Arc::clone(&stop),
        };
        (tx, stop, stream)
    }

    /// Receive the next chunk; `None` when the capture side has shut down
    pub async fn next_chunk(&mut self) -> Option<Vec<f32>> {
        self.rx.recv().await
    }

    fn signal_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Spawns the platform capture side for a lease
pub type CaptureSpawner = dyn Fn() -> Result<SampleStream> + Send + Sync;

/// Mutex-guarded "current owner" token for the audio input device
pub struct AudioArbiter {
    holder: Mutex<Option<ListenerKind>>,
    acquisitions: AtomicU64,
    releases: AtomicU64,
    spawner: Box<CaptureSpawner>,
}

impl AudioArbiter {
    /// Create an arbiter with the given capture spawner
    #[must_use]
    pub fn new(spawner: Box<CaptureSpawner>) -> Self {
        Self {
            holder: Mutex::new(None),
            acquisitions: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            spawner,
        }
    }

    /// Acquire exclusive device ownership for a listener
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceBusy`] if another listener currently holds the
    /// device. This indicates a sequencing bug in the caller, not a runtime
    /// condition, and is logged at error level.
    pub fn try_acquire(self: &Arc<Self>, kind: ListenerKind) -> Result<DeviceLease> {
        {
            let mut holder = self
                .holder
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(current) = *holder {
                tracing::error!(
                    requested = kind.name(),
                    held_by = current.name(),
                    "audio device acquisition while held; sequencing contract violated"
                );
                return Err(Error::DeviceBusy(current.name()));
            }
            *holder = Some(kind);
        }

        let stream = match (self.spawner)() {
            Ok(stream) => stream,
            Err(e) => {
                // Roll back ownership so a later acquire can succeed
                self.clear_holder();
                return Err(e);
            }
        };

        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(owner = kind.name(), "audio device acquired");

        Ok(DeviceLease {
            kind,
            arbiter: Arc::clone(self),
            stream,
        })
    }

    /// Current holder, if any
    #[must_use]
    pub fn holder(&self) -> Option<ListenerKind> {
        *self
            .holder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Total successful acquisitions (test instrumentation)
    #[must_use]
    pub fn acquisition_count(&self) -> u64 {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Total releases (test instrumentation)
    #[must_use]
    pub fn release_count(&self) -> u64 {
        self.releases.load(Ordering::SeqCst)
    }

    fn clear_holder(&self) {
        let mut holder = self
            .holder
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *holder = None;
    }
}

impl std::fmt::Debug for AudioArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioArbiter")
            .field("holder", &self.holder())
            .field("acquisitions", &self.acquisition_count())
            .finish_non_exhaustive()
    }
}

/// Exclusive lease on the audio input device
///
/// Dropping the lease signals the capture side to stop and releases ownership
/// before the drop returns, so the other listener can immediately acquire.
#[derive(Debug)]
pub struct DeviceLease {
    kind: ListenerKind,
    arbiter: Arc<AudioArbiter>,
    stream: SampleStream,
}

impl DeviceLease {
    /// Receive the next sample chunk
    pub async fn next_chunk(&mut self) -> Option<Vec<f32>> {
        self.stream.next_chunk().await
    }

    /// The listener holding this lease
    #[must_use]
    pub const fn kind(&self) -> ListenerKind {
        self.kind
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.stream.signal_stop();
        self.arbiter.clear_holder();
        self.arbiter.releases.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(owner = self.kind.name(), "audio device released");
    }
}
