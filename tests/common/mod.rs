//! Shared test utilities
//!
//! Scripted engines and collaborators so the pipeline can run without audio
//! hardware or network services.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use hark::intent::{Classifier, IntentResult};
use hark::{Error, Result};
use hark::mail::{DraftBackend, DraftHandle, InboxSummary};
use hark::voice::{
    AudioArbiter, DeviceLease, EngineEvent, SampleStream, SpeechEngine, WakeWordEngine,
};

/// Senders for every sample stream the test arbiter has minted
pub type FeedTxs = Arc<Mutex<Vec<mpsc::Sender<Vec<f32>>>>>;

/// Arbiter whose spawner mints a fresh sample stream per acquisition
#[must_use]
pub fn test_arbiter() -> (Arc<AudioArbiter>, FeedTxs) {
    let txs: FeedTxs = Arc::new(Mutex::new(Vec::new()));
    let txs_in_spawner = Arc::clone(&txs);
    let arbiter = Arc::new(AudioArbiter::new(Box::new(move || {
        let (tx, _stop, stream) = SampleStream::channel();
        txs_in_spawner.lock().unwrap().push(tx);
        Ok(stream)
    })));
    (arbiter, txs)
}

/// Sender feeding the most recently acquired lease
#[must_use]
pub fn latest_tx(txs: &FeedTxs) -> mpsc::Sender<Vec<f32>> {
    txs.lock().unwrap().last().unwrap().clone()
}

/// Wake engine that detects on the nth fed chunk
pub struct CountingWakeEngine {
    detect_on: usize,
    seen: usize,
}

impl CountingWakeEngine {
    #[must_use]
    pub fn detecting_on(detect_on: usize) -> Box<Self> {
        Box::new(Self { detect_on, seen: 0 })
    }
}

#[async_trait]
impl WakeWordEngine for CountingWakeEngine {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    async fn feed(&mut self, _samples: &[f32]) -> Result<bool> {
        self.seen += 1;
        Ok(self.seen >= self.detect_on)
    }
}

/// Wake engine whose feed always fails
pub struct FailingWakeEngine;

impl FailingWakeEngine {
    #[must_use]
    pub fn boxed() -> Box<Self> {
        Box::new(Self)
    }
}

#[async_trait]
impl WakeWordEngine for FailingWakeEngine {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    async fn feed(&mut self, _samples: &[f32]) -> Result<bool> {
        Err(Error::WakeWord("detector backend lost".to_string()))
    }
}

/// Speech engine that replays scripted cycles, then blocks until cancelled
pub struct ScriptedSpeechEngine {
    cycles: VecDeque<Vec<EngineEvent>>,
}

impl ScriptedSpeechEngine {
    #[must_use]
    pub fn with_cycles(cycles: Vec<Vec<EngineEvent>>) -> Box<Self> {
        Box::new(Self {
            cycles: cycles.into(),
        })
    }
}

#[async_trait]
impl SpeechEngine for ScriptedSpeechEngine {
    async fn run_cycle(&mut self, _audio: &mut DeviceLease, events: mpsc::Sender<EngineEvent>) {
        let Some(cycle) = self.cycles.pop_front() else {
            std::future::pending::<()>().await;
            return;
        };
        for event in cycle {
            let _ = events.send(event).await;
        }
    }
}

/// Classifier returning a programmable result
pub struct ScriptedClassifier {
    result: Mutex<IntentResult>,
}

impl ScriptedClassifier {
    #[must_use]
    pub fn returning(intent: &str, instruction: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(IntentResult {
                intent: intent.to_string(),
                confidence: 0.9,
                suggested_action: "try rephrasing".to_string(),
                navigation_instruction: instruction.to_string(),
                recipient_mentioned: false,
            }),
        })
    }

    pub fn set(&self, intent: &str, instruction: &str) {
        let mut result = self.result.lock().unwrap();
        result.intent = intent.to_string();
        result.navigation_instruction = instruction.to_string();
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, _user_input: &str, _current_screen: &str) -> Result<IntentResult> {
        Ok(self.result.lock().unwrap().clone())
    }
}

/// Forwarding wrapper so one [`ScriptedClassifier`] can be shared with the
/// dispatcher (which takes a boxed classifier) and the test body
pub struct SharedClassifier(pub Arc<ScriptedClassifier>);

#[async_trait]
impl Classifier for SharedClassifier {
    async fn classify(&self, user_input: &str, current_screen: &str) -> Result<IntentResult> {
        self.0.classify(user_input, current_screen).await
    }
}

/// Backend that fabricates drafts and counts calls per operation
#[derive(Default)]
pub struct RecordingBackend {
    pub creates: AtomicU64,
    pub edits: AtomicU64,
    pub sends: AtomicU64,
    pub fetches: AtomicU64,
}

#[async_trait]
impl DraftBackend for RecordingBackend {
    async fn create_draft(&self, _prompt: &str) -> Result<DraftHandle> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(DraftHandle {
            draft_id: "d1".to_string(),
            recipient: Some("john@x.com".to_string()),
            subject: Some("Budget".to_string()),
            body: Some("Hi John, about the budget...".to_string()),
        })
    }

    async fn edit_draft(&self, draft_id: &str, _edit_prompt: &str) -> Result<DraftHandle> {
        self.edits.fetch_add(1, Ordering::SeqCst);
        Ok(DraftHandle {
            draft_id: draft_id.to_string(),
            recipient: Some("john@x.com".to_string()),
            subject: Some("Budget".to_string()),
            body: Some("Shorter.".to_string()),
        })
    }

    async fn send_draft(&self, _draft_id: &str) -> Result<()> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_inbox(&self) -> Result<Vec<InboxSummary>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(vec![InboxSummary {
            id: "m1".to_string(),
            from: "sarah@x.com".to_string(),
            subject: "Lunch".to_string(),
            snippet: "Are we still on?".to_string(),
        }])
    }
}

/// Forwarding wrapper so one [`RecordingBackend`] can be shared with the
/// dispatcher and the test body
pub struct SharedBackend(pub Arc<RecordingBackend>);

#[async_trait]
impl DraftBackend for SharedBackend {
    async fn create_draft(&self, prompt: &str) -> Result<DraftHandle> {
        self.0.create_draft(prompt).await
    }

    async fn edit_draft(&self, draft_id: &str, edit_prompt: &str) -> Result<DraftHandle> {
        self.0.edit_draft(draft_id, edit_prompt).await
    }

    async fn send_draft(&self, draft_id: &str) -> Result<()> {
        self.0.send_draft(draft_id).await
    }

    async fn fetch_inbox(&self) -> Result<Vec<InboxSummary>> {
        self.0.fetch_inbox().await
    }
}
