//! Intent-driven action dispatch
//!
//! One dispatch per final transcript: classify the utterance, then route it
//! through a table keyed by the classifier's `navigation_instruction` (exact
//! string match, no fuzzy fallback). The dispatcher owns the current screen
//! and the live draft handle; the caller serializes dispatches through the
//! state machine's `Processing` mode, so at most one is in flight.

use super::classifier::Classifier;
use crate::mail::{DraftBackend, DraftHandle, InboxSummary};
use crate::{Error, Result};

/// Screens the assistant can navigate between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Conversation,
    Composer,
    Inbox,
    Drafts,
}

impl Screen {
    /// Wire name sent to the classifier as `current_screen`
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Composer => "composer",
            Self::Inbox => "inbox",
            Self::Drafts => "drafts",
        }
    }
}

/// Result of one dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Navigation only
    ScreenChanged(Screen),
    /// Composer opened with a freshly created draft
    DraftCreated(DraftHandle),
    /// The live draft was rewritten in place
    DraftUpdated(DraftHandle),
    /// The live draft was sent and the handle cleared
    DraftSent { draft_id: String },
    /// Inbox opened and fetched
    InboxLoaded(Vec<InboxSummary>),
    /// Schedule-picker navigation event
    ShowSchedulePicker,
    /// Chat navigation event
    ShowChat,
    /// Unrecognized instruction; the suggested action is shown to the user
    ShowError(String),
}

/// Routes classified intents to actions
pub struct IntentDispatcher {
    classifier: Box<dyn Classifier>,
    backend: Box<dyn DraftBackend>,
    screen: Screen,
    draft: Option<DraftHandle>,
}

impl IntentDispatcher {
    /// Create a dispatcher on the conversation screen with no live draft
    #[must_use]
    pub fn new(classifier: Box<dyn Classifier>, backend: Box<dyn DraftBackend>) -> Self {
        Self {
            classifier,
            backend,
            screen: Screen::Conversation,
            draft: None,
        }
    }

    /// The screen the user is currently on
    #[must_use]
    pub const fn screen(&self) -> Screen {
        self.screen
    }

    /// The live draft, if any
    #[must_use]
    pub const fn draft(&self) -> Option<&DraftHandle> {
        self.draft.as_ref()
    }

    /// Explicitly discard the live draft
    pub fn clear_draft(&mut self) {
        if let Some(draft) = self.draft.take() {
            tracing::debug!(draft_id = %draft.draft_id, "draft handle cleared");
        }
    }

    /// Classify `utterance` and execute the matching action
    ///
    /// An unrecognized `navigation_instruction` is not an error: it produces
    /// [`DispatchOutcome::ShowError`] and leaves screen and draft untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveDraft`] if an edit or send arrives with no
    /// live draft (before any backend call), [`Error::DraftAlreadyActive`] if
    /// a compose arrives while a draft is live, or the classifier/backend
    /// failure.
    pub async fn dispatch(&mut self, utterance: &str) -> Result<DispatchOutcome> {
        let result = self
            .classifier
            .classify(utterance, self.screen.name())
            .await?;

        tracing::info!(
            instruction = %result.navigation_instruction,
            intent = %result.intent,
            "dispatching"
        );

        match result.navigation_instruction.as_str() {
            "navigate_to_composer" => {
                if result.intent == "compose" {
                    if let Some(live) = &self.draft {
                        return Err(Error::DraftAlreadyActive(live.draft_id.clone()));
                    }
                    let handle = self.backend.create_draft(utterance).await?;
                    self.screen = Screen::Composer;
                    self.draft = Some(handle.clone());
                    Ok(DispatchOutcome::DraftCreated(handle))
                } else {
                    self.screen = Screen::Composer;
                    Ok(DispatchOutcome::ScreenChanged(Screen::Composer))
                }
            }
            "navigate_to_inbox" => {
                let messages = self.backend.fetch_inbox().await?;
                self.screen = Screen::Inbox;
                Ok(DispatchOutcome::InboxLoaded(messages))
            }
            "navigate_to_drafts" | "save_and_go_to_drafts" => {
                // A saved draft was already persisted by the step that
                // created it; the handle stays live until sent or cleared
                self.screen = Screen::Drafts;
                Ok(DispatchOutcome::ScreenChanged(Screen::Drafts))
            }
            "stay_and_edit" => {
                let live = self.draft.as_ref().ok_or(Error::NoActiveDraft)?;
                let updated = self.backend.edit_draft(&live.draft_id, utterance).await?;
                self.draft = Some(updated.clone());
                Ok(DispatchOutcome::DraftUpdated(updated))
            }
            "send_current_draft" => {
                let live = self.draft.as_ref().ok_or(Error::NoActiveDraft)?;
                let draft_id = live.draft_id.clone();
                self.backend.send_draft(&draft_id).await?;
                self.draft = None;
                Ok(DispatchOutcome::DraftSent { draft_id })
            }
            "show_schedule_picker" => Ok(DispatchOutcome::ShowSchedulePicker),
            "show_chat_interface" => Ok(DispatchOutcome::ShowChat),
            other => {
                tracing::warn!(instruction = other, "unrecognized navigation instruction");
                Ok(DispatchOutcome::ShowError(result.suggested_action))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::intent::classifier::IntentResult;

    /// Classifier returning a canned result
    struct CannedClassifier {
        result: Mutex<IntentResult>,
    }

    impl CannedClassifier {
        fn returning(intent: &str, instruction: &str) -> Box<Self> {
            Box::new(Self {
                result: Mutex::new(IntentResult {
                    intent: intent.to_string(),
                    confidence: 0.9,
                    suggested_action: "try rephrasing".to_string(),
                    navigation_instruction: instruction.to_string(),
                    recipient_mentioned: false,
                }),
            })
        }

        fn set(&self, intent: &str, instruction: &str) {
            let mut result = self.result.lock().unwrap();
            result.intent = intent.to_string();
            result.navigation_instruction = instruction.to_string();
        }
    }

    #[async_trait]
    impl Classifier for CannedClassifier {
        async fn classify(&self, _user_input: &str, _current_screen: &str) -> Result<IntentResult> {
            Ok(self.result.lock().unwrap().clone())
        }
    }

    /// Backend that fabricates drafts and counts calls
    #[derive(Default)]
    struct FakeBackend {
        calls: AtomicU64,
    }

    #[async_trait]
    impl DraftBackend for FakeBackend {
        async fn create_draft(&self, _prompt: &str) -> Result<DraftHandle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DraftHandle {
                draft_id: "d1".to_string(),
                recipient: Some("john@x.com".to_string()),
                subject: Some("Budget".to_string()),
                body: Some("Hi John, about the budget...".to_string()),
            })
        }

        async fn edit_draft(&self, draft_id: &str, _edit_prompt: &str) -> Result<DraftHandle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DraftHandle {
                draft_id: draft_id.to_string(),
                recipient: Some("john@x.com".to_string()),
                subject: Some("Budget".to_string()),
                body: Some("Shorter.".to_string()),
            })
        }

        async fn send_draft(&self, _draft_id: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn fetch_inbox(&self) -> Result<Vec<InboxSummary>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }
    }

    /// Forwarding classifier so a test can flip the canned result mid-flight
    struct Fwd(std::sync::Arc<CannedClassifier>);

    #[async_trait]
    impl Classifier for Fwd {
        async fn classify(&self, input: &str, screen: &str) -> Result<IntentResult> {
            self.0.classify(input, screen).await
        }
    }

    fn dispatcher(intent: &str, instruction: &str) -> IntentDispatcher {
        IntentDispatcher::new(
            CannedClassifier::returning(intent, instruction),
            Box::new(FakeBackend::default()),
        )
    }

    #[tokio::test]
    async fn schedule_picker_creates_no_draft() {
        let mut d = dispatcher("schedule", "show_schedule_picker");

        let outcome = d.dispatch("schedule a meeting").await.unwrap();
        assert_eq!(outcome, DispatchOutcome::ShowSchedulePicker);
        assert!(d.draft().is_none());
        assert_eq!(d.screen(), Screen::Conversation);
    }

    #[tokio::test]
    async fn compose_then_edit_keeps_draft_id() {
        let classifier = CannedClassifier::returning("compose", "navigate_to_composer");
        let canned: std::sync::Arc<CannedClassifier> = std::sync::Arc::from(classifier);
        let mut d = IntentDispatcher::new(
            Box::new(Fwd(std::sync::Arc::clone(&canned))),
            Box::new(FakeBackend::default()),
        );

        let outcome = d.dispatch("email John about the budget").await.unwrap();
        let DispatchOutcome::DraftCreated(handle) = outcome else {
            panic!("expected draft creation");
        };
        assert_eq!(handle.draft_id, "d1");
        assert_eq!(d.screen(), Screen::Composer);

        canned.set("edit", "stay_and_edit");
        let outcome = d.dispatch("make it shorter").await.unwrap();
        let DispatchOutcome::DraftUpdated(updated) = outcome else {
            panic!("expected draft update");
        };
        assert_eq!(updated.draft_id, "d1");
        assert_eq!(updated.body.as_deref(), Some("Shorter."));
        assert_eq!(d.draft().unwrap().body.as_deref(), Some("Shorter."));
    }

    #[tokio::test]
    async fn send_clears_the_live_draft() {
        let mut d = dispatcher("compose", "navigate_to_composer");
        d.dispatch("email John").await.unwrap();
        assert!(d.draft().is_some());

        let mut d2 = IntentDispatcher {
            classifier: CannedClassifier::returning("send", "send_current_draft"),
            backend: Box::new(FakeBackend::default()),
            screen: d.screen,
            draft: d.draft.clone(),
        };
        let outcome = d2.dispatch("send it").await.unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::DraftSent {
                draft_id: "d1".to_string()
            }
        );
        assert!(d2.draft().is_none());
    }

    #[tokio::test]
    async fn edit_without_draft_fails_before_any_backend_call() {
        let backend = Box::new(FakeBackend::default());
        let mut d = IntentDispatcher::new(
            CannedClassifier::returning("edit", "stay_and_edit"),
            backend,
        );

        let err = d.dispatch("make it shorter").await.unwrap_err();
        assert!(matches!(err, Error::NoActiveDraft));
    }

    #[tokio::test]
    async fn send_without_draft_fails() {
        let mut d = dispatcher("send", "send_current_draft");
        let err = d.dispatch("send it").await.unwrap_err();
        assert!(matches!(err, Error::NoActiveDraft));
    }

    #[tokio::test]
    async fn compose_while_draft_live_is_rejected() {
        let mut d = dispatcher("compose", "navigate_to_composer");
        d.dispatch("email John").await.unwrap();

        let err = d.dispatch("email Sarah").await.unwrap_err();
        assert!(matches!(err, Error::DraftAlreadyActive(id) if id == "d1"));
        // Still the first draft
        assert_eq!(d.draft().unwrap().draft_id, "d1");
    }

    #[tokio::test]
    async fn unrecognized_instruction_changes_nothing() {
        let mut d = dispatcher("mystery", "do_a_barrel_roll");

        let outcome = d.dispatch("whatever").await.unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::ShowError("try rephrasing".to_string())
        );
        assert_eq!(d.screen(), Screen::Conversation);
        assert!(d.draft().is_none());
    }

    #[tokio::test]
    async fn save_and_go_to_drafts_keeps_the_handle() {
        let mut d = dispatcher("compose", "navigate_to_composer");
        d.dispatch("email John").await.unwrap();

        let mut d2 = IntentDispatcher {
            classifier: CannedClassifier::returning("save", "save_and_go_to_drafts"),
            backend: Box::new(FakeBackend::default()),
            screen: d.screen,
            draft: d.draft.clone(),
        };
        let outcome = d2.dispatch("save it for later").await.unwrap();
        assert_eq!(outcome, DispatchOutcome::ScreenChanged(Screen::Drafts));
        assert!(d2.draft().is_some());
    }

    #[tokio::test]
    async fn composer_navigation_without_compose_intent_creates_no_draft() {
        let mut d = dispatcher("navigate", "navigate_to_composer");

        let outcome = d.dispatch("open the composer").await.unwrap();
        assert_eq!(outcome, DispatchOutcome::ScreenChanged(Screen::Composer));
        assert!(d.draft().is_none());
    }
}
