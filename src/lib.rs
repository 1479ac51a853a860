//! hark - voice-driven mail assistant
//!
//! This library provides the voice-interaction orchestration pipeline:
//! - Wake-word monitoring (always-on background listener)
//! - Speech recognition session management (foreground active listener)
//! - Conversation state tracking (single-writer, snapshot reads)
//! - Intent classification and action dispatch (compose/edit/send/navigate)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     Microphone                        │
//! │        (exclusive: one listener at a time)            │
//! └──────────┬────────────────────────────┬──────────────┘
//!            │                            │
//! ┌──────────▼──────────┐     ┌───────────▼──────────────┐
//! │  Wake-Word Monitor  │ ──► │ Recognition Session Mgr  │
//! └──────────┬──────────┘ bus └───────────┬──────────────┘
//!            │                            │ partial/final
//! ┌──────────▼────────────────────────────▼──────────────┐
//! │             Conversation State Machine                │
//! └──────────────────────────┬───────────────────────────┘
//!                            │ final transcript
//! ┌──────────────────────────▼───────────────────────────┐
//! │   Intent Dispatcher ── classifier / mail backend      │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod bus;
pub mod config;
pub mod daemon;
pub mod error;
pub mod intent;
pub mod mail;
pub mod state;
pub mod voice;

pub use bus::{EventBus, Signal};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use intent::{DispatchOutcome, IntentDispatcher, Screen};
pub use mail::{DraftBackend, DraftHandle, MailClient};
pub use state::{
    ConversationMessage, ConversationState, DeliveryStatus, MessageKind, Mode, Origin,
    StateMachine, TranscriptOutcome,
};
