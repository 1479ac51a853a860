//! Error types for the hark assistant

use thiserror::Error;

/// Result type alias for hark operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Wake word engine error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Intent classification error
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Draft backend error
    #[error("mail error: {0}")]
    Mail(String),

    /// Edit or send requested with no live draft
    #[error("no active draft")]
    NoActiveDraft,

    /// Draft creation requested while another draft is live
    #[error("a draft is already active: {0}")]
    DraftAlreadyActive(String),

    /// Required auth token is absent from the local store
    #[error("missing auth token: {0}")]
    MissingAuthToken(String),

    /// Audio input device is already held by another listener
    #[error("audio device busy: held by {0}")]
    DeviceBusy(&'static str),

    /// A listener was started while already running
    #[error("listener already running: {0}")]
    AlreadyRunning(&'static str),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
