//! Configuration management for the hark assistant

use std::path::PathBuf;

use crate::{Error, Result};

/// Default phrases suppressed from user transcripts (recognizer artifacts)
const DEFAULT_USER_BLOCKLIST: &[&str] = &[
    "no speech detected",
    "no speech was detected",
    "didn't catch that",
    "speech timeout",
];

/// Default phrases suppressed from assistant replies (redundant confirmations)
const DEFAULT_ASSISTANT_BLOCKLIST: &[&str] = &[
    "done!",
    "request completed",
    "action completed successfully",
];

/// hark assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Wake phrase that arms active listening (e.g. "hey mail")
    pub wake_phrase: String,

    /// Path to data directory (credentials, cache)
    pub data_dir: PathBuf,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// Remote service endpoints
    pub services: ServiceConfig,

    /// Phrases filtered from user transcripts (case-insensitive substrings)
    pub user_blocklist: Vec<String>,

    /// Phrases filtered from assistant replies (case-insensitive substrings)
    pub assistant_blocklist: Vec<String>,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable voice input
    pub enabled: bool,

    /// STT model identifier (e.g. "whisper-1")
    pub stt_model: String,

    /// STT endpoint URL
    pub stt_url: String,
}

/// Remote collaborator endpoints
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Intent classification service base URL
    pub classifier_url: String,

    /// Draft/mail backend base URL
    pub mail_url: String,
}

/// Return the XDG data directory for hark, creating it if needed
///
/// Uses `~/.local/share/omni/hark/` on Linux
#[must_use]
pub fn data_dir() -> PathBuf {
    let dir = directories::ProjectDirs::from("dev", "omni", "omni").map_or_else(
        || PathBuf::from(".hark"),
        |d| d.data_dir().join("hark"),
    );

    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::warn!(path = %dir.display(), error = %e, "failed to create data directory");
    }

    dir
}

impl Config {
    /// Load configuration from the environment
    ///
    /// # Errors
    ///
    /// Returns error if required settings are missing or malformed
    pub fn load() -> Result<Self> {
        Self::load_with_options(false)
    }

    /// Load configuration with explicit voice disable option
    ///
    /// # Errors
    ///
    /// Returns error if required settings are missing or malformed
    pub fn load_with_options(disable_voice: bool) -> Result<Self> {
        let wake_phrase = std::env::var("HARK_WAKE_PHRASE")
            .unwrap_or_else(|_| "hey mail".to_string())
            .trim()
            .to_lowercase();

        if wake_phrase.is_empty() {
            return Err(Error::Config("HARK_WAKE_PHRASE must not be empty".to_string()));
        }

        let voice = VoiceConfig {
            enabled: !disable_voice,
            stt_model: std::env::var("HARK_STT_MODEL").unwrap_or_else(|_| "whisper-1".to_string()),
            stt_url: std::env::var("HARK_STT_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/audio/transcriptions".to_string()),
        };

        if disable_voice {
            tracing::info!("voice explicitly disabled via --disable-voice");
        }

        let services = ServiceConfig {
            classifier_url: std::env::var("HARK_CLASSIFIER_URL")
                .unwrap_or_else(|_| "http://localhost:6100".to_string()),
            mail_url: std::env::var("HARK_MAIL_URL")
                .unwrap_or_else(|_| "http://localhost:6200".to_string()),
        };

        let user_blocklist = Self::blocklist_from_env("HARK_USER_BLOCKLIST", DEFAULT_USER_BLOCKLIST);
        let assistant_blocklist =
            Self::blocklist_from_env("HARK_ASSISTANT_BLOCKLIST", DEFAULT_ASSISTANT_BLOCKLIST);

        Ok(Self {
            wake_phrase,
            data_dir: data_dir(),
            voice,
            services,
            user_blocklist,
            assistant_blocklist,
        })
    }

    /// Build a blocklist: defaults plus comma-separated env extensions
    fn blocklist_from_env(var: &str, defaults: &[&str]) -> Vec<String> {
        merge_blocklist(defaults, std::env::var(var).ok().as_deref())
    }
}

/// Merge default blocklist phrases with a comma-separated extension string
fn merge_blocklist(defaults: &[&str], extra: Option<&str>) -> Vec<String> {
    let mut list: Vec<String> = defaults.iter().map(|s| (*s).to_string()).collect();

    if let Some(extra) = extra {
        for phrase in extra.split(',') {
            let phrase = phrase.trim().to_lowercase();
            if !phrase.is_empty() {
                list.push(phrase);
            }
        }
    }

    list
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_blocklists_cover_no_speech_variants() {
        assert!(DEFAULT_USER_BLOCKLIST.contains(&"no speech detected"));
        assert!(!DEFAULT_ASSISTANT_BLOCKLIST.is_empty());
    }

    #[test]
    fn blocklist_extension_is_trimmed_and_lowercased() {
        let list = merge_blocklist(&["base"], Some(" Extra Phrase ,  "));
        assert_eq!(list, vec!["base".to_string(), "extra phrase".to_string()]);
    }

    #[test]
    fn blocklist_without_extension_keeps_defaults() {
        let list = merge_blocklist(&["a", "b"], None);
        assert_eq!(list, vec!["a".to_string(), "b".to_string()]);
    }
}
