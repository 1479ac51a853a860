//! Local credential storage
//!
//! Tokens for remote services live in a `credentials.toml` file in the data
//! directory, keyed by name. Absence of a token is a precondition failure for
//! any authenticated call; no network request is attempted without one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Fixed token name used for all assistant remote calls
pub const SERVICE_TOKEN: &str = "assistant_api_token";

/// Credentials file name inside the data directory
const CREDENTIALS_FILE: &str = "credentials.toml";

/// On-disk credential map
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    tokens: BTreeMap<String, String>,
}

/// Local key-value store for service tokens
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Create a store backed by `credentials.toml` under the given data directory
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(CREDENTIALS_FILE),
        }
    }

    /// Retrieve a token by name
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAuthToken`] if the token is absent, or an IO/parse
    /// error if the credentials file is unreadable.
    pub fn get(&self, name: &str) -> Result<SecretString> {
        let file = self.read_file()?;
        file.tokens
            .get(name)
            .map(|t| SecretString::from(t.clone()))
            .ok_or_else(|| Error::MissingAuthToken(name.to_string()))
    }

    /// Store a token under the given name, replacing any existing value
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials file cannot be written.
    pub fn set(&self, name: &str, token: &SecretString) -> Result<()> {
        let mut file = self.read_file()?;
        file.tokens
            .insert(name.to_string(), token.expose_secret().to_string());

        let content = toml::to_string_pretty(&file)
            .map_err(|e| Error::Config(format!("failed to serialize credentials: {e}")))?;
        std::fs::write(&self.path, content)?;

        tracing::debug!(name, path = %self.path.display(), "stored token");
        Ok(())
    }

    /// Remove a token by name; no-op if absent
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials file cannot be written.
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut file = self.read_file()?;
        if file.tokens.remove(name).is_some() {
            let content = toml::to_string_pretty(&file)
                .map_err(|e| Error::Config(format!("failed to serialize credentials: {e}")))?;
            std::fs::write(&self.path, content)?;
        }
        Ok(())
    }

    /// Read the credentials file, treating a missing file as empty
    fn read_file(&self) -> Result<CredentialFile> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CredentialFile::default()),
            Err(e) => Err(e.into()),
        }
    }
}
