//! Remote intent classification
//!
//! One utterance in, one [`IntentResult`] out. The result is consumed by the
//! dispatcher for a single dispatch decision and not retained.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Classification of one utterance
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IntentResult {
    pub intent: String,
    pub confidence: f64,
    pub suggested_action: String,
    pub navigation_instruction: String,
    pub recipient_mentioned: bool,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    user_input: &'a str,
    current_screen: &'a str,
}

/// Classifies utterances into actionable intents
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify one utterance against the screen the user is on
    ///
    /// # Errors
    ///
    /// Returns error if classification fails
    async fn classify(&self, user_input: &str, current_screen: &str) -> Result<IntentResult>;
}

/// HTTP classifier client
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
    api_key: SecretString,
}

impl HttpClassifier {
    /// Create a new classifier client
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint URL is empty
    pub fn new(url: String, api_key: SecretString) -> Result<Self> {
        if url.is_empty() {
            return Err(Error::Config("classifier endpoint URL required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url,
            api_key,
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, user_input: &str, current_screen: &str) -> Result<IntentResult> {
        tracing::debug!(current_screen, "classifying utterance");

        let response = self
            .client
            .post(&self.url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&ClassifyRequest {
                user_input,
                current_screen,
            })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "classification request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "classifier API error");
            return Err(Error::Classifier(format!(
                "classifier API error {status}: {body}"
            )));
        }

        let result: IntentResult = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse classifier response");
            e
        })?;

        tracing::debug!(
            intent = %result.intent,
            confidence = result.confidence,
            instruction = %result.navigation_instruction,
            "utterance classified"
        );
        Ok(result)
    }
}
