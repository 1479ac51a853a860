//! Speech-to-text over HTTP
//!
//! Thin client for a Whisper-style transcription endpoint. Both the wake
//! engine (phrase verification) and the speech engine (utterance
//! transcription) share one client.

use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

/// Response from the transcription API
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes WAV audio to text
pub struct SttClient {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: SecretString,
}

impl SttClient {
    /// Create a new STT client
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint URL is empty
    pub fn new(url: String, model: String, api_key: SecretString) -> Result<Self> {
        if url.is_empty() {
            return Err(Error::Config("STT endpoint URL required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url,
            model,
            api_key,
        })
    }

    /// Transcribe WAV audio bytes to text
    ///
    /// # Errors
    ///
    /// Returns error if the request or response parsing fails
    pub async fn transcribe(&self, audio: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(&self.url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription API error");
            return Err(Error::Stt(format!("transcription API error {status}: {body}")));
        }

        let result: TranscriptionResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse transcription response");
            e
        })?;

        tracing::debug!(transcript = %result.text, "transcription complete");
        Ok(result.text.trim().to_string())
    }
}
