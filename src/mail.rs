//! Draft lifecycle backend
//!
//! Remote collaborator that drafts, edits, and sends messages. The dispatcher
//! talks to it through [`DraftBackend`] so tests can substitute a scripted
//! implementation.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The live draft being composed
///
/// Created by a successful draft-create action, replaced wholesale by edits
/// (same `draft_id`, new content), cleared on successful send. At most one
/// live handle per conversation session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftHandle {
    pub draft_id: String,
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

/// One message summary from an inbox fetch
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InboxSummary {
    pub id: String,
    pub from: String,
    pub subject: String,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Serialize)]
struct CreateDraftRequest<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
struct EditDraftRequest<'a> {
    draft_id: &'a str,
    edit_prompt: &'a str,
}

#[derive(Serialize)]
struct SendDraftRequest<'a> {
    draft_id: &'a str,
    action: &'a str,
}

#[derive(Deserialize)]
struct DraftResponse {
    draft_id: String,
    to: Option<String>,
    subject: Option<String>,
    body: Option<String>,
}

impl From<DraftResponse> for DraftHandle {
    fn from(r: DraftResponse) -> Self {
        Self {
            draft_id: r.draft_id,
            recipient: r.to,
            subject: r.subject,
            body: r.body,
        }
    }
}

#[derive(Deserialize)]
struct InboxResponse {
    messages: Vec<InboxSummary>,
}

/// Draft lifecycle operations
#[async_trait]
pub trait DraftBackend: Send + Sync {
    /// Create a draft from a natural-language prompt
    ///
    /// # Errors
    ///
    /// Returns error if the backend call fails
    async fn create_draft(&self, prompt: &str) -> Result<DraftHandle>;

    /// Rewrite an existing draft; the returned handle keeps the same id
    ///
    /// # Errors
    ///
    /// Returns error if the backend call fails
    async fn edit_draft(&self, draft_id: &str, edit_prompt: &str) -> Result<DraftHandle>;

    /// Send a draft
    ///
    /// # Errors
    ///
    /// Returns error if the backend call fails
    async fn send_draft(&self, draft_id: &str) -> Result<()>;

    /// Fetch current inbox summaries
    ///
    /// # Errors
    ///
    /// Returns error if the backend call fails
    async fn fetch_inbox(&self) -> Result<Vec<InboxSummary>>;
}

/// HTTP mail service client
pub struct MailClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl MailClient {
    /// Create a new mail client
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is empty
    pub fn new(base_url: String, api_key: SecretString) -> Result<Self> {
        if base_url.is_empty() {
            return Err(Error::Config("mail service URL required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, path, "mail request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, path, "mail API error");
            return Err(Error::Mail(format!("mail API error {status}: {body}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl DraftBackend for MailClient {
    async fn create_draft(&self, prompt: &str) -> Result<DraftHandle> {
        let response = self
            .post("/drafts", &CreateDraftRequest { prompt })
            .await?
            .json::<DraftResponse>()
            .await?;

        tracing::info!(draft_id = %response.draft_id, "draft created");
        Ok(response.into())
    }

    async fn edit_draft(&self, draft_id: &str, edit_prompt: &str) -> Result<DraftHandle> {
        let response = self
            .post(
                "/drafts/edit",
                &EditDraftRequest {
                    draft_id,
                    edit_prompt,
                },
            )
            .await?
            .json::<DraftResponse>()
            .await?;

        tracing::info!(draft_id = %response.draft_id, "draft edited");
        Ok(response.into())
    }

    async fn send_draft(&self, draft_id: &str) -> Result<()> {
        self.post(
            "/drafts/send",
            &SendDraftRequest {
                draft_id,
                action: "send",
            },
        )
        .await?;

        tracing::info!(draft_id, "draft sent");
        Ok(())
    }

    async fn fetch_inbox(&self) -> Result<Vec<InboxSummary>> {
        let url = format!("{}/inbox", self.base_url);
        let response = self
            .client
            .get(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "inbox fetch error");
            return Err(Error::Mail(format!("mail API error {status}: {body}")));
        }

        let inbox: InboxResponse = response.json().await?;
        tracing::debug!(count = inbox.messages.len(), "inbox fetched");
        Ok(inbox.messages)
    }
}
