use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;

use crate::stream::DeltaStream;
use crate::types::{ChatConfig, ChatRequest, Message};
use crate::{ChatError, Result};

/// Sends chat requests to the completions endpoint.
///
/// One client (and one connection pool) is shared by every exchange of a
/// session; the configuration is fixed at construction.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    config: ChatConfig,
}

impl ChatClient {
    pub fn new(config: ChatConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ChatError::Config("no API key configured".into()));
        }
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Send `history` and open the streamed response.
    ///
    /// A non-2xx status is returned as [`ChatError::Status`] with the trimmed
    /// response body; nothing further is read. The returned stream checks
    /// `cancel` before every line.
    pub async fn execute(
        &self,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> Result<DeltaStream> {
        if cancel.is_cancelled() {
            return Err(ChatError::Cancelled);
        }

        let body = ChatRequest::new(history, &self.config);
        let endpoint = self.config.endpoint();
        tracing::debug!(
            %endpoint,
            model = %self.config.model,
            messages = history.len(),
            online = self.config.online,
            "sending chat request"
        );

        let send = self
            .http
            .post(&endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .json(&body)
            .send();

        let response = tokio::select! {
            res = send => res?,
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body: text.trim().to_string(),
            });
        }

        Ok(DeltaStream::new(response, cancel.clone()))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
