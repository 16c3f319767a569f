//! REST history client - `HistoryFetcher` over the messages HTTP API.
//!
//! # Configuration
//!
//! ```ignore
//! let config = RestHistoryConfig::new("https://chat.example.com/api")
//!     .with_access_token(token)
//!     .with_timeout(Duration::from_secs(10));
//!
//! let client = RestHistoryClient::new(config)?;
//! ```
//!
//! # Endpoints
//!
//! - `GET {base}/channels/{id}/messages?page=&limit=`
//! - `GET {base}/channels/{id}/messages?beforeId=&limit=`
//! - `GET {base}/channels/{id}/messages?afterId=&limit=`
//! - `GET {base}/channels/{id}/messages/{messageId}`
//!
//! List endpoints answer `{ "messages": [...], "hasMore": bool }`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, Secret};

use crate::domain::chat::MessageView;
use crate::domain::foundation::{ChannelId, MessageId};
use crate::domain::timeline::HistoryPage;
use crate::ports::{HistoryError, HistoryFetcher};

/// Configuration for the REST history client.
#[derive(Debug, Clone)]
pub struct RestHistoryConfig {
    /// API root, e.g. `http://localhost:3000/api`.
    pub base_url: String,
    /// Bearer token sent with every request.
    access_token: Option<Secret<String>>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl RestHistoryConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: None,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(Secret::new(token.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// `HistoryFetcher` backed by the REST messages API.
pub struct RestHistoryClient {
    config: RestHistoryConfig,
    client: Client,
}

impl RestHistoryClient {
    pub fn new(config: RestHistoryConfig) -> Result<Self, HistoryError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| HistoryError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn messages_url(&self, channel_id: &ChannelId) -> String {
        format!(
            "{}/channels/{}/messages",
            self.config.base_url.trim_end_matches('/'),
            channel_id
        )
    }

    async fn get(&self, url: String, query: &[(&str, String)]) -> Result<Response, HistoryError> {
        let mut request = self.client.get(url).query(query);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token.expose_secret());
        }

        request.send().await.map_err(|e| {
            if e.is_timeout() {
                HistoryError::Transport(format!(
                    "Request timed out after {}s",
                    self.config.timeout.as_secs()
                ))
            } else if e.is_connect() {
                HistoryError::Transport(format!("Connection failed: {}", e))
            } else {
                HistoryError::Transport(e.to_string())
            }
        })
    }

    async fn get_page(
        &self,
        channel_id: &ChannelId,
        query: &[(&str, String)],
        anchor: Option<MessageId>,
    ) -> Result<HistoryPage, HistoryError> {
        let response = self.get(self.messages_url(channel_id), query).await?;

        if response.status() == StatusCode::NOT_FOUND {
            if let Some(anchor) = anchor {
                return Err(HistoryError::NotFound(anchor));
            }
        }

        ensure_success(response)
            .await?
            .json::<HistoryPage>()
            .await
            .map_err(|e| HistoryError::Decode(e.to_string()))
    }
}

async fn ensure_success(response: Response) -> Result<Response, HistoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), "history request failed");
    Err(HistoryError::Http {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl HistoryFetcher for RestHistoryClient {
    async fn fetch_page(
        &self,
        channel_id: &ChannelId,
        page: u32,
        limit: u32,
    ) -> Result<HistoryPage, HistoryError> {
        let query = [("page", page.max(1).to_string()), ("limit", limit.to_string())];
        self.get_page(channel_id, &query, None).await
    }

    async fn fetch_before(
        &self,
        channel_id: &ChannelId,
        before: &MessageId,
        limit: u32,
    ) -> Result<HistoryPage, HistoryError> {
        let query = [("beforeId", before.to_string()), ("limit", limit.to_string())];
        self.get_page(channel_id, &query, Some(*before)).await
    }

    async fn fetch_after(
        &self,
        channel_id: &ChannelId,
        after: &MessageId,
        limit: u32,
    ) -> Result<HistoryPage, HistoryError> {
        let query = [("afterId", after.to_string()), ("limit", limit.to_string())];
        self.get_page(channel_id, &query, Some(*after)).await
    }

    async fn fetch_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<Option<MessageView>, HistoryError> {
        let url = format!("{}/{}", self.messages_url(channel_id), message_id);
        let response = self.get(url, &[]).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let message = ensure_success(response)
            .await?
            .json::<MessageView>()
            .await
            .map_err(|e| HistoryError::Decode(e.to_string()))?;

        Ok(Some(message).filter(|m| !m.is_deleted()))
    }
}
