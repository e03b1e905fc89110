//! Bot-deployment provider client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DispatchError;

/// Request asking the provider to send a recording bot into a meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotRequest {
    pub meeting_url: String,
    pub bot_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_image: Option<String>,
    pub recording_mode: String,
    pub webhook_url: String,
    pub metadata: BotMetadata,
}

/// Correlation ids echoed back on provider callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotMetadata {
    pub meeting_id: Uuid,
    pub account_id: Uuid,
}

#[async_trait]
pub trait BotDeployer: Send + Sync {
    /// Dispatch a bot, returning the provider's opaque bot id.
    async fn deploy(&self, request: &BotRequest) -> Result<String, DispatchError>;
}

/// HTTP client for the bot-deployment API
pub struct HttpBotDeployer {
    http: Client,
    api_url: String,
    api_key: String,
}

impl HttpBotDeployer {
    pub fn new(http: Client, api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BotResponse {
    id: Option<String>,
}

#[async_trait]
impl BotDeployer for HttpBotDeployer {
    async fn deploy(&self, request: &BotRequest) -> Result<String, DispatchError> {
        let response = self
            .http
            .post(format!("{}/bot", self.api_url))
            .header("Authorization", format!("Token {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(DispatchError::Network)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bot: BotResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::Decode(e.to_string()))?;

        bot.id
            .filter(|id| !id.is_empty())
            .ok_or(DispatchError::MissingBotId)
    }
}
