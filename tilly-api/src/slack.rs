//! Direct messages through the Slack Web API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tilly_core::notifications::{ChatMessenger, DeliveryError, DirectMessage};
use tilly_shared::Masked;

#[derive(Debug, Error)]
enum SlackError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Slack API error: {0}")]
    Api(String),
    #[error("No Slack conversation linked for user {0}")]
    NoChannel(i64),
}

impl From<SlackError> for DeliveryError {
    fn from(err: SlackError) -> Self {
        match err {
            SlackError::Http(e) => DeliveryError::Unavailable(e.to_string()),
            other => DeliveryError::Rejected(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackMessenger {
    client: Client,
    api_url: String,
    token: Masked<String>,
}

impl SlackMessenger {
    pub fn new(api_url: impl Into<String>, token: Masked<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .connect_timeout(Duration::from_secs(2))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn post_message(&self, message: &DirectMessage) -> Result<(), SlackError> {
        let channel = message
            .channel_id
            .as_deref()
            .ok_or(SlackError::NoChannel(message.user_id))?;

        let response: SlackResponse = self
            .client
            .post(format!("{}/chat.postMessage", self.api_url))
            .header("Authorization", format!("Bearer {}", self.token.expose()))
            .json(&json!({
                "channel": channel,
                "text": render_text(message),
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.ok {
            return Err(SlackError::Api(response.error.unwrap_or_else(|| "unknown_error".to_string())));
        }
        Ok(())
    }
}

fn render_text(message: &DirectMessage) -> String {
    match &message.url {
        Some(url) => format!("*{}*\n{}\n<{}|Open in tillywork>", message.title, message.message, url),
        None => format!("*{}*\n{}", message.title, message.message),
    }
}

#[async_trait]
impl ChatMessenger for SlackMessenger {
    async fn send_dm(&self, message: &DirectMessage) -> Result<(), DeliveryError> {
        self.post_message(message).await?;
        tracing::debug!("Slack DM sent to user {}", message.user_id);
        Ok(())
    }
}

/// Used when no bot token is configured.
pub struct DisabledMessenger;

#[async_trait]
impl ChatMessenger for DisabledMessenger {
    async fn send_dm(&self, _message: &DirectMessage) -> Result<(), DeliveryError> {
        Err(DeliveryError::Unavailable("chat integration is not configured".to_string()))
    }
}
