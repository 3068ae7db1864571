//! HTTP webhook message channel.

use std::time::Duration;

use async_trait::async_trait;
use reactivation_core::{MessageChannel, ReactivationError, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundMessage<'a> {
    conversation_id: &'a str,
    text: &'a str,
}

/// Posts each follow-up as JSON to a messaging gateway.
///
/// The gateway owns delivery to the contact. An empty `text` asks it to have
/// the conversation's agent write the message.
#[derive(Clone)]
pub struct WebhookChannel {
    http: Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ReactivationError::SendFailed(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl MessageChannel for WebhookChannel {
    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<()> {
        debug!(conversation_id, url = %self.url, "Posting follow-up");

        let response = self
            .http
            .post(&self.url)
            .json(&OutboundMessage {
                conversation_id,
                text,
            })
            .send()
            .await
            .map_err(|e| ReactivationError::SendFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReactivationError::SendFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let payload = serde_json::to_value(OutboundMessage {
            conversation_id: "conv-1",
            text: "",
        })
        .unwrap();
        assert_eq!(payload, serde_json::json!({"conversationId": "conv-1", "text": ""}));
    }
}
