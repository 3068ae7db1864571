//! Outbound message channel trait.

use async_trait::async_trait;

use crate::error::Result;

/// Delivers follow-up messages to a contact.
///
/// Abstracted so the engine can drive WhatsApp gateways, webhooks, or tests
/// alike. An empty `text` asks the channel's agent to generate the content.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Send `text` into the conversation.
    ///
    /// Errors should be [`ReactivationError::SendFailed`](crate::ReactivationError::SendFailed).
    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<()>;

    /// Human-readable name for logs.
    fn name(&self) -> &str;
}
