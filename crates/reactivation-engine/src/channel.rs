//! Message channel implementations that need no external service.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use reactivation_core::{MessageChannel, ReactivationError};
use tokio::sync::Mutex;

/// A no-op channel that discards all messages.
#[derive(Debug, Clone, Default)]
pub struct NoOpChannel;

#[async_trait]
impl MessageChannel for NoOpChannel {
    async fn send_message(&self, _conversation_id: &str, _text: &str) -> Result<(), ReactivationError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// A logging channel for dry runs that logs every message instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct LoggingChannel;

#[async_trait]
impl MessageChannel for LoggingChannel {
    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), ReactivationError> {
        if text.is_empty() {
            tracing::info!(conversation_id, "[dry-run] Follow-up requested (agent-generated content)");
        } else {
            tracing::info!(conversation_id, "[dry-run] Sending follow-up: {}", text);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}

/// A message recorded by [`RecordingChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub conversation_id: String,
    pub text: String,
}

/// Records messages in memory and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<SentMessage>>,
    failures_remaining: AtomicU32,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` sends with [`ReactivationError::SendFailed`].
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Everything sent so far, in order.
    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, conversation_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .map(|m| m.text.clone())
            .collect()
    }
}

#[async_trait]
impl MessageChannel for RecordingChannel {
    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), ReactivationError> {
        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(ReactivationError::SendFailed(format!(
                "simulated failure for {}",
                conversation_id
            )));
        }

        self.sent.lock().await.push(SentMessage {
            conversation_id: conversation_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
