//! Entry point wiring stores, channel and scheduler together.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reactivation_core::{
    CandidateSource, ConfigurationStore, ConversationStore, CursorStore, MessageChannel, Result,
};
use tokio::sync::watch;
use tracing::debug;

use crate::cache::CachedConfigurationStore;
use crate::config::EngineConfig;
use crate::evaluator::ConversationEvaluator;
use crate::executor::ActionExecutor;
use crate::scheduler::{ReactivationScheduler, SweepReport};

fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(duration.as_secs()).unwrap_or(i64::MAX / 1_000))
}

/// The reactivation engine.
///
/// Feed it inbound activity and closures as they happen; the scheduler does
/// the rest on its own clock.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use reactivation_engine::{EngineConfig, InMemoryStore, LoggingChannel, ReactivationEngine};
///
/// # async fn demo() -> reactivation_core::Result<()> {
/// let store = Arc::new(InMemoryStore::default());
/// let engine = ReactivationEngine::new(store, Arc::new(LoggingChannel), &EngineConfig::default());
///
/// engine.on_inbound_message("conv-1", chrono::Utc::now()).await?;
/// let report = engine.sweep(chrono::Utc::now()).await;
/// println!("executed {}", report.executed);
/// # Ok(())
/// # }
/// ```
pub struct ReactivationEngine {
    conversations: Arc<dyn ConversationStore>,
    cursors: Arc<dyn CursorStore>,
    configuration: Arc<CachedConfigurationStore>,
    scheduler: Arc<ReactivationScheduler>,
}

impl ReactivationEngine {
    /// Build an engine over a store that provides every persistence role.
    pub fn new<S>(store: Arc<S>, channel: Arc<dyn MessageChannel>, config: &EngineConfig) -> Self
    where
        S: ConfigurationStore + CursorStore + ConversationStore + CandidateSource + 'static,
    {
        let configuration = Arc::new(CachedConfigurationStore::new(store.clone(), config.config_ttl));
        let executor = ActionExecutor::new(store.clone(), store.clone(), channel.clone());
        let evaluator = ConversationEvaluator::new(
            configuration.clone(),
            store.clone(),
            executor,
            chrono_duration(config.claim_timeout),
            config.max_consecutive_send_failures,
        );
        let scheduler = Arc::new(ReactivationScheduler::new(
            store.clone(),
            evaluator,
            config.shard,
            config.max_concurrency,
            config.sweep_interval,
        ));

        debug!(channel = channel.name(), shard = %config.shard, "Reactivation engine ready");

        Self {
            conversations: store.clone(),
            cursors: store,
            configuration,
            scheduler,
        }
    }

    /// Record a customer message and start a new silence period.
    ///
    /// Any reactivation in flight for the old period is cancelled: its claim
    /// can no longer commit.
    pub async fn on_inbound_message(&self, conversation_id: &str, at: DateTime<Utc>) -> Result<()> {
        // Stores keep millisecond precision.
        let at = DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at);
        self.conversations.record_inbound(conversation_id, at).await?;

        if let Some(cursor) = self.cursors.cursor(conversation_id).await? {
            if cursor.is_superseded_by(at) {
                self.cursors
                    .reset_cursor(conversation_id, &cursor.tenant_id, at)
                    .await?;
                debug!(conversation_id, "Reactivation cursor reset by inbound message");
            }
        }

        Ok(())
    }

    /// Stop reactivation for a conversation that was closed elsewhere.
    ///
    /// Returns `false` if the conversation never had a cursor.
    pub async fn on_conversation_closed(&self, conversation_id: &str) -> Result<bool> {
        let resolved = self.cursors.resolve_cursor(conversation_id).await?;
        debug!(conversation_id, resolved, "Conversation closed");
        Ok(resolved)
    }

    /// Forget cached configuration after a tenant edits it.
    pub async fn invalidate_configuration(&self, tenant_id: &str) {
        self.configuration.invalidate(tenant_id).await;
    }

    pub fn scheduler(&self) -> Arc<ReactivationScheduler> {
        self.scheduler.clone()
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        self.scheduler.sweep(now).await
    }

    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        self.scheduler.run(shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RecordingChannel;
    use crate::memory::InMemoryStore;
    use chrono::TimeZone;
    use reactivation_core::{CursorStatus, ReactivationSettings, ReactivationStep, StepAction};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, 15, 0, 0).unwrap()
    }

    async fn engine() -> (Arc<InMemoryStore>, Arc<RecordingChannel>, ReactivationEngine) {
        let store = Arc::new(InMemoryStore::default());
        store.put_settings(ReactivationSettings::new("t1")).await;
        store
            .put_steps(
                "t1",
                vec![
                    ReactivationStep::new("s0", 20, StepAction::SendMessage).with_parameter("Any news?"),
                    ReactivationStep::new("s1", 40, StepAction::SendMessage).with_parameter("Ping"),
                ],
            )
            .await;
        store.add_conversation("c1", "t1", start()).await;

        let channel = Arc::new(RecordingChannel::new());
        let engine = ReactivationEngine::new(store.clone(), channel.clone(), &EngineConfig::default());
        (store, channel, engine)
    }

    #[tokio::test]
    async fn test_reply_restarts_sequence() {
        let (store, channel, engine) = engine().await;

        engine.sweep(start() + chrono::Duration::minutes(20)).await;
        assert_eq!(channel.sent_to("c1").await, vec!["Any news?".to_string()]);

        let replied_at = start() + chrono::Duration::minutes(25);
        engine.on_inbound_message("c1", replied_at).await.unwrap();
        let cursor = store.cursor("c1").await.unwrap().unwrap();
        assert_eq!(cursor.anchor_at, replied_at);
        assert_eq!(cursor.last_executed_step_index, -1);

        let report = engine.sweep(replied_at + chrono::Duration::minutes(19)).await;
        assert_eq!(report.executed, 0);
        assert_eq!(report.waiting, 1);

        engine.sweep(replied_at + chrono::Duration::minutes(20)).await;
        assert_eq!(
            channel.sent_to("c1").await,
            vec!["Any news?".to_string(), "Any news?".to_string()]
        );
    }

    #[tokio::test]
    async fn test_redelivered_inbound_keeps_progress() {
        let (store, channel, engine) = engine().await;
        let at = start() + chrono::Duration::minutes(1) + chrono::Duration::microseconds(1500);

        engine.on_inbound_message("c1", at).await.unwrap();
        engine.sweep(at + chrono::Duration::minutes(20)).await;
        engine.on_inbound_message("c1", at).await.unwrap();

        let cursor = store.cursor("c1").await.unwrap().unwrap();
        assert_eq!(cursor.last_executed_step_index, 0);
        assert_eq!(cursor.anchor_at.timestamp_millis(), at.timestamp_millis());
        assert_eq!(channel.sent_to("c1").await, vec!["Any news?".to_string()]);
    }

    #[tokio::test]
    async fn test_closed_conversation_is_resolved() {
        let (store, channel, engine) = engine().await;

        assert!(!engine.on_conversation_closed("c1").await.unwrap());

        engine.sweep(start() + chrono::Duration::minutes(5)).await;
        assert!(engine.on_conversation_closed("c1").await.unwrap());
        assert_eq!(store.cursor("c1").await.unwrap().unwrap().status, CursorStatus::Resolved);

        let report = engine.sweep(start() + chrono::Duration::hours(2)).await;
        assert_eq!(report.candidates, 0);
        assert!(channel.sent().await.is_empty());
    }
}
