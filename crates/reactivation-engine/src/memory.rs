//! In-memory store for tests and dry runs.
//!
//! Implements every store trait with the same compare-and-swap rules as the
//! SQLite store, behind a single async mutex.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reactivation_core::{
    CandidateConversation, CandidateSource, ClaimOutcome, ConfigurationStore, ConversationStatus,
    ConversationStore, CursorStatus, CursorStore, CursorTarget, ReactivationCursor,
    ReactivationError, ReactivationSettings, ReactivationStep, Result,
};
use tokio::sync::Mutex;

/// Snapshot of a conversation held by [`InMemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConversation {
    pub tenant_id: String,
    pub status: ConversationStatus,
    pub automation_enabled: bool,
    pub last_inbound_at: Option<DateTime<Utc>>,
    pub tags: BTreeSet<String>,
    /// Reasons recorded for each transfer to a human.
    pub transfers: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    settings: HashMap<String, ReactivationSettings>,
    steps: HashMap<String, Vec<ReactivationStep>>,
    cursors: HashMap<String, ReactivationCursor>,
    conversations: HashMap<String, MemoryConversation>,
}

/// Store backed by process memory.
#[derive(Debug)]
pub struct InMemoryStore {
    state: Mutex<State>,
    min_idle: Duration,
    configuration_offline: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Duration::zero())
    }
}

impl InMemoryStore {
    /// Create an empty store. Conversations become candidates after `min_idle` of silence.
    pub fn new(min_idle: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            min_idle,
            configuration_offline: AtomicBool::new(false),
        }
    }

    pub async fn put_settings(&self, settings: ReactivationSettings) {
        self.state
            .lock()
            .await
            .settings
            .insert(settings.tenant_id.clone(), settings);
    }

    pub async fn put_steps(&self, tenant_id: &str, steps: Vec<ReactivationStep>) {
        self.state.lock().await.steps.insert(tenant_id.to_string(), steps);
    }

    /// Add an open, automated conversation.
    pub async fn add_conversation(&self, conversation_id: &str, tenant_id: &str, last_inbound_at: DateTime<Utc>) {
        self.state.lock().await.conversations.insert(
            conversation_id.to_string(),
            MemoryConversation {
                tenant_id: tenant_id.to_string(),
                status: ConversationStatus::Open,
                automation_enabled: true,
                last_inbound_at: Some(last_inbound_at),
                tags: BTreeSet::new(),
                transfers: Vec::new(),
            },
        );
    }

    pub async fn conversation(&self, conversation_id: &str) -> Option<MemoryConversation> {
        self.state.lock().await.conversations.get(conversation_id).cloned()
    }

    /// Overwrite a stored cursor, e.g. to simulate a crash mid-claim.
    pub async fn put_cursor(&self, cursor: ReactivationCursor) {
        self.state
            .lock()
            .await
            .cursors
            .insert(cursor.conversation_id.clone(), cursor);
    }

    /// Make configuration reads fail until switched back.
    pub fn set_configuration_offline(&self, offline: bool) {
        self.configuration_offline.store(offline, Ordering::SeqCst);
    }

    fn check_configuration_online(&self, tenant_id: &str) -> Result<()> {
        if self.configuration_offline.load(Ordering::SeqCst) {
            return Err(ReactivationError::ConfigurationUnavailable {
                tenant_id: tenant_id.to_string(),
                reason: "configuration store offline".to_string(),
            });
        }
        Ok(())
    }
}

fn missing_conversation(conversation_id: &str) -> ReactivationError {
    ReactivationError::PersistenceFailure(format!("conversation not found: {}", conversation_id))
}

#[async_trait]
impl ConfigurationStore for InMemoryStore {
    async fn settings(&self, tenant_id: &str) -> Result<Option<ReactivationSettings>> {
        self.check_configuration_online(tenant_id)?;
        Ok(self.state.lock().await.settings.get(tenant_id).cloned())
    }

    async fn steps(&self, tenant_id: &str) -> Result<Vec<ReactivationStep>> {
        self.check_configuration_online(tenant_id)?;
        Ok(self
            .state
            .lock()
            .await
            .steps
            .get(tenant_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl CursorStore for InMemoryStore {
    async fn cursor(&self, conversation_id: &str) -> Result<Option<ReactivationCursor>> {
        Ok(self.state.lock().await.cursors.get(conversation_id).cloned())
    }

    async fn create_cursor(&self, cursor: &ReactivationCursor) -> Result<ReactivationCursor> {
        let mut state = self.state.lock().await;
        let stored = state
            .cursors
            .entry(cursor.conversation_id.clone())
            .or_insert_with(|| cursor.clone());
        Ok(stored.clone())
    }

    async fn claim_and_advance(
        &self,
        conversation_id: &str,
        expected_version: i64,
        target: CursorTarget,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        let mut state = self.state.lock().await;
        let Some(cursor) = state.cursors.get_mut(conversation_id) else {
            return Ok(ClaimOutcome::Conflict);
        };

        if cursor.version != expected_version || cursor.has_outstanding_claim() || cursor.is_resolved() {
            return Ok(ClaimOutcome::Conflict);
        }

        *cursor = cursor.claimed(target, now);
        Ok(ClaimOutcome::Claimed {
            version: cursor.version,
        })
    }

    async fn commit_claim(&self, conversation_id: &str, claimed_version: i64) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.cursors.get_mut(conversation_id) {
            Some(cursor) if cursor.version == claimed_version && cursor.has_outstanding_claim() => {
                cursor.claimed_at = None;
                cursor.consecutive_failures = 0;
                cursor.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_claim(
        &self,
        conversation_id: &str,
        claimed_version: i64,
        previous: &ReactivationCursor,
    ) -> Result<Option<u32>> {
        let mut state = self.state.lock().await;
        match state.cursors.get_mut(conversation_id) {
            Some(cursor) if cursor.version == claimed_version && cursor.has_outstanding_claim() => {
                cursor.last_executed_step_index = previous.last_executed_step_index;
                cursor.last_executed_at = previous.last_executed_at;
                cursor.status = previous.status;
                cursor.claimed_at = None;
                cursor.consecutive_failures += 1;
                cursor.version += 1;
                Ok(Some(cursor.consecutive_failures))
            }
            _ => Ok(None),
        }
    }

    async fn reset_cursor(
        &self,
        conversation_id: &str,
        tenant_id: &str,
        anchor_at: DateTime<Utc>,
    ) -> Result<ReactivationCursor> {
        let mut state = self.state.lock().await;
        let next_version = state
            .cursors
            .get(conversation_id)
            .map(|c| c.version + 1)
            .unwrap_or(0);

        let mut cursor = ReactivationCursor::fresh(conversation_id, tenant_id, anchor_at);
        cursor.version = next_version;
        state.cursors.insert(conversation_id.to_string(), cursor.clone());
        Ok(cursor)
    }

    async fn resolve_cursor(&self, conversation_id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.cursors.get_mut(conversation_id) {
            Some(cursor) => {
                cursor.status = CursorStatus::Resolved;
                cursor.claimed_at = None;
                cursor.version += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn record_inbound(&self, conversation_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        let conv = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| missing_conversation(conversation_id))?;
        conv.last_inbound_at = Some(conv.last_inbound_at.map_or(at, |prev| prev.max(at)));
        Ok(())
    }

    async fn assign_tags(&self, conversation_id: &str, tag_ids: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        let conv = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| missing_conversation(conversation_id))?;
        conv.tags.extend(tag_ids.iter().cloned());
        Ok(())
    }

    async fn set_status(&self, conversation_id: &str, status: ConversationStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        let conv = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| missing_conversation(conversation_id))?;
        conv.status = status;
        Ok(())
    }

    async fn transfer_to_human(&self, conversation_id: &str, reason: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let conv = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| missing_conversation(conversation_id))?;
        if conv.automation_enabled {
            conv.automation_enabled = false;
            conv.transfers.push(reason.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl CandidateSource for InMemoryStore {
    async fn candidates(&self, now: DateTime<Utc>) -> Result<Vec<CandidateConversation>> {
        let idle_before = now - self.min_idle;
        let state = self.state.lock().await;

        let mut candidates: Vec<CandidateConversation> = state
            .conversations
            .iter()
            .filter(|(_, conv)| conv.status != ConversationStatus::Closed && conv.automation_enabled)
            .filter_map(|(id, conv)| {
                let last_inbound_at = conv.last_inbound_at.filter(|at| *at <= idle_before)?;
                let resolved_for_period = state
                    .cursors
                    .get(id)
                    .map(|c| c.is_resolved() && c.anchor_at >= last_inbound_at)
                    .unwrap_or(false);
                (!resolved_for_period).then(|| CandidateConversation {
                    conversation_id: id.clone(),
                    tenant_id: conv.tenant_id.clone(),
                    last_inbound_at,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.last_inbound_at
                .cmp(&b.last_inbound_at)
                .then_with(|| a.conversation_id.cmp(&b.conversation_id))
        });
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-06-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_claim_conflicts_on_stale_version() {
        let store = InMemoryStore::default();
        store
            .create_cursor(&ReactivationCursor::fresh("c1", "t1", t0()))
            .await
            .unwrap();

        let target = CursorTarget {
            step_index: Some(0),
            resolve: false,
        };
        let first = store.claim_and_advance("c1", 0, target, t0()).await.unwrap();
        assert_eq!(first, ClaimOutcome::Claimed { version: 1 });

        let second = store.claim_and_advance("c1", 0, target, t0()).await.unwrap();
        assert_eq!(second, ClaimOutcome::Conflict);
    }

    #[tokio::test]
    async fn test_candidates_skip_resolved_period() {
        let store = InMemoryStore::new(Duration::minutes(5));
        store.add_conversation("c1", "t1", t0()).await;
        store.add_conversation("c2", "t1", t0() + Duration::minutes(9)).await;

        let now = t0() + Duration::minutes(10);
        let ids: Vec<String> = store
            .candidates(now)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.conversation_id)
            .collect();
        assert_eq!(ids, vec!["c1".to_string()]);

        store.reset_cursor("c1", "t1", t0()).await.unwrap();
        store.resolve_cursor("c1").await.unwrap();
        assert!(store.candidates(now).await.unwrap().is_empty());

        store
            .record_inbound("c1", t0() + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(store.candidates(now).await.unwrap().len(), 1);
    }
}
