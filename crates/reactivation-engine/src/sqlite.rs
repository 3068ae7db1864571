//! Store traits backed by the `database` crate.

use chrono::{DateTime, Duration, Utc};
use database::cursor::PriorProgress;
use database::{
    conversation, cursor, human_queue, settings, step, CursorRecord, Database, DatabaseError,
    SettingsRecord, StepRecord,
};
use reactivation_core::{
    async_trait, CandidateConversation, CandidateSource, ClaimOutcome, ConfigurationStore,
    ConversationStatus, ConversationStore, CursorStore, CursorTarget, ReactivationCursor,
    ReactivationError, ReactivationSettings, ReactivationStep, Result, TimeWindow,
};
use tracing::warn;

/// SQLite-backed implementation of every store the engine uses.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
    min_idle: Duration,
}

impl SqliteStore {
    /// Conversations become candidates after `min_idle` of silence.
    pub fn new(db: Database, min_idle: Duration) -> Self {
        Self { db, min_idle }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

fn persistence(e: DatabaseError) -> ReactivationError {
    ReactivationError::PersistenceFailure(e.to_string())
}

fn unavailable(tenant_id: &str, e: DatabaseError) -> ReactivationError {
    ReactivationError::ConfigurationUnavailable {
        tenant_id: tenant_id.to_string(),
        reason: e.to_string(),
    }
}

fn invalid(message: String) -> ReactivationError {
    ReactivationError::InvalidConfiguration(message)
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| ReactivationError::PersistenceFailure(format!("timestamp out of range: {}", ms)))
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn settings_from_record(record: SettingsRecord) -> Result<ReactivationSettings> {
    let max_window_minutes = record
        .max_window_minutes
        .map(|minutes| {
            u32::try_from(minutes).map_err(|_| invalid(format!("max window out of range: {}", minutes)))
        })
        .transpose()?;
    let utc_offset_minutes = i32::try_from(record.utc_offset_minutes)
        .map_err(|_| invalid(format!("utc offset out of range: {}", record.utc_offset_minutes)))?;

    Ok(ReactivationSettings {
        exhausted_action: record.exhausted_action.parse()?,
        max_window_action: record.max_window_action.parse()?,
        tenant_id: record.tenant_id,
        enabled: record.enabled,
        exhausted_message: record.exhausted_message,
        max_window_minutes,
        max_window_message: record.max_window_message,
        utc_offset_minutes,
    })
}

fn step_from_record(record: StepRecord) -> Result<ReactivationStep> {
    let wait_minutes = u32::try_from(record.wait_minutes)
        .map_err(|_| invalid(format!("step {} wait out of range", record.id)))?;

    let time_window = match (record.window_start, record.window_end) {
        (None, None) => None,
        (Some(start), Some(end)) => {
            let start = u16::try_from(start).map_err(|_| invalid(format!("step {} window start", record.id)))?;
            let end = u16::try_from(end).map_err(|_| invalid(format!("step {} window end", record.id)))?;
            Some(TimeWindow::new(start, end)?)
        }
        _ => return Err(invalid(format!("step {} has a window with only one bound", record.id))),
    };

    let tag_ids = record
        .tag_list()
        .map_err(|e| invalid(format!("step {} tags: {}", record.id, e)))?;

    Ok(ReactivationStep {
        action_type: record.action_type.parse()?,
        id: record.id,
        order: record.position,
        wait_minutes,
        action_parameter: record.action_parameter,
        time_window,
        tag_ids,
    })
}

fn cursor_from_record(record: CursorRecord) -> Result<ReactivationCursor> {
    Ok(ReactivationCursor {
        anchor_at: from_millis(record.anchor_at_ms)?,
        last_executed_at: record.last_executed_at_ms.map(from_millis).transpose()?,
        claimed_at: record.claimed_at_ms.map(from_millis).transpose()?,
        status: record.status.parse()?,
        consecutive_failures: u32::try_from(record.consecutive_failures).unwrap_or(u32::MAX),
        conversation_id: record.conversation_id,
        tenant_id: record.tenant_id,
        last_executed_step_index: record.last_executed_step_index,
        version: record.version,
    })
}

#[async_trait]
impl ConfigurationStore for SqliteStore {
    async fn settings(&self, tenant_id: &str) -> Result<Option<ReactivationSettings>> {
        settings::get_settings(self.db.pool(), tenant_id)
            .await
            .map_err(|e| unavailable(tenant_id, e))?
            .map(settings_from_record)
            .transpose()
    }

    async fn steps(&self, tenant_id: &str) -> Result<Vec<ReactivationStep>> {
        step::list_steps(self.db.pool(), tenant_id)
            .await
            .map_err(|e| unavailable(tenant_id, e))?
            .into_iter()
            .map(step_from_record)
            .collect()
    }
}

#[async_trait]
impl CursorStore for SqliteStore {
    async fn cursor(&self, conversation_id: &str) -> Result<Option<ReactivationCursor>> {
        cursor::get_cursor(self.db.pool(), conversation_id)
            .await
            .map_err(persistence)?
            .map(cursor_from_record)
            .transpose()
    }

    async fn create_cursor(&self, fresh: &ReactivationCursor) -> Result<ReactivationCursor> {
        cursor::insert_cursor_if_absent(
            self.db.pool(),
            &fresh.conversation_id,
            &fresh.tenant_id,
            fresh.anchor_at.timestamp_millis(),
            now_ms(),
        )
        .await
        .map_err(persistence)?;

        self.cursor(&fresh.conversation_id).await?.ok_or_else(|| {
            ReactivationError::PersistenceFailure(format!(
                "cursor for {} vanished after insert",
                fresh.conversation_id
            ))
        })
    }

    async fn claim_and_advance(
        &self,
        conversation_id: &str,
        expected_version: i64,
        target: CursorTarget,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        let claimed = cursor::claim_and_advance(
            self.db.pool(),
            conversation_id,
            expected_version,
            target.step_index.map(|index| index as i64),
            target.resolve,
            now.timestamp_millis(),
        )
        .await
        .map_err(persistence)?;

        Ok(match claimed {
            Some(version) => ClaimOutcome::Claimed { version },
            None => ClaimOutcome::Conflict,
        })
    }

    async fn commit_claim(&self, conversation_id: &str, claimed_version: i64) -> Result<bool> {
        cursor::commit_claim(self.db.pool(), conversation_id, claimed_version, now_ms())
            .await
            .map_err(persistence)
    }

    async fn release_claim(
        &self,
        conversation_id: &str,
        claimed_version: i64,
        previous: &ReactivationCursor,
    ) -> Result<Option<u32>> {
        let prior = PriorProgress {
            last_executed_step_index: previous.last_executed_step_index,
            last_executed_at_ms: previous.last_executed_at.map(|at| at.timestamp_millis()),
            status: previous.status.as_str(),
        };

        let failures = cursor::release_claim(self.db.pool(), conversation_id, claimed_version, &prior, now_ms())
            .await
            .map_err(persistence)?;

        Ok(failures.map(|n| u32::try_from(n).unwrap_or(u32::MAX)))
    }

    async fn reset_cursor(
        &self,
        conversation_id: &str,
        tenant_id: &str,
        anchor_at: DateTime<Utc>,
    ) -> Result<ReactivationCursor> {
        let record = cursor::reset_cursor(
            self.db.pool(),
            conversation_id,
            tenant_id,
            anchor_at.timestamp_millis(),
            now_ms(),
        )
        .await
        .map_err(persistence)?;

        cursor_from_record(record)
    }

    async fn resolve_cursor(&self, conversation_id: &str) -> Result<bool> {
        cursor::resolve_cursor(self.db.pool(), conversation_id, now_ms())
            .await
            .map_err(persistence)
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn record_inbound(&self, conversation_id: &str, at: DateTime<Utc>) -> Result<()> {
        conversation::record_inbound(self.db.pool(), conversation_id, at.timestamp_millis(), now_ms())
            .await
            .map_err(persistence)
    }

    async fn assign_tags(&self, conversation_id: &str, tag_ids: &[String]) -> Result<()> {
        conversation::assign_tags(self.db.pool(), conversation_id, tag_ids)
            .await
            .map_err(persistence)
    }

    async fn set_status(&self, conversation_id: &str, status: ConversationStatus) -> Result<()> {
        conversation::set_status(self.db.pool(), conversation_id, status.as_str(), now_ms())
            .await
            .map_err(persistence)
    }

    async fn transfer_to_human(&self, conversation_id: &str, reason: &str) -> Result<()> {
        human_queue::transfer_to_human(self.db.pool(), conversation_id, reason, now_ms())
            .await
            .map_err(persistence)
    }
}

#[async_trait]
impl CandidateSource for SqliteStore {
    async fn candidates(&self, now: DateTime<Utc>) -> Result<Vec<CandidateConversation>> {
        let idle_before_ms = (now - self.min_idle).timestamp_millis();

        let rows = conversation::list_candidates(self.db.pool(), idle_before_ms)
            .await
            .map_err(persistence)?;

        // A corrupt row only drops that conversation from this sweep.
        Ok(rows
            .into_iter()
            .filter_map(|candidate| match from_millis(candidate.last_inbound_at_ms) {
                Ok(last_inbound_at) => Some(CandidateConversation {
                    conversation_id: candidate.conversation_id,
                    tenant_id: candidate.tenant_id,
                    last_inbound_at,
                }),
                Err(e) => {
                    warn!(
                        conversation_id = %candidate.conversation_id,
                        tenant_id = %candidate.tenant_id,
                        "Skipping reactivation candidate: {}",
                        e
                    );
                    None
                }
            })
            .collect())
    }
}
