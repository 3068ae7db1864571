//! One conversation, one tick.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reactivation_core::{
    validate_steps, CandidateConversation, ConfigurationStore, CursorStore, Decision,
    FallbackResolver, ReactivationCursor, ReactivationError, Result, TenantConfiguration,
    WaitReason,
};
use tracing::{debug, error, warn};

use crate::executor::{ActionExecutor, Execution, ExecutionOutcome};

/// Why a candidate was left alone this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The tenant has no reactivation settings.
    NotConfigured,
    /// Reactivation is switched off for the tenant.
    Disabled,
    /// Another evaluator holds a recent claim.
    ClaimInFlight,
    /// A claim older than the claim timeout was committed instead of evaluated.
    StaleClaimCommitted,
    /// An inbound message reset the cursor while the action was running.
    Superseded,
}

#[derive(Debug)]
pub enum EvaluationOutcome {
    Executed(Execution),
    Waiting(WaitReason),
    Skipped(SkipReason),
    Conflict,
    /// The action failed before delivery and will be retried next tick.
    Failed {
        error: ReactivationError,
        consecutive_failures: u32,
    },
}

/// Reads configuration and the cursor, decides, and executes.
#[derive(Clone)]
pub struct ConversationEvaluator {
    configuration: Arc<dyn ConfigurationStore>,
    cursors: Arc<dyn CursorStore>,
    executor: ActionExecutor,
    claim_timeout: Duration,
    max_consecutive_failures: u32,
}

impl ConversationEvaluator {
    pub fn new(
        configuration: Arc<dyn ConfigurationStore>,
        cursors: Arc<dyn CursorStore>,
        executor: ActionExecutor,
        claim_timeout: Duration,
        max_consecutive_failures: u32,
    ) -> Self {
        Self {
            configuration,
            cursors,
            executor,
            claim_timeout,
            max_consecutive_failures,
        }
    }

    pub async fn evaluate(&self, candidate: &CandidateConversation, now: DateTime<Utc>) -> Result<EvaluationOutcome> {
        let conversation_id = candidate.conversation_id.as_str();
        let tenant_id = candidate.tenant_id.as_str();

        let TenantConfiguration { settings, steps } = self.configuration.tenant(tenant_id).await?;
        let Some(settings) = settings else {
            debug!(conversation_id, tenant_id, "No reactivation settings, skipping");
            return Ok(EvaluationOutcome::Skipped(SkipReason::NotConfigured));
        };
        if !settings.enabled {
            return Ok(EvaluationOutcome::Skipped(SkipReason::Disabled));
        }

        settings.validate()?;
        validate_steps(&steps)?;

        let cursor = self.current_cursor(candidate).await?;

        if cursor.has_outstanding_claim() {
            if !cursor.claim_is_stale(now, self.claim_timeout) {
                return Ok(EvaluationOutcome::Skipped(SkipReason::ClaimInFlight));
            }

            let committed = self
                .cursors
                .commit_claim(conversation_id, cursor.version)
                .await?;
            warn!(
                conversation_id,
                tenant_id,
                version = cursor.version,
                committed,
                "Committed stale claim from {:?}, assuming its side effects were delivered",
                cursor.claimed_at
            );
            return Ok(EvaluationOutcome::Skipped(SkipReason::StaleClaimCommitted));
        }

        let action = match FallbackResolver::new(&settings, &steps).decide(&cursor, now) {
            Decision::Wait(reason) => {
                debug!(conversation_id, ?reason, "Waiting");
                return Ok(EvaluationOutcome::Waiting(reason));
            }
            Decision::Execute(action) => action,
        };

        let outcome = match self.executor.execute(&cursor, &action, now).await? {
            ExecutionOutcome::Executed(execution) => EvaluationOutcome::Executed(execution),
            ExecutionOutcome::Conflict => EvaluationOutcome::Conflict,
            ExecutionOutcome::Superseded { .. } => EvaluationOutcome::Skipped(SkipReason::Superseded),
            ExecutionOutcome::RolledBack {
                error,
                consecutive_failures,
            } => {
                if consecutive_failures >= self.max_consecutive_failures {
                    error!(
                        alert = true,
                        conversation_id,
                        tenant_id,
                        consecutive_failures,
                        "Reactivation keeps failing: {}",
                        error
                    );
                }
                EvaluationOutcome::Failed {
                    error,
                    consecutive_failures,
                }
            }
        };

        Ok(outcome)
    }

    /// The cursor for the candidate's current silence period, created or
    /// reset as needed.
    async fn current_cursor(&self, candidate: &CandidateConversation) -> Result<ReactivationCursor> {
        let conversation_id = candidate.conversation_id.as_str();

        match self.cursors.cursor(conversation_id).await? {
            None => {
                self.cursors
                    .create_cursor(&ReactivationCursor::fresh(
                        conversation_id,
                        candidate.tenant_id.as_str(),
                        candidate.last_inbound_at,
                    ))
                    .await
            }
            Some(cursor) if cursor.is_superseded_by(candidate.last_inbound_at) => {
                debug!(conversation_id, "Inbound activity since last anchor, resetting cursor");
                self.cursors
                    .reset_cursor(conversation_id, &candidate.tenant_id, candidate.last_inbound_at)
                    .await
            }
            Some(cursor) => Ok(cursor),
        }
    }
}
