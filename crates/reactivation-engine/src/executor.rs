//! Claim-then-commit execution of a planned action.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reactivation_core::{
    ActionOrigin, ClaimOutcome, ConversationEffect, ConversationStatus, ConversationStore,
    CursorStore, MessageChannel, PlannedAction, ReactivationCursor, ReactivationError, Result,
};
use tracing::{debug, info, warn};

/// A claimed action whose side effects ran.
#[derive(Debug)]
pub struct Execution {
    pub origin: ActionOrigin,
    /// Version written by the claim.
    pub version: i64,
    /// `false` when the cursor was reset between claim and commit.
    pub committed: bool,
    /// Tag or status failure after the message was already delivered.
    pub side_effect_error: Option<ReactivationError>,
}

#[derive(Debug)]
pub enum ExecutionOutcome {
    Executed(Execution),
    /// Another evaluator claimed first, or the cursor moved on.
    Conflict,
    /// A side effect failed before anything was delivered and the claim was undone.
    RolledBack {
        error: ReactivationError,
        consecutive_failures: u32,
    },
    /// A side effect failed and the cursor had already been reset, so there
    /// was nothing to roll back.
    Superseded { error: ReactivationError },
}

/// Result of running an action's side effects.
struct Applied {
    delivered: bool,
    error: Option<ReactivationError>,
}

/// Applies a [`PlannedAction`] at most once per cursor version.
///
/// The cursor is advanced by a compare-and-swap claim before anything leaves
/// the process. Side effects then run in order: message, tags, status change.
/// A failure before delivery restores the previous cursor; after delivery the
/// claim is always committed so a retry can never send twice.
#[derive(Clone)]
pub struct ActionExecutor {
    cursors: Arc<dyn CursorStore>,
    conversations: Arc<dyn ConversationStore>,
    channel: Arc<dyn MessageChannel>,
}

impl ActionExecutor {
    pub fn new(
        cursors: Arc<dyn CursorStore>,
        conversations: Arc<dyn ConversationStore>,
        channel: Arc<dyn MessageChannel>,
    ) -> Self {
        Self {
            cursors,
            conversations,
            channel,
        }
    }

    /// Execute `action` for the conversation `cursor` belongs to.
    ///
    /// `cursor` must be the state the decision was made from; its version is
    /// the claim's expected version.
    pub async fn execute(
        &self,
        cursor: &ReactivationCursor,
        action: &PlannedAction,
        now: DateTime<Utc>,
    ) -> Result<ExecutionOutcome> {
        let conversation_id = cursor.conversation_id.as_str();

        let version = match self
            .cursors
            .claim_and_advance(conversation_id, cursor.version, action.cursor_target(), now)
            .await?
        {
            ClaimOutcome::Claimed { version } => version,
            ClaimOutcome::Conflict => {
                debug!(
                    conversation_id,
                    expected_version = cursor.version,
                    "Claim conflict, another evaluator got here first"
                );
                return Ok(ExecutionOutcome::Conflict);
            }
        };

        debug!(conversation_id, version, "Claimed: {}", action.description());

        let applied = self.apply(conversation_id, action).await;

        match applied.error {
            Some(error) if !applied.delivered => {
                self.roll_back(cursor, version, error).await
            }
            side_effect_error => {
                let committed = self.cursors.commit_claim(conversation_id, version).await?;
                if committed {
                    info!(
                        conversation_id,
                        tenant_id = %cursor.tenant_id,
                        version,
                        "Executed {}",
                        action.description()
                    );
                } else {
                    info!(
                        conversation_id,
                        version,
                        "Executed {} but the cursor was reset before commit",
                        action.description()
                    );
                }

                Ok(ExecutionOutcome::Executed(Execution {
                    origin: action.origin,
                    version,
                    committed,
                    side_effect_error,
                }))
            }
        }
    }

    async fn roll_back(
        &self,
        previous: &ReactivationCursor,
        claimed_version: i64,
        error: ReactivationError,
    ) -> Result<ExecutionOutcome> {
        let conversation_id = previous.conversation_id.as_str();

        match self
            .cursors
            .release_claim(conversation_id, claimed_version, previous)
            .await?
        {
            Some(consecutive_failures) => {
                warn!(
                    conversation_id,
                    consecutive_failures,
                    "Rolled back claim: {}",
                    error
                );
                Ok(ExecutionOutcome::RolledBack {
                    error,
                    consecutive_failures,
                })
            }
            None => {
                debug!(conversation_id, "Claim already superseded: {}", error);
                Ok(ExecutionOutcome::Superseded { error })
            }
        }
    }

    async fn apply(&self, conversation_id: &str, action: &PlannedAction) -> Applied {
        if let Some(text) = &action.message {
            if let Err(e) = self.channel.send_message(conversation_id, text).await {
                return Applied {
                    delivered: false,
                    error: Some(e),
                };
            }
        }

        let delivered = action.message.is_some();
        let mut first_error = None;

        if !action.tag_ids.is_empty() {
            if let Err(e) = self
                .conversations
                .assign_tags(conversation_id, &action.tag_ids)
                .await
            {
                let error = ReactivationError::SideEffectFailed(format!("assign tags: {}", e));
                if !delivered {
                    return Applied {
                        delivered,
                        error: Some(error),
                    };
                }
                warn!(conversation_id, "Message delivered but tagging failed: {}", error);
                first_error = Some(error);
            }
        }

        let status_change = match action.effect {
            ConversationEffect::None => Ok(()),
            ConversationEffect::Close => {
                self.conversations
                    .set_status(conversation_id, ConversationStatus::Closed)
                    .await
            }
            ConversationEffect::TransferToHuman => {
                let reason = format!("reactivation {}", action.origin);
                self.conversations
                    .transfer_to_human(conversation_id, &reason)
                    .await
            }
        };

        if let Err(e) = status_change {
            let error = ReactivationError::SideEffectFailed(format!("status change: {}", e));
            if !delivered {
                return Applied {
                    delivered,
                    error: Some(error),
                };
            }
            warn!(
                conversation_id,
                "Message delivered but status change failed: {}", error
            );
            first_error.get_or_insert(error);
        }

        Applied {
            delivered,
            error: first_error,
        }
    }
}
