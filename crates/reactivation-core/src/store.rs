//! Persistence collaborators the engine reads from and writes to.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::CursorTarget;
use crate::cursor::ReactivationCursor;
use crate::error::{ReactivationError, Result};
use crate::settings::ReactivationSettings;
use crate::step::ReactivationStep;

/// Lifecycle status of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Open,
    Paused,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Paused => "paused",
            Self::Closed => "closed",
        }
    }
}

impl FromStr for ConversationStatus {
    type Err = ReactivationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "paused" => Ok(Self::Paused),
            "closed" => Ok(Self::Closed),
            other => Err(ReactivationError::PersistenceFailure(format!(
                "unknown conversation status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A silent, open conversation with automated handling enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateConversation {
    pub conversation_id: String,
    pub tenant_id: String,
    /// Last inbound customer message.
    pub last_inbound_at: DateTime<Utc>,
}

/// Result of a compare-and-swap claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The cursor now carries `version` and an outstanding claim.
    Claimed { version: i64 },
    /// The expected version was stale, a claim was outstanding, or the cursor
    /// was already resolved.
    Conflict,
}

/// A tenant's settings and steps as read together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantConfiguration {
    pub settings: Option<ReactivationSettings>,
    pub steps: Vec<ReactivationStep>,
}

/// Read-only source of tenant configuration.
#[async_trait]
pub trait ConfigurationStore: Send + Sync {
    /// Settings for a tenant. `None` means the tenant never configured reactivation.
    async fn settings(&self, tenant_id: &str) -> Result<Option<ReactivationSettings>>;

    /// Steps in execution order.
    async fn steps(&self, tenant_id: &str) -> Result<Vec<ReactivationStep>>;

    /// Settings and steps for one evaluation.
    ///
    /// Steps are only read for configured tenants. Caching implementations
    /// override this to serve both from the same snapshot.
    async fn tenant(&self, tenant_id: &str) -> Result<TenantConfiguration> {
        let settings = self.settings(tenant_id).await?;
        let steps = match &settings {
            Some(_) => self.steps(tenant_id).await?,
            None => Vec::new(),
        };
        Ok(TenantConfiguration { settings, steps })
    }
}

/// Versioned cursor persistence.
///
/// Every write bumps `version`. Claims, commits and rollbacks are
/// compare-and-swap on the version so racing evaluators produce at most one
/// side effect.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn cursor(&self, conversation_id: &str) -> Result<Option<ReactivationCursor>>;

    /// Insert `cursor` unless one exists. Returns whichever cursor is stored.
    async fn create_cursor(&self, cursor: &ReactivationCursor) -> Result<ReactivationCursor>;

    /// Reserve the cursor and write `target` in one step.
    ///
    /// Succeeds only if the stored version equals `expected_version`, no claim
    /// is outstanding and the cursor is active.
    async fn claim_and_advance(
        &self,
        conversation_id: &str,
        expected_version: i64,
        target: CursorTarget,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome>;

    /// Clear the outstanding claim and reset the failure counter.
    ///
    /// Returns `false` if the cursor moved on (e.g. was reset) since the claim.
    async fn commit_claim(&self, conversation_id: &str, claimed_version: i64) -> Result<bool>;

    /// Restore `previous` progress after a failed side effect and count the failure.
    ///
    /// Returns the new consecutive failure count, or `None` if the cursor
    /// moved on since the claim.
    async fn release_claim(
        &self,
        conversation_id: &str,
        claimed_version: i64,
        previous: &ReactivationCursor,
    ) -> Result<Option<u32>>;

    /// Start a new silence period at `anchor_at`, creating the cursor if needed.
    async fn reset_cursor(
        &self,
        conversation_id: &str,
        tenant_id: &str,
        anchor_at: DateTime<Utc>,
    ) -> Result<ReactivationCursor>;

    /// Mark the cursor resolved regardless of version.
    ///
    /// Returns `false` if there is no cursor.
    async fn resolve_cursor(&self, conversation_id: &str) -> Result<bool>;
}

/// Conversation-side effects other than messaging.
///
/// Implementations must be idempotent: tag assignment is a union and status
/// changes are absolute.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Record inbound customer activity. Never moves the timestamp backwards.
    async fn record_inbound(&self, conversation_id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn assign_tags(&self, conversation_id: &str, tag_ids: &[String]) -> Result<()>;

    async fn set_status(&self, conversation_id: &str, status: ConversationStatus) -> Result<()>;

    /// Disable automated handling and put the conversation on the human queue.
    async fn transfer_to_human(&self, conversation_id: &str, reason: &str) -> Result<()>;
}

/// Enumerates conversations to evaluate.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn candidates(&self, now: DateTime<Utc>) -> Result<Vec<CandidateConversation>>;
}
