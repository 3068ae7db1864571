//! Per-conversation reactivation progress.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::action::CursorTarget;
use crate::error::ReactivationError;

/// `last_executed_step_index` before any step has fired.
pub const NO_STEP_EXECUTED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorStatus {
    Active,
    Resolved,
}

impl CursorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resolved => "resolved",
        }
    }
}

impl FromStr for CursorStatus {
    type Err = ReactivationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "resolved" => Ok(Self::Resolved),
            other => Err(ReactivationError::PersistenceFailure(format!(
                "unknown cursor status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for CursorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted progress marker for one conversation's current silence period.
///
/// Every mutation bumps `version`; claims are compare-and-swap on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactivationCursor {
    pub conversation_id: String,
    pub tenant_id: String,
    /// Start of the current silence period.
    pub anchor_at: DateTime<Utc>,
    pub last_executed_step_index: i64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub status: CursorStatus,
    pub version: i64,
    /// Set between claim and commit.
    pub claimed_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl ReactivationCursor {
    /// A cursor for a silence period that started at `anchor_at`.
    pub fn fresh(
        conversation_id: impl Into<String>,
        tenant_id: impl Into<String>,
        anchor_at: DateTime<Utc>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            tenant_id: tenant_id.into(),
            anchor_at,
            last_executed_step_index: NO_STEP_EXECUTED,
            last_executed_at: None,
            status: CursorStatus::Active,
            version: 0,
            claimed_at: None,
            consecutive_failures: 0,
        }
    }

    /// List position of the next step to consider.
    pub fn next_step_index(&self) -> usize {
        (self.last_executed_step_index + 1).max(0) as usize
    }

    pub fn is_resolved(&self) -> bool {
        self.status == CursorStatus::Resolved
    }

    pub fn has_outstanding_claim(&self) -> bool {
        self.claimed_at.is_some()
    }

    /// A claim older than `timeout` whose evaluator never committed or rolled back.
    pub fn claim_is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.claimed_at
            .map(|claimed_at| now - claimed_at >= timeout)
            .unwrap_or(false)
    }

    /// Whether inbound activity at `last_inbound_at` started a new silence period.
    ///
    /// Anchors are persisted with millisecond precision, so the comparison is
    /// in whole milliseconds. The same event delivered twice never resets.
    pub fn is_superseded_by(&self, last_inbound_at: DateTime<Utc>) -> bool {
        last_inbound_at.timestamp_millis() > self.anchor_at.timestamp_millis()
    }

    /// The state a successful claim for `target` writes.
    pub fn claimed(&self, target: CursorTarget, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        if let Some(index) = target.step_index {
            next.last_executed_step_index = index as i64;
        }
        if target.resolve {
            next.status = CursorStatus::Resolved;
        }
        next.last_executed_at = Some(now);
        next.claimed_at = Some(now);
        next.version = self.version + 1;
        next
    }
}
