//! Database models.
//!
//! Timestamps are Unix milliseconds.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::Result;

/// A customer conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: String,
    pub tenant_id: String,
    /// "open", "paused" or "closed"
    pub status: String,
    /// Whether the automated agent still handles this conversation.
    pub automation_enabled: bool,
    /// Last inbound customer message, if any.
    pub last_inbound_at_ms: Option<i64>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// A conversation eligible for a reactivation sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Candidate {
    pub conversation_id: String,
    pub tenant_id: String,
    pub last_inbound_at_ms: i64,
}

/// Per-tenant reactivation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SettingsRecord {
    pub tenant_id: String,
    pub enabled: bool,
    pub exhausted_action: String,
    pub exhausted_message: Option<String>,
    pub max_window_minutes: Option<i64>,
    pub max_window_action: String,
    pub max_window_message: Option<String>,
    pub utc_offset_minutes: i64,
}

/// One configured reactivation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StepRecord {
    pub id: String,
    pub tenant_id: String,
    /// Editor ordering; steps are listed by this column.
    pub position: i64,
    pub wait_minutes: i64,
    pub action_type: String,
    pub action_parameter: Option<String>,
    /// Minutes since local midnight.
    pub window_start: Option<i64>,
    pub window_end: Option<i64>,
    /// JSON array of tag ids.
    pub tag_ids: String,
}

impl StepRecord {
    /// Decode the `tag_ids` JSON column.
    pub fn tag_list(&self) -> Result<Vec<String>> {
        Ok(serde_json::from_str(&self.tag_ids)?)
    }

    /// Encode tags into the `tag_ids` column format.
    pub fn encode_tags(tags: &[String]) -> Result<String> {
        Ok(serde_json::to_string(tags)?)
    }
}

/// Engine-owned reactivation progress for one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CursorRecord {
    pub conversation_id: String,
    pub tenant_id: String,
    pub anchor_at_ms: i64,
    pub last_executed_step_index: i64,
    pub last_executed_at_ms: Option<i64>,
    /// "active" or "resolved"
    pub status: String,
    pub version: i64,
    pub claimed_at_ms: Option<i64>,
    pub consecutive_failures: i64,
    pub updated_at_ms: i64,
}

/// A conversation waiting for a human agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct HumanQueueEntry {
    pub id: i64,
    pub conversation_id: String,
    pub tenant_id: String,
    pub reason: String,
    pub created_at_ms: i64,
    pub picked_up_at_ms: Option<i64>,
}
