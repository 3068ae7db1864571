//! Error types for reactivation.

use thiserror::Error;

/// Errors that can occur while evaluating or executing a reactivation.
///
/// Every variant is local to one conversation's evaluation. None of them is
/// allowed to stop a sweep.
#[derive(Debug, Error)]
pub enum ReactivationError {
    /// Settings or steps for a tenant could not be read.
    ///
    /// The conversation is skipped this tick and no fallback is applied.
    #[error("configuration unavailable for tenant {tenant_id}: {reason}")]
    ConfigurationUnavailable { tenant_id: String, reason: String },

    /// Configuration was read but is not usable (bad window, wait out of range).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Another evaluator holds or already consumed the claim.
    #[error("claim conflict for conversation {0}")]
    ClaimConflict(String),

    /// The outbound channel rejected or failed to deliver a message.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// A cursor or conversation write could not be confirmed.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// Tagging or a status transition failed.
    #[error("side effect failed: {0}")]
    SideEffectFailed(String),
}

impl ReactivationError {
    /// Whether the next tick should try the same conversation again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidConfiguration(_) | Self::ClaimConflict(_))
    }
}

/// Result type for reactivation operations.
pub type Result<T> = std::result::Result<T, ReactivationError>;
