//! Reactivation cursor persistence with optimistic concurrency.
//!
//! Every write bumps `version`. Claim, commit and release only apply when the
//! caller's expected version is still current, so two evaluators racing on
//! one conversation cannot both act.

use sqlx::SqlitePool;

use crate::models::CursorRecord;
use crate::Result;

const CURSOR_COLUMNS: &str = "conversation_id, tenant_id, anchor_at_ms, last_executed_step_index, \
     last_executed_at_ms, status, version, claimed_at_ms, consecutive_failures, updated_at_ms";

/// Get the cursor for a conversation.
pub async fn get_cursor(pool: &SqlitePool, conversation_id: &str) -> Result<Option<CursorRecord>> {
    let query = format!(
        "SELECT {} FROM reactivation_cursors WHERE conversation_id = ?",
        CURSOR_COLUMNS
    );
    let record = sqlx::query_as::<_, CursorRecord>(&query)
        .bind(conversation_id)
        .fetch_optional(pool)
        .await?;

    Ok(record)
}

/// Insert a fresh cursor unless one already exists.
///
/// Returns `true` if this call created it.
pub async fn insert_cursor_if_absent(
    pool: &SqlitePool,
    conversation_id: &str,
    tenant_id: &str,
    anchor_at_ms: i64,
    now_ms: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO reactivation_cursors (
            conversation_id, tenant_id, anchor_at_ms, last_executed_step_index,
            status, version, consecutive_failures, updated_at_ms
        )
        VALUES (?, ?, ?, -1, 'active', 0, 0, ?)
        ON CONFLICT(conversation_id) DO NOTHING
        "#,
    )
    .bind(conversation_id)
    .bind(tenant_id)
    .bind(anchor_at_ms)
    .bind(now_ms)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Claim the cursor at `expected_version` and advance it.
///
/// `step_index` replaces `last_executed_step_index` when set; `resolve`
/// marks the cursor resolved. Returns the claimed version, or `None` on
/// conflict (stale version, outstanding claim or already resolved).
pub async fn claim_and_advance(
    pool: &SqlitePool,
    conversation_id: &str,
    expected_version: i64,
    step_index: Option<i64>,
    resolve: bool,
    now_ms: i64,
) -> Result<Option<i64>> {
    let result = sqlx::query(
        r#"
        UPDATE reactivation_cursors
        SET last_executed_step_index = COALESCE(?, last_executed_step_index),
            status = CASE WHEN ? THEN 'resolved' ELSE status END,
            last_executed_at_ms = ?,
            claimed_at_ms = ?,
            version = version + 1,
            updated_at_ms = ?
        WHERE conversation_id = ?
          AND version = ?
          AND claimed_at_ms IS NULL
          AND status = 'active'
        "#,
    )
    .bind(step_index)
    .bind(resolve)
    .bind(now_ms)
    .bind(now_ms)
    .bind(now_ms)
    .bind(conversation_id)
    .bind(expected_version)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    Ok(Some(expected_version + 1))
}

/// Clear an outstanding claim and reset the failure counter.
///
/// Returns `false` if the cursor changed since the claim.
pub async fn commit_claim(
    pool: &SqlitePool,
    conversation_id: &str,
    claimed_version: i64,
    now_ms: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE reactivation_cursors
        SET claimed_at_ms = NULL,
            consecutive_failures = 0,
            version = version + 1,
            updated_at_ms = ?
        WHERE conversation_id = ?
          AND version = ?
          AND claimed_at_ms IS NOT NULL
        "#,
    )
    .bind(now_ms)
    .bind(conversation_id)
    .bind(claimed_version)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Previous cursor progress restored by [`release_claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorProgress<'a> {
    pub last_executed_step_index: i64,
    pub last_executed_at_ms: Option<i64>,
    pub status: &'a str,
}

/// Roll a claim back to `prior` and count one more consecutive failure.
///
/// Returns the new failure count, or `None` if the cursor changed since the claim.
pub async fn release_claim(
    pool: &SqlitePool,
    conversation_id: &str,
    claimed_version: i64,
    prior: &PriorProgress<'_>,
    now_ms: i64,
) -> Result<Option<i64>> {
    let failures = sqlx::query_scalar::<_, i64>(
        r#"
        UPDATE reactivation_cursors
        SET last_executed_step_index = ?,
            last_executed_at_ms = ?,
            status = ?,
            claimed_at_ms = NULL,
            consecutive_failures = consecutive_failures + 1,
            version = version + 1,
            updated_at_ms = ?
        WHERE conversation_id = ?
          AND version = ?
          AND claimed_at_ms IS NOT NULL
        RETURNING consecutive_failures
        "#,
    )
    .bind(prior.last_executed_step_index)
    .bind(prior.last_executed_at_ms)
    .bind(prior.status)
    .bind(now_ms)
    .bind(conversation_id)
    .bind(claimed_version)
    .fetch_optional(pool)
    .await?;

    Ok(failures)
}

/// Start a new silence period, creating the cursor if needed.
///
/// Any outstanding claim is dropped and the version bumped, which turns the
/// pending commit or release of an in-flight evaluation into a no-op.
pub async fn reset_cursor(
    pool: &SqlitePool,
    conversation_id: &str,
    tenant_id: &str,
    anchor_at_ms: i64,
    now_ms: i64,
) -> Result<CursorRecord> {
    let query = format!(
        r#"
        INSERT INTO reactivation_cursors (
            conversation_id, tenant_id, anchor_at_ms, last_executed_step_index,
            status, version, consecutive_failures, updated_at_ms
        )
        VALUES (?, ?, ?, -1, 'active', 0, 0, ?)
        ON CONFLICT(conversation_id) DO UPDATE SET
            tenant_id = excluded.tenant_id,
            anchor_at_ms = excluded.anchor_at_ms,
            last_executed_step_index = -1,
            last_executed_at_ms = NULL,
            status = 'active',
            version = reactivation_cursors.version + 1,
            claimed_at_ms = NULL,
            consecutive_failures = 0,
            updated_at_ms = excluded.updated_at_ms
        RETURNING {}
        "#,
        CURSOR_COLUMNS
    );
    let record = sqlx::query_as::<_, CursorRecord>(&query)
        .bind(conversation_id)
        .bind(tenant_id)
        .bind(anchor_at_ms)
        .bind(now_ms)
        .fetch_one(pool)
        .await?;

    Ok(record)
}

/// Mark a cursor resolved regardless of its version.
///
/// Returns `false` if there is no cursor for the conversation.
pub async fn resolve_cursor(pool: &SqlitePool, conversation_id: &str, now_ms: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE reactivation_cursors
        SET status = 'resolved',
            claimed_at_ms = NULL,
            version = version + 1,
            updated_at_ms = ?
        WHERE conversation_id = ?
        "#,
    )
    .bind(now_ms)
    .bind(conversation_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
