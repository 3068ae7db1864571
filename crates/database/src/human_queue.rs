//! Hand-over of conversations to human agents.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::HumanQueueEntry;

/// Disable automation and enqueue the conversation for a human agent.
///
/// Idempotent while the conversation is still waiting: a second call does not
/// add another queue entry.
pub async fn transfer_to_human(pool: &SqlitePool, conversation_id: &str, reason: &str, now_ms: i64) -> Result<()> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE conversations
        SET automation_enabled = 0, updated_at_ms = ?
        WHERE id = ?
        "#,
    )
    .bind(now_ms)
    .bind(conversation_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Conversation",
            id: conversation_id.to_string(),
        });
    }

    sqlx::query(
        r#"
        INSERT INTO human_queue (conversation_id, tenant_id, reason, created_at_ms)
        SELECT id, tenant_id, ?, ?
        FROM conversations
        WHERE id = ?
          AND NOT EXISTS (
              SELECT 1 FROM human_queue
              WHERE conversation_id = ? AND picked_up_at_ms IS NULL
          )
        "#,
    )
    .bind(reason)
    .bind(now_ms)
    .bind(conversation_id)
    .bind(conversation_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Entries still waiting for a human, oldest first.
pub async fn list_pending(pool: &SqlitePool, tenant_id: &str) -> Result<Vec<HumanQueueEntry>> {
    let entries = sqlx::query_as::<_, HumanQueueEntry>(
        r#"
        SELECT id, conversation_id, tenant_id, reason, created_at_ms, picked_up_at_ms
        FROM human_queue
        WHERE tenant_id = ? AND picked_up_at_ms IS NULL
        ORDER BY created_at_ms ASC, id ASC
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

/// Mark a queue entry as picked up by an agent.
pub async fn pick_up(pool: &SqlitePool, entry_id: i64, now_ms: i64) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE human_queue
        SET picked_up_at_ms = ?
        WHERE id = ? AND picked_up_at_ms IS NULL
        "#,
    )
    .bind(now_ms)
    .bind(entry_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Queue entry",
            id: entry_id.to_string(),
        });
    }

    Ok(())
}
