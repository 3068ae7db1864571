//! Conversation CRUD, tags, and candidate selection.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{Candidate, Conversation};

/// Create a conversation.
pub async fn create_conversation(pool: &SqlitePool, conversation: &Conversation) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO conversations (
            id, tenant_id, status, automation_enabled, last_inbound_at_ms,
            created_at_ms, updated_at_ms
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&conversation.id)
    .bind(&conversation.tenant_id)
    .bind(&conversation.status)
    .bind(conversation.automation_enabled)
    .bind(conversation.last_inbound_at_ms)
    .bind(conversation.created_at_ms)
    .bind(conversation.updated_at_ms)
    .execute(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DatabaseError::AlreadyExists {
                    entity: "Conversation",
                    id: conversation.id.clone(),
                };
            }
        }
        DatabaseError::Sqlx(e)
    })?;

    Ok(())
}

/// Get a conversation by ID.
pub async fn get_conversation(pool: &SqlitePool, id: &str) -> Result<Conversation> {
    sqlx::query_as::<_, Conversation>(
        r#"
        SELECT id, tenant_id, status, automation_enabled, last_inbound_at_ms,
               created_at_ms, updated_at_ms
        FROM conversations
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Conversation",
        id: id.to_string(),
    })
}

/// Record an inbound customer message.
///
/// Never moves `last_inbound_at_ms` backwards. `updated_at_ms` is set to
/// `now_ms` so late or redelivered events do not rewind it.
pub async fn record_inbound(pool: &SqlitePool, id: &str, at_ms: i64, now_ms: i64) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE conversations
        SET last_inbound_at_ms = MAX(COALESCE(last_inbound_at_ms, 0), ?),
            updated_at_ms = ?
        WHERE id = ?
        "#,
    )
    .bind(at_ms)
    .bind(now_ms)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Conversation",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Set a conversation's status ("open", "paused" or "closed").
pub async fn set_status(pool: &SqlitePool, id: &str, status: &str, now_ms: i64) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE conversations
        SET status = ?, updated_at_ms = ?
        WHERE id = ?
        "#,
    )
    .bind(status)
    .bind(now_ms)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Conversation",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Enable or disable automated handling.
pub async fn set_automation(pool: &SqlitePool, id: &str, enabled: bool, now_ms: i64) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE conversations
        SET automation_enabled = ?, updated_at_ms = ?
        WHERE id = ?
        "#,
    )
    .bind(enabled)
    .bind(now_ms)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Conversation",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Union `tag_ids` into the conversation's tags.
pub async fn assign_tags(pool: &SqlitePool, id: &str, tag_ids: &[String]) -> Result<()> {
    let mut tx = pool.begin().await?;

    for tag_id in tag_ids {
        sqlx::query(
            r#"
            INSERT INTO conversation_tags (conversation_id, tag_id)
            VALUES (?, ?)
            ON CONFLICT(conversation_id, tag_id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(tag_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// List a conversation's tags.
pub async fn list_tags(pool: &SqlitePool, id: &str) -> Result<Vec<String>> {
    let tags = sqlx::query_scalar::<_, String>(
        r#"
        SELECT tag_id
        FROM conversation_tags
        WHERE conversation_id = ?
        ORDER BY tag_id
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(tags)
}

/// List conversations due for a reactivation evaluation.
///
/// A candidate is not closed, still has automated handling, and has been
/// silent since at least `idle_before_ms`. Conversations whose cursor was
/// resolved for the current silence period are left out.
pub async fn list_candidates(pool: &SqlitePool, idle_before_ms: i64) -> Result<Vec<Candidate>> {
    let candidates = sqlx::query_as::<_, Candidate>(
        r#"
        SELECT c.id AS conversation_id, c.tenant_id, c.last_inbound_at_ms
        FROM conversations c
        LEFT JOIN reactivation_cursors r ON r.conversation_id = c.id
        WHERE c.status != 'closed'
          AND c.automation_enabled = 1
          AND c.last_inbound_at_ms IS NOT NULL
          AND c.last_inbound_at_ms <= ?
          AND (
              r.conversation_id IS NULL
              OR r.status != 'resolved'
              OR r.anchor_at_ms < c.last_inbound_at_ms
          )
        ORDER BY c.last_inbound_at_ms ASC
        "#,
    )
    .bind(idle_before_ms)
    .fetch_all(pool)
    .await?;

    Ok(candidates)
}
