//! Tenant reactivation steps.

use sqlx::SqlitePool;

use crate::models::StepRecord;
use crate::validation::validate_step;
use crate::{DatabaseError, Result};

/// Replace a tenant's whole step list in one transaction.
///
/// Every step is validated first; nothing is written if any step is invalid.
pub async fn replace_steps(pool: &SqlitePool, tenant_id: &str, steps: &[StepRecord]) -> Result<()> {
    for step in steps {
        validate_step(step)?;
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        DELETE FROM reactivation_steps
        WHERE tenant_id = ?
        "#,
    )
    .bind(tenant_id)
    .execute(&mut *tx)
    .await?;

    for step in steps {
        sqlx::query(
            r#"
            INSERT INTO reactivation_steps (
                id, tenant_id, position, wait_minutes, action_type,
                action_parameter, window_start, window_end, tag_ids
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&step.id)
        .bind(tenant_id)
        .bind(step.position)
        .bind(step.wait_minutes)
        .bind(&step.action_type)
        .bind(&step.action_parameter)
        .bind(step.window_start)
        .bind(step.window_end)
        .bind(&step.tag_ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.is_unique_violation() {
                    return DatabaseError::AlreadyExists {
                        entity: "Step",
                        id: step.id.clone(),
                    };
                }
            }
            DatabaseError::Sqlx(e)
        })?;
    }

    tx.commit().await?;

    tracing::debug!(tenant_id, count = steps.len(), "Replaced reactivation steps");
    Ok(())
}

/// List a tenant's steps in execution order.
pub async fn list_steps(pool: &SqlitePool, tenant_id: &str) -> Result<Vec<StepRecord>> {
    let steps = sqlx::query_as::<_, StepRecord>(
        r#"
        SELECT id, tenant_id, position, wait_minutes, action_type,
               action_parameter, window_start, window_end, tag_ids
        FROM reactivation_steps
        WHERE tenant_id = ?
        ORDER BY position ASC, rowid ASC
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    Ok(steps)
}
