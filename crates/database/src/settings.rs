//! Tenant reactivation settings.

use sqlx::SqlitePool;

use crate::models::SettingsRecord;
use crate::validation::validate_settings;
use crate::Result;

/// Create or update a tenant's settings.
pub async fn upsert_settings(pool: &SqlitePool, settings: &SettingsRecord) -> Result<()> {
    validate_settings(settings)?;

    sqlx::query(
        r#"
        INSERT INTO reactivation_settings (
            tenant_id, enabled, exhausted_action, exhausted_message,
            max_window_minutes, max_window_action, max_window_message, utc_offset_minutes
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(tenant_id) DO UPDATE SET
            enabled = excluded.enabled,
            exhausted_action = excluded.exhausted_action,
            exhausted_message = excluded.exhausted_message,
            max_window_minutes = excluded.max_window_minutes,
            max_window_action = excluded.max_window_action,
            max_window_message = excluded.max_window_message,
            utc_offset_minutes = excluded.utc_offset_minutes,
            updated_at_ms = CAST(strftime('%s', 'now') AS INTEGER) * 1000
        "#,
    )
    .bind(&settings.tenant_id)
    .bind(settings.enabled)
    .bind(&settings.exhausted_action)
    .bind(&settings.exhausted_message)
    .bind(settings.max_window_minutes)
    .bind(&settings.max_window_action)
    .bind(&settings.max_window_message)
    .bind(settings.utc_offset_minutes)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a tenant's settings.
pub async fn get_settings(pool: &SqlitePool, tenant_id: &str) -> Result<Option<SettingsRecord>> {
    let record = sqlx::query_as::<_, SettingsRecord>(
        r#"
        SELECT tenant_id, enabled, exhausted_action, exhausted_message,
               max_window_minutes, max_window_action, max_window_message, utc_offset_minutes
        FROM reactivation_settings
        WHERE tenant_id = ?
        "#,
    )
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Remove a tenant's settings.
pub async fn delete_settings(pool: &SqlitePool, tenant_id: &str) -> Result<()> {
    sqlx::query(
        r#"
        DELETE FROM reactivation_settings
        WHERE tenant_id = ?
        "#,
    )
    .bind(tenant_id)
    .execute(pool)
    .await?;

    Ok(())
}
