//! Data-access overrides

use chrono::{DateTime, Utc};
use compass_common::models::{DataAccessOverride, OverrideScope};
use compass_common::Result;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{guid, opt_timestamp, timestamp};

fn override_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<DataAccessOverride> {
    let scope: String = row.get("scope");
    Ok(DataAccessOverride {
        id: guid(row, "guid")?,
        user_id: guid(row, "user_id")?,
        granted_by: guid(row, "granted_by")?,
        scope: OverrideScope::parse(&scope)?,
        expires_at: opt_timestamp(row, "expires_at")?,
        is_active: row.get("is_active"),
        created_at: timestamp(row, "created_at")?,
    })
}

pub async fn insert_override(
    conn: &mut SqliteConnection,
    grant: &DataAccessOverride,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO data_access_overrides (
            guid, user_id, granted_by, scope, expires_at, is_active, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(grant.id.to_string())
    .bind(grant.user_id.to_string())
    .bind(grant.granted_by.to_string())
    .bind(grant.scope.as_str())
    .bind(grant.expires_at.map(|t| t.to_rfc3339()))
    .bind(grant.is_active)
    .bind(grant.created_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

/// Overrides that are active and unexpired at `now`, newest grant first
pub async fn live_overrides(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<DataAccessOverride>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM data_access_overrides
        WHERE user_id = ? AND is_active = 1
          AND (expires_at IS NULL OR expires_at > ?)
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id.to_string())
    .bind(now.to_rfc3339())
    .fetch_all(conn)
    .await?;

    rows.iter().map(override_from_row).collect()
}
