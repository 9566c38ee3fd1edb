//! API key persistence. Keys are looked up by their public prefix; the secret
//! part is only ever stored as a salted hash.

use chrono::{DateTime, Utc};
use compass_common::models::ApiKey;
use compass_common::Result;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{guid, opt_timestamp, timestamp};

fn api_key_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ApiKey> {
    Ok(ApiKey {
        id: guid(row, "guid")?,
        prefix: row.get("prefix"),
        hashed_key: row.get("hashed_key"),
        salt: row.get("salt"),
        user_id: guid(row, "user_id")?,
        is_active: row.get("is_active"),
        last_used: opt_timestamp(row, "last_used")?,
        created_at: timestamp(row, "created_at")?,
    })
}

pub async fn insert_api_key(conn: &mut SqliteConnection, key: &ApiKey) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO api_keys (
            guid, prefix, hashed_key, salt, user_id, is_active, last_used, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(key.id.to_string())
    .bind(&key.prefix)
    .bind(&key.hashed_key)
    .bind(&key.salt)
    .bind(key.user_id.to_string())
    .bind(key.is_active)
    .bind(key.last_used.map(|t| t.to_rfc3339()))
    .bind(key.created_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn find_by_prefix(conn: &mut SqliteConnection, prefix: &str) -> Result<Option<ApiKey>> {
    let row = sqlx::query("SELECT * FROM api_keys WHERE prefix = ? AND is_active = 1")
        .bind(prefix)
        .fetch_optional(conn)
        .await?;

    row.map(|r| api_key_from_row(&r)).transpose()
}

pub async fn touch_last_used(
    conn: &mut SqliteConnection,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE api_keys SET last_used = ? WHERE guid = ?")
        .bind(now.to_rfc3339())
        .bind(id.to_string())
        .execute(conn)
        .await?;

    Ok(())
}
