//! Value tags attachable to one-on-ones

use compass_common::models::ValueTag;
use compass_common::{Error, Result};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::guid;

fn tag_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ValueTag> {
    Ok(ValueTag {
        id: guid(row, "guid")?,
        name: row.get("name"),
        is_active: row.get("is_active"),
    })
}

pub async fn insert_value_tag(conn: &mut SqliteConnection, tag: &ValueTag) -> Result<()> {
    sqlx::query("INSERT INTO value_tags (guid, name, is_active) VALUES (?, ?, ?)")
        .bind(tag.id.to_string())
        .bind(&tag.name)
        .bind(tag.is_active)
        .execute(conn)
        .await?;

    Ok(())
}

pub async fn get_value_tag(conn: &mut SqliteConnection, id: Uuid) -> Result<ValueTag> {
    let row = sqlx::query("SELECT * FROM value_tags WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Value tag {}", id)))?;

    tag_from_row(&row)
}

pub async fn list_value_tags(conn: &mut SqliteConnection, active_only: bool) -> Result<Vec<ValueTag>> {
    let sql = if active_only {
        "SELECT * FROM value_tags WHERE is_active = 1 ORDER BY name"
    } else {
        "SELECT * FROM value_tags ORDER BY name"
    };

    let rows = sqlx::query(sql).fetch_all(conn).await?;

    rows.iter().map(tag_from_row).collect()
}
