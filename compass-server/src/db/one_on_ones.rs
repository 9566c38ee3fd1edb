//! One-on-one records and their tag links

use chrono::Utc;
use compass_common::models::OneOnOne;
use compass_common::{Error, Result};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{guid, timestamp};

fn one_on_one_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<OneOnOne> {
    Ok(OneOnOne {
        id: guid(row, "guid")?,
        note_id: guid(row, "note_id")?,
        member_id: guid(row, "member_id")?,
        personal_summary: row.get("personal_summary"),
        career_summary: row.get("career_summary"),
        performance_summary: row.get("performance_summary"),
        communication_summary: row.get("communication_summary"),
        actions: row.get("actions"),
        leader_vibe: row.get("leader_vibe"),
        member_vibe: row.get("member_vibe"),
        tags: Vec::new(),
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

async fn load_tags(conn: &mut SqliteConnection, one_on_one_id: Uuid) -> Result<Vec<Uuid>> {
    let rows =
        sqlx::query("SELECT tag_id FROM one_on_one_tags WHERE one_on_one_id = ? ORDER BY tag_id")
            .bind(one_on_one_id.to_string())
            .fetch_all(conn)
            .await?;

    rows.iter().map(|r| guid(r, "tag_id")).collect()
}

pub async fn insert_one_on_one(conn: &mut SqliteConnection, record: &OneOnOne) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO one_on_ones (
            guid, note_id, member_id, personal_summary, career_summary,
            performance_summary, communication_summary, actions,
            leader_vibe, member_vibe, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id.to_string())
    .bind(record.note_id.to_string())
    .bind(record.member_id.to_string())
    .bind(&record.personal_summary)
    .bind(&record.career_summary)
    .bind(&record.performance_summary)
    .bind(&record.communication_summary)
    .bind(&record.actions)
    .bind(&record.leader_vibe)
    .bind(&record.member_vibe)
    .bind(record.created_at.to_rfc3339())
    .bind(record.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    set_tags(conn, record.id, &record.tags).await?;

    Ok(())
}

pub async fn update_one_on_one(conn: &mut SqliteConnection, record: &OneOnOne) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE one_on_ones SET
            personal_summary = ?, career_summary = ?, performance_summary = ?,
            communication_summary = ?, actions = ?, leader_vibe = ?,
            member_vibe = ?, updated_at = ?
        WHERE guid = ?
        "#,
    )
    .bind(&record.personal_summary)
    .bind(&record.career_summary)
    .bind(&record.performance_summary)
    .bind(&record.communication_summary)
    .bind(&record.actions)
    .bind(&record.leader_vibe)
    .bind(&record.member_vibe)
    .bind(record.updated_at.to_rfc3339())
    .bind(record.id.to_string())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("One-on-one {}", record.id)));
    }

    set_tags(conn, record.id, &record.tags).await?;

    Ok(())
}

/// The member side may only touch their vibe
pub async fn update_member_vibe(
    conn: &mut SqliteConnection,
    id: Uuid,
    member_vibe: Option<&str>,
) -> Result<()> {
    let result =
        sqlx::query("UPDATE one_on_ones SET member_vibe = ?, updated_at = ? WHERE guid = ?")
            .bind(member_vibe)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(conn)
            .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("One-on-one {}", id)));
    }

    Ok(())
}

pub async fn set_tags(
    conn: &mut SqliteConnection,
    one_on_one_id: Uuid,
    tag_ids: &[Uuid],
) -> Result<()> {
    sqlx::query("DELETE FROM one_on_one_tags WHERE one_on_one_id = ?")
        .bind(one_on_one_id.to_string())
        .execute(&mut *conn)
        .await?;

    for tag_id in tag_ids {
        sqlx::query("INSERT OR IGNORE INTO one_on_one_tags (one_on_one_id, tag_id) VALUES (?, ?)")
            .bind(one_on_one_id.to_string())
            .bind(tag_id.to_string())
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

pub async fn find_one_on_one(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<OneOnOne>> {
    let row = sqlx::query("SELECT * FROM one_on_ones WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut record = one_on_one_from_row(&row)?;
    record.tags = load_tags(conn, record.id).await?;

    Ok(Some(record))
}

pub async fn get_one_on_one(conn: &mut SqliteConnection, id: Uuid) -> Result<OneOnOne> {
    find_one_on_one(conn, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("One-on-one {}", id)))
}

pub async fn find_by_note(conn: &mut SqliteConnection, note_id: Uuid) -> Result<Option<OneOnOne>> {
    let row = sqlx::query("SELECT * FROM one_on_ones WHERE note_id = ?")
        .bind(note_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut record = one_on_one_from_row(&row)?;
    record.tags = load_tags(conn, record.id).await?;

    Ok(Some(record))
}

pub async fn list_for_member(
    conn: &mut SqliteConnection,
    member_id: Uuid,
) -> Result<Vec<OneOnOne>> {
    let rows = sqlx::query("SELECT * FROM one_on_ones WHERE member_id = ? ORDER BY created_at DESC")
        .bind(member_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut record = one_on_one_from_row(row)?;
        record.tags = load_tags(&mut *conn, record.id).await?;
        records.push(record);
    }

    Ok(records)
}
