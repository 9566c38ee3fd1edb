//! Computed per-(note, user) permission rows

use chrono::Utc;
use compass_common::models::{AccessVector, NoteUserAccess};
use compass_common::Result;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{guid, timestamp};

fn row_from_db(row: &sqlx::sqlite::SqliteRow) -> Result<NoteUserAccess> {
    Ok(NoteUserAccess {
        note_id: guid(row, "note_id")?,
        user_id: guid(row, "user_id")?,
        access: AccessVector {
            can_view: row.get("can_view"),
            can_edit: row.get("can_edit"),
            can_view_summary: row.get("can_view_summary"),
            can_write_summary: row.get("can_write_summary"),
            can_write_feedback: row.get("can_write_feedback"),
            can_view_feedbacks: row.get("can_view_feedbacks"),
        },
        updated_at: timestamp(row, "updated_at")?,
    })
}

/// Write one permission row, replacing the bits if it already exists
pub async fn upsert_row(
    conn: &mut SqliteConnection,
    note_id: Uuid,
    user_id: Uuid,
    access: AccessVector,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO note_user_access (
            note_id, user_id, can_view, can_edit, can_view_summary,
            can_write_summary, can_write_feedback, can_view_feedbacks, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(note_id, user_id) DO UPDATE SET
            can_view = excluded.can_view,
            can_edit = excluded.can_edit,
            can_view_summary = excluded.can_view_summary,
            can_write_summary = excluded.can_write_summary,
            can_write_feedback = excluded.can_write_feedback,
            can_view_feedbacks = excluded.can_view_feedbacks,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(note_id.to_string())
    .bind(user_id.to_string())
    .bind(access.can_view)
    .bind(access.can_edit)
    .bind(access.can_view_summary)
    .bind(access.can_write_summary)
    .bind(access.can_write_feedback)
    .bind(access.can_view_feedbacks)
    .bind(Utc::now().to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

/// Or the given bits into an existing row (creating it if absent). Used for
/// additive grants that must survive policy recomputes.
pub async fn merge_grant(
    conn: &mut SqliteConnection,
    note_id: Uuid,
    user_id: Uuid,
    grant: AccessVector,
) -> Result<()> {
    let current = find_row(&mut *conn, note_id, user_id)
        .await?
        .map(|r| r.access)
        .unwrap_or_default();

    upsert_row(conn, note_id, user_id, current.merge(grant)).await
}

pub async fn find_row(
    conn: &mut SqliteConnection,
    note_id: Uuid,
    user_id: Uuid,
) -> Result<Option<NoteUserAccess>> {
    let row = sqlx::query("SELECT * FROM note_user_access WHERE note_id = ? AND user_id = ?")
        .bind(note_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(conn)
        .await?;

    row.map(|r| row_from_db(&r)).transpose()
}

/// Effective permission vector; absent row means no access
pub async fn vector_for(
    conn: &mut SqliteConnection,
    note_id: Uuid,
    user_id: Uuid,
) -> Result<AccessVector> {
    Ok(find_row(conn, note_id, user_id)
        .await?
        .map(|r| r.access)
        .unwrap_or_default())
}

pub async fn rows_for_note(
    conn: &mut SqliteConnection,
    note_id: Uuid,
) -> Result<Vec<NoteUserAccess>> {
    let rows = sqlx::query("SELECT * FROM note_user_access WHERE note_id = ? ORDER BY user_id")
        .bind(note_id.to_string())
        .fetch_all(conn)
        .await?;

    rows.iter().map(row_from_db).collect()
}
