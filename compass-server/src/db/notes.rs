//! Note persistence, mentions, reads, links, and review cycles

use chrono::Utc;
use compass_common::models::{Cycle, Note, NoteType, ProposalType, SubmitStatus};
use compass_common::{Error, Result};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{date, guid, opt_date, timestamp, DATE_FORMAT};

const NOTE_COLUMNS: &str = "guid, owner_id, title, content, date, period, year, note_type, \
     proposal_type, is_public, submit_status, cycle_id, created_at, updated_at";

fn note_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Note> {
    let note_type: String = row.get("note_type");
    let proposal_type: Option<String> = row.get("proposal_type");
    let submit_status: String = row.get("submit_status");
    Ok(Note {
        id: guid(row, "guid")?,
        owner_id: guid(row, "owner_id")?,
        title: row.get("title"),
        content: row.get("content"),
        date: opt_date(row, "date")?,
        period: row.get("period"),
        year: row.get("year"),
        note_type: NoteType::parse(&note_type)?,
        proposal_type: proposal_type.map(|p| ProposalType::parse(&p)).transpose()?,
        mentioned_users: Vec::new(),
        is_public: row.get("is_public"),
        submit_status: SubmitStatus::parse(&submit_status)?,
        cycle_id: super::opt_guid(row, "cycle_id")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

async fn load_mentions(conn: &mut SqliteConnection, note_id: Uuid) -> Result<Vec<Uuid>> {
    let rows = sqlx::query("SELECT user_id FROM note_mentions WHERE note_id = ? ORDER BY user_id")
        .bind(note_id.to_string())
        .fetch_all(conn)
        .await?;

    rows.iter().map(|r| guid(r, "user_id")).collect()
}

pub async fn insert_note(conn: &mut SqliteConnection, note: &Note) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO notes (
            guid, owner_id, title, content, date, period, year, note_type,
            proposal_type, is_public, submit_status, cycle_id, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(note.id.to_string())
    .bind(note.owner_id.to_string())
    .bind(&note.title)
    .bind(&note.content)
    .bind(note.date.map(|d| d.format(DATE_FORMAT).to_string()))
    .bind(&note.period)
    .bind(note.year)
    .bind(note.note_type.as_str())
    .bind(note.proposal_type.map(|p| p.as_str()))
    .bind(note.is_public)
    .bind(note.submit_status.as_str())
    .bind(note.cycle_id.map(|id| id.to_string()))
    .bind(note.created_at.to_rfc3339())
    .bind(note.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    set_mentions(conn, note.id, &note.mentioned_users).await?;

    Ok(())
}

pub async fn update_note(conn: &mut SqliteConnection, note: &Note) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE notes SET
            title = ?, content = ?, date = ?, period = ?, year = ?,
            proposal_type = ?, is_public = ?, submit_status = ?, cycle_id = ?,
            updated_at = ?
        WHERE guid = ?
        "#,
    )
    .bind(&note.title)
    .bind(&note.content)
    .bind(note.date.map(|d| d.format(DATE_FORMAT).to_string()))
    .bind(&note.period)
    .bind(note.year)
    .bind(note.proposal_type.map(|p| p.as_str()))
    .bind(note.is_public)
    .bind(note.submit_status.as_str())
    .bind(note.cycle_id.map(|id| id.to_string()))
    .bind(note.updated_at.to_rfc3339())
    .bind(note.id.to_string())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Note {}", note.id)));
    }

    set_mentions(conn, note.id, &note.mentioned_users).await?;

    Ok(())
}

pub async fn set_submit_status(
    conn: &mut SqliteConnection,
    note_id: Uuid,
    status: SubmitStatus,
) -> Result<()> {
    let result = sqlx::query("UPDATE notes SET submit_status = ?, updated_at = ? WHERE guid = ?")
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(note_id.to_string())
        .execute(conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Note {}", note_id)));
    }

    Ok(())
}

pub async fn delete_note(conn: &mut SqliteConnection, note_id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM notes WHERE guid = ?")
        .bind(note_id.to_string())
        .execute(conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Note {}", note_id)));
    }

    Ok(())
}

pub async fn find_note(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Note>> {
    let row = sqlx::query(&format!("SELECT {} FROM notes WHERE guid = ?", NOTE_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut note = note_from_row(&row)?;
    note.mentioned_users = load_mentions(conn, note.id).await?;

    Ok(Some(note))
}

pub async fn get_note(conn: &mut SqliteConnection, id: Uuid) -> Result<Note> {
    find_note(conn, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Note {}", id)))
}

/// Notes the user holds a `can_view` row for, newest first
pub async fn list_notes_visible_to(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> Result<Vec<Note>> {
    let rows = sqlx::query(
        r#"
        SELECT n.* FROM notes n
        JOIN note_user_access a ON a.note_id = n.guid
        WHERE a.user_id = ? AND a.can_view = 1
        ORDER BY n.created_at DESC
        "#,
    )
    .bind(user_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let mut notes = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut note = note_from_row(row)?;
        note.mentioned_users = load_mentions(&mut *conn, note.id).await?;
        notes.push(note);
    }

    Ok(notes)
}

/// Proposal notes owned by a user, optionally narrowed to submit states
pub async fn proposals_by_owner(
    conn: &mut SqliteConnection,
    owner_id: Uuid,
    statuses: Option<&[SubmitStatus]>,
) -> Result<Vec<Note>> {
    let base = format!(
        "SELECT {} FROM notes WHERE owner_id = ? AND note_type = 'PROPOSAL'",
        NOTE_COLUMNS
    );
    let sql = match statuses {
        Some(statuses) => {
            let list = statuses
                .iter()
                .map(|s| format!("'{}'", s.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} AND submit_status IN ({})", base, list)
        }
        None => base,
    };

    let rows = sqlx::query(&sql)
        .bind(owner_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

    let mut notes = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut note = note_from_row(row)?;
        note.mentioned_users = load_mentions(&mut *conn, note.id).await?;
        notes.push(note);
    }

    Ok(notes)
}

/// Notes of the given types owned by a user
pub async fn notes_by_owner_of_types(
    conn: &mut SqliteConnection,
    owner_id: Uuid,
    types: &[NoteType],
) -> Result<Vec<Note>> {
    let list = types
        .iter()
        .map(|t| format!("'{}'", t.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {} FROM notes WHERE owner_id = ? AND note_type IN ({})",
        NOTE_COLUMNS, list
    );

    let rows = sqlx::query(&sql)
        .bind(owner_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

    let mut notes = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut note = note_from_row(row)?;
        note.mentioned_users = load_mentions(&mut *conn, note.id).await?;
        notes.push(note);
    }

    Ok(notes)
}

/// Replace the mention set
pub async fn set_mentions(
    conn: &mut SqliteConnection,
    note_id: Uuid,
    user_ids: &[Uuid],
) -> Result<()> {
    sqlx::query("DELETE FROM note_mentions WHERE note_id = ?")
        .bind(note_id.to_string())
        .execute(&mut *conn)
        .await?;

    for user_id in user_ids {
        sqlx::query("INSERT OR IGNORE INTO note_mentions (note_id, user_id) VALUES (?, ?)")
            .bind(note_id.to_string())
            .bind(user_id.to_string())
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

pub async fn mark_read(conn: &mut SqliteConnection, note_id: Uuid, user_id: Uuid) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO note_reads (note_id, user_id, read_at) VALUES (?, ?, ?)",
    )
    .bind(note_id.to_string())
    .bind(user_id.to_string())
    .bind(Utc::now().to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn add_link(
    conn: &mut SqliteConnection,
    note_id: Uuid,
    linked_note_id: Uuid,
) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO note_links (note_id, linked_note_id) VALUES (?, ?)")
        .bind(note_id.to_string())
        .bind(linked_note_id.to_string())
        .execute(conn)
        .await?;

    Ok(())
}

pub async fn list_links(conn: &mut SqliteConnection, note_id: Uuid) -> Result<Vec<Uuid>> {
    let rows = sqlx::query("SELECT linked_note_id FROM note_links WHERE note_id = ?")
        .bind(note_id.to_string())
        .fetch_all(conn)
        .await?;

    rows.iter().map(|r| guid(r, "linked_note_id")).collect()
}

pub async fn insert_cycle(conn: &mut SqliteConnection, cycle: &Cycle) -> Result<()> {
    sqlx::query("INSERT INTO cycles (guid, name, start_date, end_date) VALUES (?, ?, ?, ?)")
        .bind(cycle.id.to_string())
        .bind(&cycle.name)
        .bind(cycle.start_date.format(DATE_FORMAT).to_string())
        .bind(cycle.end_date.format(DATE_FORMAT).to_string())
        .execute(conn)
        .await?;

    Ok(())
}

pub async fn list_cycles(conn: &mut SqliteConnection) -> Result<Vec<Cycle>> {
    let rows = sqlx::query("SELECT * FROM cycles ORDER BY start_date DESC")
        .fetch_all(conn)
        .await?;

    rows.iter()
        .map(|row| {
            Ok(Cycle {
                id: guid(row, "guid")?,
                name: row.get("name"),
                start_date: date(row, "start_date")?,
                end_date: date(row, "end_date")?,
            })
        })
        .collect()
}
