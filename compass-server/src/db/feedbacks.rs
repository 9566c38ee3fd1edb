//! Feedback entries and feedback requests

use compass_common::models::{Feedback, FeedbackRequest};
use compass_common::{Error, Result};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{guid, opt_date, opt_guid, timestamp, DATE_FORMAT};

/// Scope filter shared by entry and request listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    /// Entries the user sent / requests the user issued
    Owned,
    /// Entries addressed to the user / requests inviting the user
    Invited,
    All,
}

impl ListScope {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "owned" => Ok(ListScope::Owned),
            "invited" => Ok(ListScope::Invited),
            "all" => Ok(ListScope::All),
            other => Err(Error::InvalidInput(format!("Unknown scope: {}", other))),
        }
    }
}

fn feedback_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Feedback> {
    Ok(Feedback {
        id: guid(row, "guid")?,
        note_id: guid(row, "note_id")?,
        parent_note_id: opt_guid(row, "parent_note_id")?,
        request_id: opt_guid(row, "request_id")?,
        sender_id: guid(row, "sender_id")?,
        receiver_id: guid(row, "receiver_id")?,
        content: row.get("content"),
        evidence: row.get("evidence"),
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

pub async fn insert_feedback(conn: &mut SqliteConnection, feedback: &Feedback) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO feedbacks (
            guid, note_id, parent_note_id, request_id, sender_id, receiver_id,
            content, evidence, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(feedback.id.to_string())
    .bind(feedback.note_id.to_string())
    .bind(feedback.parent_note_id.map(|id| id.to_string()))
    .bind(feedback.request_id.map(|id| id.to_string()))
    .bind(feedback.sender_id.to_string())
    .bind(feedback.receiver_id.to_string())
    .bind(&feedback.content)
    .bind(&feedback.evidence)
    .bind(feedback.created_at.to_rfc3339())
    .bind(feedback.updated_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn find_feedback(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Feedback>> {
    let row = sqlx::query("SELECT * FROM feedbacks WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

    row.map(|r| feedback_from_row(&r)).transpose()
}

/// Entries written against a given note
pub async fn list_for_parent_note(
    conn: &mut SqliteConnection,
    parent_note_id: Uuid,
) -> Result<Vec<Feedback>> {
    let rows =
        sqlx::query("SELECT * FROM feedbacks WHERE parent_note_id = ? ORDER BY created_at")
            .bind(parent_note_id.to_string())
            .fetch_all(conn)
            .await?;

    rows.iter().map(feedback_from_row).collect()
}

/// Entry listing with `?scope=` and `?adhoc=` filters. Ad hoc entries are the
/// ones not answering any request.
pub async fn list_entries(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    scope: ListScope,
    adhoc: Option<bool>,
) -> Result<Vec<Feedback>> {
    let mut sql = String::from("SELECT * FROM feedbacks WHERE ");
    sql.push_str(match scope {
        ListScope::Owned => "sender_id = ?1",
        ListScope::Invited => "receiver_id = ?1",
        ListScope::All => "(sender_id = ?1 OR receiver_id = ?1)",
    });
    match adhoc {
        Some(true) => sql.push_str(" AND request_id IS NULL"),
        Some(false) => sql.push_str(" AND request_id IS NOT NULL"),
        None => {}
    }
    sql.push_str(" ORDER BY created_at DESC");

    let rows = sqlx::query(&sql)
        .bind(user_id.to_string())
        .fetch_all(conn)
        .await?;

    rows.iter().map(feedback_from_row).collect()
}

async fn load_invitees(conn: &mut SqliteConnection, request_id: Uuid) -> Result<Vec<Uuid>> {
    let rows = sqlx::query(
        "SELECT user_id FROM feedback_request_invitees WHERE request_id = ? ORDER BY user_id",
    )
    .bind(request_id.to_string())
    .fetch_all(conn)
    .await?;

    rows.iter().map(|r| guid(r, "user_id")).collect()
}

fn request_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<FeedbackRequest> {
    Ok(FeedbackRequest {
        id: guid(row, "guid")?,
        note_id: guid(row, "note_id")?,
        deadline: opt_date(row, "deadline")?,
        invitees: Vec::new(),
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

pub async fn insert_request(
    conn: &mut SqliteConnection,
    request: &FeedbackRequest,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO feedback_requests (guid, note_id, deadline, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(request.id.to_string())
    .bind(request.note_id.to_string())
    .bind(request.deadline.map(|d| d.format(DATE_FORMAT).to_string()))
    .bind(request.created_at.to_rfc3339())
    .bind(request.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    for user_id in &request.invitees {
        sqlx::query(
            "INSERT OR IGNORE INTO feedback_request_invitees (request_id, user_id) VALUES (?, ?)",
        )
        .bind(request.id.to_string())
        .bind(user_id.to_string())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub async fn find_request(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> Result<Option<FeedbackRequest>> {
    let row = sqlx::query("SELECT * FROM feedback_requests WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut request = request_from_row(&row)?;
    request.invitees = load_invitees(conn, request.id).await?;

    Ok(Some(request))
}

pub async fn get_request(conn: &mut SqliteConnection, id: Uuid) -> Result<FeedbackRequest> {
    find_request(conn, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Feedback request {}", id)))
}

/// Request listing: owned requests ride on the owner of the request note,
/// invited requests on the invitee link table
pub async fn list_requests(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    scope: ListScope,
) -> Result<Vec<FeedbackRequest>> {
    let sql = match scope {
        ListScope::Owned => {
            "SELECT fr.* FROM feedback_requests fr \
             JOIN notes n ON n.guid = fr.note_id \
             WHERE n.owner_id = ?1 ORDER BY fr.created_at DESC"
        }
        ListScope::Invited => {
            "SELECT fr.* FROM feedback_requests fr \
             JOIN feedback_request_invitees i ON i.request_id = fr.guid \
             WHERE i.user_id = ?1 ORDER BY fr.created_at DESC"
        }
        ListScope::All => {
            "SELECT DISTINCT fr.* FROM feedback_requests fr \
             JOIN notes n ON n.guid = fr.note_id \
             LEFT JOIN feedback_request_invitees i ON i.request_id = fr.guid \
             WHERE n.owner_id = ?1 OR i.user_id = ?1 ORDER BY fr.created_at DESC"
        }
    };

    let rows = sqlx::query(sql)
        .bind(user_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

    let mut requests = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut request = request_from_row(row)?;
        request.invitees = load_invitees(&mut *conn, request.id).await?;
        requests.push(request);
    }

    Ok(requests)
}
