//! Timeline event persistence

use compass_common::models::{EventSource, EventType, TimelineEvent};
use compass_common::Result;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{date, guid, opt_guid, timestamp, DATE_FORMAT};

fn event_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<TimelineEvent> {
    let event_type: String = row.get("event_type");
    let source_kind: Option<String> = row.get("source_kind");
    let source = match (source_kind, opt_guid(row, "source_id")?) {
        (Some(kind), Some(id)) => Some(EventSource::from_parts(&kind, id)?),
        _ => None,
    };

    Ok(TimelineEvent {
        id: guid(row, "guid")?,
        user_id: guid(row, "user_id")?,
        event_type: EventType::parse(&event_type)?,
        summary_text: row.get("summary_text"),
        effective_date: date(row, "effective_date")?,
        source,
        visibility_mask: row.get("visibility_mask"),
        created_by: opt_guid(row, "created_by")?,
        created_at: timestamp(row, "created_at")?,
    })
}

pub async fn insert_event(conn: &mut SqliteConnection, event: &TimelineEvent) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO timeline_events (
            guid, user_id, event_type, summary_text, effective_date,
            source_kind, source_id, visibility_mask, created_by, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.id.to_string())
    .bind(event.user_id.to_string())
    .bind(event.event_type.as_str())
    .bind(&event.summary_text)
    .bind(event.effective_date.format(DATE_FORMAT).to_string())
    .bind(event.source.map(|s| s.kind_str()))
    .bind(event.source.map(|s| s.id().to_string()))
    .bind(event.visibility_mask)
    .bind(event.created_by.map(|id| id.to_string()))
    .bind(event.created_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

/// Pipeline idempotency check: has any event already been derived from this
/// artefact?
pub async fn exists_for_source(
    conn: &mut SqliteConnection,
    source: &EventSource,
) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM timeline_events WHERE source_kind = ? AND source_id = ?",
    )
    .bind(source.kind_str())
    .bind(source.id().to_string())
    .fetch_one(conn)
    .await?;

    Ok(count > 0)
}

/// Newest first: `(-effective_date, -created_at)` with rowid as final tie-break
pub async fn list_for_user(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<TimelineEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM timeline_events WHERE user_id = ?
        ORDER BY effective_date DESC, created_at DESC, rowid DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(user_id.to_string())
    .bind(limit)
    .bind(offset)
    .fetch_all(conn)
    .await?;

    rows.iter().map(event_from_row).collect()
}

pub async fn count_for_user(conn: &mut SqliteConnection, user_id: Uuid) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM timeline_events WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_one(conn)
            .await?;

    Ok(count)
}

/// Events for a user ordered oldest-first within the pipeline's own
/// transaction, used by tests and the source-detail endpoint
pub async fn list_for_source(
    conn: &mut SqliteConnection,
    source: &EventSource,
) -> Result<Vec<TimelineEvent>> {
    let rows = sqlx::query(
        "SELECT * FROM timeline_events WHERE source_kind = ? AND source_id = ? ORDER BY rowid",
    )
    .bind(source.kind_str())
    .bind(source.id().to_string())
    .fetch_all(conn)
    .await?;

    rows.iter().map(event_from_row).collect()
}
