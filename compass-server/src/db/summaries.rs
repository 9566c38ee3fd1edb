//! Committee summary persistence

use chrono::NaiveDate;
use compass_common::models::{AspectChange, Summary, SummaryStatus};
use compass_common::{Error, Result};
use sqlx::{Row, SqliteConnection};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{guid, opt_date, opt_guid, timestamp, DATE_FORMAT};

fn summary_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Summary> {
    let aspect_changes: String = row.get("aspect_changes");
    let aspect_changes: BTreeMap<String, AspectChange> = serde_json::from_str(&aspect_changes)
        .map_err(|e| Error::Internal(format!("Bad aspect_changes JSON: {}", e)))?;
    let submit_status: String = row.get("submit_status");

    Ok(Summary {
        id: guid(row, "guid")?,
        note_id: guid(row, "note_id")?,
        content: row.get("content"),
        ladder_id: opt_guid(row, "ladder_id")?,
        aspect_changes,
        performance_label: row.get("performance_label"),
        ladder_change: row.get("ladder_change"),
        bonus: row.get("bonus"),
        salary_change: row.get("salary_change"),
        committee_date: opt_date(row, "committee_date")?,
        submit_status: SummaryStatus::parse(&submit_status)?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn aspect_changes_json(changes: &BTreeMap<String, AspectChange>) -> Result<String> {
    serde_json::to_string(changes)
        .map_err(|e| Error::Internal(format!("Cannot encode aspect_changes: {}", e)))
}

pub async fn insert_summary(conn: &mut SqliteConnection, summary: &Summary) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO summaries (
            guid, note_id, content, ladder_id, aspect_changes, performance_label,
            ladder_change, bonus, salary_change, committee_date, submit_status,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(summary.id.to_string())
    .bind(summary.note_id.to_string())
    .bind(&summary.content)
    .bind(summary.ladder_id.map(|id| id.to_string()))
    .bind(aspect_changes_json(&summary.aspect_changes)?)
    .bind(&summary.performance_label)
    .bind(&summary.ladder_change)
    .bind(summary.bonus)
    .bind(summary.salary_change)
    .bind(summary.committee_date.map(|d| d.format(DATE_FORMAT).to_string()))
    .bind(summary.submit_status.as_str())
    .bind(summary.created_at.to_rfc3339())
    .bind(summary.updated_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn update_summary(conn: &mut SqliteConnection, summary: &Summary) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE summaries SET
            content = ?, ladder_id = ?, aspect_changes = ?, performance_label = ?,
            ladder_change = ?, bonus = ?, salary_change = ?, committee_date = ?,
            submit_status = ?, updated_at = ?
        WHERE guid = ?
        "#,
    )
    .bind(&summary.content)
    .bind(summary.ladder_id.map(|id| id.to_string()))
    .bind(aspect_changes_json(&summary.aspect_changes)?)
    .bind(&summary.performance_label)
    .bind(&summary.ladder_change)
    .bind(summary.bonus)
    .bind(summary.salary_change)
    .bind(summary.committee_date.map(|d| d.format(DATE_FORMAT).to_string()))
    .bind(summary.submit_status.as_str())
    .bind(summary.updated_at.to_rfc3339())
    .bind(summary.id.to_string())
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Summary {}", summary.id)));
    }

    Ok(())
}

pub async fn find_summary(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Summary>> {
    let row = sqlx::query("SELECT * FROM summaries WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

    row.map(|r| summary_from_row(&r)).transpose()
}

pub async fn get_summary(conn: &mut SqliteConnection, id: Uuid) -> Result<Summary> {
    find_summary(conn, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Summary {}", id)))
}

/// At most one summary exists per note
pub async fn find_summary_by_note(
    conn: &mut SqliteConnection,
    note_id: Uuid,
) -> Result<Option<Summary>> {
    let row = sqlx::query("SELECT * FROM summaries WHERE note_id = ?")
        .bind(note_id.to_string())
        .fetch_optional(conn)
        .await?;

    row.map(|r| summary_from_row(&r)).transpose()
}

/// Committee dates of every promotion, evaluation or mapping summary owned
/// by the user, with the summary creation date standing in where no
/// committee date was recorded. Feeds the performance table's committee
/// metrics.
pub async fn committee_effective_dates(
    conn: &mut SqliteConnection,
    owner_id: Uuid,
) -> Result<Vec<NaiveDate>> {
    let rows = sqlx::query(
        r#"
        SELECT COALESCE(s.committee_date, date(s.created_at)) AS committee_date
        FROM summaries s
        JOIN notes n ON n.guid = s.note_id
        WHERE n.owner_id = ?
          AND n.proposal_type IN ('PROMOTION', 'EVALUATION', 'MAPPING')
        ORDER BY committee_date
        "#,
    )
    .bind(owner_id.to_string())
    .fetch_all(conn)
    .await?;

    rows.iter()
        .map(|row| {
            let raw: String = row.get("committee_date");
            NaiveDate::parse_from_str(&raw, DATE_FORMAT)
                .map_err(|e| Error::Internal(format!("Bad committee date {}: {}", raw, e)))
        })
        .collect()
}
