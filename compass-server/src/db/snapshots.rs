//! Snapshot persistence. All three snapshot kinds are insert-only; "latest"
//! is resolved by `effective_date DESC, created_at DESC, rowid DESC`.

use chrono::NaiveDate;
use compass_common::models::{
    CompensationSnapshot, OrgAssignmentSnapshot, SeniorityLevel, SenioritySnapshot, Stage,
};
use compass_common::{Error, Result};
use sqlx::{Row, SqliteConnection};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::{date, guid, opt_guid, timestamp, DATE_FORMAT};

const LATEST_ORDER: &str = "ORDER BY effective_date DESC, created_at DESC, rowid DESC LIMIT 1";

fn compensation_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CompensationSnapshot> {
    Ok(CompensationSnapshot {
        id: guid(row, "guid")?,
        user_id: guid(row, "user_id")?,
        pay_band_id: guid(row, "pay_band_id")?,
        pay_band_number: row.get("pay_band_number"),
        salary_change: row.get("salary_change"),
        bonus_percentage: row.get("bonus_percentage"),
        effective_date: date(row, "effective_date")?,
        source_summary_id: opt_guid(row, "source_summary_id")?,
        created_at: timestamp(row, "created_at")?,
    })
}

pub async fn insert_compensation(
    conn: &mut SqliteConnection,
    snapshot: &CompensationSnapshot,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO compensation_snapshots (
            guid, user_id, pay_band_id, pay_band_number, salary_change,
            bonus_percentage, effective_date, source_summary_id, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(snapshot.id.to_string())
    .bind(snapshot.user_id.to_string())
    .bind(snapshot.pay_band_id.to_string())
    .bind(snapshot.pay_band_number)
    .bind(snapshot.salary_change)
    .bind(snapshot.bonus_percentage)
    .bind(snapshot.effective_date.format(DATE_FORMAT).to_string())
    .bind(snapshot.source_summary_id.map(|id| id.to_string()))
    .bind(snapshot.created_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn latest_compensation(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> Result<Option<CompensationSnapshot>> {
    let row = sqlx::query(&format!(
        "SELECT * FROM compensation_snapshots WHERE user_id = ? {}",
        LATEST_ORDER
    ))
    .bind(user_id.to_string())
    .fetch_optional(conn)
    .await?;

    row.map(|r| compensation_from_row(&r)).transpose()
}

fn seniority_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SenioritySnapshot> {
    let details: String = row.get("details");
    let details: BTreeMap<String, i64> = serde_json::from_str(&details)
        .map_err(|e| Error::Internal(format!("Bad details JSON: {}", e)))?;
    let stages: String = row.get("stages");
    let stages: BTreeMap<String, Stage> = serde_json::from_str(&stages)
        .map_err(|e| Error::Internal(format!("Bad stages JSON: {}", e)))?;
    let seniority_level: Option<String> = row.get("seniority_level");

    Ok(SenioritySnapshot {
        id: guid(row, "guid")?,
        user_id: guid(row, "user_id")?,
        ladder_id: guid(row, "ladder_id")?,
        title: row.get("title"),
        overall_score: row.get("overall_score"),
        details,
        stages,
        seniority_level: seniority_level
            .map(|s| SeniorityLevel::parse(&s))
            .transpose()?,
        effective_date: date(row, "effective_date")?,
        source_summary_id: opt_guid(row, "source_summary_id")?,
        created_at: timestamp(row, "created_at")?,
    })
}

pub async fn insert_seniority(
    conn: &mut SqliteConnection,
    snapshot: &SenioritySnapshot,
) -> Result<()> {
    let details = serde_json::to_string(&snapshot.details)
        .map_err(|e| Error::Internal(format!("Cannot encode details: {}", e)))?;
    let stages = serde_json::to_string(&snapshot.stages)
        .map_err(|e| Error::Internal(format!("Cannot encode stages: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO seniority_snapshots (
            guid, user_id, ladder_id, title, overall_score, details, stages,
            seniority_level, effective_date, source_summary_id, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(snapshot.id.to_string())
    .bind(snapshot.user_id.to_string())
    .bind(snapshot.ladder_id.to_string())
    .bind(&snapshot.title)
    .bind(snapshot.overall_score)
    .bind(details)
    .bind(stages)
    .bind(snapshot.seniority_level.map(|l| l.as_str()))
    .bind(snapshot.effective_date.format(DATE_FORMAT).to_string())
    .bind(snapshot.source_summary_id.map(|id| id.to_string()))
    .bind(snapshot.created_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

/// Latest snapshot regardless of ladder; drives ladder-change detection
pub async fn latest_seniority(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> Result<Option<SenioritySnapshot>> {
    let row = sqlx::query(&format!(
        "SELECT * FROM seniority_snapshots WHERE user_id = ? {}",
        LATEST_ORDER
    ))
    .bind(user_id.to_string())
    .fetch_optional(conn)
    .await?;

    row.map(|r| seniority_from_row(&r)).transpose()
}

/// Latest snapshot on one ladder; the merge baseline when a committee keeps
/// or returns to a ladder
pub async fn latest_seniority_for_ladder(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    ladder_id: Uuid,
) -> Result<Option<SenioritySnapshot>> {
    let row = sqlx::query(&format!(
        "SELECT * FROM seniority_snapshots WHERE user_id = ? AND ladder_id = ? {}",
        LATEST_ORDER
    ))
    .bind(user_id.to_string())
    .bind(ladder_id.to_string())
    .fetch_optional(conn)
    .await?;

    row.map(|r| seniority_from_row(&r)).transpose()
}

pub async fn insert_org_assignment(
    conn: &mut SqliteConnection,
    snapshot: &OrgAssignmentSnapshot,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO org_assignment_snapshots (
            guid, user_id, leader_id, team_id, tribe_id, chapter_id,
            department_id, effective_date, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(snapshot.id.to_string())
    .bind(snapshot.user_id.to_string())
    .bind(snapshot.leader_id.map(|id| id.to_string()))
    .bind(snapshot.team_id.map(|id| id.to_string()))
    .bind(snapshot.tribe_id.map(|id| id.to_string()))
    .bind(snapshot.chapter_id.map(|id| id.to_string()))
    .bind(snapshot.department_id.map(|id| id.to_string()))
    .bind(snapshot.effective_date.format(DATE_FORMAT).to_string())
    .bind(snapshot.created_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

fn org_assignment_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<OrgAssignmentSnapshot> {
    Ok(OrgAssignmentSnapshot {
        id: guid(row, "guid")?,
        user_id: guid(row, "user_id")?,
        leader_id: opt_guid(row, "leader_id")?,
        team_id: opt_guid(row, "team_id")?,
        tribe_id: opt_guid(row, "tribe_id")?,
        chapter_id: opt_guid(row, "chapter_id")?,
        department_id: opt_guid(row, "department_id")?,
        effective_date: date(row, "effective_date")?,
        created_at: timestamp(row, "created_at")?,
    })
}

pub async fn latest_org_assignment(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> Result<Option<OrgAssignmentSnapshot>> {
    let row = sqlx::query(&format!(
        "SELECT * FROM org_assignment_snapshots WHERE user_id = ? {}",
        LATEST_ORDER
    ))
    .bind(user_id.to_string())
    .fetch_optional(conn)
    .await?;

    row.map(|r| org_assignment_from_row(&r)).transpose()
}

fn fmt_as_of(as_of: Option<NaiveDate>) -> Option<String> {
    as_of.map(|d| d.format(DATE_FORMAT).to_string())
}

// Dates are stored as %Y-%m-%d text, so the <= comparison below is
// chronological.

pub async fn latest_compensation_as_of(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    as_of: Option<NaiveDate>,
) -> Result<Option<CompensationSnapshot>> {
    let row = sqlx::query(&format!(
        "SELECT * FROM compensation_snapshots
         WHERE user_id = ?1 AND (?2 IS NULL OR effective_date <= ?2) {}",
        LATEST_ORDER
    ))
    .bind(user_id.to_string())
    .bind(fmt_as_of(as_of))
    .fetch_optional(conn)
    .await?;

    row.map(|r| compensation_from_row(&r)).transpose()
}

pub async fn latest_seniority_as_of(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    as_of: Option<NaiveDate>,
) -> Result<Option<SenioritySnapshot>> {
    let row = sqlx::query(&format!(
        "SELECT * FROM seniority_snapshots
         WHERE user_id = ?1 AND (?2 IS NULL OR effective_date <= ?2) {}",
        LATEST_ORDER
    ))
    .bind(user_id.to_string())
    .bind(fmt_as_of(as_of))
    .fetch_optional(conn)
    .await?;

    row.map(|r| seniority_from_row(&r)).transpose()
}

pub async fn latest_org_assignment_as_of(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    as_of: Option<NaiveDate>,
) -> Result<Option<OrgAssignmentSnapshot>> {
    let row = sqlx::query(&format!(
        "SELECT * FROM org_assignment_snapshots
         WHERE user_id = ?1 AND (?2 IS NULL OR effective_date <= ?2) {}",
        LATEST_ORDER
    ))
    .bind(user_id.to_string())
    .bind(fmt_as_of(as_of))
    .fetch_optional(conn)
    .await?;

    row.map(|r| org_assignment_from_row(&r)).transpose()
}

/// Date and percentage of the most recent non-zero bonus payout
pub async fn last_nonzero_bonus(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    as_of: Option<NaiveDate>,
) -> Result<Option<(NaiveDate, i64)>> {
    let row = sqlx::query(&format!(
        "SELECT effective_date, bonus_percentage FROM compensation_snapshots
         WHERE user_id = ?1 AND bonus_percentage != 0
           AND (?2 IS NULL OR effective_date <= ?2) {}",
        LATEST_ORDER
    ))
    .bind(user_id.to_string())
    .bind(fmt_as_of(as_of))
    .fetch_optional(conn)
    .await?;

    row.map(|r| Ok((date(&r, "effective_date")?, r.get("bonus_percentage"))))
        .transpose()
}

/// Date of the most recent non-zero salary change
pub async fn last_nonzero_salary_change(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    as_of: Option<NaiveDate>,
) -> Result<Option<NaiveDate>> {
    let row = sqlx::query(&format!(
        "SELECT effective_date FROM compensation_snapshots
         WHERE user_id = ?1 AND salary_change != 0.0
           AND (?2 IS NULL OR effective_date <= ?2) {}",
        LATEST_ORDER
    ))
    .bind(user_id.to_string())
    .bind(fmt_as_of(as_of))
    .fetch_optional(conn)
    .await?;

    row.map(|r| date(&r, "effective_date")).transpose()
}

/// Whether the user has ever been mapped to a ladder
pub async fn has_any_seniority(conn: &mut SqliteConnection, user_id: Uuid) -> Result<bool> {
    let row = sqlx::query("SELECT 1 FROM seniority_snapshots WHERE user_id = ? LIMIT 1")
        .bind(user_id.to_string())
        .fetch_optional(conn)
        .await?;

    Ok(row.is_some())
}

/// Current ladder code per user, resolved from each user's latest seniority
/// snapshot in one pass. Feeds the population filters of the visibility
/// service.
pub async fn latest_ladder_codes(conn: &mut SqliteConnection) -> Result<HashMap<Uuid, String>> {
    let rows = sqlx::query(
        r#"
        SELECT ranked.user_id AS user_id, l.code AS code
        FROM (
            SELECT user_id, ladder_id,
                   ROW_NUMBER() OVER (
                       PARTITION BY user_id
                       ORDER BY effective_date DESC, created_at DESC, rowid DESC
                   ) AS rn
            FROM seniority_snapshots
        ) ranked
        JOIN ladders l ON l.guid = ranked.ladder_id
        WHERE ranked.rn = 1
        "#,
    )
    .fetch_all(conn)
    .await?;

    let mut codes = HashMap::with_capacity(rows.len());
    for row in &rows {
        codes.insert(guid(row, "user_id")?, row.get::<String, _>("code"));
    }

    Ok(codes)
}
