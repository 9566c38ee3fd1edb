//! User persistence

use compass_common::models::User;
use compass_common::{Error, Result};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{guid, opt_guid, timestamp};

const USER_COLUMNS: &str = "guid, email, display_name, gmail, phone, department_id, chapter_id, \
     team_id, organization_id, leader_id, agile_coach_id, committee_id, created_at, updated_at";

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: guid(row, "guid")?,
        email: row.get("email"),
        display_name: row.get("display_name"),
        gmail: row.get("gmail"),
        phone: row.get("phone"),
        department_id: opt_guid(row, "department_id")?,
        chapter_id: opt_guid(row, "chapter_id")?,
        team_id: opt_guid(row, "team_id")?,
        organization_id: opt_guid(row, "organization_id")?,
        leader_id: opt_guid(row, "leader_id")?,
        agile_coach_id: opt_guid(row, "agile_coach_id")?,
        committee_id: opt_guid(row, "committee_id")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

pub async fn insert_user(conn: &mut SqliteConnection, user: &User) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (
            guid, email, display_name, gmail, phone, department_id, chapter_id,
            team_id, organization_id, leader_id, agile_coach_id, committee_id,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.id.to_string())
    .bind(&user.email)
    .bind(&user.display_name)
    .bind(&user.gmail)
    .bind(&user.phone)
    .bind(user.department_id.map(|id| id.to_string()))
    .bind(user.chapter_id.map(|id| id.to_string()))
    .bind(user.team_id.map(|id| id.to_string()))
    .bind(user.organization_id.map(|id| id.to_string()))
    .bind(user.leader_id.map(|id| id.to_string()))
    .bind(user.agile_coach_id.map(|id| id.to_string()))
    .bind(user.committee_id.map(|id| id.to_string()))
    .bind(user.created_at.to_rfc3339())
    .bind(user.updated_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

/// Full-row update; the handler compares old and new org fields to decide
/// which signals to raise
pub async fn update_user(conn: &mut SqliteConnection, user: &User) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE users SET
            email = ?, display_name = ?, gmail = ?, phone = ?,
            department_id = ?, chapter_id = ?, team_id = ?, organization_id = ?,
            leader_id = ?, agile_coach_id = ?, committee_id = ?, updated_at = ?
        WHERE guid = ?
        "#,
    )
    .bind(&user.email)
    .bind(&user.display_name)
    .bind(&user.gmail)
    .bind(&user.phone)
    .bind(user.department_id.map(|id| id.to_string()))
    .bind(user.chapter_id.map(|id| id.to_string()))
    .bind(user.team_id.map(|id| id.to_string()))
    .bind(user.organization_id.map(|id| id.to_string()))
    .bind(user.leader_id.map(|id| id.to_string()))
    .bind(user.agile_coach_id.map(|id| id.to_string()))
    .bind(user.committee_id.map(|id| id.to_string()))
    .bind(user.updated_at.to_rfc3339())
    .bind(user.id.to_string())
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("User {}", user.id)));
    }

    Ok(())
}

pub async fn find_user(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE guid = ?", USER_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

    row.map(|r| user_from_row(&r)).transpose()
}

pub async fn get_user(conn: &mut SqliteConnection, id: Uuid) -> Result<User> {
    find_user(conn, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {}", id)))
}

pub async fn get_user_by_email(conn: &mut SqliteConnection, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM users WHERE email = ?",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_optional(conn)
    .await?;

    row.map(|r| user_from_row(&r)).transpose()
}

pub async fn list_users(conn: &mut SqliteConnection) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM users ORDER BY display_name",
        USER_COLUMNS
    ))
    .fetch_all(conn)
    .await?;

    rows.iter().map(user_from_row).collect()
}

pub async fn list_users_by_leader(
    conn: &mut SqliteConnection,
    leader_id: Uuid,
) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM users WHERE leader_id = ? ORDER BY display_name",
        USER_COLUMNS
    ))
    .bind(leader_id.to_string())
    .fetch_all(conn)
    .await?;

    rows.iter().map(user_from_row).collect()
}

/// Users whose profile points at the given committee
pub async fn list_user_ids_by_committee(
    conn: &mut SqliteConnection,
    committee_id: Uuid,
) -> Result<Vec<Uuid>> {
    let rows = sqlx::query("SELECT guid FROM users WHERE committee_id = ?")
        .bind(committee_id.to_string())
        .fetch_all(conn)
        .await?;

    rows.iter().map(|r| guid(r, "guid")).collect()
}

pub async fn list_user_ids_by_team(
    conn: &mut SqliteConnection,
    team_id: Uuid,
) -> Result<Vec<Uuid>> {
    let rows = sqlx::query("SELECT guid FROM users WHERE team_id = ?")
        .bind(team_id.to_string())
        .fetch_all(conn)
        .await?;

    rows.iter().map(|r| guid(r, "guid")).collect()
}

pub async fn list_all_user_ids(conn: &mut SqliteConnection) -> Result<Vec<Uuid>> {
    let rows = sqlx::query("SELECT guid FROM users").fetch_all(conn).await?;
    rows.iter().map(|r| guid(r, "guid")).collect()
}
