//! Committees, their member lists, role slots, and the role catalogue

use chrono::Utc;
use compass_common::models::{Committee, Role, RoleScope, RoleType};
use compass_common::{Error, Result};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{guid, timestamp};

fn role_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Role> {
    let role_type: String = row.get("role_type");
    let role_scope: String = row.get("role_scope");
    Ok(Role {
        id: guid(row, "guid")?,
        role_type: RoleType::parse(&role_type)?,
        role_scope: RoleScope::parse(&role_scope)?,
    })
}

pub async fn insert_role(conn: &mut SqliteConnection, role: &Role) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO roles (guid, role_type, role_scope, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(role.id.to_string())
    .bind(role.role_type.as_str())
    .bind(role.role_scope.as_str())
    .bind(Utc::now().to_rfc3339())
    .execute(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.message().contains("UNIQUE") => Error::Conflict(
            format!(
                "Role ({}, {}) already exists",
                role.role_type.as_str(),
                role.role_scope.as_str()
            ),
        ),
        other => Error::Database(other),
    })?;

    Ok(())
}

pub async fn get_role(conn: &mut SqliteConnection, id: Uuid) -> Result<Role> {
    let row = sqlx::query("SELECT guid, role_type, role_scope FROM roles WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Role {}", id)))?;

    role_from_row(&row)
}

pub async fn list_roles(conn: &mut SqliteConnection) -> Result<Vec<Role>> {
    let rows = sqlx::query("SELECT guid, role_type, role_scope FROM roles ORDER BY role_type")
        .fetch_all(conn)
        .await?;

    rows.iter().map(role_from_row).collect()
}

pub async fn insert_committee(conn: &mut SqliteConnection, committee: &Committee) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO committees (guid, name, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(committee.id.to_string())
    .bind(&committee.name)
    .bind(committee.created_at.to_rfc3339())
    .bind(committee.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    set_members(conn, committee.id, &committee.members).await?;
    let role_ids: Vec<Uuid> = committee.roles.iter().map(|r| r.id).collect();
    set_roles(conn, committee.id, &role_ids).await?;

    Ok(())
}

/// Replace the member list
pub async fn set_members(
    conn: &mut SqliteConnection,
    committee_id: Uuid,
    members: &[Uuid],
) -> Result<()> {
    sqlx::query("DELETE FROM committee_members WHERE committee_id = ?")
        .bind(committee_id.to_string())
        .execute(&mut *conn)
        .await?;

    for user_id in members {
        sqlx::query(
            "INSERT OR IGNORE INTO committee_members (committee_id, user_id, created_at) \
             VALUES (?, ?, ?)",
        )
        .bind(committee_id.to_string())
        .bind(user_id.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Replace the role-slot list
pub async fn set_roles(
    conn: &mut SqliteConnection,
    committee_id: Uuid,
    role_ids: &[Uuid],
) -> Result<()> {
    sqlx::query("DELETE FROM committee_roles WHERE committee_id = ?")
        .bind(committee_id.to_string())
        .execute(&mut *conn)
        .await?;

    for role_id in role_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO committee_roles (committee_id, role_id, created_at) \
             VALUES (?, ?, ?)",
        )
        .bind(committee_id.to_string())
        .bind(role_id.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub async fn member_ids(conn: &mut SqliteConnection, committee_id: Uuid) -> Result<Vec<Uuid>> {
    let rows = sqlx::query(
        "SELECT user_id FROM committee_members WHERE committee_id = ? ORDER BY created_at, user_id",
    )
    .bind(committee_id.to_string())
    .fetch_all(conn)
    .await?;

    rows.iter().map(|r| guid(r, "user_id")).collect()
}

/// Role slots of a committee, in insertion order. Later-configured slots win
/// when the access policy writes per-user rows, so ordering matters here.
pub async fn role_entries(conn: &mut SqliteConnection, committee_id: Uuid) -> Result<Vec<Role>> {
    let rows = sqlx::query(
        r#"
        SELECT r.guid, r.role_type, r.role_scope
        FROM committee_roles cr
        JOIN roles r ON r.guid = cr.role_id
        WHERE cr.committee_id = ?
        ORDER BY cr.created_at, r.guid
        "#,
    )
    .bind(committee_id.to_string())
    .fetch_all(conn)
    .await?;

    rows.iter().map(role_from_row).collect()
}

pub async fn find_committee(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> Result<Option<Committee>> {
    let row = sqlx::query("SELECT guid, name, created_at, updated_at FROM committees WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let committee_id = guid(&row, "guid")?;
    let name: String = row.get("name");
    let created_at = timestamp(&row, "created_at")?;
    let updated_at = timestamp(&row, "updated_at")?;

    let members = member_ids(&mut *conn, committee_id).await?;
    let roles = role_entries(&mut *conn, committee_id).await?;

    Ok(Some(Committee {
        id: committee_id,
        name,
        members,
        roles,
        created_at,
        updated_at,
    }))
}

pub async fn get_committee(conn: &mut SqliteConnection, id: Uuid) -> Result<Committee> {
    find_committee(conn, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Committee {}", id)))
}

pub async fn list_committees(conn: &mut SqliteConnection) -> Result<Vec<Committee>> {
    let rows = sqlx::query("SELECT guid FROM committees ORDER BY name")
        .fetch_all(&mut *conn)
        .await?;

    let ids: Vec<Uuid> = rows
        .iter()
        .map(|r| guid(r, "guid"))
        .collect::<Result<_>>()?;

    let mut committees = Vec::with_capacity(ids.len());
    for id in ids {
        committees.push(get_committee(&mut *conn, id).await?);
    }

    Ok(committees)
}
