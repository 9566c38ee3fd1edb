//! Organisation graph persistence: organizations, departments, tribes,
//! chapters, teams

use compass_common::models::{Chapter, Department, OrgCategory, Organization, Team, Tribe};
use compass_common::{Error, Result};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{guid, opt_guid, timestamp};

fn organization_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Organization> {
    Ok(Organization {
        id: guid(row, "guid")?,
        name: row.get("name"),
        ceo: opt_guid(row, "ceo")?,
        vp: opt_guid(row, "vp")?,
        cto: opt_guid(row, "cto")?,
        cpo: opt_guid(row, "cpo")?,
        cfo: opt_guid(row, "cfo")?,
        hr_manager: opt_guid(row, "hr_manager")?,
        sales_manager: opt_guid(row, "sales_manager")?,
        function_owner: opt_guid(row, "function_owner")?,
        maintainer: opt_guid(row, "maintainer")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

pub async fn insert_organization(conn: &mut SqliteConnection, org: &Organization) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO organizations (
            guid, name, ceo, vp, cto, cpo, cfo, hr_manager, sales_manager,
            function_owner, maintainer, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(org.id.to_string())
    .bind(&org.name)
    .bind(org.ceo.map(|id| id.to_string()))
    .bind(org.vp.map(|id| id.to_string()))
    .bind(org.cto.map(|id| id.to_string()))
    .bind(org.cpo.map(|id| id.to_string()))
    .bind(org.cfo.map(|id| id.to_string()))
    .bind(org.hr_manager.map(|id| id.to_string()))
    .bind(org.sales_manager.map(|id| id.to_string()))
    .bind(org.function_owner.map(|id| id.to_string()))
    .bind(org.maintainer.map(|id| id.to_string()))
    .bind(org.created_at.to_rfc3339())
    .bind(org.updated_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn update_organization(conn: &mut SqliteConnection, org: &Organization) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE organizations SET
            name = ?, ceo = ?, vp = ?, cto = ?, cpo = ?, cfo = ?,
            hr_manager = ?, sales_manager = ?, function_owner = ?,
            maintainer = ?, updated_at = ?
        WHERE guid = ?
        "#,
    )
    .bind(&org.name)
    .bind(org.ceo.map(|id| id.to_string()))
    .bind(org.vp.map(|id| id.to_string()))
    .bind(org.cto.map(|id| id.to_string()))
    .bind(org.cpo.map(|id| id.to_string()))
    .bind(org.cfo.map(|id| id.to_string()))
    .bind(org.hr_manager.map(|id| id.to_string()))
    .bind(org.sales_manager.map(|id| id.to_string()))
    .bind(org.function_owner.map(|id| id.to_string()))
    .bind(org.maintainer.map(|id| id.to_string()))
    .bind(org.updated_at.to_rfc3339())
    .bind(org.id.to_string())
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Organization {}", org.id)));
    }

    Ok(())
}

pub async fn find_organization(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> Result<Option<Organization>> {
    let row = sqlx::query("SELECT * FROM organizations WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

    row.map(|r| organization_from_row(&r)).transpose()
}

pub async fn list_organizations(conn: &mut SqliteConnection) -> Result<Vec<Organization>> {
    let rows = sqlx::query("SELECT * FROM organizations ORDER BY name")
        .fetch_all(conn)
        .await?;

    rows.iter().map(organization_from_row).collect()
}

pub async fn insert_department(conn: &mut SqliteConnection, dept: &Department) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO departments (guid, name, organization_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(dept.id.to_string())
    .bind(&dept.name)
    .bind(dept.organization_id.to_string())
    .bind(dept.created_at.to_rfc3339())
    .bind(dept.updated_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn find_department(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Department>> {
    let row = sqlx::query("SELECT * FROM departments WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

    row.map(|r| {
        Ok(Department {
            id: guid(&r, "guid")?,
            name: r.get("name"),
            organization_id: guid(&r, "organization_id")?,
            created_at: timestamp(&r, "created_at")?,
            updated_at: timestamp(&r, "updated_at")?,
        })
    })
    .transpose()
}

fn tribe_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Tribe> {
    let category: Option<String> = row.get("category");
    Ok(Tribe {
        id: guid(row, "guid")?,
        name: row.get("name"),
        department_id: opt_guid(row, "department_id")?,
        category: category.map(|c| OrgCategory::parse(&c)).transpose()?,
        product_director: opt_guid(row, "product_director")?,
        engineering_director: opt_guid(row, "engineering_director")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

pub async fn insert_tribe(conn: &mut SqliteConnection, tribe: &Tribe) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO tribes (
            guid, name, department_id, category, product_director,
            engineering_director, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(tribe.id.to_string())
    .bind(&tribe.name)
    .bind(tribe.department_id.map(|id| id.to_string()))
    .bind(tribe.category.map(|c| c.as_str()))
    .bind(tribe.product_director.map(|id| id.to_string()))
    .bind(tribe.engineering_director.map(|id| id.to_string()))
    .bind(tribe.created_at.to_rfc3339())
    .bind(tribe.updated_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn update_tribe(conn: &mut SqliteConnection, tribe: &Tribe) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE tribes SET
            name = ?, department_id = ?, category = ?, product_director = ?,
            engineering_director = ?, updated_at = ?
        WHERE guid = ?
        "#,
    )
    .bind(&tribe.name)
    .bind(tribe.department_id.map(|id| id.to_string()))
    .bind(tribe.category.map(|c| c.as_str()))
    .bind(tribe.product_director.map(|id| id.to_string()))
    .bind(tribe.engineering_director.map(|id| id.to_string()))
    .bind(tribe.updated_at.to_rfc3339())
    .bind(tribe.id.to_string())
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Tribe {}", tribe.id)));
    }

    Ok(())
}

pub async fn find_tribe(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Tribe>> {
    let row = sqlx::query("SELECT * FROM tribes WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

    row.map(|r| tribe_from_row(&r)).transpose()
}

pub async fn list_tribes(conn: &mut SqliteConnection) -> Result<Vec<Tribe>> {
    let rows = sqlx::query("SELECT * FROM tribes ORDER BY name")
        .fetch_all(conn)
        .await?;

    rows.iter().map(tribe_from_row).collect()
}

fn chapter_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Chapter> {
    Ok(Chapter {
        id: guid(row, "guid")?,
        name: row.get("name"),
        department_id: opt_guid(row, "department_id")?,
        leader: opt_guid(row, "leader")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

pub async fn insert_chapter(conn: &mut SqliteConnection, chapter: &Chapter) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO chapters (guid, name, department_id, leader, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(chapter.id.to_string())
    .bind(&chapter.name)
    .bind(chapter.department_id.map(|id| id.to_string()))
    .bind(chapter.leader.map(|id| id.to_string()))
    .bind(chapter.created_at.to_rfc3339())
    .bind(chapter.updated_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn find_chapter(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Chapter>> {
    let row = sqlx::query("SELECT * FROM chapters WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

    row.map(|r| chapter_from_row(&r)).transpose()
}

pub async fn list_chapters(conn: &mut SqliteConnection) -> Result<Vec<Chapter>> {
    let rows = sqlx::query("SELECT * FROM chapters ORDER BY name")
        .fetch_all(conn)
        .await?;

    rows.iter().map(chapter_from_row).collect()
}

fn team_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Team> {
    let category: Option<String> = row.get("category");
    Ok(Team {
        id: guid(row, "guid")?,
        name: row.get("name"),
        department_id: opt_guid(row, "department_id")?,
        tribe_id: opt_guid(row, "tribe_id")?,
        leader: opt_guid(row, "leader")?,
        category: category.map(|c| OrgCategory::parse(&c)).transpose()?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

pub async fn insert_team(conn: &mut SqliteConnection, team: &Team) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO teams (
            guid, name, department_id, tribe_id, leader, category, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(team.id.to_string())
    .bind(&team.name)
    .bind(team.department_id.map(|id| id.to_string()))
    .bind(team.tribe_id.map(|id| id.to_string()))
    .bind(team.leader.map(|id| id.to_string()))
    .bind(team.category.map(|c| c.as_str()))
    .bind(team.created_at.to_rfc3339())
    .bind(team.updated_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

/// Full-row update; the handler compares the previous tribe to decide
/// whether to raise the tribe-change signal
pub async fn update_team(conn: &mut SqliteConnection, team: &Team) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE teams SET
            name = ?, department_id = ?, tribe_id = ?, leader = ?,
            category = ?, updated_at = ?
        WHERE guid = ?
        "#,
    )
    .bind(&team.name)
    .bind(team.department_id.map(|id| id.to_string()))
    .bind(team.tribe_id.map(|id| id.to_string()))
    .bind(team.leader.map(|id| id.to_string()))
    .bind(team.category.map(|c| c.as_str()))
    .bind(team.updated_at.to_rfc3339())
    .bind(team.id.to_string())
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Team {}", team.id)));
    }

    Ok(())
}

pub async fn find_team(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Team>> {
    let row = sqlx::query("SELECT * FROM teams WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

    row.map(|r| team_from_row(&r)).transpose()
}

pub async fn list_teams(conn: &mut SqliteConnection) -> Result<Vec<Team>> {
    let rows = sqlx::query("SELECT * FROM teams ORDER BY name")
        .fetch_all(conn)
        .await?;

    rows.iter().map(team_from_row).collect()
}
