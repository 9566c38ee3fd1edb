//! Ladder catalogue and pay bands

use compass_common::ids::new_id;
use compass_common::models::{Ladder, LadderAspect, PayBand};
use compass_common::{Error, Result};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{guid, timestamp};

fn ladder_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Ladder> {
    Ok(Ladder {
        id: guid(row, "guid")?,
        code: row.get("code"),
        name: row.get("name"),
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

pub async fn insert_ladder(conn: &mut SqliteConnection, ladder: &Ladder) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ladders (guid, code, name, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(ladder.id.to_string())
    .bind(&ladder.code)
    .bind(&ladder.name)
    .bind(ladder.created_at.to_rfc3339())
    .bind(ladder.updated_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn find_ladder(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Ladder>> {
    let row = sqlx::query("SELECT * FROM ladders WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

    row.map(|r| ladder_from_row(&r)).transpose()
}

pub async fn get_ladder(conn: &mut SqliteConnection, id: Uuid) -> Result<Ladder> {
    find_ladder(conn, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Ladder {}", id)))
}

pub async fn find_ladder_by_code(
    conn: &mut SqliteConnection,
    code: &str,
) -> Result<Option<Ladder>> {
    let row = sqlx::query("SELECT * FROM ladders WHERE code = ?")
        .bind(code)
        .fetch_optional(conn)
        .await?;

    row.map(|r| ladder_from_row(&r)).transpose()
}

pub async fn list_ladders(conn: &mut SqliteConnection) -> Result<Vec<Ladder>> {
    let rows = sqlx::query("SELECT * FROM ladders ORDER BY code")
        .fetch_all(conn)
        .await?;

    rows.iter().map(ladder_from_row).collect()
}

pub async fn insert_aspect(conn: &mut SqliteConnection, aspect: &LadderAspect) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ladder_aspects (guid, ladder_id, code, name, sort_order)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(aspect.id.to_string())
    .bind(aspect.ladder_id.to_string())
    .bind(&aspect.code)
    .bind(&aspect.name)
    .bind(aspect.sort_order)
    .execute(conn)
    .await?;

    Ok(())
}

/// Aspects in display order; event text for aspect changes follows this
pub async fn list_aspects(
    conn: &mut SqliteConnection,
    ladder_id: Uuid,
) -> Result<Vec<LadderAspect>> {
    let rows = sqlx::query(
        "SELECT * FROM ladder_aspects WHERE ladder_id = ? ORDER BY sort_order, code",
    )
    .bind(ladder_id.to_string())
    .fetch_all(conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(LadderAspect {
                id: guid(row, "guid")?,
                ladder_id: guid(row, "ladder_id")?,
                code: row.get("code"),
                name: row.get("name"),
                sort_order: row.get("sort_order"),
            })
        })
        .collect()
}

pub async fn find_pay_band(conn: &mut SqliteConnection, number: f64) -> Result<Option<PayBand>> {
    let row = sqlx::query("SELECT guid, number FROM pay_bands WHERE number = ?")
        .bind(number)
        .fetch_optional(conn)
        .await?;

    row.map(|r| {
        Ok(PayBand {
            id: guid(&r, "guid")?,
            number: r.get("number"),
        })
    })
    .transpose()
}

/// Bands are created on demand as committees move people in half steps
pub async fn get_or_create_pay_band(conn: &mut SqliteConnection, number: f64) -> Result<PayBand> {
    if let Some(band) = find_pay_band(&mut *conn, number).await? {
        return Ok(band);
    }

    let band = PayBand {
        id: new_id(),
        number,
    };
    sqlx::query("INSERT INTO pay_bands (guid, number) VALUES (?, ?)")
        .bind(band.id.to_string())
        .bind(band.number)
        .execute(conn)
        .await?;

    Ok(band)
}
