//! Title changes, notices, and stock grants

use compass_common::models::{Notice, StockGrant, TitleChange};
use compass_common::{Error, Result};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{date, guid, timestamp, DATE_FORMAT};

fn title_change_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<TitleChange> {
    Ok(TitleChange {
        id: guid(row, "guid")?,
        user_id: guid(row, "user_id")?,
        old_title: row.get("old_title"),
        new_title: row.get("new_title"),
        effective_date: date(row, "effective_date")?,
        created_at: timestamp(row, "created_at")?,
    })
}

pub async fn insert_title_change(
    conn: &mut SqliteConnection,
    change: &TitleChange,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO title_changes (guid, user_id, old_title, new_title, effective_date, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(change.id.to_string())
    .bind(change.user_id.to_string())
    .bind(&change.old_title)
    .bind(&change.new_title)
    .bind(change.effective_date.format(DATE_FORMAT).to_string())
    .bind(change.created_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn get_title_change(conn: &mut SqliteConnection, id: Uuid) -> Result<TitleChange> {
    let row = sqlx::query("SELECT * FROM title_changes WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

    match row {
        Some(row) => title_change_from_row(&row),
        None => Err(Error::NotFound(format!("Title change {}", id))),
    }
}

pub async fn list_title_changes(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> Result<Vec<TitleChange>> {
    let rows = sqlx::query(
        "SELECT * FROM title_changes WHERE user_id = ? ORDER BY effective_date DESC",
    )
    .bind(user_id.to_string())
    .fetch_all(conn)
    .await?;

    rows.iter().map(title_change_from_row).collect()
}

pub async fn insert_notice(conn: &mut SqliteConnection, notice: &Notice) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO notices (guid, user_id, notice_type, effective_date, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(notice.id.to_string())
    .bind(notice.user_id.to_string())
    .bind(&notice.notice_type)
    .bind(notice.effective_date.format(DATE_FORMAT).to_string())
    .bind(notice.created_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn get_notice(conn: &mut SqliteConnection, id: Uuid) -> Result<Notice> {
    let row = sqlx::query("SELECT * FROM notices WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

    match row {
        Some(row) => Ok(Notice {
            id: guid(&row, "guid")?,
            user_id: guid(&row, "user_id")?,
            notice_type: row.get("notice_type"),
            effective_date: date(&row, "effective_date")?,
            created_at: timestamp(&row, "created_at")?,
        }),
        None => Err(Error::NotFound(format!("Notice {}", id))),
    }
}

pub async fn insert_stock_grant(conn: &mut SqliteConnection, grant: &StockGrant) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_grants (guid, user_id, amount, effective_date, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(grant.id.to_string())
    .bind(grant.user_id.to_string())
    .bind(grant.amount)
    .bind(grant.effective_date.format(DATE_FORMAT).to_string())
    .bind(grant.created_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn get_stock_grant(conn: &mut SqliteConnection, id: Uuid) -> Result<StockGrant> {
    let row = sqlx::query("SELECT * FROM stock_grants WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

    match row {
        Some(row) => Ok(StockGrant {
            id: guid(&row, "guid")?,
            user_id: guid(&row, "user_id")?,
            amount: row.get("amount"),
            effective_date: date(&row, "effective_date")?,
            created_at: timestamp(&row, "created_at")?,
        }),
        None => Err(Error::NotFound(format!("Stock grant {}", id))),
    }
}
