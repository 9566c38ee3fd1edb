//! Entity query modules
//!
//! Every function takes `&mut SqliteConnection` so reads run on a pooled
//! connection and writes compose inside the caller's transaction together
//! with the signal-driven derived writes.

pub mod access;
pub mod api_keys;
pub mod career;
pub mod committees;
pub mod feedbacks;
pub mod forms;
pub mod ladders;
pub mod notes;
pub mod one_on_ones;
pub mod orgs;
pub mod overrides;
pub mod snapshots;
pub mod summaries;
pub mod timeline;
pub mod users;
pub mod value_tags;

use chrono::{DateTime, NaiveDate, Utc};
use compass_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// Date columns are stored as `YYYY-MM-DD` TEXT
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn guid(row: &SqliteRow, col: &str) -> Result<Uuid> {
    let s: String = row.get(col);
    Uuid::parse_str(&s).map_err(|e| Error::Internal(format!("Bad guid in {}: {}", col, e)))
}

pub(crate) fn opt_guid(row: &SqliteRow, col: &str) -> Result<Option<Uuid>> {
    let s: Option<String> = row.get(col);
    s.map(|s| {
        Uuid::parse_str(&s).map_err(|e| Error::Internal(format!("Bad guid in {}: {}", col, e)))
    })
    .transpose()
}

pub(crate) fn timestamp(row: &SqliteRow, col: &str) -> Result<DateTime<Utc>> {
    let s: String = row.get(col);
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Bad timestamp in {}: {}", col, e)))
}

pub(crate) fn opt_timestamp(row: &SqliteRow, col: &str) -> Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(col);
    s.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::Internal(format!("Bad timestamp in {}: {}", col, e)))
    })
    .transpose()
}

pub(crate) fn date(row: &SqliteRow, col: &str) -> Result<NaiveDate> {
    let s: String = row.get(col);
    NaiveDate::parse_from_str(&s, DATE_FORMAT)
        .map_err(|e| Error::Internal(format!("Bad date in {}: {}", col, e)))
}

pub(crate) fn opt_date(row: &SqliteRow, col: &str) -> Result<Option<NaiveDate>> {
    let s: Option<String> = row.get(col);
    s.map(|s| {
        NaiveDate::parse_from_str(&s, DATE_FORMAT)
            .map_err(|e| Error::Internal(format!("Bad date in {}: {}", col, e)))
    })
    .transpose()
}
