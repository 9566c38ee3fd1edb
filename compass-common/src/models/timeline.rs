//! Career timeline events

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Visibility mask bits. An event is visible to an audience when the
/// corresponding bit is set; new events default to `SELF`.
pub mod visibility {
    pub const SELF: i64 = 1;
    pub const COMMITTEE: i64 = 2;
    pub const LEADER: i64 = 4;
    pub const HR: i64 = 8;
    pub const EXEC: i64 = 16;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    SeniorityChange,
    PayChange,
    BonusPayout,
    Evaluation,
    Mapping,
    TitleChange,
    StockGrant,
    Notice,
    LadderChanged,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SeniorityChange => "SENIORITY_CHANGE",
            EventType::PayChange => "PAY_CHANGE",
            EventType::BonusPayout => "BONUS_PAYOUT",
            EventType::Evaluation => "EVALUATION",
            EventType::Mapping => "MAPPING",
            EventType::TitleChange => "TITLE_CHANGE",
            EventType::StockGrant => "STOCK_GRANT",
            EventType::Notice => "NOTICE",
            EventType::LadderChanged => "LADDER_CHANGED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "SENIORITY_CHANGE" => Ok(EventType::SeniorityChange),
            "PAY_CHANGE" => Ok(EventType::PayChange),
            "BONUS_PAYOUT" => Ok(EventType::BonusPayout),
            "EVALUATION" => Ok(EventType::Evaluation),
            "MAPPING" => Ok(EventType::Mapping),
            "TITLE_CHANGE" => Ok(EventType::TitleChange),
            "STOCK_GRANT" => Ok(EventType::StockGrant),
            "NOTICE" => Ok(EventType::Notice),
            "LADDER_CHANGED" => Ok(EventType::LadderChanged),
            other => Err(Error::InvalidInput(format!("Unknown event type: {}", other))),
        }
    }
}

/// Link back to the artefact an event was derived from. Stored as a
/// `(kind, id)` pair so the pipeline idempotency check can query by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EventSource {
    Summary(Uuid),
    TitleChange(Uuid),
    Notice(Uuid),
    StockGrant(Uuid),
}

impl EventSource {
    pub fn kind_str(&self) -> &'static str {
        match self {
            EventSource::Summary(_) => "summary",
            EventSource::TitleChange(_) => "title_change",
            EventSource::Notice(_) => "notice",
            EventSource::StockGrant(_) => "stock_grant",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            EventSource::Summary(id)
            | EventSource::TitleChange(id)
            | EventSource::Notice(id)
            | EventSource::StockGrant(id) => *id,
        }
    }

    pub fn from_parts(kind: &str, id: Uuid) -> Result<Self> {
        match kind {
            "summary" => Ok(EventSource::Summary(id)),
            "title_change" => Ok(EventSource::TitleChange(id)),
            "notice" => Ok(EventSource::Notice(id)),
            "stock_grant" => Ok(EventSource::StockGrant(id)),
            other => Err(Error::InvalidInput(format!(
                "Unknown event source kind: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_type: EventType,
    /// Human-readable line, capped at 512 characters
    pub summary_text: String,
    pub effective_date: NaiveDate,
    pub source: Option<EventSource>,
    pub visibility_mask: i64,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
