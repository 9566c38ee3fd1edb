//! Notes and everything hanging off them: summaries, feedback entries,
//! feedback requests, one-on-ones and per-user access rows

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::Stage;

/// Note kinds. `Proposal` notes additionally carry a `proposal_type` and
/// drive the committee workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoteType {
    Goal,
    Meeting,
    Personal,
    Task,
    Proposal,
    Message,
    Template,
    OneOnOne,
    Feedback,
    FeedbackRequest,
}

impl NoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteType::Goal => "GOAL",
            NoteType::Meeting => "MEETING",
            NoteType::Personal => "PERSONAL",
            NoteType::Task => "TASK",
            NoteType::Proposal => "PROPOSAL",
            NoteType::Message => "MESSAGE",
            NoteType::Template => "TEMPLATE",
            NoteType::OneOnOne => "ONE_ON_ONE",
            NoteType::Feedback => "FEEDBACK",
            NoteType::FeedbackRequest => "FEEDBACK_REQUEST",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "GOAL" => Ok(NoteType::Goal),
            "MEETING" => Ok(NoteType::Meeting),
            "PERSONAL" => Ok(NoteType::Personal),
            "TASK" => Ok(NoteType::Task),
            "PROPOSAL" => Ok(NoteType::Proposal),
            "MESSAGE" => Ok(NoteType::Message),
            "TEMPLATE" => Ok(NoteType::Template),
            "ONE_ON_ONE" => Ok(NoteType::OneOnOne),
            "FEEDBACK" => Ok(NoteType::Feedback),
            "FEEDBACK_REQUEST" => Ok(NoteType::FeedbackRequest),
            other => Err(Error::InvalidInput(format!("Unknown note type: {}", other))),
        }
    }
}

/// Committee workflow selected by a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalType {
    Promotion,
    Evaluation,
    Mapping,
    Notice,
}

impl ProposalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalType::Promotion => "PROMOTION",
            ProposalType::Evaluation => "EVALUATION",
            ProposalType::Mapping => "MAPPING",
            ProposalType::Notice => "NOTICE",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PROMOTION" => Ok(ProposalType::Promotion),
            "EVALUATION" => Ok(ProposalType::Evaluation),
            "MAPPING" => Ok(ProposalType::Mapping),
            "NOTICE" => Ok(ProposalType::Notice),
            other => Err(Error::InvalidInput(format!(
                "Unknown proposal type: {}",
                other
            ))),
        }
    }
}

/// Note submission status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmitStatus {
    InitialSubmit,
    Pending,
    Reviewed,
}

impl SubmitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitStatus::InitialSubmit => "INITIAL_SUBMIT",
            SubmitStatus::Pending => "PENDING",
            SubmitStatus::Reviewed => "REVIEWED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "INITIAL_SUBMIT" => Ok(SubmitStatus::InitialSubmit),
            "PENDING" => Ok(SubmitStatus::Pending),
            "REVIEWED" => Ok(SubmitStatus::Reviewed),
            other => Err(Error::InvalidInput(format!(
                "Unknown submit status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub content: String,
    pub date: Option<NaiveDate>,
    pub period: Option<String>,
    pub year: Option<i64>,
    pub note_type: NoteType,
    pub proposal_type: Option<ProposalType>,
    pub mentioned_users: Vec<Uuid>,
    pub is_public: bool,
    pub submit_status: SubmitStatus,
    pub cycle_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// A note is with its committee once it has moved past the initial
    /// draft state
    pub fn is_sent_to_committee(&self) -> bool {
        matches!(
            self.submit_status,
            SubmitStatus::Pending | SubmitStatus::Reviewed
        )
    }
}

/// Summary submission status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SummaryStatus {
    InitialSubmit,
    Done,
}

impl SummaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStatus::InitialSubmit => "INITIAL_SUBMIT",
            SummaryStatus::Done => "DONE",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "INITIAL_SUBMIT" => Ok(SummaryStatus::InitialSubmit),
            "DONE" => Ok(SummaryStatus::Done),
            other => Err(Error::InvalidInput(format!(
                "Unknown summary status: {}",
                other
            ))),
        }
    }
}

/// Per-aspect change recorded on a summary. `new_level` is a delta added to
/// the previous absolute level; a missing previous snapshot defaults to 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AspectChange {
    pub changed: bool,
    pub new_level: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
}

/// Committee outcome attached one-to-one to a proposal or goal note
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: Uuid,
    pub note_id: Uuid,
    pub content: String,
    pub ladder_id: Option<Uuid>,
    pub aspect_changes: BTreeMap<String, AspectChange>,
    pub performance_label: Option<String>,
    pub ladder_change: Option<String>,
    pub bonus: i64,
    /// Pay-band delta on a 0.5 step
    pub salary_change: f64,
    pub committee_date: Option<NaiveDate>,
    pub submit_status: SummaryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Summary {
    /// Effective date stamped on derived snapshots and events
    pub fn effective_date(&self) -> NaiveDate {
        self.committee_date
            .unwrap_or_else(|| self.created_at.date_naive())
    }
}

/// Peer feedback entry. Each entry owns its own FEEDBACK note carrying the
/// access rows; `parent_note_id` points at the note being commented on and
/// `request_id` at the feedback request being answered (both optional, an
/// entry with neither is ad hoc).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    pub note_id: Uuid,
    pub parent_note_id: Option<Uuid>,
    pub request_id: Option<Uuid>,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub evidence: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Invitation to give feedback; invitees are granted view on the request
/// note when the request is created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub id: Uuid,
    pub note_id: Uuid,
    pub deadline: Option<NaiveDate>,
    pub invitees: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One-on-one record attached one-to-one to a note owned by the leader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneOnOne {
    pub id: Uuid,
    pub note_id: Uuid,
    pub member_id: Uuid,
    pub personal_summary: Option<String>,
    pub career_summary: Option<String>,
    pub performance_summary: Option<String>,
    pub communication_summary: Option<String>,
    pub actions: Option<String>,
    pub leader_vibe: Option<String>,
    pub member_vibe: Option<String>,
    pub tags: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tag attachable to one-on-ones. Disabled tags are rejected at attach time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueTag {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
}

/// Review cycle notes may belong to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    pub id: Uuid,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Six-bit permission vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessVector {
    pub can_view: bool,
    pub can_edit: bool,
    pub can_view_summary: bool,
    pub can_write_summary: bool,
    pub can_write_feedback: bool,
    pub can_view_feedbacks: bool,
}

impl AccessVector {
    /// Bitwise-or merge used by the additive grants (feedback receiver,
    /// request invitees)
    pub fn merge(self, other: AccessVector) -> AccessVector {
        AccessVector {
            can_view: self.can_view || other.can_view,
            can_edit: self.can_edit || other.can_edit,
            can_view_summary: self.can_view_summary || other.can_view_summary,
            can_write_summary: self.can_write_summary || other.can_write_summary,
            can_write_feedback: self.can_write_feedback || other.can_write_feedback,
            can_view_feedbacks: self.can_view_feedbacks || other.can_view_feedbacks,
        }
    }
}

/// Computed access row, unique per `(note, user)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteUserAccess {
    pub note_id: Uuid,
    pub user_id: Uuid,
    #[serde(flatten)]
    pub access: AccessVector,
    pub updated_at: DateTime<Utc>,
}
