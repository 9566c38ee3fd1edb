//! Note CRUD plus the nested feedback and summary surfaces.
//!
//! Every read checks the viewer's permission row for the note; every write
//! runs inside one transaction and re-dispatches the access recompute, so
//! permission rows always reflect the note state that was committed.

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{NaiveDate, Utc};
use compass_common::models::{
    AccessVector, AspectChange, Feedback, Note, NoteType, ProposalType, SubmitStatus, Summary,
    SummaryStatus,
};
use compass_common::Signal;
use serde::Deserialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::auth::RequestContext;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::dispatch;
use crate::AppState;

/// GET /notes/
///
/// Notes the viewer holds a `can_view` row for, newest first.
pub async fn list_notes(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<Vec<Note>>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let notes = db::notes::list_notes_visible_to(&mut conn, ctx.user_id).await?;
    Ok(Json(notes))
}

#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub note_type: NoteType,
    #[serde(default)]
    pub proposal_type: Option<ProposalType>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub year: Option<i64>,
    #[serde(default)]
    pub mentioned_users: Vec<Uuid>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub cycle_id: Option<Uuid>,
}

fn validate_note_fields(
    owner_id: Uuid,
    title: &str,
    note_type: NoteType,
    proposal_type: Option<ProposalType>,
    mentioned_users: &[Uuid],
) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    if title.trim().is_empty() {
        fields.insert("title".to_string(), "Must not be empty".to_string());
    }
    if proposal_type.is_some() && note_type != NoteType::Proposal {
        fields.insert(
            "proposal_type".to_string(),
            "Only proposal notes carry a proposal type".to_string(),
        );
    }
    if proposal_type.is_none() && note_type == NoteType::Proposal {
        fields.insert(
            "proposal_type".to_string(),
            "Proposal notes require a proposal type".to_string(),
        );
    }
    if mentioned_users.contains(&owner_id) {
        fields.insert(
            "mentioned_users".to_string(),
            "Users cannot mention themselves".to_string(),
        );
    }
    fields
}

/// POST /notes/
///
/// Feedback, feedback-request and one-on-one notes are created by their own
/// endpoints so the attached entity row always exists.
pub async fn create_note(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<CreateNoteRequest>,
) -> ApiResult<Json<Note>> {
    let mut fields = validate_note_fields(
        ctx.user_id,
        &body.title,
        body.note_type,
        body.proposal_type,
        &body.mentioned_users,
    );
    if matches!(
        body.note_type,
        NoteType::Feedback | NoteType::FeedbackRequest | NoteType::OneOnOne
    ) {
        fields.insert(
            "note_type".to_string(),
            format!("{} notes have their own endpoint", body.note_type.as_str()),
        );
    }
    if !fields.is_empty() {
        return Err(ApiError::Validation(fields));
    }

    let now = Utc::now();
    let note = Note {
        id: Uuid::new_v4(),
        owner_id: ctx.user_id,
        title: body.title,
        content: body.content,
        date: body.date,
        period: body.period,
        year: body.year,
        note_type: body.note_type,
        proposal_type: body.proposal_type,
        mentioned_users: body.mentioned_users,
        is_public: body.is_public,
        submit_status: SubmitStatus::InitialSubmit,
        cycle_id: body.cycle_id,
        created_at: now,
        updated_at: now,
    };

    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    db::notes::insert_note(&mut tx, &note).await?;
    dispatch::dispatch(
        &mut tx,
        Some(ctx.user_id),
        Signal::NoteSaved { note_id: note.id },
    )
    .await?;

    tx.commit().await.map_err(|e| ApiError::Common(e.into()))?;
    Ok(Json(note))
}

/// GET /notes/:note_id/
///
/// A successful read stamps the viewer's read receipt.
pub async fn get_note(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(note_id): Path<Uuid>,
) -> ApiResult<Json<Note>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let note = db::notes::get_note(&mut conn, note_id).await?;
    let vector = db::access::vector_for(&mut conn, note.id, ctx.user_id).await?;
    if !vector.can_view {
        return Err(ApiError::Forbidden(
            "Not allowed to view this note".to_string(),
        ));
    }

    db::notes::mark_read(&mut conn, note.id, ctx.user_id).await?;
    Ok(Json(note))
}

#[derive(Debug, Deserialize)]
pub struct UpdateNoteRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub proposal_type: Option<ProposalType>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub year: Option<i64>,
    #[serde(default)]
    pub mentioned_users: Vec<Uuid>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub cycle_id: Option<Uuid>,
}

/// PUT /notes/:note_id/
///
/// Replaces the editable fields; the type and submit status stay put.
pub async fn update_note(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(note_id): Path<Uuid>,
    Json(body): Json<UpdateNoteRequest>,
) -> ApiResult<Json<Note>> {
    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let mut note = db::notes::get_note(&mut tx, note_id).await?;
    let vector = db::access::vector_for(&mut tx, note.id, ctx.user_id).await?;
    if !vector.can_edit {
        return Err(ApiError::Forbidden(
            "Not allowed to edit this note".to_string(),
        ));
    }

    let fields = validate_note_fields(
        note.owner_id,
        &body.title,
        note.note_type,
        body.proposal_type,
        &body.mentioned_users,
    );
    if !fields.is_empty() {
        return Err(ApiError::Validation(fields));
    }

    note.title = body.title;
    note.content = body.content;
    note.proposal_type = body.proposal_type;
    note.date = body.date;
    note.period = body.period;
    note.year = body.year;
    note.mentioned_users = body.mentioned_users;
    note.is_public = body.is_public;
    note.cycle_id = body.cycle_id;
    note.updated_at = Utc::now();

    db::notes::update_note(&mut tx, &note).await?;
    dispatch::dispatch(
        &mut tx,
        Some(ctx.user_id),
        Signal::NoteSaved { note_id: note.id },
    )
    .await?;

    tx.commit().await.map_err(|e| ApiError::Common(e.into()))?;
    Ok(Json(note))
}

#[derive(Debug, Default, Deserialize)]
pub struct PatchNoteRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub date: Option<NaiveDate>,
    pub period: Option<String>,
    pub year: Option<i64>,
    pub mentioned_users: Option<Vec<Uuid>>,
    pub is_public: Option<bool>,
    pub submit_status: Option<SubmitStatus>,
    pub cycle_id: Option<Uuid>,
}

/// PATCH /notes/:note_id/
///
/// Partial update; this is also how a proposal is sent to its committee
/// (`submit_status: PENDING`). Sending consumes the owner's edit bit, so the
/// transition cannot be reversed from here.
pub async fn patch_note(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(note_id): Path<Uuid>,
    Json(body): Json<PatchNoteRequest>,
) -> ApiResult<Json<Note>> {
    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let mut note = db::notes::get_note(&mut tx, note_id).await?;
    let vector = db::access::vector_for(&mut tx, note.id, ctx.user_id).await?;
    if !vector.can_edit {
        return Err(ApiError::Forbidden(
            "Not allowed to edit this note".to_string(),
        ));
    }

    if let Some(title) = body.title {
        note.title = title;
    }
    if let Some(content) = body.content {
        note.content = content;
    }
    if let Some(date) = body.date {
        note.date = Some(date);
    }
    if let Some(period) = body.period {
        note.period = Some(period);
    }
    if let Some(year) = body.year {
        note.year = Some(year);
    }
    if let Some(mentioned) = body.mentioned_users {
        note.mentioned_users = mentioned;
    }
    if let Some(is_public) = body.is_public {
        note.is_public = is_public;
    }
    if let Some(status) = body.submit_status {
        note.submit_status = status;
    }
    if let Some(cycle_id) = body.cycle_id {
        note.cycle_id = Some(cycle_id);
    }
    note.updated_at = Utc::now();

    let fields = validate_note_fields(
        note.owner_id,
        &note.title,
        note.note_type,
        note.proposal_type,
        &note.mentioned_users,
    );
    if !fields.is_empty() {
        return Err(ApiError::Validation(fields));
    }

    db::notes::update_note(&mut tx, &note).await?;
    dispatch::dispatch(
        &mut tx,
        Some(ctx.user_id),
        Signal::NoteSaved { note_id: note.id },
    )
    .await?;

    tx.commit().await.map_err(|e| ApiError::Common(e.into()))?;
    Ok(Json(note))
}

/// DELETE /notes/:note_id/
pub async fn delete_note(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(note_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let note = db::notes::get_note(&mut tx, note_id).await?;
    let vector = db::access::vector_for(&mut tx, note.id, ctx.user_id).await?;
    if !vector.can_edit {
        return Err(ApiError::Forbidden(
            "Not allowed to delete this note".to_string(),
        ));
    }

    db::notes::delete_note(&mut tx, note.id).await?;
    tx.commit().await.map_err(|e| ApiError::Common(e.into()))?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /notes/:note_id/feedbacks/
pub async fn list_note_feedbacks(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(note_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Feedback>>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let note = db::notes::get_note(&mut conn, note_id).await?;
    let vector = db::access::vector_for(&mut conn, note.id, ctx.user_id).await?;
    if !vector.can_view_feedbacks {
        return Err(ApiError::Forbidden(
            "Not allowed to view feedback on this note".to_string(),
        ));
    }

    let entries = db::feedbacks::list_for_parent_note(&mut conn, note.id).await?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct CreateNoteFeedbackRequest {
    pub content: String,
    #[serde(default)]
    pub evidence: Option<String>,
}

/// POST /notes/:note_id/feedbacks/
///
/// The receiver is the note's owner. The entry gets its own FEEDBACK note;
/// the receiver's view of it is an additive grant so later recomputes keep
/// it alive.
pub async fn create_note_feedback(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(note_id): Path<Uuid>,
    Json(body): Json<CreateNoteFeedbackRequest>,
) -> ApiResult<Json<Feedback>> {
    if body.content.trim().is_empty() {
        return Err(ApiError::field("content", "Must not be empty"));
    }

    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let parent = db::notes::get_note(&mut tx, note_id).await?;
    let vector = db::access::vector_for(&mut tx, parent.id, ctx.user_id).await?;
    if !vector.can_write_feedback {
        return Err(ApiError::Forbidden(
            "Not allowed to write feedback on this note".to_string(),
        ));
    }

    let feedback = insert_entry(
        &mut tx,
        ctx.user_id,
        parent.owner_id,
        Some(parent.id),
        None,
        body.content,
        body.evidence,
    )
    .await?;

    tx.commit().await.map_err(|e| ApiError::Common(e.into()))?;
    Ok(Json(feedback))
}

/// Create a feedback entry with its backing note and access grants. Shared
/// with the standalone `/feedback-entries/` endpoint.
pub(crate) async fn insert_entry(
    conn: &mut sqlx::SqliteConnection,
    sender_id: Uuid,
    receiver_id: Uuid,
    parent_note_id: Option<Uuid>,
    request_id: Option<Uuid>,
    content: String,
    evidence: Option<String>,
) -> ApiResult<Feedback> {
    let now = Utc::now();
    let note = Note {
        id: Uuid::new_v4(),
        owner_id: sender_id,
        title: "Feedback".to_string(),
        content: content.clone(),
        date: None,
        period: None,
        year: None,
        note_type: NoteType::Feedback,
        proposal_type: None,
        mentioned_users: Vec::new(),
        is_public: false,
        submit_status: SubmitStatus::InitialSubmit,
        cycle_id: None,
        created_at: now,
        updated_at: now,
    };
    db::notes::insert_note(&mut *conn, &note).await?;

    let feedback = Feedback {
        id: Uuid::new_v4(),
        note_id: note.id,
        parent_note_id,
        request_id,
        sender_id,
        receiver_id,
        content,
        evidence,
        created_at: now,
        updated_at: now,
    };
    db::feedbacks::insert_feedback(&mut *conn, &feedback).await?;

    dispatch::dispatch(&mut *conn, Some(sender_id), Signal::NoteSaved { note_id: note.id })
        .await?;
    if receiver_id != sender_id {
        let grant = AccessVector {
            can_view: true,
            can_view_feedbacks: true,
            ..Default::default()
        };
        db::access::merge_grant(&mut *conn, note.id, receiver_id, grant).await?;
    }

    Ok(feedback)
}

/// GET /notes/:note_id/summaries/
pub async fn list_note_summaries(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(note_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Summary>>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let note = db::notes::get_note(&mut conn, note_id).await?;
    let vector = db::access::vector_for(&mut conn, note.id, ctx.user_id).await?;
    if !vector.can_view_summary {
        return Err(ApiError::Forbidden(
            "Not allowed to view this summary".to_string(),
        ));
    }

    let summaries = db::summaries::find_summary_by_note(&mut conn, note.id)
        .await?
        .into_iter()
        .collect();
    Ok(Json(summaries))
}

#[derive(Debug, Deserialize)]
pub struct SummaryRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub ladder_id: Option<Uuid>,
    #[serde(default)]
    pub aspect_changes: BTreeMap<String, AspectChange>,
    #[serde(default)]
    pub performance_label: Option<String>,
    #[serde(default)]
    pub ladder_change: Option<String>,
    #[serde(default)]
    pub bonus: i64,
    #[serde(default)]
    pub salary_change: f64,
    #[serde(default)]
    pub committee_date: Option<NaiveDate>,
    #[serde(default)]
    pub submit_status: Option<SummaryStatus>,
}

/// POST /notes/:note_id/summaries/
///
/// One summary per note. Saving with `submit_status: DONE` finalises it
/// immediately: the note flips to REVIEWED and the snapshot/timeline
/// pipeline runs inside this transaction.
pub async fn create_summary(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(note_id): Path<Uuid>,
    Json(body): Json<SummaryRequest>,
) -> ApiResult<Json<Summary>> {
    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let note = db::notes::get_note(&mut tx, note_id).await?;
    let vector = db::access::vector_for(&mut tx, note.id, ctx.user_id).await?;
    if !vector.can_write_summary {
        return Err(ApiError::Forbidden(
            "Not allowed to write a summary on this note".to_string(),
        ));
    }
    if db::summaries::find_summary_by_note(&mut tx, note.id)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("Note already has a summary".to_string()));
    }

    let now = Utc::now();
    let summary = Summary {
        id: Uuid::new_v4(),
        note_id: note.id,
        content: body.content,
        ladder_id: body.ladder_id,
        aspect_changes: body.aspect_changes,
        performance_label: body.performance_label,
        ladder_change: body.ladder_change,
        bonus: body.bonus,
        salary_change: body.salary_change,
        committee_date: body.committee_date,
        submit_status: body.submit_status.unwrap_or(SummaryStatus::InitialSubmit),
        created_at: now,
        updated_at: now,
    };
    db::summaries::insert_summary(&mut tx, &summary).await?;

    if summary.submit_status == SummaryStatus::Done {
        dispatch::dispatch(
            &mut tx,
            Some(ctx.user_id),
            Signal::SummaryFinalised {
                summary_id: summary.id,
            },
        )
        .await?;
    }

    tx.commit().await.map_err(|e| ApiError::Common(e.into()))?;
    Ok(Json(summary))
}

/// PUT /notes/:note_id/summaries/
///
/// Rewrites the summary while it is in progress. A DONE summary is a
/// committee decision and stays immutable.
pub async fn update_summary(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(note_id): Path<Uuid>,
    Json(body): Json<SummaryRequest>,
) -> ApiResult<Json<Summary>> {
    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let note = db::notes::get_note(&mut tx, note_id).await?;
    let vector = db::access::vector_for(&mut tx, note.id, ctx.user_id).await?;
    if !vector.can_write_summary {
        return Err(ApiError::Forbidden(
            "Not allowed to write a summary on this note".to_string(),
        ));
    }

    let mut summary = db::summaries::find_summary_by_note(&mut tx, note.id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No summary on note {}", note.id)))?;
    if summary.submit_status == SummaryStatus::Done {
        return Err(ApiError::BadRequest(
            "Summary is final and cannot be edited".to_string(),
        ));
    }

    summary.content = body.content;
    summary.ladder_id = body.ladder_id;
    summary.aspect_changes = body.aspect_changes;
    summary.performance_label = body.performance_label;
    summary.ladder_change = body.ladder_change;
    summary.bonus = body.bonus;
    summary.salary_change = body.salary_change;
    summary.committee_date = body.committee_date;
    if let Some(status) = body.submit_status {
        summary.submit_status = status;
    }
    summary.updated_at = Utc::now();

    db::summaries::update_summary(&mut tx, &summary).await?;

    if summary.submit_status == SummaryStatus::Done {
        dispatch::dispatch(
            &mut tx,
            Some(ctx.user_id),
            Signal::SummaryFinalised {
                summary_id: summary.id,
            },
        )
        .await?;
    }

    tx.commit().await.map_err(|e| ApiError::Common(e.into()))?;
    Ok(Json(summary))
}
