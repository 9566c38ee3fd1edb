//! Standalone feedback requests and feedback entries.
//!
//! Requests invite named users to comment; entries either answer a request,
//! comment on a note the sender holds `can_write_feedback` for, or go ad hoc
//! straight to a receiver. Every entry rides on its own FEEDBACK note.

use axum::extract::{Extension, Query, State};
use axum::Json;
use chrono::{NaiveDate, Utc};
use compass_common::models::{
    AccessVector, Feedback, FeedbackRequest, Note, NoteType, SubmitStatus,
};
use compass_common::Signal;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::notes::insert_entry;
use crate::auth::RequestContext;
use crate::db;
use crate::db::feedbacks::ListScope;
use crate::error::{ApiError, ApiResult};
use crate::services::dispatch;
use crate::AppState;

fn default_scope() -> String {
    "all".to_string()
}

#[derive(Debug, Deserialize)]
pub struct RequestsQuery {
    #[serde(rename = "type", default = "default_scope")]
    pub scope: String,
}

/// GET /feedback-requests/?type=owned|invited|all
pub async fn list_requests(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<RequestsQuery>,
) -> ApiResult<Json<Vec<FeedbackRequest>>> {
    let scope = ListScope::parse(&query.scope)?;

    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let requests = db::feedbacks::list_requests(&mut conn, ctx.user_id, scope).await?;
    Ok(Json(requests))
}

#[derive(Debug, Deserialize)]
pub struct CreateRequestRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    pub invitees: Vec<Uuid>,
}

/// POST /feedback-requests/
///
/// Invitees get a `can_view` grant on the request note; the right to answer
/// comes from the invitee list itself.
pub async fn create_request(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<CreateRequestRequest>,
) -> ApiResult<Json<FeedbackRequest>> {
    if body.invitees.is_empty() {
        return Err(ApiError::field("invitees", "At least one invitee is required"));
    }
    if body.invitees.contains(&ctx.user_id) {
        return Err(ApiError::field(
            "invitees",
            "Users cannot request feedback from themselves",
        ));
    }
    if let Some(deadline) = body.deadline {
        if deadline < Utc::now().date_naive() {
            return Err(ApiError::field("deadline", "Deadline cannot be in the past"));
        }
    }

    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    for invitee in &body.invitees {
        if db::users::find_user(&mut tx, *invitee).await?.is_none() {
            return Err(ApiError::field("invitees", format!("Unknown user {}", invitee)));
        }
    }

    let now = Utc::now();
    let note = Note {
        id: Uuid::new_v4(),
        owner_id: ctx.user_id,
        title: body.title.unwrap_or_else(|| "Feedback request".to_string()),
        content: body.content,
        date: None,
        period: None,
        year: None,
        note_type: NoteType::FeedbackRequest,
        proposal_type: None,
        mentioned_users: Vec::new(),
        is_public: false,
        submit_status: SubmitStatus::InitialSubmit,
        cycle_id: None,
        created_at: now,
        updated_at: now,
    };
    db::notes::insert_note(&mut tx, &note).await?;

    let request = FeedbackRequest {
        id: Uuid::new_v4(),
        note_id: note.id,
        deadline: body.deadline,
        invitees: body.invitees,
        created_at: now,
        updated_at: now,
    };
    db::feedbacks::insert_request(&mut tx, &request).await?;

    dispatch::dispatch(
        &mut tx,
        Some(ctx.user_id),
        Signal::NoteSaved { note_id: note.id },
    )
    .await?;

    let grant = AccessVector {
        can_view: true,
        ..Default::default()
    };
    for invitee in &request.invitees {
        db::access::merge_grant(&mut tx, note.id, *invitee, grant).await?;
    }

    tx.commit().await.map_err(|e| ApiError::Common(e.into()))?;
    Ok(Json(request))
}

#[derive(Debug, Deserialize)]
pub struct EntriesQuery {
    #[serde(rename = "type", default = "default_scope")]
    pub scope: String,
    #[serde(default)]
    pub adhoc: Option<bool>,
}

/// GET /feedback-entries/?type=owned|invited|all&adhoc=true|false
pub async fn list_entries(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<EntriesQuery>,
) -> ApiResult<Json<Vec<Feedback>>> {
    let scope = ListScope::parse(&query.scope)?;

    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let entries = db::feedbacks::list_entries(&mut conn, ctx.user_id, scope, query.adhoc).await?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    pub content: String,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub parent_note_id: Option<Uuid>,
    #[serde(default)]
    pub request_id: Option<Uuid>,
    #[serde(default)]
    pub receiver_id: Option<Uuid>,
}

/// POST /feedback-entries/
///
/// The receiver is derived: a request's entry goes to the requester, a note
/// comment to the note owner. Only a fully ad hoc entry names its receiver.
pub async fn create_entry(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<CreateEntryRequest>,
) -> ApiResult<Json<Feedback>> {
    if body.content.trim().is_empty() {
        return Err(ApiError::field("content", "Must not be empty"));
    }

    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    // Both links may be present; each authorizes independently and the
    // request decides the receiver
    let mut derived_receiver = None;
    if let Some(parent_note_id) = body.parent_note_id {
        let parent = db::notes::get_note(&mut tx, parent_note_id).await?;
        let vector = db::access::vector_for(&mut tx, parent.id, ctx.user_id).await?;
        if !vector.can_write_feedback {
            return Err(ApiError::Forbidden(
                "Not allowed to write feedback on this note".to_string(),
            ));
        }
        derived_receiver = Some(parent.owner_id);
    }
    if let Some(request_id) = body.request_id {
        let request = db::feedbacks::get_request(&mut tx, request_id).await?;
        if !request.invitees.contains(&ctx.user_id) {
            return Err(ApiError::Forbidden(
                "Only invitees can answer this request".to_string(),
            ));
        }
        let request_note = db::notes::get_note(&mut tx, request.note_id).await?;
        derived_receiver = Some(request_note.owner_id);
    }

    let receiver_id = match derived_receiver {
        Some(id) => id,
        None => {
            let id = body
                .receiver_id
                .ok_or_else(|| ApiError::field("receiver_id", "Required for ad hoc feedback"))?;
            if db::users::find_user(&mut tx, id).await?.is_none() {
                return Err(ApiError::field("receiver_id", format!("Unknown user {}", id)));
            }
            id
        }
    };

    let feedback = insert_entry(
        &mut tx,
        ctx.user_id,
        receiver_id,
        body.parent_note_id,
        body.request_id,
        body.content,
        body.evidence,
    )
    .await?;

    tx.commit().await.map_err(|e| ApiError::Common(e.into()))?;
    Ok(Json(feedback))
}
