//! One-on-one meeting records.
//!
//! Only the member's current leader opens a record; the member reads it and
//! may record their own vibe, nothing else. The backing note pins the access
//! rows through the usual recompute.

use axum::extract::{Extension, Path, State};
use axum::Json;
use chrono::Utc;
use compass_common::models::{Note, NoteType, OneOnOne, SubmitStatus};
use compass_common::Signal;
use serde::Deserialize;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::auth::RequestContext;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::dispatch;
use crate::AppState;

/// GET /one-on-ones/:member_id/
///
/// Records for the member the viewer can see, newest first. Leaders see the
/// ones they wrote; the member sees all of theirs.
pub async fn list_one_on_ones(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(member_id): Path<Uuid>,
) -> ApiResult<Json<Vec<OneOnOne>>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    db::users::get_user(&mut conn, member_id).await?;

    let mut visible = Vec::new();
    for record in db::one_on_ones::list_for_member(&mut conn, member_id).await? {
        let vector = db::access::vector_for(&mut conn, record.note_id, ctx.user_id).await?;
        if vector.can_view {
            visible.push(record);
        }
    }
    Ok(Json(visible))
}

#[derive(Debug, Default, Deserialize)]
pub struct OneOnOneBody {
    pub personal_summary: Option<String>,
    pub career_summary: Option<String>,
    pub performance_summary: Option<String>,
    pub communication_summary: Option<String>,
    pub actions: Option<String>,
    pub leader_vibe: Option<String>,
    pub member_vibe: Option<String>,
    pub tags: Option<Vec<Uuid>>,
}

/// Tags must exist and still be active to be attached
async fn check_tags(conn: &mut SqliteConnection, tag_ids: &[Uuid]) -> ApiResult<()> {
    for tag_id in tag_ids {
        match db::value_tags::get_value_tag(&mut *conn, *tag_id).await {
            Ok(tag) if tag.is_active => {}
            Ok(tag) => {
                return Err(ApiError::field(
                    "tags",
                    format!("Tag '{}' is disabled", tag.name),
                ));
            }
            Err(compass_common::Error::NotFound(_)) => {
                return Err(ApiError::field("tags", format!("Unknown tag {}", tag_id)));
            }
            Err(e) => return Err(ApiError::Common(e)),
        }
    }
    Ok(())
}

/// POST /one-on-ones/:member_id/
pub async fn create_one_on_one(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(member_id): Path<Uuid>,
    Json(body): Json<OneOnOneBody>,
) -> ApiResult<Json<OneOnOne>> {
    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let member = db::users::get_user(&mut tx, member_id).await?;
    if member.leader_id != Some(ctx.user_id) {
        return Err(ApiError::Forbidden(
            "Only the member's leader can open a one-on-one".to_string(),
        ));
    }

    let tags = body.tags.unwrap_or_default();
    check_tags(&mut tx, &tags).await?;

    let now = Utc::now();
    let note = Note {
        id: Uuid::new_v4(),
        owner_id: ctx.user_id,
        title: format!("One-on-one with {}", member.display_name),
        content: String::new(),
        date: None,
        period: None,
        year: None,
        note_type: NoteType::OneOnOne,
        proposal_type: None,
        mentioned_users: Vec::new(),
        is_public: false,
        submit_status: SubmitStatus::InitialSubmit,
        cycle_id: None,
        created_at: now,
        updated_at: now,
    };
    db::notes::insert_note(&mut tx, &note).await?;

    let record = OneOnOne {
        id: Uuid::new_v4(),
        note_id: note.id,
        member_id,
        personal_summary: body.personal_summary,
        career_summary: body.career_summary,
        performance_summary: body.performance_summary,
        communication_summary: body.communication_summary,
        actions: body.actions,
        leader_vibe: body.leader_vibe,
        member_vibe: None,
        tags,
        created_at: now,
        updated_at: now,
    };
    db::one_on_ones::insert_one_on_one(&mut tx, &record).await?;

    dispatch::dispatch(
        &mut tx,
        Some(ctx.user_id),
        Signal::NoteSaved { note_id: note.id },
    )
    .await?;

    tx.commit().await.map_err(|e| ApiError::Common(e.into()))?;
    Ok(Json(record))
}

/// Record ids are scoped under the member in the path; a mismatch reads as
/// not found rather than leaking the record's existence.
async fn load_scoped(
    conn: &mut SqliteConnection,
    member_id: Uuid,
    id: Uuid,
) -> ApiResult<OneOnOne> {
    let record = db::one_on_ones::get_one_on_one(&mut *conn, id).await?;
    if record.member_id != member_id {
        return Err(ApiError::NotFound(format!("One-on-one {}", id)));
    }
    Ok(record)
}

/// GET /one-on-ones/:member_id/:id/
pub async fn get_one_on_one(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((member_id, id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<OneOnOne>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let record = load_scoped(&mut conn, member_id, id).await?;
    let vector = db::access::vector_for(&mut conn, record.note_id, ctx.user_id).await?;
    if !vector.can_view {
        return Err(ApiError::Forbidden(
            "Not allowed to view this one-on-one".to_string(),
        ));
    }
    Ok(Json(record))
}

/// PATCH /one-on-ones/:member_id/:id/
///
/// The leader edits everything except the member's vibe; the member edits
/// only the vibe.
pub async fn patch_one_on_one(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((member_id, id)): Path<(Uuid, Uuid)>,
    Json(body): Json<OneOnOneBody>,
) -> ApiResult<Json<OneOnOne>> {
    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let mut record = load_scoped(&mut tx, member_id, id).await?;
    let vector = db::access::vector_for(&mut tx, record.note_id, ctx.user_id).await?;

    if vector.can_edit {
        if body.member_vibe.is_some() {
            return Err(ApiError::Forbidden(
                "Only the member can record their vibe".to_string(),
            ));
        }
        if let Some(value) = body.personal_summary {
            record.personal_summary = Some(value);
        }
        if let Some(value) = body.career_summary {
            record.career_summary = Some(value);
        }
        if let Some(value) = body.performance_summary {
            record.performance_summary = Some(value);
        }
        if let Some(value) = body.communication_summary {
            record.communication_summary = Some(value);
        }
        if let Some(value) = body.actions {
            record.actions = Some(value);
        }
        if let Some(value) = body.leader_vibe {
            record.leader_vibe = Some(value);
        }
        if let Some(tags) = body.tags {
            check_tags(&mut tx, &tags).await?;
            record.tags = tags;
        }
        record.updated_at = Utc::now();
        db::one_on_ones::update_one_on_one(&mut tx, &record).await?;
    } else if ctx.user_id == record.member_id {
        let leader_only = body.personal_summary.is_some()
            || body.career_summary.is_some()
            || body.performance_summary.is_some()
            || body.communication_summary.is_some()
            || body.actions.is_some()
            || body.leader_vibe.is_some()
            || body.tags.is_some();
        if leader_only {
            return Err(ApiError::Forbidden(
                "Members may only record their own vibe".to_string(),
            ));
        }
        db::one_on_ones::update_member_vibe(&mut tx, record.id, body.member_vibe.as_deref())
            .await?;
        record.member_vibe = body.member_vibe;
        record.updated_at = Utc::now();
    } else {
        return Err(ApiError::Forbidden(
            "Not allowed to edit this one-on-one".to_string(),
        ));
    }

    tx.commit().await.map_err(|e| ApiError::Common(e.into()))?;
    Ok(Json(record))
}
