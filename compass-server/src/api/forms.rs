//! Assessment forms: creation, assignment, submission and stored results.
//!
//! Submissions are bounds-checked against the form's questions and stored
//! verbatim; nothing is aggregated server-side.

use axum::extract::{Extension, Path, State};
use axum::Json;
use chrono::Utc;
use compass_common::models::{AssessmentForm, FormAssignment, FormQuestion, FormSubmission};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::auth::RequestContext;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AssessorAssignment {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub submitted: bool,
}

#[derive(Debug, Serialize)]
pub struct AssessorForm {
    #[serde(flatten)]
    pub form: AssessmentForm,
    pub assignments: Vec<AssessorAssignment>,
}

/// GET /forms/
///
/// Active forms on which the viewer is an assessor, with their assignments
/// and whether each one has been answered yet.
pub async fn list_forms(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<Vec<AssessorForm>>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let mut out = Vec::new();
    for form in db::forms::list_forms(&mut conn).await? {
        if !form.is_active {
            continue;
        }
        let assignments =
            db::forms::list_assignments_for_assessor(&mut conn, form.id, ctx.user_id).await?;
        if assignments.is_empty() {
            continue;
        }
        let mut views = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let submitted =
                db::forms::find_submission_for_assignment(&mut conn, assignment.id)
                    .await?
                    .is_some();
            views.push(AssessorAssignment {
                id: assignment.id,
                subject_id: assignment.subject_id,
                submitted,
            });
        }
        out.push(AssessorForm {
            form,
            assignments: views,
        });
    }
    Ok(Json(out))
}

#[derive(Debug, Deserialize)]
pub struct AssignmentPair {
    pub assessor_id: Uuid,
    pub subject_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CreateFormRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub questions: Vec<FormQuestion>,
    #[serde(default)]
    pub deadline: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub assignments: Vec<AssignmentPair>,
}

fn validate_questions(questions: &[FormQuestion]) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    if questions.is_empty() {
        fields.insert(
            "questions".to_string(),
            "At least one question is required".to_string(),
        );
        return fields;
    }
    let mut codes = BTreeSet::new();
    for question in questions {
        if question.code.trim().is_empty() {
            fields.insert(
                "questions".to_string(),
                "Question codes must not be empty".to_string(),
            );
        } else if !codes.insert(question.code.as_str()) {
            fields.insert(
                "questions".to_string(),
                format!("Duplicate question code '{}'", question.code),
            );
        }
        if question.min > question.max {
            fields.insert(
                "questions".to_string(),
                format!(
                    "Question '{}' has min {} above max {}",
                    question.code, question.min, question.max
                ),
            );
        }
    }
    fields
}

/// POST /forms/
pub async fn create_form(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<CreateFormRequest>,
) -> ApiResult<Json<AssessmentForm>> {
    let mut fields = validate_questions(&body.questions);
    if body.title.trim().is_empty() {
        fields.insert("title".to_string(), "Must not be empty".to_string());
    }
    if let Some(deadline) = body.deadline {
        if deadline < Utc::now().date_naive() {
            fields.insert(
                "deadline".to_string(),
                "Deadline cannot be in the past".to_string(),
            );
        }
    }
    if !fields.is_empty() {
        return Err(ApiError::Validation(fields));
    }

    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    for pair in &body.assignments {
        for user_id in [pair.assessor_id, pair.subject_id] {
            if db::users::find_user(&mut tx, user_id).await?.is_none() {
                return Err(ApiError::field(
                    "assignments",
                    format!("Unknown user {}", user_id),
                ));
            }
        }
    }

    let now = Utc::now();
    let form = AssessmentForm {
        id: Uuid::new_v4(),
        title: body.title,
        description: body.description,
        questions: body.questions,
        deadline: body.deadline,
        is_active: true,
        created_by: ctx.user_id,
        created_at: now,
        updated_at: now,
    };
    db::forms::insert_form(&mut tx, &form).await?;

    for pair in &body.assignments {
        let assignment = FormAssignment {
            id: Uuid::new_v4(),
            form_id: form.id,
            assessor_id: pair.assessor_id,
            subject_id: pair.subject_id,
            created_at: now,
        };
        db::forms::insert_assignment(&mut tx, &assignment).await?;
    }

    tx.commit().await.map_err(|e| ApiError::Common(e.into()))?;
    Ok(Json(form))
}

/// GET /forms/:form_id/
///
/// Visible to its creator and to its assessors.
pub async fn get_form(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(form_id): Path<Uuid>,
) -> ApiResult<Json<AssessmentForm>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let form = db::forms::get_form(&mut conn, form_id).await?;
    if form.created_by != ctx.user_id {
        let mine =
            db::forms::list_assignments_for_assessor(&mut conn, form.id, ctx.user_id).await?;
        if mine.is_empty() {
            return Err(ApiError::Forbidden(
                "Not allowed to view this form".to_string(),
            ));
        }
    }
    Ok(Json(form))
}

#[derive(Debug, Deserialize)]
pub struct SubmitFormRequest {
    pub subject_id: Uuid,
    pub answers: BTreeMap<String, i64>,
}

/// POST /forms/:form_id/submit/
///
/// One submission per assignment; every question must be answered within its
/// bounds before the deadline.
pub async fn submit_form(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(form_id): Path<Uuid>,
    Json(body): Json<SubmitFormRequest>,
) -> ApiResult<Json<FormSubmission>> {
    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let form = db::forms::get_form(&mut tx, form_id).await?;
    if !form.is_active {
        return Err(ApiError::BadRequest("Form is not active".to_string()));
    }

    let assignment =
        db::forms::find_assignment_for(&mut tx, form.id, ctx.user_id, body.subject_id)
            .await?
            .ok_or_else(|| {
                ApiError::Forbidden("No assignment for this subject".to_string())
            })?;

    let mut fields = BTreeMap::new();
    if let Some(deadline) = form.deadline {
        if Utc::now().date_naive() > deadline {
            fields.insert(
                "deadline".to_string(),
                "Form deadline has passed".to_string(),
            );
        }
    }
    for question in &form.questions {
        match body.answers.get(&question.code) {
            None => {
                fields.insert(question.code.clone(), "Answer is required".to_string());
            }
            Some(answer) if *answer < question.min || *answer > question.max => {
                fields.insert(
                    question.code.clone(),
                    format!("Answer must be between {} and {}", question.min, question.max),
                );
            }
            Some(_) => {}
        }
    }
    for code in body.answers.keys() {
        if form.question(code).is_none() {
            fields.insert(code.clone(), "Unknown question".to_string());
        }
    }
    if !fields.is_empty() {
        return Err(ApiError::Validation(fields));
    }

    if db::forms::find_submission_for_assignment(&mut tx, assignment.id)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(
            "Assignment already has a submission".to_string(),
        ));
    }

    let submission = FormSubmission {
        id: Uuid::new_v4(),
        assignment_id: assignment.id,
        answers: body.answers,
        submitted_at: Utc::now(),
    };
    db::forms::insert_submission(&mut tx, &submission).await?;

    tx.commit().await.map_err(|e| ApiError::Common(e.into()))?;
    Ok(Json(submission))
}

#[derive(Debug, Serialize)]
pub struct FormResult {
    pub assignment: FormAssignment,
    pub submission: FormSubmission,
}

/// GET /forms/:form_id/results/
///
/// Stored submissions, creator-only.
pub async fn form_results(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(form_id): Path<Uuid>,
) -> ApiResult<Json<Vec<FormResult>>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let form = db::forms::get_form(&mut conn, form_id).await?;
    if form.created_by != ctx.user_id {
        return Err(ApiError::Forbidden(
            "Only the form's creator can read results".to_string(),
        ));
    }

    let results = db::forms::list_submissions_for_form(&mut conn, form.id)
        .await?
        .into_iter()
        .map(|(assignment, submission)| FormResult {
            assignment,
            submission,
        })
        .collect();
    Ok(Json(results))
}

#[derive(Debug, Serialize)]
pub struct CreatedForm {
    #[serde(flatten)]
    pub form: AssessmentForm,
    pub assignment_count: usize,
    pub submission_count: usize,
}

/// GET /forms/assigned-by/
///
/// Forms the viewer created, with completion counts.
pub async fn assigned_by(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<Vec<CreatedForm>>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let mut out = Vec::new();
    for form in db::forms::list_forms_created_by(&mut conn, ctx.user_id).await? {
        let assignment_count = db::forms::list_assignments_for_form(&mut conn, form.id)
            .await?
            .len();
        let submission_count = db::forms::list_submissions_for_form(&mut conn, form.id)
            .await?
            .len();
        out.push(CreatedForm {
            form,
            assignment_count,
            submission_count,
        });
    }
    Ok(Json(out))
}
