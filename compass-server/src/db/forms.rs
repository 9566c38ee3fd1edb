//! Assessment form persistence

use compass_common::models::{AssessmentForm, FormAssignment, FormQuestion, FormSubmission};
use compass_common::{Error, Result};
use sqlx::{Row, SqliteConnection};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{guid, opt_date, timestamp, DATE_FORMAT};

fn form_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AssessmentForm> {
    let questions: String = row.get("questions");
    let questions: Vec<FormQuestion> = serde_json::from_str(&questions)
        .map_err(|e| Error::Internal(format!("Bad questions JSON: {}", e)))?;

    Ok(AssessmentForm {
        id: guid(row, "guid")?,
        title: row.get("title"),
        description: row.get("description"),
        questions,
        deadline: opt_date(row, "deadline")?,
        is_active: row.get("is_active"),
        created_by: guid(row, "created_by")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

pub async fn insert_form(conn: &mut SqliteConnection, form: &AssessmentForm) -> Result<()> {
    let questions = serde_json::to_string(&form.questions)
        .map_err(|e| Error::Internal(format!("Cannot encode questions: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO assessment_forms (
            guid, title, description, questions, deadline, is_active,
            created_by, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(form.id.to_string())
    .bind(&form.title)
    .bind(&form.description)
    .bind(questions)
    .bind(form.deadline.map(|d| d.format(DATE_FORMAT).to_string()))
    .bind(form.is_active)
    .bind(form.created_by.to_string())
    .bind(form.created_at.to_rfc3339())
    .bind(form.updated_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn find_form(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<AssessmentForm>> {
    let row = sqlx::query("SELECT * FROM assessment_forms WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

    row.map(|r| form_from_row(&r)).transpose()
}

pub async fn get_form(conn: &mut SqliteConnection, id: Uuid) -> Result<AssessmentForm> {
    find_form(conn, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Form {}", id)))
}

pub async fn list_forms(conn: &mut SqliteConnection) -> Result<Vec<AssessmentForm>> {
    let rows = sqlx::query("SELECT * FROM assessment_forms ORDER BY created_at DESC")
        .fetch_all(conn)
        .await?;

    rows.iter().map(form_from_row).collect()
}

pub async fn list_forms_created_by(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> Result<Vec<AssessmentForm>> {
    let rows = sqlx::query(
        "SELECT * FROM assessment_forms WHERE created_by = ? ORDER BY created_at DESC",
    )
    .bind(user_id.to_string())
    .fetch_all(conn)
    .await?;

    rows.iter().map(form_from_row).collect()
}

fn assignment_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<FormAssignment> {
    Ok(FormAssignment {
        id: guid(row, "guid")?,
        form_id: guid(row, "form_id")?,
        assessor_id: guid(row, "assessor_id")?,
        subject_id: guid(row, "subject_id")?,
        created_at: timestamp(row, "created_at")?,
    })
}

pub async fn insert_assignment(
    conn: &mut SqliteConnection,
    assignment: &FormAssignment,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO form_assignments (guid, form_id, assessor_id, subject_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(assignment.id.to_string())
    .bind(assignment.form_id.to_string())
    .bind(assignment.assessor_id.to_string())
    .bind(assignment.subject_id.to_string())
    .bind(assignment.created_at.to_rfc3339())
    .execute(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.message().contains("UNIQUE") => Error::Conflict(
            "Assessor is already assigned to this subject on this form".to_string(),
        ),
        other => Error::Database(other),
    })?;

    Ok(())
}

pub async fn get_assignment(conn: &mut SqliteConnection, id: Uuid) -> Result<FormAssignment> {
    let row = sqlx::query("SELECT * FROM form_assignments WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Form assignment {}", id)))?;

    assignment_from_row(&row)
}

pub async fn find_assignment_for(
    conn: &mut SqliteConnection,
    form_id: Uuid,
    assessor_id: Uuid,
    subject_id: Uuid,
) -> Result<Option<FormAssignment>> {
    let row = sqlx::query(
        "SELECT * FROM form_assignments WHERE form_id = ? AND assessor_id = ? AND subject_id = ?",
    )
    .bind(form_id.to_string())
    .bind(assessor_id.to_string())
    .bind(subject_id.to_string())
    .fetch_optional(conn)
    .await?;

    row.map(|r| assignment_from_row(&r)).transpose()
}

pub async fn list_assignments_for_form(
    conn: &mut SqliteConnection,
    form_id: Uuid,
) -> Result<Vec<FormAssignment>> {
    let rows = sqlx::query("SELECT * FROM form_assignments WHERE form_id = ? ORDER BY created_at")
        .bind(form_id.to_string())
        .fetch_all(conn)
        .await?;

    rows.iter().map(assignment_from_row).collect()
}

pub async fn list_assignments_for_assessor(
    conn: &mut SqliteConnection,
    form_id: Uuid,
    assessor_id: Uuid,
) -> Result<Vec<FormAssignment>> {
    let rows = sqlx::query(
        "SELECT * FROM form_assignments WHERE form_id = ? AND assessor_id = ? ORDER BY created_at",
    )
    .bind(form_id.to_string())
    .bind(assessor_id.to_string())
    .fetch_all(conn)
    .await?;

    rows.iter().map(assignment_from_row).collect()
}

fn submission_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<FormSubmission> {
    let answers: String = row.get("answers");
    let answers: BTreeMap<String, i64> = serde_json::from_str(&answers)
        .map_err(|e| Error::Internal(format!("Bad answers JSON: {}", e)))?;

    Ok(FormSubmission {
        id: guid(row, "guid")?,
        assignment_id: guid(row, "assignment_id")?,
        answers,
        submitted_at: timestamp(row, "submitted_at")?,
    })
}

pub async fn insert_submission(
    conn: &mut SqliteConnection,
    submission: &FormSubmission,
) -> Result<()> {
    let answers = serde_json::to_string(&submission.answers)
        .map_err(|e| Error::Internal(format!("Cannot encode answers: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO form_submissions (guid, assignment_id, answers, submitted_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(submission.id.to_string())
    .bind(submission.assignment_id.to_string())
    .bind(answers)
    .bind(submission.submitted_at.to_rfc3339())
    .execute(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.message().contains("UNIQUE") => {
            Error::Conflict("Assignment already has a submission".to_string())
        }
        other => Error::Database(other),
    })?;

    Ok(())
}

pub async fn find_submission_for_assignment(
    conn: &mut SqliteConnection,
    assignment_id: Uuid,
) -> Result<Option<FormSubmission>> {
    let row = sqlx::query("SELECT * FROM form_submissions WHERE assignment_id = ?")
        .bind(assignment_id.to_string())
        .fetch_optional(conn)
        .await?;

    row.map(|r| submission_from_row(&r)).transpose()
}

/// Submissions joined through assignments, for the results endpoint
pub async fn list_submissions_for_form(
    conn: &mut SqliteConnection,
    form_id: Uuid,
) -> Result<Vec<(FormAssignment, FormSubmission)>> {
    let rows = sqlx::query(
        r#"
        SELECT a.guid AS a_guid, a.form_id, a.assessor_id, a.subject_id,
               a.created_at, s.guid AS s_guid, s.assignment_id, s.answers,
               s.submitted_at
        FROM form_submissions s
        JOIN form_assignments a ON a.guid = s.assignment_id
        WHERE a.form_id = ?
        ORDER BY s.submitted_at
        "#,
    )
    .bind(form_id.to_string())
    .fetch_all(conn)
    .await?;

    rows.iter()
        .map(|row| {
            let assignment = FormAssignment {
                id: guid(row, "a_guid")?,
                form_id: guid(row, "form_id")?,
                assessor_id: guid(row, "assessor_id")?,
                subject_id: guid(row, "subject_id")?,
                created_at: timestamp(row, "created_at")?,
            };
            let answers: String = row.get("answers");
            let answers: BTreeMap<String, i64> = serde_json::from_str(&answers)
                .map_err(|e| Error::Internal(format!("Bad answers JSON: {}", e)))?;
            let submission = FormSubmission {
                id: guid(row, "s_guid")?,
                assignment_id: guid(row, "assignment_id")?,
                answers,
                submitted_at: timestamp(row, "submitted_at")?,
            };
            Ok((assignment, submission))
        })
        .collect()
}
