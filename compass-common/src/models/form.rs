//! Assessment forms. Submissions are stored and bounds-checked; no
//! aggregation runs server-side.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Question on a form; answers must land in `[min, max]` inclusive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormQuestion {
    pub code: String,
    pub text: String,
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentForm {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub questions: Vec<FormQuestion>,
    pub deadline: Option<NaiveDate>,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssessmentForm {
    pub fn question(&self, code: &str) -> Option<&FormQuestion> {
        self.questions.iter().find(|q| q.code == code)
    }
}

/// One assessor asked to rate one subject, unique per `(form, assessor,
/// subject)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormAssignment {
    pub id: Uuid,
    pub form_id: Uuid,
    pub assessor_id: Uuid,
    pub subject_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Answers keyed by question code, one submission per assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormSubmission {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub answers: BTreeMap<String, i64>,
    pub submitted_at: DateTime<Utc>,
}
