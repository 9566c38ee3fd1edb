//! Insert-only history rows derived from committee outcomes and org changes.
//! "Latest" queries order by effective date and break ties on creation time.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::Stage;

/// Pay history row. `pay_band_number` is denormalised from the pay band so
/// table queries and baseline seeding skip a join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationSnapshot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pay_band_id: Uuid,
    pub pay_band_number: f64,
    pub salary_change: f64,
    pub bonus_percentage: i64,
    pub effective_date: NaiveDate,
    pub source_summary_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Coarse seniority label a committee may attach alongside the numeric levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeniorityLevel {
    Junior,
    Mid,
    Senior,
    Principal,
}

impl SeniorityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeniorityLevel::Junior => "JUNIOR",
            SeniorityLevel::Mid => "MID",
            SeniorityLevel::Senior => "SENIOR",
            SeniorityLevel::Principal => "PRINCIPAL",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "JUNIOR" => Ok(SeniorityLevel::Junior),
            "MID" => Ok(SeniorityLevel::Mid),
            "SENIOR" => Ok(SeniorityLevel::Senior),
            "PRINCIPAL" => Ok(SeniorityLevel::Principal),
            other => Err(Error::InvalidInput(format!(
                "Unknown seniority level: {}",
                other
            ))),
        }
    }
}

/// Per-ladder seniority state after a committee decision. `details` holds the
/// absolute level per aspect code, `stages` the per-aspect stage where set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenioritySnapshot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ladder_id: Uuid,
    pub title: Option<String>,
    pub overall_score: f64,
    pub details: BTreeMap<String, i64>,
    pub stages: BTreeMap<String, Stage>,
    pub seniority_level: Option<SeniorityLevel>,
    pub effective_date: NaiveDate,
    pub source_summary_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl SenioritySnapshot {
    /// Mean of the aspect levels rounded to one decimal; 0.0 for an empty map
    pub fn compute_overall(details: &BTreeMap<String, i64>) -> f64 {
        if details.is_empty() {
            return 0.0;
        }
        let sum: i64 = details.values().sum();
        let mean = sum as f64 / details.len() as f64;
        (mean * 10.0).round() / 10.0
    }
}

/// Where a user sat in the org graph on a given date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgAssignmentSnapshot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub leader_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub tribe_id: Option<Uuid>,
    pub chapter_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub effective_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_overall_rounds_to_one_decimal() {
        let mut details = BTreeMap::new();
        details.insert("ENG".to_string(), 3);
        details.insert("DES".to_string(), 0);
        details.insert("OPS".to_string(), 0);
        details.insert("COM".to_string(), 0);
        details.insert("LEAD".to_string(), 0);
        // 3 / 5 = 0.6
        assert!((SenioritySnapshot::compute_overall(&details) - 0.6).abs() < 0.05);

        details.insert("ENG".to_string(), 2);
        details.insert("DES".to_string(), 2);
        details.insert("OPS".to_string(), 3);
        // (2 + 2 + 3) / 5 = 1.4
        assert!((SenioritySnapshot::compute_overall(&details) - 1.4).abs() < 0.05);
    }

    #[test]
    fn test_compute_overall_empty_map() {
        let details = BTreeMap::new();
        assert_eq!(SenioritySnapshot::compute_overall(&details), 0.0);
    }

    #[test]
    fn test_seniority_level_round_trip() {
        for level in [
            SeniorityLevel::Junior,
            SeniorityLevel::Mid,
            SeniorityLevel::Senior,
            SeniorityLevel::Principal,
        ] {
            assert_eq!(SeniorityLevel::parse(level.as_str()).unwrap(), level);
        }
        assert!(SeniorityLevel::parse("STAFF").is_err());
    }
}
