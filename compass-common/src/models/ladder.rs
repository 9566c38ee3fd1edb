//! Career ladders: competency aspects, graded levels and pay bands

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ladder {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Competency axis within a ladder, unique per `(ladder, code)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderAspect {
    pub id: Uuid,
    pub ladder_id: Uuid,
    pub code: String,
    pub name: String,
    pub sort_order: i64,
}

/// Within-level stage. Contributes a fractional offset to the numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Early,
    Mid,
    Late,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Early => "EARLY",
            Stage::Mid => "MID",
            Stage::Late => "LATE",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "EARLY" => Ok(Stage::Early),
            "MID" => Ok(Stage::Mid),
            "LATE" => Ok(Stage::Late),
            other => Err(Error::InvalidInput(format!("Unknown stage: {}", other))),
        }
    }

    /// Fractional offset added to the integer level
    pub fn offset(&self) -> f64 {
        match self {
            Stage::Early => 0.0,
            Stage::Mid => 0.3,
            Stage::Late => 0.6,
        }
    }
}

/// Grade step on one aspect, unique per `(ladder, aspect, level, stage)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderLevel {
    pub id: Uuid,
    pub ladder_id: Uuid,
    pub aspect_id: Uuid,
    pub level: i64,
    pub stage: Stage,
    pub weight: f64,
}

impl LadderLevel {
    /// Numeric value of the step: `level + stage offset`
    pub fn numeric_value(&self) -> f64 {
        self.level as f64 + self.stage.offset()
    }
}

/// Salary band on a 0.5-step scale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayBand {
    pub id: Uuid,
    pub number: f64,
}

/// Round a band number to the nearest 0.5 step
pub fn round_to_band(value: f64) -> f64 {
    (value * 2.0).round() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_offsets() {
        assert_eq!(Stage::Early.offset(), 0.0);
        assert_eq!(Stage::Mid.offset(), 0.3);
        assert_eq!(Stage::Late.offset(), 0.6);
    }

    #[test]
    fn test_numeric_value() {
        let level = LadderLevel {
            id: Uuid::new_v4(),
            ladder_id: Uuid::new_v4(),
            aspect_id: Uuid::new_v4(),
            level: 3,
            stage: Stage::Mid,
            weight: 1.0,
        };
        assert!((level.numeric_value() - 3.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_round_to_band() {
        assert_eq!(round_to_band(4.2), 4.0);
        assert_eq!(round_to_band(4.3), 4.5);
        assert_eq!(round_to_band(4.75), 5.0);
        assert_eq!(round_to_band(-0.3), -0.5);
        assert_eq!(round_to_band(7.0), 7.0);
    }
}
