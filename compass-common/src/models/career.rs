//! Career artefacts recorded outside the committee flow, plus the data-access
//! override used by the visibility service

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleChange {
    pub id: Uuid,
    pub user_id: Uuid,
    pub old_title: String,
    pub new_title: String,
    pub effective_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Performance notice. `notice_type` is the display text stamped onto the
/// derived timeline event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notice_type: String,
    pub effective_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockGrant {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: f64,
    pub effective_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Which slice of the workforce an override exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverrideScope {
    All,
    Tech,
    Product,
}

impl OverrideScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideScope::All => "ALL",
            OverrideScope::Tech => "TECH",
            OverrideScope::Product => "PRODUCT",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ALL" => Ok(OverrideScope::All),
            "TECH" => Ok(OverrideScope::Tech),
            "PRODUCT" => Ok(OverrideScope::Product),
            other => Err(Error::InvalidInput(format!(
                "Unknown override scope: {}",
                other
            ))),
        }
    }
}

/// Grant letting a viewer see users beyond their role-derived set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataAccessOverride {
    pub id: Uuid,
    pub user_id: Uuid,
    pub granted_by: Uuid,
    pub scope: OverrideScope,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl DataAccessOverride {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |exp| exp > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_override_expiry() {
        let now = Utc::now();
        let mut grant = DataAccessOverride {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            granted_by: Uuid::new_v4(),
            scope: OverrideScope::All,
            expires_at: None,
            is_active: true,
            created_at: now,
        };
        assert!(grant.is_live(now));

        grant.expires_at = Some(now + Duration::days(1));
        assert!(grant.is_live(now));

        grant.expires_at = Some(now - Duration::days(1));
        assert!(!grant.is_live(now));

        grant.expires_at = None;
        grant.is_active = false;
        assert!(!grant.is_live(now));
    }

    #[test]
    fn test_override_scope_round_trip() {
        for scope in [OverrideScope::All, OverrideScope::Tech, OverrideScope::Product] {
            assert_eq!(OverrideScope::parse(scope.as_str()).unwrap(), scope);
        }
        assert!(OverrideScope::parse("FINANCE").is_err());
    }
}
