//! User accounts and API keys

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Employee record with its organisational foreign keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub gmail: Option<String>,
    pub phone: Option<String>,
    pub department_id: Option<Uuid>,
    pub chapter_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    /// Direct leader (self-reference). The leader chain is bounded at ten
    /// hops when traversed.
    pub leader_id: Option<Uuid>,
    pub agile_coach_id: Option<Uuid>,
    /// Committee reviewing this user's proposals
    pub committee_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored API key. Only the salted hash and the lookup prefix persist; the
/// full token is shown once at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    /// First 12 characters of the token, used for indexed lookup
    pub prefix: String,
    pub hashed_key: String,
    pub salt: String,
    pub user_id: Uuid,
    pub is_active: bool,
    pub last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
