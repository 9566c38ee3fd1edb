//! User directory, team listing, and the gated career timeline

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use compass_common::config::TimelineAccess;
use compass_common::models::{RoleType, TimelineEvent, User};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::profile::{self, CurrentLadderResponse};
use crate::auth::RequestContext;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::{roles, visibility};
use crate::AppState;

/// GET /users/
///
/// Full directory; mention pickers and feedback routing need every account,
/// so this is not narrowed by the visibility tiers.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(_ctx): Extension<RequestContext>,
) -> ApiResult<Json<Vec<User>>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let users = db::users::list_users(&mut conn).await?;
    Ok(Json(users))
}

/// GET /my-team/
pub async fn my_team(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<Vec<User>>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let members = db::users::list_users_by_leader(&mut conn, ctx.user_id).await?;
    Ok(Json(members))
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    50
}

const MAX_TIMELINE_PAGE_SIZE: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    #[serde(default)]
    pub include_level: bool,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

#[derive(Debug, Serialize)]
pub struct TimelinePage {
    pub events: Vec<TimelineEvent>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_level: Option<CurrentLadderResponse>,
}

/// GET /users/:user_id/timeline/
///
/// Gated by the timeline feature flag: `off` rejects everyone, `dev`
/// restricts to Maintainers, `hr` to HR manager / CEO / Maintainer plus the
/// user themselves, `all` applies the regular visibility predicate.
pub async fn user_timeline(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<TimelineQuery>,
) -> ApiResult<Json<TimelinePage>> {
    if query.page < 1 {
        return Err(ApiError::BadRequest(format!("Bad page: {}", query.page)));
    }
    if query.page_size < 1 || query.page_size > MAX_TIMELINE_PAGE_SIZE {
        return Err(ApiError::BadRequest(format!(
            "Bad page size: {}",
            query.page_size
        )));
    }

    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let viewer = db::users::get_user(&mut conn, ctx.user_id).await?;
    let target = db::users::get_user(&mut conn, user_id).await?;

    let allowed = match state.config.timeline_access {
        TimelineAccess::Off => false,
        TimelineAccess::Dev => {
            let held = roles::organization_roles(&mut conn, viewer.id).await?;
            held.contains(&RoleType::Maintainer)
        }
        TimelineAccess::Hr => {
            if viewer.id == target.id {
                true
            } else {
                let held = roles::organization_roles(&mut conn, viewer.id).await?;
                held.contains(&RoleType::HrManager)
                    || held.contains(&RoleType::Ceo)
                    || held.contains(&RoleType::Maintainer)
            }
        }
        TimelineAccess::All => visibility::can_view_timeline(&mut conn, &viewer, &target).await?,
    };
    if !allowed {
        return Err(ApiError::Forbidden(
            "Not allowed to view this timeline".to_string(),
        ));
    }

    let offset = (query.page - 1) * query.page_size;
    let events = db::timeline::list_for_user(&mut conn, target.id, query.page_size, offset).await?;
    let total = db::timeline::count_for_user(&mut conn, target.id).await?;

    let current_level = if query.include_level {
        match profile::current_ladder_of(&mut conn, target.id).await {
            Ok(level) => Some(level),
            Err(ApiError::NotFound(_)) => None,
            Err(e) => return Err(e),
        }
    } else {
        None
    };

    Ok(Json(TimelinePage {
        events,
        total,
        page: query.page,
        page_size: query.page_size,
        current_level,
    }))
}
