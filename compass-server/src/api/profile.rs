//! Profile endpoints: self read/update, current ladder, permission hints

use axum::extract::{Extension, Path, State};
use axum::Json;
use chrono::{NaiveDate, Utc};
use compass_common::models::{SeniorityLevel, Stage, User};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::auth::RequestContext;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::visibility;
use crate::AppState;

/// GET /profile/
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<User>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let user = db::users::get_user(&mut conn, ctx.user_id).await?;
    Ok(Json(user))
}

/// PUT /profile/ body. Replaces the self-editable fields; organisational
/// assignments change through admin flows, not here.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: String,
    #[serde(default)]
    pub gmail: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// PUT /profile/
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    if body.display_name.trim().is_empty() {
        return Err(ApiError::field("display_name", "Must not be empty"));
    }

    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let mut user = db::users::get_user(&mut tx, ctx.user_id).await?;
    user.display_name = body.display_name;
    user.gmail = body.gmail;
    user.phone = body.phone;
    user.updated_at = Utc::now();
    db::users::update_user(&mut tx, &user).await?;

    tx.commit().await.map_err(|e| ApiError::Common(e.into()))?;
    Ok(Json(user))
}

/// Latest seniority snapshot joined with its ladder
#[derive(Debug, Serialize)]
pub struct CurrentLadderResponse {
    pub ladder_id: Uuid,
    pub ladder_code: String,
    pub ladder_name: String,
    pub title: Option<String>,
    pub overall_score: f64,
    pub seniority_level: Option<SeniorityLevel>,
    pub details: BTreeMap<String, i64>,
    pub stages: BTreeMap<String, Stage>,
    pub effective_date: NaiveDate,
}

pub(crate) async fn current_ladder_of(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> ApiResult<CurrentLadderResponse> {
    let snapshot = db::snapshots::latest_seniority(&mut *conn, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No ladder mapping recorded".to_string()))?;
    let ladder = db::ladders::get_ladder(&mut *conn, snapshot.ladder_id).await?;

    Ok(CurrentLadderResponse {
        ladder_id: ladder.id,
        ladder_code: ladder.code,
        ladder_name: ladder.name,
        title: snapshot.title,
        overall_score: snapshot.overall_score,
        seniority_level: snapshot.seniority_level,
        details: snapshot.details,
        stages: snapshot.stages,
        effective_date: snapshot.effective_date,
    })
}

/// GET /profile/current-ladder/
pub async fn current_ladder_self(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<CurrentLadderResponse>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let response = current_ladder_of(&mut conn, ctx.user_id).await?;
    Ok(Json(response))
}

/// GET /profile/:user_id/current-ladder/
pub async fn current_ladder_for(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<CurrentLadderResponse>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let viewer = db::users::get_user(&mut conn, ctx.user_id).await?;
    let target = db::users::get_user(&mut conn, user_id).await?;
    if !visibility::can_view_timeline(&mut conn, &viewer, &target).await? {
        return Err(ApiError::Forbidden(
            "Not allowed to view this profile".to_string(),
        ));
    }

    let response = current_ladder_of(&mut conn, target.id).await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct LeaderEntry {
    pub id: Uuid,
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct NamedEntry {
    pub id: Uuid,
    pub name: String,
}

/// Filter-dropdown hints for the performance UI: what the viewer can open,
/// and the distinct leaders / teams / tribes / ladder codes occurring in
/// their visible population.
#[derive(Debug, Serialize)]
pub struct PermissionsResponse {
    pub can_view_performance_table: bool,
    pub timeline_access: String,
    pub leaders: Vec<LeaderEntry>,
    pub teams: Vec<NamedEntry>,
    pub tribes: Vec<NamedEntry>,
    pub ladders: Vec<String>,
}

/// GET /profile/permissions/
pub async fn get_permissions(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<PermissionsResponse>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let viewer = db::users::get_user(&mut conn, ctx.user_id).await?;
    let ids = visibility::visible_user_ids(&mut conn, &viewer).await?;

    let mut visible = Vec::with_capacity(ids.len());
    for id in &ids {
        if let Some(user) = db::users::find_user(&mut conn, *id).await? {
            visible.push(user);
        }
    }

    let leader_ids: BTreeSet<Uuid> = visible.iter().filter_map(|u| u.leader_id).collect();
    let mut leaders = Vec::with_capacity(leader_ids.len());
    for id in leader_ids {
        if let Some(user) = db::users::find_user(&mut conn, id).await? {
            leaders.push(LeaderEntry {
                id: user.id,
                display_name: user.display_name,
            });
        }
    }
    leaders.sort_by(|a, b| a.display_name.cmp(&b.display_name));

    let team_ids: BTreeSet<Uuid> = visible.iter().filter_map(|u| u.team_id).collect();
    let mut teams = Vec::with_capacity(team_ids.len());
    let mut tribe_ids = BTreeSet::new();
    for id in team_ids {
        if let Some(team) = db::orgs::find_team(&mut conn, id).await? {
            if let Some(tribe_id) = team.tribe_id {
                tribe_ids.insert(tribe_id);
            }
            teams.push(NamedEntry {
                id: team.id,
                name: team.name,
            });
        }
    }
    teams.sort_by(|a, b| a.name.cmp(&b.name));

    let mut tribes = Vec::with_capacity(tribe_ids.len());
    for id in tribe_ids {
        if let Some(tribe) = db::orgs::find_tribe(&mut conn, id).await? {
            tribes.push(NamedEntry {
                id: tribe.id,
                name: tribe.name,
            });
        }
    }
    tribes.sort_by(|a, b| a.name.cmp(&b.name));

    let codes = db::snapshots::latest_ladder_codes(&mut conn).await?;
    let ladders: BTreeSet<String> = ids.iter().filter_map(|id| codes.get(id).cloned()).collect();

    Ok(Json(PermissionsResponse {
        can_view_performance_table: !visible.is_empty(),
        timeline_access: state.config.timeline_access.as_str().to_string(),
        leaders,
        teams,
        tribes,
        ladders: ladders.into_iter().collect(),
    }))
}
