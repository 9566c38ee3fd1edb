//! Org reference data for pickers: tags, teams and tribes.

use axum::extract::{Query, State};
use axum::Json;
use compass_common::models::{Team, Tribe, ValueTag};
use serde::Deserialize;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ValueTagsQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// GET /value-tags/
///
/// Active tags by default; `?include_inactive=true` shows retired ones too.
pub async fn list_value_tags(
    State(state): State<AppState>,
    Query(query): Query<ValueTagsQuery>,
) -> ApiResult<Json<Vec<ValueTag>>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let tags = db::value_tags::list_value_tags(&mut conn, !query.include_inactive).await?;
    Ok(Json(tags))
}

/// GET /teams/
pub async fn list_teams(State(state): State<AppState>) -> ApiResult<Json<Vec<Team>>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let teams = db::orgs::list_teams(&mut conn).await?;
    Ok(Json(teams))
}

/// GET /tribes/
pub async fn list_tribes(State(state): State<AppState>) -> ApiResult<Json<Vec<Tribe>>> {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let tribes = db::orgs::list_tribes(&mut conn).await?;
    Ok(Json(tribes))
}
