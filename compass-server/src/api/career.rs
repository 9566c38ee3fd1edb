//! Career artefacts recorded outside the committee flow.

use axum::extract::{Extension, State};
use axum::Json;
use chrono::{NaiveDate, Utc};
use compass_common::models::{Notice, RoleType, StockGrant, TitleChange};
use sqlx::SqliteConnection;
use compass_common::Signal;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::RequestContext;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::{dispatch, roles};
use crate::AppState;

async fn require_maintainer(conn: &mut SqliteConnection, user_id: Uuid) -> ApiResult<()> {
    let held = roles::organization_roles(&mut *conn, user_id).await?;
    if !held.contains(&RoleType::Maintainer) {
        return Err(ApiError::Forbidden(
            "Only the maintainer can record career artefacts".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CreateTitleChangeRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub old_title: String,
    pub new_title: String,
    #[serde(default)]
    pub effective_date: Option<NaiveDate>,
}

/// POST /title-changes/
///
/// Maintainer-only. The derived timeline event lands in the same
/// transaction.
pub async fn create_title_change(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<CreateTitleChangeRequest>,
) -> ApiResult<Json<TitleChange>> {
    if body.new_title.trim().is_empty() {
        return Err(ApiError::field("new_title", "Must not be empty"));
    }

    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    require_maintainer(&mut tx, ctx.user_id).await?;
    db::users::get_user(&mut tx, body.user_id).await?;

    let change = TitleChange {
        id: Uuid::new_v4(),
        user_id: body.user_id,
        old_title: body.old_title,
        new_title: body.new_title,
        effective_date: body.effective_date.unwrap_or_else(|| Utc::now().date_naive()),
        created_at: Utc::now(),
    };
    db::career::insert_title_change(&mut tx, &change).await?;

    dispatch::dispatch(
        &mut tx,
        Some(ctx.user_id),
        Signal::TitleChanged {
            title_change_id: change.id,
        },
    )
    .await?;

    tx.commit().await.map_err(|e| ApiError::Common(e.into()))?;
    Ok(Json(change))
}

#[derive(Debug, Deserialize)]
pub struct CreateNoticeRequest {
    pub user_id: Uuid,
    pub notice_type: String,
    #[serde(default)]
    pub effective_date: Option<NaiveDate>,
}

/// POST /notices/
///
/// Maintainer-only. Notices recorded outside a committee flow; the ones a
/// committee decides ride on the summary instead.
pub async fn create_notice(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<CreateNoticeRequest>,
) -> ApiResult<Json<Notice>> {
    if body.notice_type.trim().is_empty() {
        return Err(ApiError::field("notice_type", "Must not be empty"));
    }

    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    require_maintainer(&mut tx, ctx.user_id).await?;
    db::users::get_user(&mut tx, body.user_id).await?;

    let notice = Notice {
        id: Uuid::new_v4(),
        user_id: body.user_id,
        notice_type: body.notice_type,
        effective_date: body.effective_date.unwrap_or_else(|| Utc::now().date_naive()),
        created_at: Utc::now(),
    };
    db::career::insert_notice(&mut tx, &notice).await?;

    dispatch::dispatch(
        &mut tx,
        Some(ctx.user_id),
        Signal::NoticeRecorded {
            notice_id: notice.id,
        },
    )
    .await?;

    tx.commit().await.map_err(|e| ApiError::Common(e.into()))?;
    Ok(Json(notice))
}

#[derive(Debug, Deserialize)]
pub struct CreateStockGrantRequest {
    pub user_id: Uuid,
    pub amount: f64,
    #[serde(default)]
    pub effective_date: Option<NaiveDate>,
}

/// POST /stock-grants/
///
/// Maintainer-only.
pub async fn create_stock_grant(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<CreateStockGrantRequest>,
) -> ApiResult<Json<StockGrant>> {
    if body.amount <= 0.0 {
        return Err(ApiError::field("amount", "Must be positive"));
    }

    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    require_maintainer(&mut tx, ctx.user_id).await?;
    db::users::get_user(&mut tx, body.user_id).await?;

    let grant = StockGrant {
        id: Uuid::new_v4(),
        user_id: body.user_id,
        amount: body.amount,
        effective_date: body.effective_date.unwrap_or_else(|| Utc::now().date_naive()),
        created_at: Utc::now(),
    };
    db::career::insert_stock_grant(&mut tx, &grant).await?;

    dispatch::dispatch(
        &mut tx,
        Some(ctx.user_id),
        Signal::StockGranted {
            stock_grant_id: grant.id,
        },
    )
    .await?;

    tx.commit().await.map_err(|e| ApiError::Common(e.into()))?;
    Ok(Json(grant))
}
