//! Personnel performance table endpoints.
//!
//! Thin wrappers over the table service: parse the query, load the viewer,
//! hand back the page. The CSV variant runs the identical selection without
//! pagination and ships it as an attachment.

use axum::extract::{Extension, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use std::collections::HashMap;

use crate::auth::RequestContext;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::performance::{self, TableParams, TablePage};
use crate::AppState;

/// GET /personnel/performance-table/
pub async fn performance_table(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult<Json<TablePage>> {
    let params = TableParams::from_query(&query)?;

    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let viewer = db::users::get_user(&mut conn, ctx.user_id).await?;
    let page = performance::build_table(&mut conn, &viewer, &params).await?;
    Ok(Json(page))
}

/// GET /personnel/performance-table/csv
pub async fn performance_table_csv(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    let mut params = TableParams::from_query(&query)?;
    // Same selection as the JSON table, just never paginated
    params.page = 1;
    params.page_size = i64::MAX;

    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|e| ApiError::Common(e.into()))?;

    let viewer = db::users::get_user(&mut conn, ctx.user_id).await?;
    let page = performance::build_table(&mut conn, &viewer, &params).await?;

    let csv = performance::to_csv(&page.rows);
    let filename = performance::csv_filename(params.as_of, Utc::now());
    Ok((
        [
            (
                header::CONTENT_TYPE,
                "text/csv; charset=utf-8".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        csv,
    ))
}
