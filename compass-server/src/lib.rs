//! compass-server library - performance management backend
//!
//! HTTP façade over the entity store, the access policy engine and the
//! committee pipeline. Every route except `/health` sits behind the
//! authentication middleware; mutating handlers run inside a single
//! database transaction so signal-driven derived writes commit atomically
//! with the triggering change.

use axum::Router;
use compass_common::config::ServerConfig;
use sqlx::SqlitePool;
use std::sync::Arc;

pub mod api;
pub mod auth;
pub mod db;
pub mod error;
pub mod services;

#[cfg(test)]
pub(crate) mod test_util;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Resolved server configuration (JWT secret, timeline feature gate)
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, config: ServerConfig) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }
}

/// Build application router.
///
/// Protected routes require a JWT bearer or API key; `/health` does not.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    // Protected routes (require authentication)
    let protected = Router::new()
        .route(
            "/profile/",
            get(api::profile::get_profile).put(api::profile::update_profile),
        )
        .route(
            "/profile/current-ladder/",
            get(api::profile::current_ladder_self),
        )
        .route(
            "/profile/:user_id/current-ladder/",
            get(api::profile::current_ladder_for),
        )
        .route("/profile/permissions/", get(api::profile::get_permissions))
        .route("/users/", get(api::users::list_users))
        .route("/my-team/", get(api::users::my_team))
        .route("/users/:user_id/timeline/", get(api::users::user_timeline))
        .route(
            "/notes/",
            get(api::notes::list_notes).post(api::notes::create_note),
        )
        .route(
            "/notes/:note_id/",
            get(api::notes::get_note)
                .put(api::notes::update_note)
                .patch(api::notes::patch_note)
                .delete(api::notes::delete_note),
        )
        .route(
            "/notes/:note_id/feedbacks/",
            get(api::notes::list_note_feedbacks).post(api::notes::create_note_feedback),
        )
        .route(
            "/notes/:note_id/summaries/",
            get(api::notes::list_note_summaries)
                .post(api::notes::create_summary)
                .put(api::notes::update_summary),
        )
        .route(
            "/one-on-ones/:member_id/",
            get(api::one_on_ones::list_one_on_ones).post(api::one_on_ones::create_one_on_one),
        )
        .route(
            "/one-on-ones/:member_id/:id/",
            get(api::one_on_ones::get_one_on_one).patch(api::one_on_ones::patch_one_on_one),
        )
        .route(
            "/feedback-requests/",
            get(api::feedbacks::list_requests).post(api::feedbacks::create_request),
        )
        .route(
            "/feedback-entries/",
            get(api::feedbacks::list_entries).post(api::feedbacks::create_entry),
        )
        .route(
            "/forms/",
            get(api::forms::list_forms).post(api::forms::create_form),
        )
        .route("/forms/assigned-by/", get(api::forms::assigned_by))
        .route("/forms/:form_id/", get(api::forms::get_form))
        .route("/forms/:form_id/submit/", post(api::forms::submit_form))
        .route("/forms/:form_id/results/", get(api::forms::form_results))
        .route("/title-changes/", post(api::career::create_title_change))
        .route("/notices/", post(api::career::create_notice))
        .route("/stock-grants/", post(api::career::create_stock_grant))
        .route(
            "/personnel/performance-table/",
            get(api::performance::performance_table),
        )
        .route(
            "/personnel/performance-table/csv",
            get(api::performance::performance_table_csv),
        )
        .route("/value-tags/", get(api::org::list_value_tags))
        .route("/teams/", get(api::org::list_teams))
        .route("/tribes/", get(api::org::list_tribes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    // Public routes (no authentication)
    let public = api::health::health_routes();

    Router::new()
        .merge(protected)
        .merge(public)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
