//! Shared fixtures for the HTTP integration tests: a file-backed test
//! database, the fully wired router, and request/seed helpers.

// Each test binary compiles its own copy and uses a different subset
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use compass_common::config::{ServerConfig, TimelineAccess};
use compass_common::models::{
    Chapter, Committee, Ladder, LadderAspect, Organization, Team, Tribe, User,
};
use compass_server::{auth, build_router, AppState};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";

/// Router plus the pool backing it. The temp dir must stay alive for the
/// duration of the test, so it rides along.
pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    _dir: TempDir,
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with(TimelineAccess::All).await
}

pub async fn create_test_app_with(timeline_access: TimelineAccess) -> TestApp {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = dir.path().join("compass_test.db");
    let url = format!("sqlite:{}?mode=rwc", db_path.display());

    let pool = SqlitePool::connect(&url)
        .await
        .expect("Failed to open test database");
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .expect("Failed to enable foreign keys");
    compass_common::db::create_all_tables(&pool)
        .await
        .expect("Failed to create schema");

    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        jwt_secret: JWT_SECRET.to_string(),
        timeline_access,
    };
    let app = build_router(AppState::new(pool.clone(), config));

    TestApp {
        app,
        pool,
        _dir: dir,
    }
}

/// Bearer token for a seeded user
pub fn token_for(user: &User) -> String {
    auth::issue_token(JWT_SECRET, user, 3600).expect("Failed to sign test token")
}

/// Fire one request and collect the response as (status, parsed JSON body).
/// Empty bodies come back as `Value::Null`.
pub async fn request(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("Failed to build request");

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("Request failed");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

pub async fn get(app: &Router, uri: &str, token: &str) -> (StatusCode, Value) {
    request(app, Method::GET, uri, Some(token), None).await
}

pub async fn post(app: &Router, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
    request(app, Method::POST, uri, Some(token), Some(body)).await
}

pub async fn patch(app: &Router, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
    request(app, Method::PATCH, uri, Some(token), Some(body)).await
}

pub async fn put(app: &Router, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
    request(app, Method::PUT, uri, Some(token), Some(body)).await
}

// --- seeding -------------------------------------------------------------

pub fn user(email: &str) -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        display_name: email.split('@').next().unwrap_or(email).to_string(),
        gmail: None,
        phone: None,
        department_id: None,
        chapter_id: None,
        team_id: None,
        organization_id: None,
        leader_id: None,
        agile_coach_id: None,
        committee_id: None,
        created_at: now,
        updated_at: now,
    }
}

pub async fn seed_user(pool: &SqlitePool, user: &User) {
    let mut conn = pool.acquire().await.unwrap();
    compass_server::db::users::insert_user(&mut conn, user)
        .await
        .expect("Failed to seed user");
}

pub async fn seed_organization(pool: &SqlitePool, org: &Organization) {
    let mut conn = pool.acquire().await.unwrap();
    compass_server::db::orgs::insert_organization(&mut conn, org)
        .await
        .expect("Failed to seed organization");
}

pub fn organization(name: &str) -> Organization {
    let now = Utc::now();
    Organization {
        id: Uuid::new_v4(),
        name: name.to_string(),
        ceo: None,
        vp: None,
        cto: None,
        cpo: None,
        cfo: None,
        hr_manager: None,
        sales_manager: None,
        function_owner: None,
        maintainer: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn committee(name: &str, members: Vec<Uuid>) -> Committee {
    let now = Utc::now();
    Committee {
        id: Uuid::new_v4(),
        name: name.to_string(),
        members,
        roles: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

pub async fn seed_committee(pool: &SqlitePool, committee: &Committee) {
    let mut conn = pool.acquire().await.unwrap();
    compass_server::db::committees::insert_committee(&mut conn, committee)
        .await
        .expect("Failed to seed committee");
}

pub fn tribe(name: &str) -> Tribe {
    let now = Utc::now();
    Tribe {
        id: Uuid::new_v4(),
        name: name.to_string(),
        department_id: None,
        category: None,
        product_director: None,
        engineering_director: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn team(name: &str) -> Team {
    let now = Utc::now();
    Team {
        id: Uuid::new_v4(),
        name: name.to_string(),
        department_id: None,
        tribe_id: None,
        leader: None,
        category: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn chapter(name: &str) -> Chapter {
    let now = Utc::now();
    Chapter {
        id: Uuid::new_v4(),
        name: name.to_string(),
        department_id: None,
        leader: None,
        created_at: now,
        updated_at: now,
    }
}

/// Ladder with one aspect row per code, in the given order
pub async fn seed_ladder(pool: &SqlitePool, code: &str, name: &str, aspects: &[&str]) -> Uuid {
    let mut conn = pool.acquire().await.unwrap();
    let now = Utc::now();
    let ladder = Ladder {
        id: Uuid::new_v4(),
        code: code.to_string(),
        name: name.to_string(),
        created_at: now,
        updated_at: now,
    };
    compass_server::db::ladders::insert_ladder(&mut conn, &ladder)
        .await
        .expect("Failed to seed ladder");
    for (i, aspect_code) in aspects.iter().enumerate() {
        let aspect = LadderAspect {
            id: Uuid::new_v4(),
            ladder_id: ladder.id,
            code: aspect_code.to_string(),
            name: aspect_code.to_string(),
            sort_order: i as i64,
        };
        compass_server::db::ladders::insert_aspect(&mut conn, &aspect)
            .await
            .expect("Failed to seed aspect");
    }
    ladder.id
}
