//! Integration tests for the HTTP surface: authentication, note CRUD with
//! permission checks, the timeline feature gate, and the performance table
//! parameter handling.

mod helpers;

use axum::http::{Method, StatusCode};
use compass_common::config::TimelineAccess;
use compass_server::{auth, db};
use helpers::*;
use serde_json::json;

#[tokio::test]
async fn test_health_needs_no_credentials() {
    let t = create_test_app().await;

    let (status, body) = request(&t.app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "compass-server");
}

#[tokio::test]
async fn test_missing_credentials_rejected() {
    let t = create_test_app().await;

    let (status, body) = request(&t.app, Method::GET, "/notes/", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_garbage_bearer_rejected() {
    let t = create_test_app().await;

    let (status, _) = get(&t.app, "/notes/", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_for_deleted_user_rejected() {
    let t = create_test_app().await;

    // Valid signature, but the subject was never persisted
    let ghost = user("ghost@compass.io");
    let (status, _) = get(&t.app, "/profile/", &token_for(&ghost)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_api_key_authenticates() {
    let t = create_test_app().await;

    let alice = user("alice@compass.io");
    seed_user(&t.pool, &alice).await;
    let (key, cleartext) = auth::generate_api_key(alice.id);
    {
        let mut conn = t.pool.acquire().await.unwrap();
        db::api_keys::insert_api_key(&mut conn, &key).await.unwrap();
    }

    let req = axum::http::Request::builder()
        .method(Method::GET)
        .uri("/profile/")
        .header("x-api-key", &cleartext)
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::util::ServiceExt::oneshot(t.app.clone(), req)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_note_crud_respects_permission_rows() {
    let t = create_test_app().await;

    let alice = user("alice@compass.io");
    let bob = user("bob@compass.io");
    seed_user(&t.pool, &alice).await;
    seed_user(&t.pool, &bob).await;
    let alice_token = token_for(&alice);
    let bob_token = token_for(&bob);

    let (status, created) = post(
        &t.app,
        "/notes/",
        &alice_token,
        json!({"title": "Q3 planning", "content": "agenda", "note_type": "TASK"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let note_id = created["id"].as_str().unwrap().to_string();

    // Owner reads it back
    let uri = format!("/notes/{}/", note_id);
    let (status, fetched) = get(&t.app, &uri, &alice_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "Q3 planning");

    // Bob holds no row
    let (status, _) = get(&t.app, &uri, &bob_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = put(
        &t.app,
        &uri,
        &bob_token,
        json!({"title": "hijacked"}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Owner deletes; the note is gone
    let (status, _) = request(&t.app, Method::DELETE, &uri, Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = get(&t.app, &uri, &alice_token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mentioned_user_can_read_and_leave_feedback() {
    let t = create_test_app().await;

    let alice = user("alice@compass.io");
    let bob = user("bob@compass.io");
    seed_user(&t.pool, &alice).await;
    seed_user(&t.pool, &bob).await;

    let (status, created) = post(
        &t.app,
        "/notes/",
        &token_for(&alice),
        json!({
            "title": "Incident review",
            "note_type": "MEETING",
            "mentioned_users": [bob.id],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let note_id = created["id"].as_str().unwrap();

    let bob_token = token_for(&bob);
    let (status, _) = get(&t.app, &format!("/notes/{}/", note_id), &bob_token).await;
    assert_eq!(status, StatusCode::OK);

    let (status, feedback) = post(
        &t.app,
        &format!("/notes/{}/feedbacks/", note_id),
        &bob_token,
        json!({"content": "Good writeup"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feedback["receiver_id"], json!(alice.id));

    // A mention grants no summary rights
    let (status, _) = get(&t.app, &format!("/notes/{}/summaries/", note_id), &bob_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_self_mention_rejected_with_field_map() {
    let t = create_test_app().await;

    let alice = user("alice@compass.io");
    seed_user(&t.pool, &alice).await;

    let (status, body) = post(
        &t.app,
        "/notes/",
        &token_for(&alice),
        json!({
            "title": "Notes to self",
            "note_type": "MEETING",
            "mentioned_users": [alice.id],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["error"]["fields"]["mentioned_users"].is_string());
}

#[tokio::test]
async fn test_proposal_type_requires_proposal_note() {
    let t = create_test_app().await;

    let alice = user("alice@compass.io");
    seed_user(&t.pool, &alice).await;

    let (status, body) = post(
        &t.app,
        "/notes/",
        &token_for(&alice),
        json!({
            "title": "Goal",
            "note_type": "GOAL",
            "proposal_type": "PROMOTION",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["fields"]["proposal_type"].is_string());

    // The other direction: a proposal without a proposal type would sail
    // through committee review and derive nothing, so it is rejected up front
    let (status, body) = post(
        &t.app,
        "/notes/",
        &token_for(&alice),
        json!({
            "title": "Promotion proposal",
            "note_type": "PROPOSAL",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["error"]["fields"]["proposal_type"].is_string());
}

#[tokio::test]
async fn test_timeline_gate_off_blocks_everyone() {
    let t = create_test_app_with(TimelineAccess::Off).await;

    let alice = user("alice@compass.io");
    seed_user(&t.pool, &alice).await;

    let uri = format!("/users/{}/timeline/", alice.id);
    let (status, _) = get(&t.app, &uri, &token_for(&alice)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_timeline_gate_hr_allows_self_and_hr_only() {
    let t = create_test_app_with(TimelineAccess::Hr).await;

    let alice = user("alice@compass.io");
    let hr = user("hr@compass.io");
    let stranger = user("stranger@compass.io");
    seed_user(&t.pool, &alice).await;
    seed_user(&t.pool, &hr).await;
    seed_user(&t.pool, &stranger).await;

    let mut org = organization("Compass");
    org.hr_manager = Some(hr.id);
    seed_organization(&t.pool, &org).await;

    let uri = format!("/users/{}/timeline/", alice.id);
    let (status, body) = get(&t.app, &uri, &token_for(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);

    let (status, _) = get(&t.app, &uri, &token_for(&hr)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get(&t.app, &uri, &token_for(&stranger)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_timeline_gate_all_applies_visibility_predicate() {
    let t = create_test_app().await;

    let leader = user("leader@compass.io");
    seed_user(&t.pool, &leader).await;
    let mut report = user("report@compass.io");
    report.leader_id = Some(leader.id);
    seed_user(&t.pool, &report).await;
    let stranger = user("stranger@compass.io");
    seed_user(&t.pool, &stranger).await;

    let uri = format!("/users/{}/timeline/", report.id);
    let (status, _) = get(&t.app, &uri, &token_for(&leader)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(&t.app, &uri, &token_for(&stranger)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_timeline_pagination_bounds() {
    let t = create_test_app().await;

    let alice = user("alice@compass.io");
    seed_user(&t.pool, &alice).await;
    let token = token_for(&alice);

    let base = format!("/users/{}/timeline/", alice.id);
    let (status, _) = get(&t.app, &format!("{}?page=0", base), &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get(&t.app, &format!("{}?page_size=501", base), &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get(&t.app, &format!("{}?page_size=500", base), &token).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_performance_table_parameter_handling() {
    let t = create_test_app().await;

    let hr = user("hr@compass.io");
    seed_user(&t.pool, &hr).await;
    let mut org = organization("Compass");
    org.hr_manager = Some(hr.id);
    seed_organization(&t.pool, &org).await;
    let token = token_for(&hr);

    // Oversized page size is clamped, not rejected
    let (status, body) = get(
        &t.app,
        "/personnel/performance-table/?page_size=9999",
        &token,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page_size"], 500);
    assert_eq!(body["total"], 1);

    let (status, _) = get(
        &t.app,
        "/personnel/performance-table/?as_of=yesterday",
        &token,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&t.app, "/personnel/performance-table/?page=0", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown filter keys are ignored
    let (status, body) = get(
        &t.app,
        "/personnel/performance-table/?nonsense=1&ordering=not_a_key",
        &token,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_performance_table_empty_for_unprivileged_viewer() {
    let t = create_test_app().await;

    let nobody = user("nobody@compass.io");
    seed_user(&t.pool, &nobody).await;

    let (status, body) = get(
        &t.app,
        "/personnel/performance-table/",
        &token_for(&nobody),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_performance_csv_sets_attachment_filename() {
    let t = create_test_app().await;

    let hr = user("hr@compass.io");
    seed_user(&t.pool, &hr).await;
    let mut org = organization("Compass");
    org.hr_manager = Some(hr.id);
    seed_organization(&t.pool, &org).await;

    let req = axum::http::Request::builder()
        .method(Method::GET)
        .uri("/personnel/performance-table/csv")
        .header(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {}", token_for(&hr)),
        )
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::util::ServiceExt::oneshot(t.app.clone(), req)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let disposition = response
        .headers()
        .get(axum::http::header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("personnel-performance_current_"));
    assert!(disposition.ends_with(".csv\""));

    let content_type = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/csv"));
}

#[tokio::test]
async fn test_title_change_is_maintainer_only() {
    let t = create_test_app().await;

    let maintainer = user("maintainer@compass.io");
    let alice = user("alice@compass.io");
    seed_user(&t.pool, &maintainer).await;
    seed_user(&t.pool, &alice).await;
    let mut org = organization("Compass");
    org.maintainer = Some(maintainer.id);
    seed_organization(&t.pool, &org).await;

    let body = json!({
        "user_id": alice.id,
        "old_title": "Engineer",
        "new_title": "Senior Engineer",
        "effective_date": "2024-05-01",
    });

    let (status, _) = post(&t.app, "/title-changes/", &token_for(&alice), body.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = post(&t.app, "/title-changes/", &token_for(&maintainer), body).await;
    assert_eq!(status, StatusCode::OK);

    // The change surfaced on the timeline
    let (status, page) = get(
        &t.app,
        &format!("/users/{}/timeline/", alice.id),
        &token_for(&maintainer),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(
        page["events"][0]["summary_text"],
        "Engineer → Senior Engineer"
    );
}

#[tokio::test]
async fn test_notices_and_stock_grants_land_on_timeline() {
    let t = create_test_app().await;

    let maintainer = user("maintainer@compass.io");
    let alice = user("alice@compass.io");
    seed_user(&t.pool, &maintainer).await;
    seed_user(&t.pool, &alice).await;
    let mut org = organization("Compass");
    org.maintainer = Some(maintainer.id);
    seed_organization(&t.pool, &org).await;

    let notice = json!({
        "user_id": alice.id,
        "notice_type": "نوتیس عملکردی",
        "effective_date": "2024-03-10",
    });
    let (status, _) = post(&t.app, "/notices/", &token_for(&alice), notice.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = post(&t.app, "/notices/", &token_for(&maintainer), notice).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notice_type"], "نوتیس عملکردی");

    let grant = json!({
        "user_id": alice.id,
        "amount": 150.0,
        "effective_date": "2024-03-11",
    });
    let (status, _) = post(
        &t.app,
        "/stock-grants/",
        &token_for(&maintainer),
        json!({ "user_id": alice.id, "amount": 0.0 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = post(&t.app, "/stock-grants/", &token_for(&maintainer), grant).await;
    assert_eq!(status, StatusCode::OK);

    let (status, page) = get(
        &t.app,
        &format!("/users/{}/timeline/", alice.id),
        &token_for(&maintainer),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    let texts: Vec<&str> = page["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["summary_text"].as_str().unwrap())
        .collect();
    assert!(texts.contains(&"نوتیس عملکردی"));
    assert!(texts.contains(&"اعطای سهام: 150"));
}
