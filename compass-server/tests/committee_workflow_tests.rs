//! End-to-end committee workflows over HTTP: a proposal moves from draft to
//! finalised summary, and the derived permission rows, snapshots and
//! timeline events all land through the same handlers a client would hit.

mod helpers;

use axum::http::StatusCode;
use helpers::*;
use serde_json::json;

const SW_ASPECTS: [&str; 5] = ["ENG", "DES", "OPS", "COM", "LEAD"];

/// Promotion with a pay step and one aspect delta. The leader writes the
/// summary, the pipeline derives PAY_CHANGE + SENIORITY_CHANGE, and the
/// snapshots become visible through the profile endpoints.
#[tokio::test]
async fn test_promotion_flow_from_draft_to_timeline() {
    let t = create_test_app().await;

    let leader = user("leader@compass.io");
    seed_user(&t.pool, &leader).await;
    let mut owner = user("owner@compass.io");
    owner.leader_id = Some(leader.id);
    seed_user(&t.pool, &owner).await;
    let ladder_id = seed_ladder(&t.pool, "SW", "Software", &SW_ASPECTS).await;

    let owner_token = token_for(&owner);
    let leader_token = token_for(&leader);

    let (status, created) = post(
        &t.app,
        "/notes/",
        &owner_token,
        json!({
            "title": "Promotion proposal",
            "note_type": "PROPOSAL",
            "proposal_type": "PROMOTION",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let note_id = created["id"].as_str().unwrap().to_string();
    let note_uri = format!("/notes/{}/", note_id);

    // Send to committee
    let (status, sent) = patch(
        &t.app,
        &note_uri,
        &owner_token,
        json!({"submit_status": "PENDING"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["submit_status"], "PENDING");

    // Sending consumed the owner's edit bit
    let (status, _) = patch(
        &t.app,
        &note_uri,
        &owner_token,
        json!({"title": "second thoughts"}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The leader files the committee decision
    let (status, summary) = post(
        &t.app,
        &format!("/notes/{}/summaries/", note_id),
        &leader_token,
        json!({
            "content": "Promoted",
            "ladder_id": ladder_id,
            "aspect_changes": {"DES": {"changed": true, "new_level": 3}},
            "salary_change": 1.0,
            "committee_date": "2024-06-01",
            "submit_status": "DONE",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["submit_status"], "DONE");

    // The note flipped to REVIEWED in the same transaction
    let (_, note) = get(&t.app, &note_uri, &owner_token).await;
    assert_eq!(note["submit_status"], "REVIEWED");

    // A DONE summary is immutable
    let (status, _) = put(
        &t.app,
        &format!("/notes/{}/summaries/", note_id),
        &leader_token,
        json!({"content": "edited after the fact"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Two derived events: the pay step and the aspect move
    let (status, page) = get(
        &t.app,
        &format!("/users/{}/timeline/", owner.id),
        &leader_token,
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
    assert!(texts.iter().any(|t| *t == "افزایش پله‌ی حقوقی: 1"));
    assert!(texts.iter().any(|t| t.contains("DES") && t.contains("(+3)")));

    // The seniority snapshot is the owner's current ladder now
    let (status, level) = get(&t.app, "/profile/current-ladder/", &owner_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(level["ladder_code"], "SW");
    assert_eq!(level["details"]["DES"], 3);
    assert_eq!(level["details"]["ENG"], 0);
    assert!((level["overall_score"].as_f64().unwrap() - 0.6).abs() < 0.05);
    assert_eq!(level["effective_date"], "2024-06-01");
}

/// Committee members see a proposal only once it is sent, and a second
/// summary on the same note is a uniqueness conflict.
#[tokio::test]
async fn test_committee_member_visibility_and_summary_conflict() {
    let t = create_test_app().await;

    let member = user("member@compass.io");
    seed_user(&t.pool, &member).await;
    let c = committee("Engineering", vec![member.id]);
    seed_committee(&t.pool, &c).await;
    let mut owner = user("owner@compass.io");
    owner.committee_id = Some(c.id);
    seed_user(&t.pool, &owner).await;

    let owner_token = token_for(&owner);
    let member_token = token_for(&member);

    let (_, created) = post(
        &t.app,
        "/notes/",
        &owner_token,
        json!({
            "title": "Evaluation proposal",
            "note_type": "PROPOSAL",
            "proposal_type": "EVALUATION",
        }),
    )
    .await;
    let note_id = created["id"].as_str().unwrap().to_string();
    let note_uri = format!("/notes/{}/", note_id);

    // Draft: invisible to the committee, and the member cannot open a
    // summary on a proposal the owner never sent
    let (status, _) = get(&t.app, &note_uri, &member_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = post(
        &t.app,
        &format!("/notes/{}/summaries/", note_id),
        &member_token,
        json!({"performance_label": "Early", "submit_status": "DONE"}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = patch(
        &t.app,
        &note_uri,
        &owner_token,
        json!({"submit_status": "PENDING"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Sent: the member reads it and files the decision
    let (status, _) = get(&t.app, &note_uri, &member_token).await;
    assert_eq!(status, StatusCode::OK);

    let summaries_uri = format!("/notes/{}/summaries/", note_id);
    let (status, _) = post(
        &t.app,
        &summaries_uri,
        &member_token,
        json!({
            "performance_label": "Great",
            "submit_status": "DONE",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(
        &t.app,
        &summaries_uri,
        &member_token,
        json!({"performance_label": "Twice"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "CONFLICT");

    // The owner sees exactly one EVALUATION event with the label text
    let (status, page) = get(
        &t.app,
        &format!("/users/{}/timeline/", owner.id),
        &owner_token,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["events"][0]["event_type"], "EVALUATION");
    assert_eq!(page["events"][0]["summary_text"], "Great");
}

/// A committee member who is also mentioned on a draft gets the mention row
/// (read + feedback, no summary rights) until the proposal is sent.
#[tokio::test]
async fn test_mention_wins_on_draft_committee_wins_once_sent() {
    let t = create_test_app().await;

    let member = user("member@compass.io");
    seed_user(&t.pool, &member).await;
    let c = committee("Engineering", vec![member.id]);
    seed_committee(&t.pool, &c).await;
    let mut owner = user("owner@compass.io");
    owner.committee_id = Some(c.id);
    seed_user(&t.pool, &owner).await;

    let owner_token = token_for(&owner);
    let member_token = token_for(&member);

    let (_, created) = post(
        &t.app,
        "/notes/",
        &owner_token,
        json!({
            "title": "Promotion proposal",
            "note_type": "PROPOSAL",
            "proposal_type": "PROMOTION",
            "mentioned_users": [member.id],
        }),
    )
    .await;
    let note_id = created["id"].as_str().unwrap().to_string();

    // Draft: mention row lets the member read, not work the summary
    let (status, _) = get(&t.app, &format!("/notes/{}/", note_id), &member_token).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(
        &t.app,
        &format!("/notes/{}/summaries/", note_id),
        &member_token,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = patch(
        &t.app,
        &format!("/notes/{}/", note_id),
        &owner_token,
        json!({"submit_status": "PENDING"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Sent: the committee row is back in force
    let (status, _) = post(
        &t.app,
        &format!("/notes/{}/summaries/", note_id),
        &member_token,
        json!({"content": "draft decision"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
