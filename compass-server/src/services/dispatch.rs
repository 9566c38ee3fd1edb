//! Signal fan-out
//!
//! Every mutating handler emits a [`Signal`] after its entity write;
//! `dispatch` routes it to the access engine, the committee pipeline and the
//! ancillary snapshot/event triggers. Runs on the caller's connection, so
//! inside a transaction all derived writes commit with the triggering one.

use chrono::Utc;
use compass_common::models::{
    EventSource, EventType, NoteType, OrgAssignmentSnapshot, SubmitStatus, TimelineEvent, User,
    visibility,
};
use compass_common::{Result, Signal};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::db;
use crate::services::{access, pipeline};

pub async fn dispatch(
    conn: &mut SqliteConnection,
    acting_user: Option<Uuid>,
    signal: Signal,
) -> Result<()> {
    tracing::debug!(signal = signal.signal_type(), "Dispatching signal");

    match signal {
        Signal::NoteSaved { note_id } | Signal::MentionsChanged { note_id } => {
            access::recompute(conn, note_id).await
        }

        Signal::CommitteeMembersChanged { committee_id } => {
            let owners = db::users::list_user_ids_by_committee(&mut *conn, committee_id).await?;
            for owner_id in owners {
                let proposals = db::notes::proposals_by_owner(&mut *conn, owner_id, None).await?;
                for note in proposals {
                    access::recompute(&mut *conn, note.id).await?;
                }
            }
            Ok(())
        }

        Signal::CommitteeRolesChanged { committee_id } => {
            // Role rows only surface on sent proposals; drafts pick the new
            // slots up when they are sent
            let sent = [SubmitStatus::Pending, SubmitStatus::Reviewed];
            let owners = db::users::list_user_ids_by_committee(&mut *conn, committee_id).await?;
            for owner_id in owners {
                let proposals =
                    db::notes::proposals_by_owner(&mut *conn, owner_id, Some(&sent)).await?;
                for note in proposals {
                    access::recompute(&mut *conn, note.id).await?;
                }
            }
            Ok(())
        }

        Signal::LeaderChanged { user_id } => {
            let kinds = [NoteType::Goal, NoteType::Proposal];
            let notes = db::notes::notes_by_owner_of_types(&mut *conn, user_id, &kinds).await?;
            for note in notes {
                access::recompute(&mut *conn, note.id).await?;
            }
            Ok(())
        }

        Signal::SummaryFinalised { summary_id } => {
            let summary = db::summaries::get_summary(&mut *conn, summary_id).await?;
            db::notes::set_submit_status(&mut *conn, summary.note_id, SubmitStatus::Reviewed)
                .await?;
            access::recompute(&mut *conn, summary.note_id).await?;
            pipeline::run_for_summary(conn, acting_user, summary_id).await
        }

        Signal::TitleChanged { title_change_id } => {
            let change = db::career::get_title_change(&mut *conn, title_change_id).await?;
            let event = TimelineEvent {
                id: Uuid::new_v4(),
                user_id: change.user_id,
                event_type: EventType::TitleChange,
                summary_text: format!("{} → {}", change.old_title, change.new_title),
                effective_date: change.effective_date,
                source: Some(EventSource::TitleChange(change.id)),
                visibility_mask: visibility::SELF,
                created_by: acting_user,
                created_at: Utc::now(),
            };
            db::timeline::insert_event(conn, &event).await
        }

        Signal::NoticeRecorded { notice_id } => {
            let notice = db::career::get_notice(&mut *conn, notice_id).await?;
            let event = TimelineEvent {
                id: Uuid::new_v4(),
                user_id: notice.user_id,
                event_type: EventType::Notice,
                summary_text: notice.notice_type.clone(),
                effective_date: notice.effective_date,
                source: Some(EventSource::Notice(notice.id)),
                visibility_mask: visibility::SELF,
                created_by: acting_user,
                created_at: Utc::now(),
            };
            db::timeline::insert_event(conn, &event).await
        }

        Signal::StockGranted { stock_grant_id } => {
            let grant = db::career::get_stock_grant(&mut *conn, stock_grant_id).await?;
            let event = TimelineEvent {
                id: Uuid::new_v4(),
                user_id: grant.user_id,
                event_type: EventType::StockGrant,
                summary_text: format!("اعطای سهام: {}", grant.amount),
                effective_date: grant.effective_date,
                source: Some(EventSource::StockGrant(grant.id)),
                visibility_mask: visibility::SELF,
                created_by: acting_user,
                created_at: Utc::now(),
            };
            db::timeline::insert_event(conn, &event).await
        }

        Signal::OrgAssignmentChanged { user_id } => {
            let user = db::users::get_user(&mut *conn, user_id).await?;
            snapshot_org_assignment(conn, &user).await
        }

        Signal::TeamTribeChanged { team_id } => {
            let member_ids = db::users::list_user_ids_by_team(&mut *conn, team_id).await?;
            for member_id in member_ids {
                let user = db::users::get_user(&mut *conn, member_id).await?;
                snapshot_org_assignment(&mut *conn, &user).await?;
            }
            Ok(())
        }
    }
}

/// Record where the user sits in the org graph as of today
async fn snapshot_org_assignment(conn: &mut SqliteConnection, user: &User) -> Result<()> {
    let tribe_id = match user.team_id {
        Some(team_id) => db::orgs::find_team(&mut *conn, team_id)
            .await?
            .and_then(|t| t.tribe_id),
        None => None,
    };

    let snapshot = OrgAssignmentSnapshot {
        id: Uuid::new_v4(),
        user_id: user.id,
        leader_id: user.leader_id,
        team_id: user.team_id,
        tribe_id,
        chapter_id: user.chapter_id,
        department_id: user.department_id,
        effective_date: Utc::now().date_naive(),
        created_at: Utc::now(),
    };
    db::snapshots::insert_org_assignment(conn, &snapshot).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;
    use compass_common::models::{Notice, ProposalType, StockGrant, SummaryStatus, TitleChange};
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_title_change_emits_event() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let user = test_util::user("dev@compass.io");
        db::users::insert_user(&mut conn, &user).await.unwrap();

        let change = TitleChange {
            id: Uuid::new_v4(),
            user_id: user.id,
            old_title: "Engineer".to_string(),
            new_title: "Senior Engineer".to_string(),
            effective_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            created_at: Utc::now(),
        };
        db::career::insert_title_change(&mut conn, &change).await.unwrap();

        dispatch(
            &mut conn,
            Some(user.id),
            Signal::TitleChanged {
                title_change_id: change.id,
            },
        )
        .await
        .unwrap();

        let events = db::timeline::list_for_user(&mut conn, user.id, 10, 0)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::TitleChange);
        assert_eq!(events[0].summary_text, "Engineer → Senior Engineer");
        assert_eq!(
            events[0].effective_date,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        );
        assert_eq!(events[0].source, Some(EventSource::TitleChange(change.id)));
    }

    #[tokio::test]
    async fn test_notice_event_carries_type_text() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let user = test_util::user("dev@compass.io");
        db::users::insert_user(&mut conn, &user).await.unwrap();

        let notice = Notice {
            id: Uuid::new_v4(),
            user_id: user.id,
            notice_type: "نوتیس شفاهی".to_string(),
            effective_date: NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
            created_at: Utc::now(),
        };
        db::career::insert_notice(&mut conn, &notice).await.unwrap();

        dispatch(&mut conn, None, Signal::NoticeRecorded { notice_id: notice.id })
            .await
            .unwrap();

        let events = db::timeline::list_for_user(&mut conn, user.id, 10, 0)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Notice);
        assert_eq!(events[0].summary_text, "نوتیس شفاهی");
    }

    #[tokio::test]
    async fn test_stock_grant_event() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let user = test_util::user("dev@compass.io");
        db::users::insert_user(&mut conn, &user).await.unwrap();

        let grant = StockGrant {
            id: Uuid::new_v4(),
            user_id: user.id,
            amount: 500.0,
            effective_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            created_at: Utc::now(),
        };
        db::career::insert_stock_grant(&mut conn, &grant).await.unwrap();

        dispatch(
            &mut conn,
            None,
            Signal::StockGranted {
                stock_grant_id: grant.id,
            },
        )
        .await
        .unwrap();

        let events = db::timeline::list_for_user(&mut conn, user.id, 10, 0)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::StockGrant);
        assert_eq!(events[0].summary_text, "اعطای سهام: 500");
    }

    #[tokio::test]
    async fn test_summary_finalised_flips_note_and_runs_pipeline() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let owner = test_util::user("dev@compass.io");
        db::users::insert_user(&mut conn, &owner).await.unwrap();

        let mut note = test_util::proposal(owner.id, ProposalType::Evaluation);
        note.submit_status = SubmitStatus::Pending;
        db::notes::insert_note(&mut conn, &note).await.unwrap();

        let mut summary = test_util::summary(note.id);
        summary.submit_status = SummaryStatus::Done;
        summary.performance_label = Some("Solid".to_string());
        db::summaries::insert_summary(&mut conn, &summary).await.unwrap();

        dispatch(
            &mut conn,
            Some(owner.id),
            Signal::SummaryFinalised {
                summary_id: summary.id,
            },
        )
        .await
        .unwrap();

        let reloaded = db::notes::get_note(&mut conn, note.id).await.unwrap();
        assert_eq!(reloaded.submit_status, SubmitStatus::Reviewed);

        let events = db::timeline::list_for_source(&mut conn, &EventSource::Summary(summary.id))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary_text, "Solid");

        // Owner's access row reflects the finalised summary
        let vector = db::access::vector_for(&mut conn, note.id, owner.id)
            .await
            .unwrap();
        assert!(vector.can_view_summary);
        assert!(!vector.can_edit);
    }

    #[tokio::test]
    async fn test_org_assignment_snapshot_resolves_tribe() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let tribe = test_util::tribe("Core");
        db::orgs::insert_tribe(&mut conn, &tribe).await.unwrap();
        let mut team = test_util::team("Payments");
        team.tribe_id = Some(tribe.id);
        db::orgs::insert_team(&mut conn, &team).await.unwrap();

        let leader = test_util::user("lead@compass.io");
        db::users::insert_user(&mut conn, &leader).await.unwrap();
        let mut user = test_util::user("dev@compass.io");
        user.team_id = Some(team.id);
        user.leader_id = Some(leader.id);
        db::users::insert_user(&mut conn, &user).await.unwrap();

        dispatch(&mut conn, None, Signal::OrgAssignmentChanged { user_id: user.id })
            .await
            .unwrap();

        let snapshot = db::snapshots::latest_org_assignment(&mut conn, user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.team_id, Some(team.id));
        assert_eq!(snapshot.tribe_id, Some(tribe.id));
        assert_eq!(snapshot.leader_id, Some(leader.id));
        assert_eq!(snapshot.effective_date, Utc::now().date_naive());
    }

    #[tokio::test]
    async fn test_team_tribe_change_snapshots_each_member() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let tribe = test_util::tribe("Growth");
        db::orgs::insert_tribe(&mut conn, &tribe).await.unwrap();
        let mut team = test_util::team("Activation");
        team.tribe_id = Some(tribe.id);
        db::orgs::insert_team(&mut conn, &team).await.unwrap();

        let mut a = test_util::user("a@compass.io");
        a.team_id = Some(team.id);
        let mut b = test_util::user("b@compass.io");
        b.team_id = Some(team.id);
        let outsider = test_util::user("c@compass.io");
        db::users::insert_user(&mut conn, &a).await.unwrap();
        db::users::insert_user(&mut conn, &b).await.unwrap();
        db::users::insert_user(&mut conn, &outsider).await.unwrap();

        dispatch(&mut conn, None, Signal::TeamTribeChanged { team_id: team.id })
            .await
            .unwrap();

        for member in [&a, &b] {
            let snapshot = db::snapshots::latest_org_assignment(&mut conn, member.id)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(snapshot.tribe_id, Some(tribe.id));
        }
        assert!(db::snapshots::latest_org_assignment(&mut conn, outsider.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_leader_change_recomputes_goal_access() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let old_leader = test_util::user("old@compass.io");
        let new_leader = test_util::user("new@compass.io");
        db::users::insert_user(&mut conn, &old_leader).await.unwrap();
        db::users::insert_user(&mut conn, &new_leader).await.unwrap();

        let mut owner = test_util::user("owner@compass.io");
        owner.leader_id = Some(old_leader.id);
        db::users::insert_user(&mut conn, &owner).await.unwrap();

        let note = test_util::note(owner.id, NoteType::Goal);
        db::notes::insert_note(&mut conn, &note).await.unwrap();
        access::recompute(&mut conn, note.id).await.unwrap();
        assert!(db::access::vector_for(&mut conn, note.id, old_leader.id)
            .await
            .unwrap()
            .can_view);

        owner.leader_id = Some(new_leader.id);
        db::users::update_user(&mut conn, &owner).await.unwrap();
        dispatch(&mut conn, None, Signal::LeaderChanged { user_id: owner.id })
            .await
            .unwrap();

        // The new leader has a row; the old leader's row is untouched by the
        // policy universe and survives as a stale grant
        assert!(db::access::vector_for(&mut conn, note.id, new_leader.id)
            .await
            .unwrap()
            .can_view);
    }
}
