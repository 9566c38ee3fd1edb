//! Access policy engine
//!
//! Recomputes the per-(note, user) permission rows from the note's current
//! state. The recompute is a pure function of note, owner, committee and
//! summary state: running it twice in a row yields identical rows. It only
//! ever touches users named by the policy, so additive grants written for
//! other users (feedback receivers, request invitees) survive.

use compass_common::models::{AccessVector, Note, NoteType, SummaryStatus};
use compass_common::Result;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use uuid::Uuid;

use crate::db;
use crate::services::roles;

/// Leaders, agile coaches and committee reviewers all get the same bits:
/// read the note, work the summary, exchange feedback.
fn reviewer_vector() -> AccessVector {
    AccessVector {
        can_view: true,
        can_edit: false,
        can_view_summary: true,
        can_write_summary: true,
        can_write_feedback: true,
        can_view_feedbacks: true,
    }
}

fn mention_vector() -> AccessVector {
    AccessVector {
        can_view: true,
        can_write_feedback: true,
        ..Default::default()
    }
}

fn owner_vector(note: &Note, summary_done: bool) -> AccessVector {
    AccessVector {
        can_view: true,
        can_edit: !note.is_sent_to_committee(),
        can_view_summary: summary_done,
        can_write_summary: note.note_type == NoteType::Goal,
        can_write_feedback: true,
        can_view_feedbacks: true,
    }
}

/// Recompute the permission rows of one note.
///
/// One-on-ones bypass the policy: the leader who owns the note and the
/// member it is about each get a fixed row and nobody else is touched. For
/// everything else the row set is assembled in tiers (leader and coach,
/// committee members, committee role holders, mentioned users) with later
/// tiers overwriting earlier ones, and the owner written last.
pub async fn recompute(conn: &mut SqliteConnection, note_id: Uuid) -> Result<()> {
    let note = db::notes::get_note(&mut *conn, note_id).await?;

    if note.note_type == NoteType::OneOnOne {
        let owner = AccessVector {
            can_view: true,
            can_edit: true,
            can_write_feedback: true,
            can_view_feedbacks: true,
            ..Default::default()
        };
        db::access::upsert_row(&mut *conn, note.id, note.owner_id, owner).await?;

        if let Some(record) = db::one_on_ones::find_by_note(&mut *conn, note.id).await? {
            let member = AccessVector {
                can_view: true,
                can_write_feedback: true,
                can_view_feedbacks: true,
                ..Default::default()
            };
            db::access::upsert_row(&mut *conn, note.id, record.member_id, member).await?;
        }
        return Ok(());
    }

    let owner = db::users::get_user(&mut *conn, note.owner_id).await?;
    let summary_done = db::summaries::find_summary_by_note(&mut *conn, note.id)
        .await?
        .map_or(false, |s| s.submit_status == SummaryStatus::Done);

    let mut rows: HashMap<Uuid, AccessVector> = HashMap::new();

    if note.note_type != NoteType::Personal {
        if matches!(note.note_type, NoteType::Goal | NoteType::Proposal) {
            if let Some(leader_id) = owner.leader_id {
                rows.insert(leader_id, reviewer_vector());
            }
            if let Some(coach_id) = owner.agile_coach_id {
                rows.insert(coach_id, reviewer_vector());
            }
        }

        // The committee tier only applies once the proposal is sent; a
        // draft carries no committee rows at all
        if note.note_type == NoteType::Proposal && note.is_sent_to_committee() {
            if let Some(committee_id) = owner.committee_id {
                if let Some(committee) =
                    db::committees::find_committee(&mut *conn, committee_id).await?
                {
                    let vector = reviewer_vector();
                    for member_id in &committee.members {
                        rows.insert(*member_id, vector);
                    }
                    // Role slots after members, in configuration order;
                    // later slots win
                    for role in &committee.roles {
                        if let Some(holder) = roles::resolve(&mut *conn, &owner, role).await? {
                            rows.insert(holder, vector);
                        }
                    }
                }
            }
        }

        // A mention never downgrades a row that already carries view
        for mentioned in &note.mentioned_users {
            let already_viewing = rows.get(mentioned).map_or(false, |v| v.can_view);
            if !already_viewing {
                rows.insert(*mentioned, mention_vector());
            }
        }
    }

    rows.insert(note.owner_id, owner_vector(&note, summary_done));

    for (user_id, vector) in &rows {
        db::access::upsert_row(&mut *conn, note.id, *user_id, *vector).await?;
    }

    tracing::debug!(
        note_id = %note.id,
        rows = rows.len(),
        "Recomputed access rows"
    );

    Ok(())
}
