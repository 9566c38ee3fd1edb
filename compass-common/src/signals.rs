//! Change signals emitted by the entity store
//!
//! Every mutating write path emits a `Signal` describing what changed. The
//! server's dispatcher fans each signal out to the access-control engine and
//! the committee pipeline inside the caller's transaction, so derived rows
//! (permissions, snapshots, timeline events) commit atomically with the
//! triggering write.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Compass change signals
///
/// All recomputation entry points key off this central enum for exhaustive
/// matching in the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Signal {
    /// A note was created or updated
    NoteSaved {
        note_id: Uuid,
    },

    /// The mentioned-user set of a note changed
    MentionsChanged {
        note_id: Uuid,
    },

    /// A committee's member set changed; proposals of users reviewed by the
    /// committee need their access rows recomputed
    CommitteeMembersChanged {
        committee_id: Uuid,
    },

    /// A committee's role set changed; only proposals already sent to the
    /// committee are affected
    CommitteeRolesChanged {
        committee_id: Uuid,
    },

    /// A user's direct leader was reassigned
    LeaderChanged {
        user_id: Uuid,
    },

    /// A summary was saved with DONE status; flips the owning note to
    /// REVIEWED and drives the committee pipeline
    SummaryFinalised {
        summary_id: Uuid,
    },

    /// A title change was recorded
    TitleChanged {
        title_change_id: Uuid,
    },

    /// A performance notice was recorded
    NoticeRecorded {
        notice_id: Uuid,
    },

    /// A stock grant was recorded
    StockGranted {
        stock_grant_id: Uuid,
    },

    /// A user's org assignment (leader/team/chapter/department) changed
    OrgAssignmentChanged {
        user_id: Uuid,
    },

    /// A team was moved to a different tribe; every member gets a fresh
    /// org-assignment snapshot
    TeamTribeChanged {
        team_id: Uuid,
    },
}

impl Signal {
    /// Signal type as string for logging
    pub fn signal_type(&self) -> &str {
        match self {
            Signal::NoteSaved { .. } => "NoteSaved",
            Signal::MentionsChanged { .. } => "MentionsChanged",
            Signal::CommitteeMembersChanged { .. } => "CommitteeMembersChanged",
            Signal::CommitteeRolesChanged { .. } => "CommitteeRolesChanged",
            Signal::LeaderChanged { .. } => "LeaderChanged",
            Signal::SummaryFinalised { .. } => "SummaryFinalised",
            Signal::TitleChanged { .. } => "TitleChanged",
            Signal::NoticeRecorded { .. } => "NoticeRecorded",
            Signal::StockGranted { .. } => "StockGranted",
            Signal::OrgAssignmentChanged { .. } => "OrgAssignmentChanged",
            Signal::TeamTribeChanged { .. } => "TeamTribeChanged",
        }
    }
}
