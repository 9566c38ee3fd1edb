//! Shared builders for service tests. Every builder returns a minimal valid
//! entity with fresh ids; tests overwrite the fields they care about and
//! insert through the `db` layer.

use chrono::Utc;
use compass_common::models::{
    AssessmentForm, Chapter, Committee, Ladder, LadderAspect, Note, NoteType, Organization,
    ProposalType, Role, RoleScope, RoleType, SenioritySnapshot, SubmitStatus, Summary,
    SummaryStatus, Team, Tribe, User,
};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use uuid::Uuid;

pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .unwrap();
    compass_common::db::create_all_tables(&pool).await.unwrap();
    pool
}

pub(crate) fn user(email: &str) -> User {
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

pub(crate) fn organization(name: &str) -> Organization {
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

pub(crate) fn tribe(name: &str) -> Tribe {
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

pub(crate) fn chapter(name: &str) -> Chapter {
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

pub(crate) fn team(name: &str) -> Team {
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

pub(crate) fn committee(name: &str) -> Committee {
    let now = Utc::now();
    Committee {
        id: Uuid::new_v4(),
        name: name.to_string(),
        members: Vec::new(),
        roles: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn role(role_type: RoleType, role_scope: RoleScope) -> Role {
    Role {
        id: Uuid::new_v4(),
        role_type,
        role_scope,
    }
}

pub(crate) fn note(owner_id: Uuid, note_type: NoteType) -> Note {
    let now = Utc::now();
    Note {
        id: Uuid::new_v4(),
        owner_id,
        title: "note".to_string(),
        content: String::new(),
        date: None,
        period: None,
        year: None,
        note_type,
        proposal_type: None,
        mentioned_users: Vec::new(),
        is_public: false,
        submit_status: SubmitStatus::InitialSubmit,
        cycle_id: None,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn proposal(owner_id: Uuid, proposal_type: ProposalType) -> Note {
    let mut n = note(owner_id, NoteType::Proposal);
    n.proposal_type = Some(proposal_type);
    n
}

pub(crate) fn summary(note_id: Uuid) -> Summary {
    let now = Utc::now();
    Summary {
        id: Uuid::new_v4(),
        note_id,
        content: String::new(),
        ladder_id: None,
        aspect_changes: BTreeMap::new(),
        performance_label: None,
        ladder_change: None,
        bonus: 0,
        salary_change: 0.0,
        committee_date: None,
        submit_status: SummaryStatus::InitialSubmit,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn ladder(code: &str, name: &str) -> Ladder {
    let now = Utc::now();
    Ladder {
        id: Uuid::new_v4(),
        code: code.to_string(),
        name: name.to_string(),
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn aspect(ladder_id: Uuid, code: &str, sort_order: i64) -> LadderAspect {
    LadderAspect {
        id: Uuid::new_v4(),
        ladder_id,
        code: code.to_string(),
        name: code.to_string(),
        sort_order,
    }
}

pub(crate) fn seniority_snapshot(user_id: Uuid, ladder_id: Uuid) -> SenioritySnapshot {
    let now = Utc::now();
    SenioritySnapshot {
        id: Uuid::new_v4(),
        user_id,
        ladder_id,
        title: None,
        overall_score: 0.0,
        details: BTreeMap::new(),
        stages: BTreeMap::new(),
        seniority_level: None,
        effective_date: now.date_naive(),
        source_summary_id: None,
        created_at: now,
    }
}

pub(crate) fn form(created_by: Uuid) -> AssessmentForm {
    let now = Utc::now();
    AssessmentForm {
        id: Uuid::new_v4(),
        title: "form".to_string(),
        description: None,
        questions: Vec::new(),
        deadline: None,
        is_active: true,
        created_by,
        created_at: now,
        updated_at: now,
    }
}
