//! Database initialization
//!
//! Creates the SQLite database on first run and brings the schema up
//! idempotently. Every table uses TEXT guids as primary keys; enum-valued
//! columns carry CHECK constraints matching the model enums; calendar dates
//! are stored as `YYYY-MM-DD` TEXT so range comparisons work lexicographically.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_all_tables(&pool).await?;

    Ok(pool)
}

/// Create the full schema (idempotent - safe to call multiple times).
///
/// Public so tests can build the schema on an in-memory pool.
pub async fn create_all_tables(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;

    // Org graph. users and organizations reference each other; SQLite
    // resolves FK targets at DML time so creation order only needs to be
    // readable, not topological.
    create_organizations_table(pool).await?;
    create_departments_table(pool).await?;
    create_committees_table(pool).await?;
    create_tribes_table(pool).await?;
    create_chapters_table(pool).await?;
    create_teams_table(pool).await?;
    create_users_table(pool).await?;
    create_roles_table(pool).await?;
    create_committee_members_table(pool).await?;
    create_committee_roles_table(pool).await?;

    // Ladders and pay
    create_ladders_table(pool).await?;
    create_ladder_aspects_table(pool).await?;
    create_ladder_levels_table(pool).await?;
    create_pay_bands_table(pool).await?;

    // Notes and derived artefacts
    create_cycles_table(pool).await?;
    create_notes_table(pool).await?;
    create_note_mentions_table(pool).await?;
    create_note_reads_table(pool).await?;
    create_note_links_table(pool).await?;
    create_note_user_access_table(pool).await?;
    create_summaries_table(pool).await?;
    create_feedback_requests_table(pool).await?;
    create_feedback_request_invitees_table(pool).await?;
    create_feedbacks_table(pool).await?;
    create_one_on_ones_table(pool).await?;
    create_value_tags_table(pool).await?;
    create_one_on_one_tags_table(pool).await?;

    // Snapshots and timeline
    create_compensation_snapshots_table(pool).await?;
    create_seniority_snapshots_table(pool).await?;
    create_org_assignment_snapshots_table(pool).await?;
    create_timeline_events_table(pool).await?;
    create_data_access_overrides_table(pool).await?;

    // Career artefacts
    create_title_changes_table(pool).await?;
    create_notices_table(pool).await?;
    create_stock_grants_table(pool).await?;

    // Assessment forms
    create_assessment_forms_table(pool).await?;
    create_form_assignments_table(pool).await?;
    create_form_submissions_table(pool).await?;

    // Auth
    create_api_keys_table(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (1)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_organizations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS organizations (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            ceo TEXT REFERENCES users(guid),
            vp TEXT REFERENCES users(guid),
            cto TEXT REFERENCES users(guid),
            cpo TEXT REFERENCES users(guid),
            cfo TEXT REFERENCES users(guid),
            hr_manager TEXT REFERENCES users(guid),
            sales_manager TEXT REFERENCES users(guid),
            function_owner TEXT REFERENCES users(guid),
            maintainer TEXT REFERENCES users(guid),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_departments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS departments (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            organization_id TEXT NOT NULL REFERENCES organizations(guid),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_committees_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS committees (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_tribes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tribes (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            department_id TEXT REFERENCES departments(guid),
            category TEXT CHECK (category IN ('TECH', 'NON_TECH', 'PRODUCT')),
            product_director TEXT REFERENCES users(guid),
            engineering_director TEXT REFERENCES users(guid),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_chapters_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chapters (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            department_id TEXT REFERENCES departments(guid),
            leader TEXT REFERENCES users(guid),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_teams_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            department_id TEXT REFERENCES departments(guid),
            tribe_id TEXT REFERENCES tribes(guid),
            leader TEXT REFERENCES users(guid),
            category TEXT CHECK (category IN ('TECH', 'NON_TECH', 'PRODUCT')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_teams_tribe ON teams(tribe_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            guid TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            gmail TEXT,
            phone TEXT,
            department_id TEXT REFERENCES departments(guid),
            chapter_id TEXT REFERENCES chapters(guid),
            team_id TEXT REFERENCES teams(guid),
            organization_id TEXT REFERENCES organizations(guid),
            leader_id TEXT REFERENCES users(guid),
            agile_coach_id TEXT REFERENCES users(guid),
            committee_id TEXT REFERENCES committees(guid),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_leader ON users(leader_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_committee ON users(committee_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_team ON users(team_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_roles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS roles (
            guid TEXT PRIMARY KEY,
            role_type TEXT NOT NULL CHECK (role_type IN (
                'LEADER', 'CTO', 'VP', 'CEO', 'CPO', 'CFO',
                'HR_MANAGER', 'SALES_MANAGER', 'PRODUCT_DIRECTOR',
                'ENGINEERING_DIRECTOR', 'HRBP', 'FUNCTION_OWNER',
                'MAINTAINER', 'PRODUCT_MANAGER'
            )),
            role_scope TEXT NOT NULL CHECK (role_scope IN (
                'USER', 'TEAM', 'TRIBE', 'CHAPTER', 'ORGANIZATION'
            )),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (role_type, role_scope)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_committee_members_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS committee_members (
            committee_id TEXT NOT NULL REFERENCES committees(guid) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(guid) ON DELETE CASCADE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (committee_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_committee_roles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS committee_roles (
            committee_id TEXT NOT NULL REFERENCES committees(guid) ON DELETE CASCADE,
            role_id TEXT NOT NULL REFERENCES roles(guid) ON DELETE CASCADE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (committee_id, role_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_ladders_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ladders (
            guid TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_ladder_aspects_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ladder_aspects (
            guid TEXT PRIMARY KEY,
            ladder_id TEXT NOT NULL REFERENCES ladders(guid) ON DELETE CASCADE,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            UNIQUE (ladder_id, code)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_ladder_levels_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ladder_levels (
            guid TEXT PRIMARY KEY,
            ladder_id TEXT NOT NULL REFERENCES ladders(guid) ON DELETE CASCADE,
            aspect_id TEXT NOT NULL REFERENCES ladder_aspects(guid) ON DELETE CASCADE,
            level INTEGER NOT NULL,
            stage TEXT NOT NULL CHECK (stage IN ('EARLY', 'MID', 'LATE')),
            weight REAL NOT NULL DEFAULT 1.0,
            UNIQUE (ladder_id, aspect_id, level, stage)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_pay_bands_table(pool: &SqlitePool) -> Result<()> {
    // Band numbers move in half steps
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pay_bands (
            guid TEXT PRIMARY KEY,
            number REAL NOT NULL UNIQUE CHECK ((number * 2) = CAST(number * 2 AS INTEGER))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_cycles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cycles (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_notes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notes (
            guid TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL REFERENCES users(guid),
            title TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            date TEXT,
            period TEXT,
            year INTEGER,
            note_type TEXT NOT NULL CHECK (note_type IN (
                'GOAL', 'MEETING', 'PERSONAL', 'TASK', 'PROPOSAL',
                'MESSAGE', 'TEMPLATE', 'ONE_ON_ONE', 'FEEDBACK',
                'FEEDBACK_REQUEST'
            )),
            proposal_type TEXT CHECK (proposal_type IN (
                'PROMOTION', 'EVALUATION', 'MAPPING', 'NOTICE'
            )),
            is_public INTEGER NOT NULL DEFAULT 0,
            submit_status TEXT NOT NULL DEFAULT 'INITIAL_SUBMIT' CHECK (submit_status IN (
                'INITIAL_SUBMIT', 'PENDING', 'REVIEWED'
            )),
            cycle_id TEXT REFERENCES cycles(guid),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_notes_owner ON notes(owner_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_notes_type ON notes(note_type)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_note_mentions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS note_mentions (
            note_id TEXT NOT NULL REFERENCES notes(guid) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(guid) ON DELETE CASCADE,
            PRIMARY KEY (note_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_note_reads_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS note_reads (
            note_id TEXT NOT NULL REFERENCES notes(guid) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(guid) ON DELETE CASCADE,
            read_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (note_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_note_links_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS note_links (
            note_id TEXT NOT NULL REFERENCES notes(guid) ON DELETE CASCADE,
            linked_note_id TEXT NOT NULL REFERENCES notes(guid) ON DELETE CASCADE,
            PRIMARY KEY (note_id, linked_note_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_note_user_access_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS note_user_access (
            note_id TEXT NOT NULL REFERENCES notes(guid) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(guid) ON DELETE CASCADE,
            can_view INTEGER NOT NULL DEFAULT 0,
            can_edit INTEGER NOT NULL DEFAULT 0,
            can_view_summary INTEGER NOT NULL DEFAULT 0,
            can_write_summary INTEGER NOT NULL DEFAULT 0,
            can_write_feedback INTEGER NOT NULL DEFAULT 0,
            can_view_feedbacks INTEGER NOT NULL DEFAULT 0,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (note_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_note_user_access_user ON note_user_access(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_summaries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS summaries (
            guid TEXT PRIMARY KEY,
            note_id TEXT NOT NULL UNIQUE REFERENCES notes(guid) ON DELETE CASCADE,
            content TEXT NOT NULL DEFAULT '',
            ladder_id TEXT REFERENCES ladders(guid),
            aspect_changes TEXT NOT NULL DEFAULT '{}',
            performance_label TEXT,
            ladder_change TEXT,
            bonus INTEGER NOT NULL DEFAULT 0,
            salary_change REAL NOT NULL DEFAULT 0,
            committee_date TEXT,
            submit_status TEXT NOT NULL DEFAULT 'INITIAL_SUBMIT' CHECK (submit_status IN (
                'INITIAL_SUBMIT', 'DONE'
            )),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_feedback_requests_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feedback_requests (
            guid TEXT PRIMARY KEY,
            note_id TEXT NOT NULL UNIQUE REFERENCES notes(guid) ON DELETE CASCADE,
            deadline TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_feedback_request_invitees_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feedback_request_invitees (
            request_id TEXT NOT NULL REFERENCES feedback_requests(guid) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(guid) ON DELETE CASCADE,
            PRIMARY KEY (request_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_feedbacks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feedbacks (
            guid TEXT PRIMARY KEY,
            note_id TEXT NOT NULL UNIQUE REFERENCES notes(guid) ON DELETE CASCADE,
            parent_note_id TEXT REFERENCES notes(guid),
            request_id TEXT REFERENCES feedback_requests(guid),
            sender_id TEXT NOT NULL REFERENCES users(guid),
            receiver_id TEXT NOT NULL REFERENCES users(guid),
            content TEXT NOT NULL,
            evidence TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_feedbacks_sender ON feedbacks(sender_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_feedbacks_receiver ON feedbacks(receiver_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_feedbacks_parent ON feedbacks(parent_note_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_one_on_ones_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS one_on_ones (
            guid TEXT PRIMARY KEY,
            note_id TEXT NOT NULL UNIQUE REFERENCES notes(guid) ON DELETE CASCADE,
            member_id TEXT NOT NULL REFERENCES users(guid),
            personal_summary TEXT CHECK (personal_summary IS NULL OR length(personal_summary) <= 400),
            career_summary TEXT CHECK (career_summary IS NULL OR length(career_summary) <= 400),
            performance_summary TEXT CHECK (performance_summary IS NULL OR length(performance_summary) <= 400),
            communication_summary TEXT CHECK (communication_summary IS NULL OR length(communication_summary) <= 400),
            actions TEXT,
            leader_vibe TEXT,
            member_vibe TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_one_on_ones_member ON one_on_ones(member_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_value_tags_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS value_tags (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            is_active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_one_on_one_tags_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS one_on_one_tags (
            one_on_one_id TEXT NOT NULL REFERENCES one_on_ones(guid) ON DELETE CASCADE,
            tag_id TEXT NOT NULL REFERENCES value_tags(guid) ON DELETE CASCADE,
            PRIMARY KEY (one_on_one_id, tag_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_compensation_snapshots_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS compensation_snapshots (
            guid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(guid),
            pay_band_id TEXT NOT NULL REFERENCES pay_bands(guid),
            pay_band_number REAL NOT NULL,
            salary_change REAL NOT NULL DEFAULT 0,
            bonus_percentage INTEGER NOT NULL DEFAULT 0,
            effective_date TEXT NOT NULL,
            source_summary_id TEXT REFERENCES summaries(guid),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_comp_snapshots_user_date \
         ON compensation_snapshots(user_id, effective_date)",
    )
    .execute(pool)
    .await?;

    // One snapshot per summary per user and date; manual snapshots
    // (no source) stay unconstrained
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS uq_comp_snapshots_source \
         ON compensation_snapshots(user_id, effective_date, source_summary_id) \
         WHERE source_summary_id IS NOT NULL",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_seniority_snapshots_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS seniority_snapshots (
            guid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(guid),
            ladder_id TEXT NOT NULL REFERENCES ladders(guid),
            title TEXT,
            overall_score REAL NOT NULL DEFAULT 0,
            details TEXT NOT NULL DEFAULT '{}',
            stages TEXT NOT NULL DEFAULT '{}',
            seniority_level TEXT CHECK (seniority_level IN (
                'JUNIOR', 'MID', 'SENIOR', 'PRINCIPAL'
            )),
            effective_date TEXT NOT NULL,
            source_summary_id TEXT REFERENCES summaries(guid),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_seniority_snapshots_user_date \
         ON seniority_snapshots(user_id, effective_date)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS uq_seniority_snapshots_source \
         ON seniority_snapshots(user_id, ladder_id, effective_date, source_summary_id) \
         WHERE source_summary_id IS NOT NULL",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_org_assignment_snapshots_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS org_assignment_snapshots (
            guid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(guid),
            leader_id TEXT REFERENCES users(guid),
            team_id TEXT REFERENCES teams(guid),
            tribe_id TEXT REFERENCES tribes(guid),
            chapter_id TEXT REFERENCES chapters(guid),
            department_id TEXT REFERENCES departments(guid),
            effective_date TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_org_snapshots_user_date \
         ON org_assignment_snapshots(user_id, effective_date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_timeline_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS timeline_events (
            guid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(guid),
            event_type TEXT NOT NULL CHECK (event_type IN (
                'SENIORITY_CHANGE', 'PAY_CHANGE', 'BONUS_PAYOUT',
                'EVALUATION', 'MAPPING', 'TITLE_CHANGE', 'STOCK_GRANT',
                'NOTICE', 'LADDER_CHANGED'
            )),
            summary_text TEXT NOT NULL CHECK (length(summary_text) <= 512),
            effective_date TEXT NOT NULL,
            source_kind TEXT CHECK (source_kind IN (
                'summary', 'title_change', 'notice', 'stock_grant'
            )),
            source_id TEXT,
            visibility_mask INTEGER NOT NULL DEFAULT 1,
            created_by TEXT REFERENCES users(guid),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_timeline_events_user_date \
         ON timeline_events(user_id, effective_date)",
    )
    .execute(pool)
    .await?;

    // Idempotency lookups go through the source link
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_timeline_events_source \
         ON timeline_events(source_kind, source_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_data_access_overrides_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS data_access_overrides (
            guid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(guid),
            granted_by TEXT NOT NULL REFERENCES users(guid),
            scope TEXT NOT NULL CHECK (scope IN ('ALL', 'TECH', 'PRODUCT')),
            expires_at TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_data_access_overrides_user \
         ON data_access_overrides(user_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_title_changes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS title_changes (
            guid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(guid),
            old_title TEXT NOT NULL,
            new_title TEXT NOT NULL,
            effective_date TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_notices_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notices (
            guid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(guid),
            notice_type TEXT NOT NULL,
            effective_date TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_stock_grants_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stock_grants (
            guid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(guid),
            amount REAL NOT NULL,
            effective_date TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_assessment_forms_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assessment_forms (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            questions TEXT NOT NULL DEFAULT '[]',
            deadline TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_by TEXT NOT NULL REFERENCES users(guid),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_form_assignments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS form_assignments (
            guid TEXT PRIMARY KEY,
            form_id TEXT NOT NULL REFERENCES assessment_forms(guid) ON DELETE CASCADE,
            assessor_id TEXT NOT NULL REFERENCES users(guid),
            subject_id TEXT NOT NULL REFERENCES users(guid),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (form_id, assessor_id, subject_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_form_assignments_assessor \
         ON form_assignments(assessor_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_form_submissions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS form_submissions (
            guid TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL UNIQUE REFERENCES form_assignments(guid) ON DELETE CASCADE,
            answers TEXT NOT NULL DEFAULT '{}',
            submitted_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_api_keys_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_keys (
            guid TEXT PRIMARY KEY,
            prefix TEXT NOT NULL UNIQUE,
            hashed_key TEXT NOT NULL,
            salt TEXT NOT NULL,
            user_id TEXT NOT NULL REFERENCES users(guid),
            is_active INTEGER NOT NULL DEFAULT 1,
            last_used TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_create_all_tables_is_idempotent() {
        let pool = memory_pool().await;
        create_all_tables(&pool).await.unwrap();
        create_all_tables(&pool).await.unwrap();

        let row = sqlx::query("SELECT COUNT(*) as cnt FROM schema_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        let count: i64 = row.get("cnt");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_pay_band_half_step_check() {
        let pool = memory_pool().await;
        create_all_tables(&pool).await.unwrap();

        sqlx::query("INSERT INTO pay_bands (guid, number) VALUES ('a', 4.5)")
            .execute(&pool)
            .await
            .unwrap();

        let err = sqlx::query("INSERT INTO pay_bands (guid, number) VALUES ('b', 4.3)")
            .execute(&pool)
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_note_type_check_rejects_unknown() {
        let pool = memory_pool().await;
        create_all_tables(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO users (guid, email, display_name) VALUES ('u1', 'a@b.c', 'A')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let err = sqlx::query(
            "INSERT INTO notes (guid, owner_id, title, note_type) \
             VALUES ('n1', 'u1', 't', 'DIARY')",
        )
        .execute(&pool)
        .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_source_uniqueness_is_partial() {
        let pool = memory_pool().await;
        create_all_tables(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO users (guid, email, display_name) VALUES ('u1', 'a@b.c', 'A')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO pay_bands (guid, number) VALUES ('pb', 4.0)")
            .execute(&pool)
            .await
            .unwrap();

        // Two manual snapshots on the same date are fine
        for guid in ["c1", "c2"] {
            sqlx::query(
                "INSERT INTO compensation_snapshots \
                 (guid, user_id, pay_band_id, pay_band_number, effective_date, created_at) \
                 VALUES (?, 'u1', 'pb', 4.0, '2024-06-01', '2024-06-01T00:00:00+00:00')",
            )
            .bind(guid)
            .execute(&pool)
            .await
            .unwrap();
        }

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM compensation_snapshots")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 2);
    }
}
