//! Workforce visibility
//!
//! Answers two questions: which employees a viewer may see on aggregate
//! surfaces (the performance table), and whether a viewer may read one
//! target's career timeline. The aggregate set is tiered and first match
//! wins; the timeline predicate is a plain disjunction applied per row as a
//! safety pass.

use chrono::Utc;
use compass_common::models::{Chapter, OrgCategory, OverrideScope, RoleType, Team, Tribe, User};
use compass_common::Result;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use uuid::Uuid;

use crate::db;
use crate::services::roles;

/// Ladder codes counted as the technical discipline
pub const TECH_LADDERS: &[&str] = &["SW", "HW", "QA", "DevOps"];
/// Ladder codes counted as the product discipline
pub const PRODUCT_LADDERS: &[&str] = &["PM", "PD"];
/// Chapters folded into the technical population
const TECH_CHAPTERS: &[&str] = &["DevOps", "Front"];
/// Chapter folded into the product population
const PRODUCT_CHAPTER: &str = "Product";
const FINANCE_TRIBE: &str = "Finance";
const SALES_TEAM: &str = "Sales";

/// Org graph plus each user's current ladder code, loaded once per
/// evaluation so the population predicates stay in memory.
struct OrgIndex {
    users: Vec<User>,
    teams: HashMap<Uuid, Team>,
    tribes: HashMap<Uuid, Tribe>,
    chapters: HashMap<Uuid, Chapter>,
    ladder_codes: HashMap<Uuid, String>,
}

impl OrgIndex {
    async fn load(conn: &mut SqliteConnection) -> Result<Self> {
        let users = db::users::list_users(&mut *conn).await?;
        let teams = db::orgs::list_teams(&mut *conn)
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();
        let tribes = db::orgs::list_tribes(&mut *conn)
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();
        let chapters = db::orgs::list_chapters(&mut *conn)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        let ladder_codes = db::snapshots::latest_ladder_codes(conn).await?;

        Ok(OrgIndex {
            users,
            teams,
            tribes,
            chapters,
            ladder_codes,
        })
    }

    fn team_of(&self, user: &User) -> Option<&Team> {
        user.team_id.and_then(|id| self.teams.get(&id))
    }

    fn tribe_of(&self, user: &User) -> Option<&Tribe> {
        self.team_of(user)
            .and_then(|t| t.tribe_id)
            .and_then(|id| self.tribes.get(&id))
    }

    fn chapter_name(&self, user: &User) -> Option<&str> {
        user.chapter_id
            .and_then(|id| self.chapters.get(&id))
            .map(|c| c.name.as_str())
    }

    fn ladder_code(&self, user: &User) -> Option<&str> {
        self.ladder_codes.get(&user.id).map(String::as_str)
    }

    fn ladder_in(&self, user: &User, codes: &[&str]) -> bool {
        self.ladder_code(user).map_or(false, |c| codes.contains(&c))
    }

    /// Technical population: tech ladder, tech team or tribe, or one of the
    /// engineering chapters
    fn is_technical(&self, user: &User) -> bool {
        self.ladder_in(user, TECH_LADDERS)
            || self.team_of(user).and_then(|t| t.category) == Some(OrgCategory::Tech)
            || self.tribe_of(user).and_then(|t| t.category) == Some(OrgCategory::Tech)
            || self
                .chapter_name(user)
                .map_or(false, |name| TECH_CHAPTERS.contains(&name))
    }

    fn is_product(&self, user: &User) -> bool {
        self.ladder_in(user, PRODUCT_LADDERS)
            || self.team_of(user).and_then(|t| t.category) == Some(OrgCategory::Product)
            || self.tribe_of(user).and_then(|t| t.category) == Some(OrgCategory::Product)
            || self.chapter_name(user) == Some(PRODUCT_CHAPTER)
    }

    fn in_tribe_named(&self, user: &User, name: &str) -> bool {
        self.tribe_of(user).map_or(false, |t| t.name == name)
    }

    fn in_team_named(&self, user: &User, name: &str) -> bool {
        self.team_of(user).map_or(false, |t| t.name == name)
    }
}

/// Employees the viewer may see on aggregate surfaces.
///
/// Tiers, first match wins: live data-access override, HR/CEO/Maintainer,
/// CTO/VP, CPO, CFO, sales manager, tribe director, team leader, nobody.
pub async fn visible_user_ids(conn: &mut SqliteConnection, viewer: &User) -> Result<Vec<Uuid>> {
    let overrides = db::overrides::live_overrides(&mut *conn, viewer.id, Utc::now()).await?;
    if !overrides.is_empty() {
        let index = OrgIndex::load(&mut *conn).await?;
        if overrides.iter().any(|o| o.scope == OverrideScope::All) {
            return Ok(index.users.iter().map(|u| u.id).collect());
        }
        // Scoped overrides filter strictly by current ladder
        let ids = index
            .users
            .iter()
            .filter(|u| {
                overrides.iter().any(|o| match o.scope {
                    OverrideScope::All => true,
                    OverrideScope::Tech => index.ladder_in(u, TECH_LADDERS),
                    OverrideScope::Product => index.ladder_in(u, PRODUCT_LADDERS),
                })
            })
            .map(|u| u.id)
            .collect();
        return Ok(ids);
    }

    let held = roles::organization_roles(&mut *conn, viewer.id).await?;
    if held.contains(&RoleType::HrManager)
        || held.contains(&RoleType::Ceo)
        || held.contains(&RoleType::Maintainer)
    {
        return db::users::list_all_user_ids(conn).await;
    }

    let index = OrgIndex::load(&mut *conn).await?;

    if held.contains(&RoleType::Cto) || held.contains(&RoleType::Vp) {
        let ids = index
            .users
            .iter()
            .filter(|u| index.is_technical(u))
            .map(|u| u.id)
            .collect();
        return Ok(ids);
    }

    if held.contains(&RoleType::Cpo) {
        // Product population plus the CPO's own direct reports
        let mut ids: Vec<Uuid> = index
            .users
            .iter()
            .filter(|u| index.is_product(u))
            .map(|u| u.id)
            .collect();
        for user in &index.users {
            if user.leader_id == Some(viewer.id) && !ids.contains(&user.id) {
                ids.push(user.id);
            }
        }
        return Ok(ids);
    }

    if held.contains(&RoleType::Cfo) {
        let ids = index
            .users
            .iter()
            .filter(|u| index.in_tribe_named(u, FINANCE_TRIBE))
            .map(|u| u.id)
            .collect();
        return Ok(ids);
    }

    if held.contains(&RoleType::SalesManager) {
        let ids = index
            .users
            .iter()
            .filter(|u| index.in_team_named(u, SALES_TEAM))
            .map(|u| u.id)
            .collect();
        return Ok(ids);
    }

    let directs_engineering = index
        .tribes
        .values()
        .any(|t| t.engineering_director == Some(viewer.id));
    let directs_product = index
        .tribes
        .values()
        .any(|t| t.product_director == Some(viewer.id));
    if directs_engineering || directs_product {
        if let Some(tribe_id) = director_tribe(&index, viewer) {
            let ids = index
                .users
                .iter()
                .filter(|u| {
                    index.tribe_of(u).map_or(false, |t| t.id == tribe_id)
                        && ((directs_engineering && index.ladder_in(u, TECH_LADDERS))
                            || (directs_product && index.ladder_in(u, PRODUCT_LADDERS)))
                })
                .map(|u| u.id)
                .collect();
            return Ok(ids);
        }
    }

    let reports: Vec<Uuid> = index
        .users
        .iter()
        .filter(|u| u.leader_id == Some(viewer.id))
        .map(|u| u.id)
        .collect();
    if !reports.is_empty() {
        return Ok(reports);
    }

    Ok(Vec::new())
}

/// A director's tribe: their own team's tribe when set, otherwise the first
/// tribe (by name) that names them as a director
fn director_tribe(index: &OrgIndex, viewer: &User) -> Option<Uuid> {
    if let Some(tribe) = index.tribe_of(viewer) {
        return Some(tribe.id);
    }
    let mut directed: Vec<&Tribe> = index
        .tribes
        .values()
        .filter(|t| {
            t.engineering_director == Some(viewer.id) || t.product_director == Some(viewer.id)
        })
        .collect();
    directed.sort_by(|a, b| a.name.cmp(&b.name));
    directed.first().map(|t| t.id)
}

/// Per-row safety predicate applied before any timeline or table row is
/// serialised. Covers every population tier of `visible_user_ids`, so a row
/// that tier system exposes is never stripped here.
pub async fn can_view_timeline(
    conn: &mut SqliteConnection,
    viewer: &User,
    target: &User,
) -> Result<bool> {
    if viewer.id == target.id {
        return Ok(true);
    }

    let overrides = db::overrides::live_overrides(&mut *conn, viewer.id, Utc::now()).await?;
    if !overrides.is_empty() {
        if overrides.iter().any(|o| o.scope == OverrideScope::All) {
            return Ok(true);
        }
        if let Some(code) = latest_ladder_code(&mut *conn, target.id).await? {
            let covered = overrides.iter().any(|o| match o.scope {
                OverrideScope::All => true,
                OverrideScope::Tech => TECH_LADDERS.contains(&code.as_str()),
                OverrideScope::Product => PRODUCT_LADDERS.contains(&code.as_str()),
            });
            if covered {
                return Ok(true);
            }
        }
    }

    let held = roles::organization_roles(&mut *conn, viewer.id).await?;
    if held.contains(&RoleType::HrManager)
        || held.contains(&RoleType::Ceo)
        || held.contains(&RoleType::Maintainer)
    {
        return Ok(true);
    }

    if target.agile_coach_id == Some(viewer.id) {
        return Ok(true);
    }

    if is_leader_chain_ancestor(&mut *conn, viewer.id, target).await? {
        return Ok(true);
    }

    // The remaining tiers need the loaded graph
    let index = OrgIndex::load(&mut *conn).await?;

    if (held.contains(&RoleType::Cto) || held.contains(&RoleType::Vp))
        && index.is_technical(target)
    {
        return Ok(true);
    }

    if held.contains(&RoleType::Cfo) && index.in_tribe_named(target, FINANCE_TRIBE) {
        return Ok(true);
    }

    if held.contains(&RoleType::SalesManager) && index.in_team_named(target, SALES_TEAM) {
        return Ok(true);
    }

    if let Some(target_tribe) = index.tribe_of(target) {
        if target_tribe.engineering_director == Some(viewer.id)
            || target_tribe.product_director == Some(viewer.id)
        {
            return Ok(true);
        }
    }

    if held.contains(&RoleType::Cpo) && index.is_product(target) {
        return Ok(true);
    }

    Ok(false)
}

async fn latest_ladder_code(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> Result<Option<String>> {
    match db::snapshots::latest_seniority(&mut *conn, user_id).await? {
        Some(snapshot) => {
            let ladder = db::ladders::get_ladder(&mut *conn, snapshot.ladder_id).await?;
            Ok(Some(ladder.code))
        }
        None => Ok(None),
    }
}

/// Walk `target.leader`, then that user's leader, and so on. Bounded at ten
/// hops so a cycle in the chain terminates.
pub async fn is_leader_chain_ancestor(
    conn: &mut SqliteConnection,
    viewer_id: Uuid,
    target: &User,
) -> Result<bool> {
    let mut current = target.leader_id;
    for _ in 0..10 {
        let leader_id = match current {
            Some(id) => id,
            None => return Ok(false),
        };
        if leader_id == viewer_id {
            return Ok(true);
        }
        current = match db::users::find_user(&mut *conn, leader_id).await? {
            Some(user) => user.leader_id,
            None => None,
        };
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;
    use chrono::Duration;
    use compass_common::models::DataAccessOverride;

    async fn insert_users(conn: &mut SqliteConnection, users: &[&User]) {
        for user in users {
            db::users::insert_user(&mut *conn, user).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_hr_manager_sees_everyone() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let hr = test_util::user("hr@compass.io");
        let a = test_util::user("a@compass.io");
        let b = test_util::user("b@compass.io");
        insert_users(&mut conn, &[&hr, &a, &b]).await;

        let mut org = test_util::organization("Compass");
        org.hr_manager = Some(hr.id);
        db::orgs::insert_organization(&mut conn, &org).await.unwrap();

        let ids = visible_user_ids(&mut conn, &hr).await.unwrap();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn test_cto_sees_technical_population_from_all_arms() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let cto = test_util::user("cto@compass.io");
        db::users::insert_user(&mut conn, &cto).await.unwrap();

        let mut org = test_util::organization("Compass");
        org.cto = Some(cto.id);
        db::orgs::insert_organization(&mut conn, &org).await.unwrap();

        // Arm 1: tech ladder
        let ladder = test_util::ladder("SW", "Software");
        db::ladders::insert_ladder(&mut conn, &ladder).await.unwrap();
        let by_ladder = test_util::user("dev@compass.io");
        db::users::insert_user(&mut conn, &by_ladder).await.unwrap();
        db::snapshots::insert_seniority(
            &mut conn,
            &test_util::seniority_snapshot(by_ladder.id, ladder.id),
        )
        .await
        .unwrap();

        // Arm 2: tech team category
        let mut team = test_util::team("Platform");
        team.category = Some(OrgCategory::Tech);
        db::orgs::insert_team(&mut conn, &team).await.unwrap();
        let mut by_team = test_util::user("platform@compass.io");
        by_team.team_id = Some(team.id);
        db::users::insert_user(&mut conn, &by_team).await.unwrap();

        // Arm 3: engineering chapter
        let chapter = test_util::chapter("DevOps");
        db::orgs::insert_chapter(&mut conn, &chapter).await.unwrap();
        let mut by_chapter = test_util::user("ops@compass.io");
        by_chapter.chapter_id = Some(chapter.id);
        db::users::insert_user(&mut conn, &by_chapter).await.unwrap();

        // Outside every arm
        let outsider = test_util::user("sales@compass.io");
        db::users::insert_user(&mut conn, &outsider).await.unwrap();

        let ids = visible_user_ids(&mut conn, &cto).await.unwrap();
        assert!(ids.contains(&by_ladder.id));
        assert!(ids.contains(&by_team.id));
        assert!(ids.contains(&by_chapter.id));
        assert!(!ids.contains(&outsider.id));
    }

    #[tokio::test]
    async fn test_cfo_sees_finance_tribe_only() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let cfo = test_util::user("cfo@compass.io");
        db::users::insert_user(&mut conn, &cfo).await.unwrap();

        let mut org = test_util::organization("Compass");
        org.cfo = Some(cfo.id);
        db::orgs::insert_organization(&mut conn, &org).await.unwrap();

        let finance = test_util::tribe("Finance");
        let core = test_util::tribe("Core");
        db::orgs::insert_tribe(&mut conn, &finance).await.unwrap();
        db::orgs::insert_tribe(&mut conn, &core).await.unwrap();

        let mut fin_team = test_util::team("Accounting");
        fin_team.tribe_id = Some(finance.id);
        let mut eng_team = test_util::team("Payments");
        eng_team.tribe_id = Some(core.id);
        db::orgs::insert_team(&mut conn, &fin_team).await.unwrap();
        db::orgs::insert_team(&mut conn, &eng_team).await.unwrap();

        let mut accountant = test_util::user("accountant@compass.io");
        accountant.team_id = Some(fin_team.id);
        let mut engineer = test_util::user("engineer@compass.io");
        engineer.team_id = Some(eng_team.id);
        insert_users(&mut conn, &[&accountant, &engineer]).await;

        let ids = visible_user_ids(&mut conn, &cfo).await.unwrap();
        assert_eq!(ids, vec![accountant.id]);
    }

    #[tokio::test]
    async fn test_team_leader_sees_direct_reports() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let leader = test_util::user("lead@compass.io");
        db::users::insert_user(&mut conn, &leader).await.unwrap();

        let mut a = test_util::user("a@compass.io");
        a.leader_id = Some(leader.id);
        let mut b = test_util::user("b@compass.io");
        b.leader_id = Some(leader.id);
        let c = test_util::user("c@compass.io");
        insert_users(&mut conn, &[&a, &b, &c]).await;

        let mut ids = visible_user_ids(&mut conn, &leader).await.unwrap();
        ids.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(ids, expected);

        // No role, no reports: nothing
        let ids = visible_user_ids(&mut conn, &c).await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_override_scopes_filter_by_ladder() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let viewer = test_util::user("viewer@compass.io");
        let granted_by = test_util::user("admin@compass.io");
        insert_users(&mut conn, &[&viewer, &granted_by]).await;

        let sw = test_util::ladder("SW", "Software");
        let pm = test_util::ladder("PM", "Product Management");
        db::ladders::insert_ladder(&mut conn, &sw).await.unwrap();
        db::ladders::insert_ladder(&mut conn, &pm).await.unwrap();

        let dev = test_util::user("dev@compass.io");
        let product = test_util::user("pm@compass.io");
        let unmapped = test_util::user("new@compass.io");
        insert_users(&mut conn, &[&dev, &product, &unmapped]).await;
        db::snapshots::insert_seniority(&mut conn, &test_util::seniority_snapshot(dev.id, sw.id))
            .await
            .unwrap();
        db::snapshots::insert_seniority(
            &mut conn,
            &test_util::seniority_snapshot(product.id, pm.id),
        )
        .await
        .unwrap();

        let grant = DataAccessOverride {
            id: uuid::Uuid::new_v4(),
            user_id: viewer.id,
            granted_by: granted_by.id,
            scope: OverrideScope::Tech,
            expires_at: Some(Utc::now() + Duration::days(1)),
            is_active: true,
            created_at: Utc::now(),
        };
        db::overrides::insert_override(&mut conn, &grant).await.unwrap();

        let ids = visible_user_ids(&mut conn, &viewer).await.unwrap();
        assert_eq!(ids, vec![dev.id]);
    }

    #[tokio::test]
    async fn test_expired_override_falls_through_to_roles() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let viewer = test_util::user("viewer@compass.io");
        let granted_by = test_util::user("admin@compass.io");
        insert_users(&mut conn, &[&viewer, &granted_by]).await;

        let grant = DataAccessOverride {
            id: uuid::Uuid::new_v4(),
            user_id: viewer.id,
            granted_by: granted_by.id,
            scope: OverrideScope::All,
            expires_at: Some(Utc::now() - Duration::days(1)),
            is_active: true,
            created_at: Utc::now(),
        };
        db::overrides::insert_override(&mut conn, &grant).await.unwrap();

        let ids = visible_user_ids(&mut conn, &viewer).await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_timeline_predicate_chain_ancestor() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        // grand -> middle -> target
        let grand = test_util::user("grand@compass.io");
        let mut middle = test_util::user("middle@compass.io");
        middle.leader_id = Some(grand.id);
        let mut target = test_util::user("target@compass.io");
        target.leader_id = Some(middle.id);
        db::users::insert_user(&mut conn, &grand).await.unwrap();
        insert_users(&mut conn, &[&middle, &target]).await;

        assert!(can_view_timeline(&mut conn, &grand, &target).await.unwrap());
        assert!(can_view_timeline(&mut conn, &middle, &target)
            .await
            .unwrap());
        assert!(!can_view_timeline(&mut conn, &target, &middle)
            .await
            .unwrap());
        assert!(can_view_timeline(&mut conn, &target, &target)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_leader_cycle_terminates_within_ten_hops() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        // a and b lead each other; an unrelated viewer must get a clean false
        let mut a = test_util::user("a@compass.io");
        let mut b = test_util::user("b@compass.io");
        a.leader_id = Some(b.id);
        b.leader_id = Some(a.id);
        // Rows first without leaders, then wire the cycle via update
        db::users::insert_user(&mut conn, &{
            let mut u = a.clone();
            u.leader_id = None;
            u
        })
        .await
        .unwrap();
        db::users::insert_user(&mut conn, &{
            let mut u = b.clone();
            u.leader_id = None;
            u
        })
        .await
        .unwrap();
        a.updated_at = Utc::now();
        b.updated_at = Utc::now();
        db::users::update_user(&mut conn, &a).await.unwrap();
        db::users::update_user(&mut conn, &b).await.unwrap();

        let outsider = test_util::user("outsider@compass.io");
        db::users::insert_user(&mut conn, &outsider).await.unwrap();

        assert!(
            !is_leader_chain_ancestor(&mut conn, outsider.id, &a)
                .await
                .unwrap()
        );
        // Members of the cycle still see each other as ancestors
        assert!(is_leader_chain_ancestor(&mut conn, b.id, &a).await.unwrap());
    }

    #[tokio::test]
    async fn test_agile_coach_sees_timeline() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let coach = test_util::user("coach@compass.io");
        db::users::insert_user(&mut conn, &coach).await.unwrap();
        let mut target = test_util::user("target@compass.io");
        target.agile_coach_id = Some(coach.id);
        db::users::insert_user(&mut conn, &target).await.unwrap();

        assert!(can_view_timeline(&mut conn, &coach, &target).await.unwrap());

        let stranger = test_util::user("stranger@compass.io");
        db::users::insert_user(&mut conn, &stranger).await.unwrap();
        assert!(!can_view_timeline(&mut conn, &stranger, &target)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_override_opens_timeline_within_scope() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let viewer = test_util::user("viewer@compass.io");
        let granted_by = test_util::user("admin@compass.io");
        insert_users(&mut conn, &[&viewer, &granted_by]).await;

        let sw = test_util::ladder("SW", "Software");
        let pm = test_util::ladder("PM", "Product Management");
        db::ladders::insert_ladder(&mut conn, &sw).await.unwrap();
        db::ladders::insert_ladder(&mut conn, &pm).await.unwrap();

        let dev = test_util::user("dev@compass.io");
        let product = test_util::user("pm@compass.io");
        insert_users(&mut conn, &[&dev, &product]).await;
        db::snapshots::insert_seniority(&mut conn, &test_util::seniority_snapshot(dev.id, sw.id))
            .await
            .unwrap();
        db::snapshots::insert_seniority(
            &mut conn,
            &test_util::seniority_snapshot(product.id, pm.id),
        )
        .await
        .unwrap();

        let grant = DataAccessOverride {
            id: uuid::Uuid::new_v4(),
            user_id: viewer.id,
            granted_by: granted_by.id,
            scope: OverrideScope::Tech,
            expires_at: Some(Utc::now() + Duration::days(1)),
            is_active: true,
            created_at: Utc::now(),
        };
        db::overrides::insert_override(&mut conn, &grant).await.unwrap();

        assert!(can_view_timeline(&mut conn, &viewer, &dev).await.unwrap());
        assert!(!can_view_timeline(&mut conn, &viewer, &product)
            .await
            .unwrap());
    }
}
