//! Role slot resolution
//!
//! A committee role slot is a `(type, scope)` pair. Resolving it walks from
//! a user to the scope object (the user themselves, their team, tribe,
//! chapter or organization) and reads the role-holder field named by the
//! type. A slot that does not resolve is skipped with a warning so one
//! vacant seat never blocks a recompute.

use compass_common::models::{Organization, Role, RoleScope, RoleType, Tribe, User};
use compass_common::Result;
use sqlx::SqliteConnection;
use std::collections::HashSet;
use tracing::warn;
use uuid::Uuid;

use crate::db;

/// Resolve a role slot against the given user's org graph. `None` means the
/// slot is vacant or the user sits outside the slot's scope.
pub async fn resolve(
    conn: &mut SqliteConnection,
    user: &User,
    role: &Role,
) -> Result<Option<Uuid>> {
    let attr = role.role_type.attribute_name();

    let resolved = match role.role_scope {
        RoleScope::User => {
            if attr == "leader" {
                user.leader_id
            } else {
                None
            }
        }
        RoleScope::Team => match user.team_id {
            Some(team_id) => db::orgs::find_team(&mut *conn, team_id)
                .await?
                .filter(|_| attr == "leader")
                .and_then(|team| team.leader),
            None => None,
        },
        RoleScope::Tribe => match tribe_of(&mut *conn, user).await? {
            Some(tribe) => match attr.as_str() {
                "product_director" => tribe.product_director,
                "engineering_director" => tribe.engineering_director,
                _ => None,
            },
            None => None,
        },
        RoleScope::Chapter => match user.chapter_id {
            Some(chapter_id) => db::orgs::find_chapter(&mut *conn, chapter_id)
                .await?
                .filter(|_| attr == "leader")
                .and_then(|chapter| chapter.leader),
            None => None,
        },
        RoleScope::Organization => match user.organization_id {
            Some(org_id) => db::orgs::find_organization(&mut *conn, org_id)
                .await?
                .and_then(|org| organization_attr(&org, &attr)),
            None => None,
        },
    };

    if resolved.is_none() {
        warn!(
            "Role {} at {} scope did not resolve for user {}",
            role.role_type.as_str(),
            role.role_scope.as_str(),
            user.id
        );
    }

    Ok(resolved)
}

/// The tribe a user belongs to, reached through their team
pub async fn tribe_of(conn: &mut SqliteConnection, user: &User) -> Result<Option<Tribe>> {
    let team_id = match user.team_id {
        Some(id) => id,
        None => return Ok(None),
    };
    let team = match db::orgs::find_team(&mut *conn, team_id).await? {
        Some(team) => team,
        None => return Ok(None),
    };
    match team.tribe_id {
        Some(tribe_id) => db::orgs::find_tribe(conn, tribe_id).await,
        None => Ok(None),
    }
}

fn organization_attr(org: &Organization, attr: &str) -> Option<Uuid> {
    match attr {
        "ceo" => org.ceo,
        "vp" => org.vp,
        "cto" => org.cto,
        "cpo" => org.cpo,
        "cfo" => org.cfo,
        "hr_manager" => org.hr_manager,
        "sales_manager" => org.sales_manager,
        "function_owner" => org.function_owner,
        "maintainer" => org.maintainer,
        _ => None,
    }
}

/// Organization-level roles the user currently fills, across every
/// organization row. Drives the top visibility tiers.
pub async fn organization_roles(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> Result<HashSet<RoleType>> {
    let mut held = HashSet::new();
    for org in db::orgs::list_organizations(conn).await? {
        let slots = [
            (RoleType::Ceo, org.ceo),
            (RoleType::Vp, org.vp),
            (RoleType::Cto, org.cto),
            (RoleType::Cpo, org.cpo),
            (RoleType::Cfo, org.cfo),
            (RoleType::HrManager, org.hr_manager),
            (RoleType::SalesManager, org.sales_manager),
            (RoleType::FunctionOwner, org.function_owner),
            (RoleType::Maintainer, org.maintainer),
        ];
        for (role_type, holder) in slots {
            if holder == Some(user_id) {
                held.insert(role_type);
            }
        }
    }

    Ok(held)
}
