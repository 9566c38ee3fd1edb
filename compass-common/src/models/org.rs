//! Organisational graph: organisations, departments, tribes, teams,
//! chapters, committees and role slots

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discipline category attached to tribes and teams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrgCategory {
    Tech,
    NonTech,
    Product,
}

impl OrgCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgCategory::Tech => "TECH",
            OrgCategory::NonTech => "NON_TECH",
            OrgCategory::Product => "PRODUCT",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "TECH" => Ok(OrgCategory::Tech),
            "NON_TECH" => Ok(OrgCategory::NonTech),
            "PRODUCT" => Ok(OrgCategory::Product),
            other => Err(Error::InvalidInput(format!("Unknown category: {}", other))),
        }
    }
}

/// Top-level organisation with its named role holders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub ceo: Option<Uuid>,
    pub vp: Option<Uuid>,
    pub cto: Option<Uuid>,
    pub cpo: Option<Uuid>,
    pub cfo: Option<Uuid>,
    pub hr_manager: Option<Uuid>,
    pub sales_manager: Option<Uuid>,
    pub function_owner: Option<Uuid>,
    pub maintainer: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
    pub organization_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tribe {
    pub id: Uuid,
    pub name: String,
    pub department_id: Option<Uuid>,
    pub category: Option<OrgCategory>,
    pub product_director: Option<Uuid>,
    pub engineering_director: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: Uuid,
    pub name: String,
    pub department_id: Option<Uuid>,
    pub leader: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub department_id: Option<Uuid>,
    pub tribe_id: Option<Uuid>,
    pub leader: Option<Uuid>,
    pub category: Option<OrgCategory>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Review committee. Members and role slots are stored in link tables and
/// loaded alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Committee {
    pub id: Uuid,
    pub name: String,
    pub members: Vec<Uuid>,
    pub roles: Vec<Role>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role slot types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleType {
    Leader,
    Cto,
    Vp,
    Ceo,
    Cpo,
    Cfo,
    HrManager,
    SalesManager,
    ProductDirector,
    EngineeringDirector,
    Hrbp,
    FunctionOwner,
    Maintainer,
    ProductManager,
}

impl RoleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleType::Leader => "LEADER",
            RoleType::Cto => "CTO",
            RoleType::Vp => "VP",
            RoleType::Ceo => "CEO",
            RoleType::Cpo => "CPO",
            RoleType::Cfo => "CFO",
            RoleType::HrManager => "HR_MANAGER",
            RoleType::SalesManager => "SALES_MANAGER",
            RoleType::ProductDirector => "PRODUCT_DIRECTOR",
            RoleType::EngineeringDirector => "ENGINEERING_DIRECTOR",
            RoleType::Hrbp => "HRBP",
            RoleType::FunctionOwner => "FUNCTION_OWNER",
            RoleType::Maintainer => "MAINTAINER",
            RoleType::ProductManager => "PRODUCT_MANAGER",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "LEADER" => Ok(RoleType::Leader),
            "CTO" => Ok(RoleType::Cto),
            "VP" => Ok(RoleType::Vp),
            "CEO" => Ok(RoleType::Ceo),
            "CPO" => Ok(RoleType::Cpo),
            "CFO" => Ok(RoleType::Cfo),
            "HR_MANAGER" => Ok(RoleType::HrManager),
            "SALES_MANAGER" => Ok(RoleType::SalesManager),
            "PRODUCT_DIRECTOR" => Ok(RoleType::ProductDirector),
            "ENGINEERING_DIRECTOR" => Ok(RoleType::EngineeringDirector),
            "HRBP" => Ok(RoleType::Hrbp),
            "FUNCTION_OWNER" => Ok(RoleType::FunctionOwner),
            "MAINTAINER" => Ok(RoleType::Maintainer),
            "PRODUCT_MANAGER" => Ok(RoleType::ProductManager),
            other => Err(Error::InvalidInput(format!("Unknown role type: {}", other))),
        }
    }

    /// Attribute name the resolver looks up on the scope object: the type
    /// lower-cased with spaces replaced by underscores
    pub fn attribute_name(&self) -> String {
        self.as_str().to_lowercase().replace(' ', "_")
    }
}

/// Scope a role slot resolves against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleScope {
    User,
    Team,
    Tribe,
    Chapter,
    Organization,
}

impl RoleScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleScope::User => "USER",
            RoleScope::Team => "TEAM",
            RoleScope::Tribe => "TRIBE",
            RoleScope::Chapter => "CHAPTER",
            RoleScope::Organization => "ORGANIZATION",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "USER" => Ok(RoleScope::User),
            "TEAM" => Ok(RoleScope::Team),
            "TRIBE" => Ok(RoleScope::Tribe),
            "CHAPTER" => Ok(RoleScope::Chapter),
            "ORGANIZATION" => Ok(RoleScope::Organization),
            other => Err(Error::InvalidInput(format!("Unknown role scope: {}", other))),
        }
    }

    /// Role-holder attribute names the scope's model actually exposes.
    /// A role whose normalised attribute is not in this list cannot be
    /// created.
    pub fn valid_attributes(&self) -> &'static [&'static str] {
        match self {
            RoleScope::User => &["leader"],
            RoleScope::Team => &["leader"],
            RoleScope::Tribe => &["product_director", "engineering_director"],
            RoleScope::Chapter => &["leader"],
            RoleScope::Organization => &[
                "ceo",
                "vp",
                "cto",
                "cpo",
                "cfo",
                "hr_manager",
                "sales_manager",
                "function_owner",
                "maintainer",
            ],
        }
    }
}

/// A `(type, scope)` role slot, unique per pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub role_type: RoleType,
    pub role_scope: RoleScope,
}

impl Role {
    /// Validate that the scope's model exposes the role's attribute
    pub fn validate(role_type: RoleType, role_scope: RoleScope) -> Result<()> {
        let attr = role_type.attribute_name();
        if role_scope.valid_attributes().contains(&attr.as_str()) {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "{} has no attribute '{}' for role {}",
                role_scope.as_str(),
                attr,
                role_type.as_str()
            )))
        }
    }
}
