use std::str::FromStr;

use serde::{Deserialize, Serialize};

use keystone_core::{DomainError, Entity, MembershipId, OrganizationId, PositionId, PrincipalId, RoleId};

/// Organization (tenant) lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationStatus {
    #[default]
    Active,
    Suspended,
    Archived,
}

impl core::fmt::Display for OrganizationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            OrganizationStatus::Active => f.write_str("active"),
            OrganizationStatus::Suspended => f.write_str("suspended"),
            OrganizationStatus::Archived => f.write_str("archived"),
        }
    }
}

impl FromStr for OrganizationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(OrganizationStatus::Active),
            "suspended" => Ok(OrganizationStatus::Suspended),
            "archived" => Ok(OrganizationStatus::Archived),
            other => Err(DomainError::validation(format!(
                "unknown organization status '{other}'"
            ))),
        }
    }
}

/// A tenant organization. Owned by the store; never mutated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub slug: String,
    pub status: OrganizationStatus,
}

impl Entity for Organization {
    type Id = OrganizationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    #[default]
    Active,
    Inactive,
}

impl core::fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MembershipStatus::Active => f.write_str("active"),
            MembershipStatus::Inactive => f.write_str("inactive"),
        }
    }
}

impl FromStr for MembershipStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MembershipStatus::Active),
            "inactive" => Ok(MembershipStatus::Inactive),
            other => Err(DomainError::validation(format!(
                "unknown membership status '{other}'"
            ))),
        }
    }
}

/// Link between a principal and an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub principal_id: PrincipalId,
    pub organization_id: OrganizationId,
    pub position_id: Option<PositionId>,
    pub is_owner: bool,
    pub status: MembershipStatus,
}

impl Membership {
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }
}

impl Entity for Membership {
    type Id = MembershipId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Job-title grouping with one default role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub default_role_id: Option<RoleId>,
}

impl Entity for Position {
    type Id = PositionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A membership joined to its organization and (optional) position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMembership {
    pub organization: Organization,
    pub membership: Membership,
    pub position: Option<Position>,
}
