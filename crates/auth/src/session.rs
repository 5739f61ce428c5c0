//! The assembled principal session.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use keystone_core::OrganizationId;

use crate::organization::{Membership, Organization, Position, ResolvedMembership};
use crate::permissions::{ModuleCode, ResolvedPermission};
use crate::principal::PrincipalIdentity;
use crate::roles::PermissionTable;

/// Everything an authorization decision needs, resolved up front.
///
/// A session is always built in full and published as one value; there is no
/// way to observe it half-resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub principal: PrincipalIdentity,
    pub organization: Option<Organization>,
    pub membership: Option<Membership>,
    pub position: Option<Position>,
    pub modules: BTreeSet<ModuleCode>,
    pub permissions: PermissionTable,
    /// Not backed by a store record (bootstrap / synthesized dev sessions).
    pub ephemeral: bool,
}

impl Session {
    pub fn assemble(
        principal: PrincipalIdentity,
        membership: Option<ResolvedMembership>,
        modules: BTreeSet<ModuleCode>,
        permissions: PermissionTable,
    ) -> Self {
        let (organization, membership, position) = match membership {
            Some(m) => (Some(m.organization), Some(m.membership), m.position),
            None => (None, None, None),
        };

        Self {
            principal,
            organization,
            membership,
            position,
            modules,
            permissions,
            ephemeral: false,
        }
    }

    /// An organization-less platform-admin session with no store backing.
    pub fn ephemeral_admin(principal: PrincipalIdentity) -> Self {
        Self {
            ephemeral: true,
            ..Self::assemble(principal, None, BTreeSet::new(), PermissionTable::new())
        }
    }

    pub fn is_platform_admin(&self) -> bool {
        self.principal.is_platform_admin()
    }

    pub fn is_organization_owner(&self) -> bool {
        self.membership.as_ref().is_some_and(|m| m.is_owner)
    }

    /// Organization of the principal's membership, if any.
    pub fn membership_organization_id(&self) -> Option<OrganizationId> {
        self.membership.as_ref().map(|m| m.organization_id)
    }

    pub fn is_subscribed(&self, module: &str) -> bool {
        self.modules.contains(module)
    }

    pub fn permission(&self, module: &str, resource: &str) -> Option<&ResolvedPermission> {
        self.permissions.get(module, resource)
    }
}
