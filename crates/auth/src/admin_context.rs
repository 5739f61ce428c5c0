//! Platform-admin "acting organization" state.

use serde::{Deserialize, Serialize};

use keystone_core::OrganizationId;

use crate::organization::Organization;
use crate::session::Session;

/// Which organization a platform admin is currently acting in.
///
/// Meaningless for non-admins: their effective organization always comes from
/// their membership.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "organization", rename_all = "snake_case")]
pub enum AdminContext {
    #[default]
    Unset,
    Selected(Organization),
}

impl AdminContext {
    pub fn selected_organization(&self) -> Option<&Organization> {
        match self {
            AdminContext::Unset => None,
            AdminContext::Selected(org) => Some(org),
        }
    }

    pub fn selected_organization_id(&self) -> Option<OrganizationId> {
        self.selected_organization().map(|org| org.id)
    }

    pub fn is_selected(&self) -> bool {
        matches!(self, AdminContext::Selected(_))
    }
}

/// `is_platform_admin ? selected : membership.organization_id`.
pub fn effective_organization_id(
    session: Option<&Session>,
    admin: &AdminContext,
) -> Option<OrganizationId> {
    let session = session?;
    if session.is_platform_admin() {
        admin.selected_organization_id()
    } else {
        session.membership_organization_id()
    }
}
