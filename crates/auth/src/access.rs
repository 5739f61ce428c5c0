//! Read-only query surface handed to feature code.

use std::sync::Arc;

use keystone_core::OrganizationId;

use crate::admin_context::{AdminContext, effective_organization_id};
use crate::authorize::{self, AuthorizationExplanation};
use crate::permissions::Action;
use crate::session::Session;

/// A consistent snapshot of the current session and admin context.
///
/// Cheap to clone. Holding one never triggers a fetch; every answer comes from
/// the snapshot alone.
#[derive(Debug, Clone, Default)]
pub struct AccessContext {
    session: Option<Arc<Session>>,
    admin: AdminContext,
}

impl AccessContext {
    pub fn new(session: Option<Arc<Session>>, admin: AdminContext) -> Self {
        Self { session, admin }
    }

    /// Logged-out view: every check is denied.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_deref()
    }

    pub fn admin_context(&self) -> &AdminContext {
        &self.admin
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn can(&self, action: Action, module: &str, resource: &str) -> bool {
        authorize::can(self.session(), action, module, resource)
    }

    /// String-action variant for callers at an untyped boundary; any action
    /// other than create/read/update/delete is denied.
    pub fn can_str(&self, action: &str, module: &str, resource: &str) -> bool {
        match action.parse::<Action>() {
            Ok(action) => self.can(action, module, resource),
            Err(_) => false,
        }
    }

    pub fn has_module(&self, module: &str) -> bool {
        authorize::has_module(self.session(), module)
    }

    pub fn explain(&self, action: &str, module: &str, resource: &str) -> AuthorizationExplanation {
        authorize::explain(self.session(), action, module, resource)
    }

    pub fn effective_organization_id(&self) -> Option<OrganizationId> {
        effective_organization_id(self.session(), &self.admin)
    }

    pub fn is_platform_admin(&self) -> bool {
        self.session().is_some_and(Session::is_platform_admin)
    }

    /// Organization owners and platform admins.
    pub fn is_organization_admin(&self) -> bool {
        self.session()
            .is_some_and(|s| s.is_platform_admin() || s.is_organization_owner())
    }
}
