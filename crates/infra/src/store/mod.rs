//! Record store gateway: the only way the core reads principals, memberships,
//! grants and subscriptions.
//!
//! The gateway is a filtered-equality read interface plus one write used by
//! onboarding flows. Implementations must not leak storage-specific shapes:
//! every query returns an explicit record type from `keystone-auth`.

use std::sync::Arc;

use thiserror::Error;

use keystone_auth::{
    Credential, ModuleCode, Organization, PositionOverrideGrant, Principal, ResolvedMembership,
    RoleGrant,
};
use keystone_core::{OrganizationId, PositionId, PrincipalId, RoleId};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;

/// Record store operation error.
///
/// Resolution steps never surface these to authorization callers: they log
/// and degrade to "not found" / empty.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or the query failed in transit.
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    /// A row could not be mapped onto its record type.
    #[error("row mapping failed for column '{column}': {message}")]
    Mapping {
        column: &'static str,
        message: String,
    },

    /// The write conflicts with an existing record.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Principal record to create during staff/vendor onboarding.
///
/// Organization-independent: memberships are created separately.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub email: String,
    pub nickname: Option<String>,
    pub credential: Credential,
    pub must_change_credential: bool,
}

/// Async, filtered-equality access to the five record sets the core needs.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Active principal whose email or nickname equals `identifier`
    /// (trimmed, case-insensitive).
    async fn find_active_principal(&self, identifier: &str) -> Result<Option<Principal>, StoreError>;

    /// Any active platform super admin (first found).
    async fn first_active_super_admin(&self) -> Result<Option<Principal>, StoreError>;

    /// Active memberships of a principal, joined to organization and position.
    ///
    /// Order is whatever the store yields; callers must not rely on it.
    async fn active_memberships(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Vec<ResolvedMembership>, StoreError>;

    async fn role_grants(&self, role_id: RoleId) -> Result<Vec<RoleGrant>, StoreError>;

    async fn position_overrides(
        &self,
        position_id: PositionId,
    ) -> Result<Vec<PositionOverrideGrant>, StoreError>;

    /// Module codes of the organization's subscriptions with status `active`.
    async fn active_module_codes(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<ModuleCode>, StoreError>;

    async fn organization_by_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<Organization>, StoreError>;

    async fn organization_by_slug(&self, slug: &str) -> Result<Option<Organization>, StoreError>;

    /// Create a principal. Rejects an email or nickname already in use.
    async fn insert_principal(&self, principal: NewPrincipal) -> Result<Principal, StoreError>;
}

#[async_trait::async_trait]
impl<S> RecordStore for Arc<S>
where
    S: RecordStore + ?Sized,
{
    async fn find_active_principal(&self, identifier: &str) -> Result<Option<Principal>, StoreError> {
        (**self).find_active_principal(identifier).await
    }

    async fn first_active_super_admin(&self) -> Result<Option<Principal>, StoreError> {
        (**self).first_active_super_admin().await
    }

    async fn active_memberships(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Vec<ResolvedMembership>, StoreError> {
        (**self).active_memberships(principal_id).await
    }

    async fn role_grants(&self, role_id: RoleId) -> Result<Vec<RoleGrant>, StoreError> {
        (**self).role_grants(role_id).await
    }

    async fn position_overrides(
        &self,
        position_id: PositionId,
    ) -> Result<Vec<PositionOverrideGrant>, StoreError> {
        (**self).position_overrides(position_id).await
    }

    async fn active_module_codes(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<ModuleCode>, StoreError> {
        (**self).active_module_codes(organization_id).await
    }

    async fn organization_by_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<Organization>, StoreError> {
        (**self).organization_by_id(organization_id).await
    }

    async fn organization_by_slug(&self, slug: &str) -> Result<Option<Organization>, StoreError> {
        (**self).organization_by_slug(slug).await
    }

    async fn insert_principal(&self, principal: NewPrincipal) -> Result<Principal, StoreError> {
        (**self).insert_principal(principal).await
    }
}
