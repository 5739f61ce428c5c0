use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use keystone_auth::{
    Membership, ModuleCode, ModuleSubscription, Organization, Position, PositionOverrideGrant,
    Principal, ResolvedMembership, RoleGrant, active_modules, normalize_identifier,
};
use keystone_core::{Entity, OrganizationId, PositionId, PrincipalId, RoleId};

use super::{NewPrincipal, RecordStore, StoreError};

/// In-memory record store.
///
/// Intended for tests/dev. Principals and memberships keep insertion order,
/// which makes "first found" deterministic here (the Postgres store gives no
/// such guarantee).
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    principals: RwLock<Vec<Principal>>,
    organizations: RwLock<HashMap<OrganizationId, Organization>>,
    memberships: RwLock<Vec<Membership>>,
    positions: RwLock<HashMap<PositionId, Position>>,
    role_grants: RwLock<Vec<RoleGrant>>,
    position_overrides: RwLock<Vec<PositionOverrideGrant>>,
    subscriptions: RwLock<Vec<ModuleSubscription>>,
    unavailable: AtomicBool,
    failing: RwLock<HashSet<&'static str>>,
}

fn upsert_keyed<T: Entity>(table: &RwLock<HashMap<T::Id, T>>, record: T) {
    if let Ok(mut map) = table.write() {
        map.insert(*record.id(), record);
    }
}

fn upsert_ordered<T: Entity>(table: &RwLock<Vec<T>>, record: T) {
    if let Ok(mut rows) = table.write() {
        match rows.iter().position(|r| r.id() == record.id()) {
            Some(idx) => rows[idx] = record,
            None => rows.push(record),
        }
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Seeding
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_principal(&self, principal: Principal) {
        upsert_ordered(&self.principals, principal);
    }

    pub fn add_organization(&self, organization: Organization) {
        upsert_keyed(&self.organizations, organization);
    }

    pub fn add_membership(&self, membership: Membership) {
        upsert_ordered(&self.memberships, membership);
    }

    pub fn add_position(&self, position: Position) {
        upsert_keyed(&self.positions, position);
    }

    pub fn add_role_grant(&self, grant: RoleGrant) {
        if let Ok(mut rows) = self.role_grants.write() {
            rows.push(grant);
        }
    }

    /// Swap every grant of `role_id` for `grants`.
    pub fn replace_role_grants(&self, role_id: RoleId, grants: Vec<RoleGrant>) {
        if let Ok(mut rows) = self.role_grants.write() {
            rows.retain(|g| g.role_id != role_id);
            rows.extend(grants);
        }
    }

    pub fn add_position_override(&self, grant: PositionOverrideGrant) {
        if let Ok(mut rows) = self.position_overrides.write() {
            rows.push(grant);
        }
    }

    pub fn add_subscription(&self, subscription: ModuleSubscription) {
        if let Ok(mut rows) = self.subscriptions.write() {
            rows.push(subscription);
        }
    }

    /// Fault injection: while set, every read fails with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fault injection for one gateway method, named as on `RecordStore`
    /// (e.g. `"position_overrides"`).
    pub fn set_operation_unavailable(&self, operation: &'static str, unavailable: bool) {
        if let Ok(mut failing) = self.failing.write() {
            if unavailable {
                failing.insert(operation);
            } else {
                failing.remove(operation);
            }
        }
    }

    fn check_available(&self, operation: &'static str) -> Result<(), StoreError> {
        let failing = self.failing.read().map_err(|_| poisoned())?;
        if self.unavailable.load(Ordering::SeqCst) || failing.contains(operation) {
            return Err(StoreError::Unavailable(format!(
                "in-memory store marked unavailable for {operation}"
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_active_principal(&self, identifier: &str) -> Result<Option<Principal>, StoreError> {
        self.check_available("find_active_principal")?;
        let rows = self.principals.read().map_err(|_| poisoned())?;
        Ok(rows
            .iter()
            .find(|p| p.is_active && p.matches_identifier(identifier))
            .cloned())
    }

    async fn first_active_super_admin(&self) -> Result<Option<Principal>, StoreError> {
        self.check_available("first_active_super_admin")?;
        let rows = self.principals.read().map_err(|_| poisoned())?;
        Ok(rows
            .iter()
            .find(|p| p.is_active && p.is_platform_super_admin)
            .cloned())
    }

    async fn active_memberships(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Vec<ResolvedMembership>, StoreError> {
        self.check_available("active_memberships")?;
        let memberships = self.memberships.read().map_err(|_| poisoned())?;
        let organizations = self.organizations.read().map_err(|_| poisoned())?;
        let positions = self.positions.read().map_err(|_| poisoned())?;

        // Inner join on organization; left join on position.
        Ok(memberships
            .iter()
            .filter(|m| m.principal_id == principal_id && m.is_active())
            .filter_map(|m| {
                let organization = organizations.get(&m.organization_id)?.clone();
                let position = m.position_id.and_then(|id| positions.get(&id).cloned());
                Some(ResolvedMembership {
                    organization,
                    membership: m.clone(),
                    position,
                })
            })
            .collect())
    }

    async fn role_grants(&self, role_id: RoleId) -> Result<Vec<RoleGrant>, StoreError> {
        self.check_available("role_grants")?;
        let rows = self.role_grants.read().map_err(|_| poisoned())?;
        Ok(rows.iter().filter(|g| g.role_id == role_id).cloned().collect())
    }

    async fn position_overrides(
        &self,
        position_id: PositionId,
    ) -> Result<Vec<PositionOverrideGrant>, StoreError> {
        self.check_available("position_overrides")?;
        let rows = self.position_overrides.read().map_err(|_| poisoned())?;
        Ok(rows
            .iter()
            .filter(|g| g.position_id == position_id)
            .cloned()
            .collect())
    }

    async fn active_module_codes(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<ModuleCode>, StoreError> {
        self.check_available("active_module_codes")?;
        let rows = self.subscriptions.read().map_err(|_| poisoned())?;
        Ok(active_modules(organization_id, rows.iter()).into_iter().collect())
    }

    async fn organization_by_id(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<Organization>, StoreError> {
        self.check_available("organization_by_id")?;
        let map = self.organizations.read().map_err(|_| poisoned())?;
        Ok(map.get(&organization_id).cloned())
    }

    async fn organization_by_slug(&self, slug: &str) -> Result<Option<Organization>, StoreError> {
        self.check_available("organization_by_slug")?;
        let map = self.organizations.read().map_err(|_| poisoned())?;
        Ok(map.values().find(|o| o.slug == slug).cloned())
    }

    async fn insert_principal(&self, new: NewPrincipal) -> Result<Principal, StoreError> {
        self.check_available("insert_principal")?;
        let mut rows = self.principals.write().map_err(|_| poisoned())?;

        let taken = |candidate: &str| rows.iter().any(|p| p.matches_identifier(candidate));
        if taken(&new.email) || new.nickname.as_deref().is_some_and(taken) {
            return Err(StoreError::Conflict(format!(
                "identifier already in use: {}",
                new.email
            )));
        }

        let principal = Principal {
            id: PrincipalId::new(),
            email: normalize_identifier(&new.email),
            nickname: new.nickname,
            is_active: true,
            is_platform_super_admin: false,
            is_platform_system_admin: false,
            must_change_credential: new.must_change_credential,
            credential: new.credential,
        };
        rows.push(principal.clone());
        Ok(principal)
    }
}
