use std::sync::Arc;

use keystone_auth::{OverrideStrategy, Principal, Session};

use crate::resolve::{resolve_membership, resolve_modules, resolve_permissions};
use crate::store::RecordStore;

/// Builds a full [`Session`] for a resolved principal.
///
/// Every build goes back to the store; nothing is cached between builds.
#[derive(Debug)]
pub struct SessionBuilder<S> {
    store: Arc<S>,
    strategy: OverrideStrategy,
}

impl<S> Clone for SessionBuilder<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            strategy: self.strategy,
        }
    }
}

impl<S> SessionBuilder<S>
where
    S: RecordStore,
{
    pub fn new(store: Arc<S>, strategy: OverrideStrategy) -> Self {
        Self { store, strategy }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn strategy(&self) -> OverrideStrategy {
        self.strategy
    }

    /// Membership first, then modules and permissions concurrently.
    #[tracing::instrument(skip(self, principal), fields(principal_id = %principal.id))]
    pub async fn build(&self, principal: &Principal) -> Session {
        let membership = resolve_membership(&*self.store, principal).await;

        let organization_id = membership.as_ref().map(|m| m.organization.id);
        let position = membership.as_ref().and_then(|m| m.position.as_ref());

        let (modules, permissions) = tokio::join!(
            resolve_modules(&*self.store, organization_id),
            resolve_permissions(&*self.store, position, self.strategy),
        );

        tracing::debug!(
            organization_id = ?organization_id,
            modules = modules.len(),
            permissions = permissions.len(),
            "session assembled"
        );

        Session::assemble(principal.identity(), membership, modules, permissions)
    }
}

#[cfg(test)]
mod tests {
    use keystone_auth::{
        Action, Credential, Membership, MembershipStatus, ModuleSubscription, Organization,
        OrganizationStatus, Position, RoleGrant, SubscriptionStatus,
    };
    use keystone_core::{MembershipId, OrganizationId, PositionId, PrincipalId, RoleId};

    use super::*;
    use crate::store::InMemoryRecordStore;

    fn member() -> Principal {
        Principal {
            id: PrincipalId::new(),
            email: "alice@acme.com".to_string(),
            nickname: None,
            is_active: true,
            is_platform_super_admin: false,
            is_platform_system_admin: false,
            must_change_credential: false,
            credential: Credential::new("pw"),
        }
    }

    #[tokio::test]
    async fn builds_every_part_of_the_session() {
        let store = Arc::new(InMemoryRecordStore::new());
        let alice = member();
        let acme = Organization {
            id: OrganizationId::new(),
            name: "Acme".to_string(),
            slug: "acme".to_string(),
            status: OrganizationStatus::Active,
        };
        let role = RoleId::new();
        let guide = Position {
            id: PositionId::new(),
            organization_id: acme.id,
            name: "Guide".to_string(),
            default_role_id: Some(role),
        };
        store.add_principal(alice.clone());
        store.add_organization(acme.clone());
        store.add_position(guide.clone());
        store.add_membership(Membership {
            id: MembershipId::new(),
            principal_id: alice.id,
            organization_id: acme.id,
            position_id: Some(guide.id),
            is_owner: false,
            status: MembershipStatus::Active,
        });
        store.add_subscription(ModuleSubscription {
            organization_id: acme.id,
            module_code: "bookings".into(),
            status: SubscriptionStatus::Active,
        });
        store.add_role_grant(RoleGrant::new(role, "bookings", "bookings", &[Action::Read]));

        let session = SessionBuilder::new(store, OverrideStrategy::default())
            .build(&alice)
            .await;

        assert_eq!(session.organization, Some(acme));
        assert_eq!(session.position, Some(guide));
        assert!(session.is_subscribed("bookings"));
        assert!(session.permission("bookings", "bookings").unwrap().can_read);
        assert!(!session.ephemeral);
    }

    #[tokio::test]
    async fn organization_less_principal_gets_an_empty_session() {
        let store = Arc::new(InMemoryRecordStore::new());
        let loner = member();
        store.add_principal(loner.clone());

        let session = SessionBuilder::new(store, OverrideStrategy::default())
            .build(&loner)
            .await;

        assert!(session.organization.is_none());
        assert!(session.modules.is_empty());
        assert!(session.permissions.is_empty());
    }
}
