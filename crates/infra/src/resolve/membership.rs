use keystone_auth::{Principal, ResolvedMembership};

use crate::store::RecordStore;

/// Membership Resolver.
///
/// Platform admins are organization-less and skip the lookup entirely. For
/// everyone else the first active membership the store yields wins; the store
/// gives no ordering guarantee, so a principal with several active memberships
/// sees an arbitrary one of them.
pub async fn resolve_membership<S>(store: &S, principal: &Principal) -> Option<ResolvedMembership>
where
    S: RecordStore + ?Sized,
{
    if principal.is_platform_admin() {
        return None;
    }

    let rows = match store.active_memberships(principal.id).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(
                step = "resolve_membership",
                principal_id = %principal.id,
                error = %e,
                "membership lookup failed; treating principal as organization-less"
            );
            return None;
        }
    };

    if rows.len() > 1 {
        tracing::debug!(
            principal_id = %principal.id,
            count = rows.len(),
            "principal has several active memberships; using the first"
        );
    }

    rows.into_iter().next()
}

#[cfg(test)]
mod tests {
    use keystone_auth::{Credential, Membership, MembershipStatus, Organization, OrganizationStatus};
    use keystone_core::{MembershipId, OrganizationId, PrincipalId};

    use super::*;
    use crate::store::InMemoryRecordStore;

    fn principal(admin: bool) -> Principal {
        Principal {
            id: PrincipalId::new(),
            email: "p@example.com".to_string(),
            nickname: None,
            is_active: true,
            is_platform_super_admin: false,
            is_platform_system_admin: admin,
            must_change_credential: false,
            credential: Credential::new("pw"),
        }
    }

    fn seed_membership(store: &InMemoryRecordStore, principal: &Principal, slug: &str) -> Organization {
        let org = Organization {
            id: OrganizationId::new(),
            name: slug.to_string(),
            slug: slug.to_string(),
            status: OrganizationStatus::Active,
        };
        store.add_organization(org.clone());
        store.add_membership(Membership {
            id: MembershipId::new(),
            principal_id: principal.id,
            organization_id: org.id,
            position_id: None,
            is_owner: false,
            status: MembershipStatus::Active,
        });
        org
    }

    #[tokio::test]
    async fn platform_admins_skip_membership() {
        let store = InMemoryRecordStore::new();
        let admin = principal(true);
        seed_membership(&store, &admin, "acme");

        assert!(resolve_membership(&store, &admin).await.is_none());
    }

    #[tokio::test]
    async fn first_active_membership_wins() {
        let store = InMemoryRecordStore::new();
        let member = principal(false);
        let acme = seed_membership(&store, &member, "acme");
        seed_membership(&store, &member, "globex");

        let resolved = resolve_membership(&store, &member).await.unwrap();
        assert_eq!(resolved.organization, acme);
    }

    #[tokio::test]
    async fn no_membership_is_none() {
        let store = InMemoryRecordStore::new();
        assert!(resolve_membership(&store, &principal(false)).await.is_none());
    }
}
