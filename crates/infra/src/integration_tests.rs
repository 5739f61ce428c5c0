//! Integration tests for the full session pipeline.
//!
//! Tests: RecordStore → resolvers → SessionBuilder → SessionManager → AccessContext
//!
//! Verifies:
//! - Members see exactly their role/position grants, gated by module subscription
//! - Platform admins act through the admin context switch
//! - Restores re-read the store and discard identifiers that no longer resolve
//! - Store failures degrade to a locked-down session instead of an error

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Notify;

    use keystone_auth::{
        Action, Credential, LoginError, LoginOutcome, Membership, MembershipStatus, ModuleCode,
        ModuleSubscription, Organization, OrganizationStatus, OverrideStrategy, Position,
        PositionOverrideGrant, Principal, ResolvedMembership, RoleGrant, SubscriptionStatus,
    };
    use keystone_core::{MembershipId, OrganizationId, PositionId, PrincipalId, RoleId};

    use crate::config::AuthConfig;
    use crate::identifier_store::{
        FileIdentifierStore, IdentifierStore, InMemoryIdentifierStore, PersistedIdentifier,
    };
    use crate::session::{BOOTSTRAP_PRINCIPAL_ID, SessionBuilder, SessionManager, SyncOutcome};
    use crate::store::{InMemoryRecordStore, NewPrincipal, RecordStore, StoreError};

    struct Acme {
        store: Arc<InMemoryRecordStore>,
        org: Organization,
        globex: Organization,
        alice: Principal,
        root: Principal,
        guide_role: RoleId,
        guide: Position,
    }

    fn organization(slug: &str) -> Organization {
        Organization {
            id: OrganizationId::new(),
            name: slug.to_uppercase(),
            slug: slug.to_string(),
            status: OrganizationStatus::Active,
        }
    }

    fn principal(email: &str, credential: &str) -> Principal {
        Principal {
            id: PrincipalId::new(),
            email: email.to_string(),
            nickname: None,
            is_active: true,
            is_platform_super_admin: false,
            is_platform_system_admin: false,
            must_change_credential: false,
            credential: Credential::new(credential),
        }
    }

    fn subscribe(store: &InMemoryRecordStore, org: &Organization, module: &'static str, status: SubscriptionStatus) {
        store.add_subscription(ModuleSubscription {
            organization_id: org.id,
            module_code: module.into(),
            status,
        });
    }

    fn join(store: &InMemoryRecordStore, who: &Principal, org: &Organization, position: Option<&Position>, owner: bool) {
        store.add_membership(Membership {
            id: MembershipId::new(),
            principal_id: who.id,
            organization_id: org.id,
            position_id: position.map(|p| p.id),
            is_owner: owner,
            status: MembershipStatus::Active,
        });
    }

    /// alice@acme.com is a Guide at acme; root@platform is a super admin.
    fn acme() -> Acme {
        let store = Arc::new(InMemoryRecordStore::new());
        let org = organization("acme");
        let globex = organization("globex");
        let guide_role = RoleId::new();
        let guide = Position {
            id: PositionId::new(),
            organization_id: org.id,
            name: "Guide".to_string(),
            default_role_id: Some(guide_role),
        };

        let mut alice = principal("alice@acme.com", "wonderland");
        alice.nickname = Some("alice".to_string());
        let mut root = principal("root@platform", "toor");
        root.is_platform_super_admin = true;

        store.add_organization(org.clone());
        store.add_organization(globex.clone());
        store.add_position(guide.clone());
        store.add_principal(alice.clone());
        store.add_principal(root.clone());
        join(&store, &alice, &org, Some(&guide), false);

        subscribe(&store, &org, "bookings", SubscriptionStatus::Active);
        subscribe(&store, &org, "crm", SubscriptionStatus::Active);
        subscribe(&store, &org, "finance", SubscriptionStatus::Cancelled);

        store.add_role_grant(RoleGrant {
            role_id: guide_role,
            module_code: "bookings".into(),
            resource_type: "bookings".into(),
            can_create: None,
            can_read: Some(true),
            can_update: Some(false),
            can_delete: None,
        });

        Acme {
            store,
            org,
            globex,
            alice,
            root,
            guide_role,
            guide,
        }
    }

    type Manager = SessionManager<InMemoryRecordStore, Arc<InMemoryIdentifierStore>>;

    fn manager(store: &Arc<InMemoryRecordStore>, identifiers: &Arc<InMemoryIdentifierStore>) -> Manager {
        SessionManager::new(store.clone(), identifiers.clone(), &AuthConfig::default())
    }

    fn persisted(identifiers: &InMemoryIdentifierStore) -> Option<String> {
        identifiers.load().unwrap().map(|p| p.identifier)
    }

    #[tokio::test]
    async fn guide_reads_but_cannot_update_bookings() {
        let acme = acme();
        let identifiers = Arc::new(InMemoryIdentifierStore::new());
        let m = manager(&acme.store, &identifiers);

        assert_eq!(m.login("alice@acme.com", "wonderland").await, Ok(LoginOutcome::Success));

        let access = m.access();
        assert!(access.can(Action::Read, "bookings", "bookings"));
        assert!(!access.can(Action::Update, "bookings", "bookings"));
        assert!(!access.can(Action::Create, "crm", "customers"));
        assert_eq!(access.effective_organization_id(), Some(acme.org.id));
        assert!(!access.is_platform_admin());
        assert!(!access.is_organization_admin());
        assert_eq!(persisted(&identifiers).as_deref(), Some("alice@acme.com"));
    }

    #[tokio::test]
    async fn nickname_login_resolves_the_same_principal() {
        let acme = acme();
        let identifiers = Arc::new(InMemoryIdentifierStore::new());
        let m = manager(&acme.store, &identifiers);

        m.login(" ALICE ", "wonderland").await.unwrap();
        assert_eq!(m.session().unwrap().principal.id, acme.alice.id);
        assert_eq!(persisted(&identifiers).as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn super_admin_acts_through_the_selected_organization() {
        let acme = acme();
        let m = manager(&acme.store, &Arc::new(InMemoryIdentifierStore::new()));
        m.login("root@platform", "toor").await.unwrap();

        let access = m.access();
        assert_eq!(access.session().unwrap().principal.id, acme.root.id);
        assert!(access.is_platform_admin());
        assert!(access.can(Action::Delete, "finance", "invoices"));
        assert!(access.has_module("anything"));
        assert_eq!(access.effective_organization_id(), None);

        assert!(m.select_organization(acme.org.id).await);
        assert_eq!(m.access().effective_organization_id(), Some(acme.org.id));
        assert_eq!(m.deep_link_query().as_deref(), Some("org=acme"));

        m.clear_organization();
        assert_eq!(m.access().effective_organization_id(), None);
    }

    #[tokio::test]
    async fn member_effective_organization_ignores_selection_attempts() {
        let acme = acme();
        let m = manager(&acme.store, &Arc::new(InMemoryIdentifierStore::new()));
        m.login("alice@acme.com", "wonderland").await.unwrap();

        assert!(!m.select_organization(acme.globex.id).await);
        assert_eq!(
            m.sync_admin_context_from_url("?org=globex").await,
            SyncOutcome::NotAdmin
        );
        assert_eq!(m.access().effective_organization_id(), Some(acme.org.id));
    }

    #[tokio::test]
    async fn unsubscribed_module_beats_a_resource_grant() {
        let acme = acme();
        acme.store.add_role_grant(RoleGrant::new(
            acme.guide_role,
            "finance",
            "invoices",
            &[Action::Read],
        ));
        let m = manager(&acme.store, &Arc::new(InMemoryIdentifierStore::new()));
        m.login("alice@acme.com", "wonderland").await.unwrap();

        let access = m.access();
        assert!(access.session().unwrap().permission("finance", "invoices").unwrap().can_read);
        assert!(!access.has_module("finance"));
        assert!(!access.can(Action::Read, "finance", "invoices"));

        let why = access.explain("read", "finance", "invoices");
        assert!(!why.granted);
    }

    #[tokio::test]
    async fn owner_bypasses_grants_only_inside_subscribed_modules() {
        let acme = acme();
        let owner = principal("owner@acme.com", "pw");
        acme.store.add_principal(owner.clone());
        join(&acme.store, &owner, &acme.org, None, true);

        let m = manager(&acme.store, &Arc::new(InMemoryIdentifierStore::new()));
        m.login("owner@acme.com", "pw").await.unwrap();

        let access = m.access();
        assert!(access.session().unwrap().permissions.is_empty());
        assert!(access.is_organization_admin());
        for action in Action::ALL {
            assert!(access.can(action, "crm", "leads"));
            assert!(!access.can(action, "finance", "invoices"));
        }
    }

    #[tokio::test]
    async fn position_overrides_replace_the_role_row() {
        let acme = acme();
        acme.store.add_role_grant(RoleGrant {
            role_id: acme.guide_role,
            module_code: "crm".into(),
            resource_type: "leads".into(),
            can_create: Some(false),
            can_read: Some(true),
            can_update: None,
            can_delete: None,
        });
        acme.store.add_position_override(PositionOverrideGrant {
            position_id: acme.guide.id,
            module_code: "crm".into(),
            resource_type: "leads".into(),
            can_create: Some(true),
            can_read: None,
            can_update: None,
            can_delete: None,
        });

        let m = manager(&acme.store, &Arc::new(InMemoryIdentifierStore::new()));
        m.login("alice@acme.com", "wonderland").await.unwrap();

        let access = m.access();
        assert!(access.can(Action::Create, "crm", "leads"));
        assert!(!access.can(Action::Read, "crm", "leads"));
        assert!(!access.can(Action::Update, "crm", "leads"));
        assert!(!access.can(Action::Delete, "crm", "leads"));
        // Uncovered keys still come from the role.
        assert!(access.can(Action::Read, "bookings", "bookings"));
    }

    #[tokio::test]
    async fn ignore_strategy_uses_role_grants_only() {
        let acme = acme();
        acme.store.add_position_override(PositionOverrideGrant::new(
            acme.guide.id,
            "bookings",
            "bookings",
            &[Action::Update],
        ));
        let config = AuthConfig {
            position_overrides: OverrideStrategy::Ignore,
            ..AuthConfig::default()
        };
        let m = SessionManager::new(acme.store.clone(), InMemoryIdentifierStore::new(), &config);
        m.login("alice@acme.com", "wonderland").await.unwrap();

        assert!(!m.access().can(Action::Update, "bookings", "bookings"));
    }

    #[tokio::test]
    async fn rebuilding_from_unchanged_data_is_identical() {
        let acme = acme();
        acme.store.add_role_grant(RoleGrant::new(acme.guide_role, "crm", "leads", &[Action::Read]));
        acme.store.add_role_grant(RoleGrant::new(acme.guide_role, "crm", "leads", &[Action::Create]));
        let builder = SessionBuilder::new(acme.store.clone(), OverrideStrategy::default());

        let first = builder.build(&acme.alice).await;
        let second = builder.build(&acme.alice).await;

        assert_eq!(first, second);
        assert_eq!(first.permissions.to_vec(), second.permissions.to_vec());
        assert_eq!(
            serde_json::to_vec(&first.permissions).unwrap(),
            serde_json::to_vec(&second.permissions).unwrap()
        );
        assert_eq!(first.membership_organization_id(), second.membership_organization_id());
    }

    #[tokio::test]
    async fn restore_honors_grants_changed_since_last_visit() {
        let acme = acme();
        let identifiers = Arc::new(InMemoryIdentifierStore::new());
        manager(&acme.store, &identifiers)
            .login("alice@acme.com", "wonderland")
            .await
            .unwrap();

        acme.store.replace_role_grants(
            acme.guide_role,
            vec![RoleGrant::new(acme.guide_role, "bookings", "bookings", &[Action::Read, Action::Update])],
        );

        // Next start.
        let m = manager(&acme.store, &identifiers);
        assert!(m.restore_session().await);
        assert!(m.access().can(Action::Update, "bookings", "bookings"));
    }

    #[tokio::test]
    async fn restore_discards_an_identifier_that_no_longer_resolves() {
        let acme = acme();
        let identifiers = Arc::new(InMemoryIdentifierStore::new());
        manager(&acme.store, &identifiers)
            .login("alice@acme.com", "wonderland")
            .await
            .unwrap();

        let mut gone = acme.alice.clone();
        gone.is_active = false;
        acme.store.add_principal(gone);

        let m = manager(&acme.store, &identifiers);
        assert!(!m.restore_session().await);
        assert!(!m.access().is_authenticated());
        assert_eq!(persisted(&identifiers), None);
    }

    #[tokio::test]
    async fn restore_during_an_outage_logs_out() {
        let acme = acme();
        let identifiers = Arc::new(InMemoryIdentifierStore::with_identifier("alice@acme.com"));
        acme.store.set_unavailable(true);

        let m = manager(&acme.store, &identifiers);
        assert!(!m.restore_session().await);
        assert_eq!(persisted(&identifiers), None);
    }

    #[tokio::test]
    async fn store_failures_degrade_to_a_locked_down_session() {
        let acme = acme();
        let builder = SessionBuilder::new(acme.store.clone(), OverrideStrategy::default());
        acme.store.set_unavailable(true);

        let session = builder.build(&acme.alice).await;

        assert!(session.organization.is_none());
        assert!(session.modules.is_empty());
        assert!(session.permissions.is_empty());
        assert!(!keystone_auth::can(Some(&session), Action::Read, "bookings", "bookings"));
    }

    #[tokio::test]
    async fn wrong_credential_and_unknown_identifier_look_the_same() {
        let acme = acme();
        let m = manager(&acme.store, &Arc::new(InMemoryIdentifierStore::new()));

        let wrong = m.login("alice@acme.com", "nope").await.unwrap_err();
        let unknown = m.login("mallory@acme.com", "nope").await.unwrap_err();

        assert_eq!(wrong, LoginError::InvalidCredentials);
        assert_eq!(wrong, unknown);
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert!(m.session().is_none());
    }

    #[tokio::test]
    async fn bootstrap_login_works_against_an_empty_store() {
        let store = Arc::new(InMemoryRecordStore::new());
        let identifiers = Arc::new(InMemoryIdentifierStore::with_identifier("someone-else"));
        let m = manager(&store, &identifiers);

        assert_eq!(m.login("admin", "admin").await, Ok(LoginOutcome::MustChangeCredential));

        let session = m.session().unwrap();
        assert!(session.ephemeral);
        assert_eq!(session.principal.id, BOOTSTRAP_PRINCIPAL_ID);
        assert!(m.access().is_platform_admin());
        assert_eq!(persisted(&identifiers), None);
    }

    #[tokio::test]
    async fn logout_clears_everything() {
        let acme = acme();
        let identifiers = Arc::new(InMemoryIdentifierStore::new());
        let m = manager(&acme.store, &identifiers);
        m.login("root@platform", "toor").await.unwrap();
        assert!(m.select_organization(acme.org.id).await);

        m.logout();

        let access = m.access();
        assert!(!access.is_authenticated());
        assert!(!access.admin_context().is_selected());
        assert_eq!(persisted(&identifiers), None);
    }

    #[tokio::test]
    async fn file_store_persists_only_the_identifier() {
        let acme = acme();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/session.json");
        let m = SessionManager::new(
            acme.store.clone(),
            FileIdentifierStore::new(&path),
            &AuthConfig::default(),
        );

        m.login("alice@acme.com", "wonderland").await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("alice@acme.com"));
        assert!(!raw.contains("wonderland"));

        let restarted = SessionManager::new(
            acme.store.clone(),
            FileIdentifierStore::new(&path),
            &AuthConfig::default(),
        );
        assert!(restarted.restore_session().await);
        assert_eq!(restarted.access().effective_organization_id(), Some(acme.org.id));
    }

    #[tokio::test]
    async fn url_sync_restores_selection_once_per_mount() {
        let acme = acme();
        let m = manager(&acme.store, &Arc::new(InMemoryIdentifierStore::new()));
        m.login("root@platform", "toor").await.unwrap();

        assert_eq!(
            m.sync_admin_context_from_url("?org=acme").await,
            SyncOutcome::Selected(acme.org.clone())
        );
        m.clear_organization();
        assert_eq!(
            m.sync_admin_context_from_url("?org=acme").await,
            SyncOutcome::AlreadySynced
        );
        assert_eq!(m.access().effective_organization_id(), None);
    }

    #[tokio::test]
    async fn url_sync_for_unknown_slug_stays_unset() {
        let acme = acme();
        let m = manager(&acme.store, &Arc::new(InMemoryIdentifierStore::new()));
        m.login("root@platform", "toor").await.unwrap();

        assert_eq!(
            m.sync_admin_context_from_url("?org=initech").await,
            SyncOutcome::NotFound
        );
        assert_eq!(m.access().effective_organization_id(), None);
    }

    #[tokio::test]
    async fn user_selection_during_url_sync_wins() {
        let acme = acme();
        let gated = Arc::new(GatedStore::new(acme.store.clone(), "organization_by_slug"));
        let m = SessionManager::new(gated.clone(), InMemoryIdentifierStore::new(), &AuthConfig::default());
        m.login("root@platform", "toor").await.unwrap();

        let sync = m.sync_admin_context_from_url("?org=acme");
        let user = async {
            gated.entered.notified().await;
            let selected = m.select_organization(acme.globex.id).await;
            gated.release.notify_one();
            selected
        };
        let (outcome, selected) = tokio::join!(sync, user);

        assert!(selected);
        assert_eq!(outcome, SyncOutcome::Superseded);
        assert_eq!(m.access().effective_organization_id(), Some(acme.globex.id));
    }

    #[tokio::test]
    async fn logout_during_restore_stays_logged_out() {
        let acme = acme();
        let gated = Arc::new(GatedStore::new(acme.store.clone(), "find_active_principal"));
        let identifiers = Arc::new(InMemoryIdentifierStore::with_identifier("alice@acme.com"));
        let m = SessionManager::new(gated.clone(), identifiers.clone(), &AuthConfig::default());

        let restore = m.restore_session();
        let user = async {
            gated.entered.notified().await;
            m.logout();
            gated.release.notify_one();
        };
        let (restored, ()) = tokio::join!(restore, user);

        assert!(!restored);
        assert!(m.session().is_none());
        assert_eq!(persisted(&identifiers), None);
    }

    #[tokio::test]
    async fn logout_during_login_stays_logged_out() {
        let acme = acme();
        let gated = Arc::new(GatedStore::new(acme.store.clone(), "find_active_principal"));
        let identifiers = Arc::new(InMemoryIdentifierStore::new());
        let m = SessionManager::new(gated.clone(), identifiers.clone(), &AuthConfig::default());

        let login = m.login("alice@acme.com", "wonderland");
        let user = async {
            gated.entered.notified().await;
            m.logout();
            gated.release.notify_one();
        };
        let (outcome, ()) = tokio::join!(login, user);

        assert_eq!(outcome, Err(LoginError::Superseded));
        assert!(!m.access().is_authenticated());
        assert_eq!(persisted(&identifiers), None);
    }

    #[tokio::test]
    async fn store_outage_does_not_open_the_bootstrap_account() {
        let acme = acme();
        let m = manager(&acme.store, &Arc::new(InMemoryIdentifierStore::new()));
        acme.store.set_operation_unavailable("find_active_principal", true);

        assert_eq!(m.login("admin", "admin").await, Err(LoginError::InvalidCredentials));
        assert!(!m.access().is_platform_admin());
    }

    #[tokio::test]
    async fn onboarding_write_feeds_the_identity_resolver() {
        let acme = acme();
        let created = acme
            .store
            .insert_principal(NewPrincipal {
                email: "Vendor@Example.com".to_string(),
                nickname: Some("vendor".to_string()),
                credential: Credential::new("temp-pass"),
                must_change_credential: true,
            })
            .await
            .unwrap();

        let m = manager(&acme.store, &Arc::new(InMemoryIdentifierStore::new()));
        assert_eq!(
            m.login("vendor", "temp-pass").await,
            Ok(LoginOutcome::MustChangeCredential)
        );
        let session = m.session().unwrap();
        assert_eq!(session.principal.id, created.id);
        assert_eq!(m.access().effective_organization_id(), None);
    }

    #[tokio::test]
    async fn persisted_identifier_is_written_only_after_verification() {
        let acme = acme();
        let identifiers = Arc::new(InMemoryIdentifierStore::new());
        let m = manager(&acme.store, &identifiers);

        let _ = m.login("alice@acme.com", "nope").await;
        assert_eq!(persisted(&identifiers), None);

        identifiers.save(&PersistedIdentifier::now("root@platform")).unwrap();
        let _ = m.login("alice@acme.com", "nope").await;
        assert_eq!(persisted(&identifiers).as_deref(), Some("root@platform"));
    }

    /// Holds one gateway method open until released, to interleave a user
    /// action with an operation that is awaiting the store.
    struct GatedStore {
        inner: Arc<InMemoryRecordStore>,
        gated: &'static str,
        entered: Notify,
        release: Notify,
    }

    impl GatedStore {
        fn new(inner: Arc<InMemoryRecordStore>, gated: &'static str) -> Self {
            Self {
                inner,
                gated,
                entered: Notify::new(),
                release: Notify::new(),
            }
        }

        async fn pass(&self, operation: &'static str) {
            if operation == self.gated {
                self.entered.notify_one();
                self.release.notified().await;
            }
        }
    }

    #[async_trait::async_trait]
    impl RecordStore for GatedStore {
        async fn find_active_principal(&self, identifier: &str) -> Result<Option<Principal>, StoreError> {
            self.pass("find_active_principal").await;
            self.inner.find_active_principal(identifier).await
        }

        async fn first_active_super_admin(&self) -> Result<Option<Principal>, StoreError> {
            self.inner.first_active_super_admin().await
        }

        async fn active_memberships(
            &self,
            principal_id: PrincipalId,
        ) -> Result<Vec<ResolvedMembership>, StoreError> {
            self.inner.active_memberships(principal_id).await
        }

        async fn role_grants(&self, role_id: RoleId) -> Result<Vec<RoleGrant>, StoreError> {
            self.inner.role_grants(role_id).await
        }

        async fn position_overrides(
            &self,
            position_id: PositionId,
        ) -> Result<Vec<PositionOverrideGrant>, StoreError> {
            self.inner.position_overrides(position_id).await
        }

        async fn active_module_codes(
            &self,
            organization_id: OrganizationId,
        ) -> Result<Vec<ModuleCode>, StoreError> {
            self.inner.active_module_codes(organization_id).await
        }

        async fn organization_by_id(
            &self,
            organization_id: OrganizationId,
        ) -> Result<Option<Organization>, StoreError> {
            self.inner.organization_by_id(organization_id).await
        }

        async fn organization_by_slug(&self, slug: &str) -> Result<Option<Organization>, StoreError> {
            self.pass("organization_by_slug").await;
            self.inner.organization_by_slug(slug).await
        }

        async fn insert_principal(&self, principal: NewPrincipal) -> Result<Principal, StoreError> {
            self.inner.insert_principal(principal).await
        }
    }
}
