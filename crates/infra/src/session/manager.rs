//! Session lifecycle and the composition root feature code reads from.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use uuid::Uuid;

use keystone_auth::{
    AccessContext, LoginError, LoginOutcome, PrincipalIdentity, Session, match_bootstrap,
    normalize_identifier,
};
use keystone_core::{OrganizationId, PrincipalId};

use crate::config::{AuthConfig, Environment};
use crate::identifier_store::{IdentifierStore, PersistedIdentifier};
use crate::resolve::resolve_identity;
use crate::store::RecordStore;

use super::admin_switch::{AdminContextSwitch, SyncOutcome};
use super::builder::SessionBuilder;

/// Principal id carried by sessions that have no store record behind them.
pub const BOOTSTRAP_PRINCIPAL_ID: PrincipalId = PrincipalId::from_uuid(Uuid::nil());

/// Owns the one current session and the admin organization switch.
///
/// Sessions are published whole: readers see either the previous session or
/// the fully built next one.
///
/// `login`, `logout`, `restore_session` and `dev_login` each start a new
/// lifecycle generation. A call only publishes its session (and touches the
/// persisted identifier) if no later call started while it awaited the store,
/// so a logout is never undone by a login or restore that was in flight.
pub struct SessionManager<S, I> {
    builder: SessionBuilder<S>,
    identifiers: I,
    admin: AdminContextSwitch,
    current: RwLock<Option<Arc<Session>>>,
    restore_attempted: AtomicBool,
    lifecycle: AtomicU64,
    environment: Environment,
    bootstrap_login: bool,
}

impl<S, I> SessionManager<S, I>
where
    S: RecordStore,
    I: IdentifierStore,
{
    pub fn new(store: Arc<S>, identifiers: I, config: &AuthConfig) -> Self {
        Self {
            builder: SessionBuilder::new(store, config.position_overrides),
            identifiers,
            admin: AdminContextSwitch::new(config.org_query_param.clone()),
            current: RwLock::new(None),
            restore_attempted: AtomicBool::new(false),
            lifecycle: AtomicU64::new(0),
            environment: config.environment,
            bootstrap_login: config.bootstrap_login,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        self.builder.store()
    }

    pub fn admin_switch(&self) -> &AdminContextSwitch {
        &self.admin
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the session and admin context for authorization queries.
    pub fn access(&self) -> AccessContext {
        AccessContext::new(self.session(), self.admin.context())
    }

    fn begin(&self) -> u64 {
        self.lifecycle.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Publish `session` and apply `identifier` if `ticket` is still the
    /// latest generation. The check and the writes happen under the session
    /// lock, which `logout` also holds while it bumps the generation.
    fn commit(&self, ticket: u64, session: Option<Session>, identifier: IdentifierUpdate<'_>) -> bool {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if self.lifecycle.load(Ordering::SeqCst) != ticket {
            tracing::debug!("session change superseded by a later lifecycle call");
            return false;
        }

        self.admin.reset();
        *current = session.map(Arc::new);
        match identifier {
            IdentifierUpdate::Keep => {}
            IdentifierUpdate::Save(identifier) => self.persist_identifier(identifier),
            IdentifierUpdate::Forget => self.forget_identifier(),
        }
        true
    }

    fn persist_identifier(&self, identifier: &str) {
        if let Err(e) = self.identifiers.save(&PersistedIdentifier::now(identifier)) {
            tracing::warn!(error = %e, "failed to persist login identifier");
        }
    }

    fn forget_identifier(&self) {
        if let Err(e) = self.identifiers.clear() {
            tracing::warn!(error = %e, "failed to clear persisted login identifier");
        }
    }

    /// Verify `credential` for `identifier` and publish a fresh session.
    ///
    /// The bootstrap allow-list is consulted only when the store answers that
    /// no active principal matches. An unreachable store refuses the login. A
    /// failed login leaves the current session untouched.
    pub async fn login(&self, identifier: &str, credential: &str) -> Result<LoginOutcome, LoginError> {
        let identifier = normalize_identifier(identifier);
        if identifier.is_empty() || credential.is_empty() {
            return Err(LoginError::MissingCredentials);
        }
        let ticket = self.begin();

        let principal = match resolve_identity(&**self.store(), &identifier).await {
            Ok(Some(principal)) => principal,
            Ok(None) => return self.login_bootstrap(ticket, &identifier, credential),
            Err(_) => {
                tracing::warn!("login rejected: identity lookup unavailable");
                return Err(LoginError::InvalidCredentials);
            }
        };

        if !principal.credential.matches(credential) {
            tracing::warn!("login rejected: invalid identifier or credential");
            return Err(LoginError::InvalidCredentials);
        }

        let session = self.builder.build(&principal).await;
        if !self.commit(ticket, Some(session), IdentifierUpdate::Save(&identifier)) {
            return Err(LoginError::Superseded);
        }

        tracing::info!(principal_id = %principal.id, "login succeeded");
        Ok(if principal.must_change_credential {
            LoginOutcome::MustChangeCredential
        } else {
            LoginOutcome::Success
        })
    }

    fn login_bootstrap(&self, ticket: u64, identifier: &str, credential: &str) -> Result<LoginOutcome, LoginError> {
        let account = match_bootstrap(identifier, credential).filter(|_| self.bootstrap_login);
        let Some(account) = account else {
            tracing::warn!("login rejected: invalid identifier or credential");
            return Err(LoginError::InvalidCredentials);
        };

        let session = Session::ephemeral_admin(synthetic_admin(account.identifier));
        // Nothing to restore from later.
        if !self.commit(ticket, Some(session), IdentifierUpdate::Forget) {
            return Err(LoginError::Superseded);
        }
        tracing::warn!(identifier = account.identifier, "bootstrap login accepted; credential must be changed");
        Ok(LoginOutcome::MustChangeCredential)
    }

    /// Drop the session, the admin context and the persisted identifier.
    ///
    /// Any login or restore still awaiting the store is superseded.
    pub fn logout(&self) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        self.lifecycle.fetch_add(1, Ordering::SeqCst);
        let had_session = current.take().is_some();
        self.admin.reset();
        self.forget_identifier();
        drop(current);
        if had_session {
            tracing::info!("logged out");
        }
    }

    /// Rebuild the session from the persisted identifier, once per start.
    ///
    /// Grants are re-read from the store, never from a cache. If the
    /// identifier no longer resolves the identifier is discarded and the
    /// manager stays logged out. Returns whether a session is current.
    pub async fn restore_session(&self) -> bool {
        if self.restore_attempted.swap(true, Ordering::SeqCst) {
            return self.session().is_some();
        }
        let ticket = self.begin();

        let persisted = match self.identifiers.load() {
            Ok(Some(persisted)) => persisted,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(error = %e, "persisted identifier unreadable; discarding");
                self.forget_identifier();
                return false;
            }
        };

        let Ok(Some(principal)) = resolve_identity(&**self.store(), &persisted.identifier).await else {
            tracing::warn!("session restore failed: identifier no longer resolves");
            self.commit(ticket, None, IdentifierUpdate::Forget);
            return self.session().is_some();
        };

        let session = self.builder.build(&principal).await;
        if !self.commit(ticket, Some(session), IdentifierUpdate::Keep) {
            return self.session().is_some();
        }
        tracing::info!(principal_id = %principal.id, "session restored");
        true
    }

    /// Explicit admin selection. Returns whether the context changed.
    pub async fn select_organization(&self, organization_id: OrganizationId) -> bool {
        let session = self.session();
        self.admin
            .select(&**self.store(), session.as_deref(), organization_id)
            .await
    }

    pub fn clear_organization(&self) {
        self.admin.clear();
    }

    /// Adopt the organization slug in `query` for an admin, once per mount.
    pub async fn sync_admin_context_from_url(&self, query: &str) -> SyncOutcome {
        let session = self.session();
        self.admin
            .sync_from_url(&**self.store(), session.as_deref(), query)
            .await
    }

    pub fn deep_link_query(&self) -> Option<String> {
        self.admin.deep_link_query()
    }

    /// Log in as the first active super admin, or as a synthesized admin when
    /// the store has none. Refused in production.
    #[cfg(feature = "dev-login")]
    pub async fn dev_login(&self) -> Result<LoginOutcome, LoginError> {
        if self.environment.is_production() {
            tracing::warn!("dev login refused in production");
            return Err(LoginError::DevLoginDisabled);
        }
        let ticket = self.begin();

        let principal = match self.store().first_active_super_admin().await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "super admin lookup failed; synthesizing a dev admin");
                None
            }
        };

        let committed = match principal {
            Some(principal) => {
                tracing::warn!(principal_id = %principal.id, "DEV LOGIN as existing super admin");
                let session = self.builder.build(&principal).await;
                self.commit(ticket, Some(session), IdentifierUpdate::Save(&principal.email))
            }
            None => {
                tracing::warn!("DEV LOGIN with a synthesized admin session");
                let session = Session::ephemeral_admin(synthetic_admin("dev@localhost"));
                self.commit(ticket, Some(session), IdentifierUpdate::Forget)
            }
        };
        if !committed {
            return Err(LoginError::Superseded);
        }
        Ok(LoginOutcome::Success)
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }
}

/// What a committed lifecycle call does to the persisted identifier.
enum IdentifierUpdate<'a> {
    Keep,
    Save(&'a str),
    Forget,
}

fn synthetic_admin(email: &str) -> PrincipalIdentity {
    PrincipalIdentity {
        id: BOOTSTRAP_PRINCIPAL_ID,
        email: email.to_string(),
        nickname: None,
        is_platform_super_admin: true,
        is_platform_system_admin: false,
    }
}
