//! Platform-admin organization switch.
//!
//! Wraps [`AdminContext`] with the two writers it has:
//! - explicit user actions (`select` / `clear`), last writer wins between them
//! - the URL sync, which runs at most once per mount and never overwrites a
//!   selection or a user action that happened while it was fetching
//!
//! Every write bumps a generation counter. A fetch remembers the generation it
//! started under and only applies its result if nothing moved in between.

use std::sync::{Mutex, MutexGuard, PoisonError};

use keystone_auth::{AdminContext, Organization, Session};
use keystone_core::OrganizationId;

use crate::store::RecordStore;

/// Result of [`AdminContextSwitch::sync_from_url`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The slug resolved and the context is now `Selected`.
    Selected(Organization),
    /// Sync already ran since the last reset.
    AlreadySynced,
    /// The session is absent or not a platform admin; the attempt is not consumed.
    NotAdmin,
    /// The query carries no organization slug.
    NoSlug,
    /// A selection already exists and is left alone.
    AlreadySelected,
    /// No organization has that slug.
    NotFound,
    /// The lookup failed; the context stays as it was.
    Failed,
    /// A user action landed while the lookup was in flight and wins.
    Superseded,
}

#[derive(Debug, Default)]
struct SwitchState {
    context: AdminContext,
    generation: u64,
    url_synced: bool,
}

#[derive(Debug)]
pub struct AdminContextSwitch {
    state: Mutex<SwitchState>,
    query_param: String,
}

impl Default for AdminContextSwitch {
    fn default() -> Self {
        Self::new("org")
    }
}

impl AdminContextSwitch {
    pub fn new(query_param: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(SwitchState::default()),
            query_param: query_param.into(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SwitchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn context(&self) -> AdminContext {
        self.lock().context.clone()
    }

    pub fn query_param(&self) -> &str {
        &self.query_param
    }

    /// Back to `Unset` with a fresh sync attempt (login, logout).
    pub fn reset(&self) {
        let mut state = self.lock();
        state.context = AdminContext::Unset;
        state.generation += 1;
        state.url_synced = false;
    }

    /// Explicit selection by id. Platform admins only.
    ///
    /// Returns whether the context changed. A failed or empty lookup keeps the
    /// current state and logs a warning.
    pub async fn select<S>(
        &self,
        store: &S,
        session: Option<&Session>,
        organization_id: OrganizationId,
    ) -> bool
    where
        S: RecordStore + ?Sized,
    {
        if !session.is_some_and(Session::is_platform_admin) {
            tracing::warn!(organization_id = %organization_id, "organization select ignored: not a platform admin");
            return false;
        }

        let ticket = {
            let mut state = self.lock();
            state.generation += 1;
            state.generation
        };

        let organization = match store.organization_by_id(organization_id).await {
            Ok(Some(org)) => org,
            Ok(None) => {
                tracing::warn!(organization_id = %organization_id, "organization select failed: not found");
                return false;
            }
            Err(e) => {
                tracing::warn!(organization_id = %organization_id, error = %e, "organization select failed");
                return false;
            }
        };

        let mut state = self.lock();
        if state.generation != ticket {
            tracing::debug!(organization_id = %organization_id, "organization select superseded by a later action");
            return false;
        }
        tracing::info!(organization_id = %organization.id, slug = %organization.slug, "admin organization selected");
        state.context = AdminContext::Selected(organization);
        true
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.generation += 1;
        if state.context.is_selected() {
            tracing::info!("admin organization cleared");
        }
        state.context = AdminContext::Unset;
    }

    /// Adopt the organization named in the URL query, once per mount.
    pub async fn sync_from_url<S>(&self, store: &S, session: Option<&Session>, query: &str) -> SyncOutcome
    where
        S: RecordStore + ?Sized,
    {
        let (ticket, slug) = {
            let mut state = self.lock();
            if state.url_synced {
                return SyncOutcome::AlreadySynced;
            }
            if !session.is_some_and(Session::is_platform_admin) {
                return SyncOutcome::NotAdmin;
            }
            state.url_synced = true;

            let Some(slug) = org_slug_from_query(query, &self.query_param) else {
                return SyncOutcome::NoSlug;
            };
            if state.context.is_selected() {
                return SyncOutcome::AlreadySelected;
            }
            (state.generation, slug)
        };

        let organization = match store.organization_by_slug(&slug).await {
            Ok(Some(org)) => org,
            Ok(None) => {
                tracing::warn!(slug = %slug, "url organization not found");
                return SyncOutcome::NotFound;
            }
            Err(e) => {
                tracing::warn!(slug = %slug, error = %e, "url organization lookup failed");
                return SyncOutcome::Failed;
            }
        };

        let mut state = self.lock();
        if state.generation != ticket || state.context.is_selected() {
            tracing::debug!(slug = %slug, "url organization sync superseded by a user action");
            return SyncOutcome::Superseded;
        }
        tracing::info!(organization_id = %organization.id, slug = %slug, "admin organization restored from url");
        state.context = AdminContext::Selected(organization.clone());
        SyncOutcome::Selected(organization)
    }

    /// `<param>=<slug>` for the current selection, if any.
    pub fn deep_link_query(&self) -> Option<String> {
        let state = self.lock();
        state
            .context
            .selected_organization()
            .map(|org| deep_link_query(&self.query_param, &org.slug))
    }
}

/// `<param>=<slug>`.
pub fn deep_link_query(param: &str, slug: &str) -> String {
    format!("{param}={slug}")
}

/// Extract a non-empty `param` value from a URL query string.
///
/// Accepts a leading `?`; the first occurrence wins.
pub fn org_slug_from_query(query: &str, param: &str) -> Option<String> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == param)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
