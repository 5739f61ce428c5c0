use keystone_auth::Principal;

use crate::store::{RecordStore, StoreError};

/// Identity Resolver.
///
/// Inactive and unknown principals are both `Ok(None)`. A store failure is
/// logged and returned, so callers can tell "nobody matches" apart from "the
/// store could not say"; login treats only the former as an empty store.
pub async fn resolve_identity<S>(store: &S, identifier: &str) -> Result<Option<Principal>, StoreError>
where
    S: RecordStore + ?Sized,
{
    match store.find_active_principal(identifier).await {
        // The store filters on `is_active`; re-check so a lax store cannot leak one.
        Ok(found) => Ok(found.filter(|p| p.is_active)),
        Err(e) => {
            tracing::warn!(step = "resolve_identity", error = %e, "identity lookup failed");
            Err(e)
        }
    }
}
