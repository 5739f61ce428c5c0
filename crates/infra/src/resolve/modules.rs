use std::collections::BTreeSet;

use keystone_auth::ModuleCode;
use keystone_core::OrganizationId;

use crate::store::RecordStore;

/// Module Gate: the organization's actively subscribed module codes.
pub async fn resolve_modules<S>(store: &S, organization_id: Option<OrganizationId>) -> BTreeSet<ModuleCode>
where
    S: RecordStore + ?Sized,
{
    let Some(organization_id) = organization_id else {
        return BTreeSet::new();
    };

    match store.active_module_codes(organization_id).await {
        Ok(codes) => codes.into_iter().collect(),
        Err(e) => {
            tracing::warn!(
                step = "resolve_modules",
                organization_id = %organization_id,
                error = %e,
                "module lookup failed; treating organization as unsubscribed"
            );
            BTreeSet::new()
        }
    }
}
