use keystone_auth::{OverrideStrategy, PermissionTable, Position, aggregate_permissions};

use crate::store::RecordStore;

/// Permission Aggregator (fetch side).
///
/// No position means an empty table. A position without a default role still
/// consults its overrides. If either grant source fails to load the whole
/// table is empty: a partial fetch must never widen access, and overrides
/// often narrow the role.
pub async fn resolve_permissions<S>(
    store: &S,
    position: Option<&Position>,
    strategy: OverrideStrategy,
) -> PermissionTable
where
    S: RecordStore + ?Sized,
{
    let Some(position) = position else {
        return PermissionTable::new();
    };

    let role_grants = match position.default_role_id {
        Some(role_id) => match store.role_grants(role_id).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(
                    step = "role_grants",
                    role_id = %role_id,
                    error = %e,
                    "role grant lookup failed; position gets no permissions"
                );
                return PermissionTable::new();
            }
        },
        None => Vec::new(),
    };

    let overrides = if strategy == OverrideStrategy::Ignore {
        Vec::new()
    } else {
        match store.position_overrides(position.id).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(
                    step = "position_overrides",
                    position_id = %position.id,
                    error = %e,
                    "override lookup failed; position gets no permissions"
                );
                return PermissionTable::new();
            }
        }
    };

    aggregate_permissions(&role_grants, &overrides, strategy)
}
