//! Role and position grants, and their aggregation into a permission table.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use keystone_core::{DomainError, PositionId, RoleId};

use crate::permissions::{Action, ModuleCode, ResolvedPermission, ResourceType};

/// One CRUD grant row of a role.
///
/// Flags are nullable in the record store; a missing flag means "not granted".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role_id: RoleId,
    pub module_code: ModuleCode,
    pub resource_type: ResourceType,
    pub can_create: Option<bool>,
    pub can_read: Option<bool>,
    pub can_update: Option<bool>,
    pub can_delete: Option<bool>,
}

/// Same shape as [`RoleGrant`], keyed by position instead of role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionOverrideGrant {
    pub position_id: PositionId,
    pub module_code: ModuleCode,
    pub resource_type: ResourceType,
    pub can_create: Option<bool>,
    pub can_read: Option<bool>,
    pub can_update: Option<bool>,
    pub can_delete: Option<bool>,
}

impl RoleGrant {
    /// Convenience constructor granting exactly `actions`.
    pub fn new(
        role_id: RoleId,
        module_code: impl Into<ModuleCode>,
        resource_type: impl Into<ResourceType>,
        actions: &[Action],
    ) -> Self {
        Self {
            role_id,
            module_code: module_code.into(),
            resource_type: resource_type.into(),
            can_create: Some(actions.contains(&Action::Create)),
            can_read: Some(actions.contains(&Action::Read)),
            can_update: Some(actions.contains(&Action::Update)),
            can_delete: Some(actions.contains(&Action::Delete)),
        }
    }

    pub fn resolve(&self) -> ResolvedPermission {
        ResolvedPermission {
            module_code: self.module_code.clone(),
            resource_type: self.resource_type.clone(),
            can_create: self.can_create.unwrap_or(false),
            can_read: self.can_read.unwrap_or(false),
            can_update: self.can_update.unwrap_or(false),
            can_delete: self.can_delete.unwrap_or(false),
        }
    }
}

impl PositionOverrideGrant {
    pub fn new(
        position_id: PositionId,
        module_code: impl Into<ModuleCode>,
        resource_type: impl Into<ResourceType>,
        actions: &[Action],
    ) -> Self {
        Self {
            position_id,
            module_code: module_code.into(),
            resource_type: resource_type.into(),
            can_create: Some(actions.contains(&Action::Create)),
            can_read: Some(actions.contains(&Action::Read)),
            can_update: Some(actions.contains(&Action::Update)),
            can_delete: Some(actions.contains(&Action::Delete)),
        }
    }

    pub fn resolve(&self) -> ResolvedPermission {
        ResolvedPermission {
            module_code: self.module_code.clone(),
            resource_type: self.resource_type.clone(),
            can_create: self.can_create.unwrap_or(false),
            can_read: self.can_read.unwrap_or(false),
            can_update: self.can_update.unwrap_or(false),
            can_delete: self.can_delete.unwrap_or(false),
        }
    }
}

/// How position override grants combine with the position's role grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverrideStrategy {
    /// Overrides are never consulted; only role grants count.
    Ignore,
    /// Override rows replace the role-derived row for the keys they cover.
    /// Keys without an override keep the role-derived value.
    #[default]
    ReplaceCovered,
    /// Any override row makes the override set the sole source of truth.
    ReplaceAll,
}

impl OverrideStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideStrategy::Ignore => "ignore",
            OverrideStrategy::ReplaceCovered => "replace-covered",
            OverrideStrategy::ReplaceAll => "replace-all",
        }
    }
}

impl core::fmt::Display for OverrideStrategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverrideStrategy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(OverrideStrategy::Ignore),
            "replace-covered" | "replace_covered" => Ok(OverrideStrategy::ReplaceCovered),
            "replace-all" | "replace_all" => Ok(OverrideStrategy::ReplaceAll),
            other => Err(DomainError::validation(format!(
                "unknown override strategy '{other}'"
            ))),
        }
    }
}

/// Flat permission table keyed by (module, resource).
///
/// Ordered maps keep iteration (and therefore serialization) deterministic, so
/// rebuilding from identical grants always yields an identical table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionTable {
    rows: BTreeMap<ModuleCode, BTreeMap<ResourceType, ResolvedPermission>>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row, OR-ing flags into an existing row for the same key.
    pub fn merge(&mut self, row: ResolvedPermission) {
        let resources = self.rows.entry(row.module_code.clone()).or_default();
        match resources.get_mut(row.resource_type.as_str()) {
            Some(existing) => existing.absorb(&row),
            None => {
                resources.insert(row.resource_type.clone(), row);
            }
        }
    }

    /// Insert a row, discarding whatever was stored for the same key.
    pub fn replace(&mut self, row: ResolvedPermission) {
        self.rows
            .entry(row.module_code.clone())
            .or_default()
            .insert(row.resource_type.clone(), row);
    }

    pub fn get(&self, module: &str, resource: &str) -> Option<&ResolvedPermission> {
        self.rows.get(module)?.get(resource)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedPermission> {
        self.rows.values().flat_map(|resources| resources.values())
    }

    pub fn len(&self) -> usize {
        self.rows.values().map(|resources| resources.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows in (module, resource) order.
    pub fn to_vec(&self) -> Vec<ResolvedPermission> {
        self.iter().cloned().collect()
    }
}

impl FromIterator<ResolvedPermission> for PermissionTable {
    fn from_iter<I: IntoIterator<Item = ResolvedPermission>>(iter: I) -> Self {
        let mut table = PermissionTable::new();
        for row in iter {
            table.merge(row);
        }
        table
    }
}

/// Merge role grants and position overrides into a flat permission table.
///
/// Pure function of its inputs. Duplicate rows for one key within the same
/// source are OR-ed together, so the store's row order never matters.
pub fn aggregate_permissions(
    role_grants: &[RoleGrant],
    overrides: &[PositionOverrideGrant],
    strategy: OverrideStrategy,
) -> PermissionTable {
    let from_role: PermissionTable = role_grants.iter().map(RoleGrant::resolve).collect();

    if overrides.is_empty() {
        return from_role;
    }

    let from_position: PermissionTable =
        overrides.iter().map(PositionOverrideGrant::resolve).collect();

    match strategy {
        OverrideStrategy::Ignore => from_role,
        OverrideStrategy::ReplaceAll => from_position,
        OverrideStrategy::ReplaceCovered => {
            let mut table = from_role;
            for row in from_position.iter() {
                table.replace(row.clone());
            }
            table
        }
    }
}
