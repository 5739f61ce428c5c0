//! Module subscriptions (the module gate's pure half).

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use keystone_core::{DomainError, OrganizationId};

use crate::permissions::ModuleCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trial,
    Cancelled,
    Expired,
}

impl FromStr for SubscriptionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "trial" => Ok(SubscriptionStatus::Trial),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            "expired" => Ok(SubscriptionStatus::Expired),
            other => Err(DomainError::validation(format!(
                "unknown subscription status '{other}'"
            ))),
        }
    }
}

impl core::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSubscription {
    pub organization_id: OrganizationId,
    pub module_code: ModuleCode,
    pub status: SubscriptionStatus,
}

/// Module codes of `organization_id`'s subscriptions with status `active`.
///
/// Only `active` counts; trials and lapsed subscriptions do not open a module.
pub fn active_modules<'a>(
    organization_id: OrganizationId,
    subscriptions: impl IntoIterator<Item = &'a ModuleSubscription>,
) -> BTreeSet<ModuleCode> {
    subscriptions
        .into_iter()
        .filter(|s| s.organization_id == organization_id && s.status == SubscriptionStatus::Active)
        .map(|s| s.module_code.clone())
        .collect()
}
