use serde::{Deserialize, Serialize};

use keystone_core::{Entity, PrincipalId};

use crate::credentials::Credential;

/// A principal record as held by the record store.
///
/// Admin flags are store-controlled; the session layer only reads them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: PrincipalId,
    pub email: String,
    pub nickname: Option<String>,
    pub is_active: bool,
    pub is_platform_super_admin: bool,
    pub is_platform_system_admin: bool,
    pub must_change_credential: bool,
    pub credential: Credential,
}

impl Principal {
    pub fn is_platform_admin(&self) -> bool {
        self.is_platform_super_admin || self.is_platform_system_admin
    }

    /// Whether `identifier` names this principal by email or nickname.
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        let wanted = normalize_identifier(identifier);
        if wanted.is_empty() {
            return false;
        }
        normalize_identifier(&self.email) == wanted
            || self
                .nickname
                .as_deref()
                .is_some_and(|nick| normalize_identifier(nick) == wanted)
    }

    /// The credential-free view carried by a session.
    pub fn identity(&self) -> PrincipalIdentity {
        PrincipalIdentity {
            id: self.id,
            email: self.email.clone(),
            nickname: self.nickname.clone(),
            is_platform_super_admin: self.is_platform_super_admin,
            is_platform_system_admin: self.is_platform_system_admin,
        }
    }
}

impl Entity for Principal {
    type Id = PrincipalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Principal identity as exposed to the rest of the system.
///
/// Never carries a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalIdentity {
    pub id: PrincipalId,
    pub email: String,
    pub nickname: Option<String>,
    pub is_platform_super_admin: bool,
    pub is_platform_system_admin: bool,
}

impl PrincipalIdentity {
    pub fn is_platform_admin(&self) -> bool {
        self.is_platform_super_admin || self.is_platform_system_admin
    }
}

/// Canonical form of a login identifier: trimmed, lowercase.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}
