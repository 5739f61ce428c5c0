use std::borrow::{Borrow, Cow};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use keystone_core::DomainError;

/// Code of a licensable feature area (e.g. "bookings", "crm").
///
/// Modules are opaque strings at this layer; the surrounding application owns
/// the catalogue of module codes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleCode(Cow<'static, str>);

/// Named entity type inside a module (e.g. "customers", "vehicles").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(Cow<'static, str>);

macro_rules! impl_code_newtype {
    ($t:ty) => {
        impl $t {
            pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
                Self(code.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        // Lets maps and sets keyed by the newtype be probed with a plain `&str`.
        impl Borrow<str> for $t {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&'static str> for $t {
            fn from(value: &'static str) -> Self {
                Self(Cow::Borrowed(value))
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                Self(Cow::Owned(value))
            }
        }
    };
}

impl_code_newtype!(ModuleCode);
impl_code_newtype!(ResourceType);

/// The closed set of actions a permission row can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Action::Create),
            "read" => Ok(Action::Read),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            other => Err(DomainError::validation(format!("unknown action '{other}'"))),
        }
    }
}

/// One flattened, session-scoped permission row keyed by (module, resource).
///
/// Derived from grants on every session build; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPermission {
    pub module_code: ModuleCode,
    pub resource_type: ResourceType,
    pub can_create: bool,
    pub can_read: bool,
    pub can_update: bool,
    pub can_delete: bool,
}

impl ResolvedPermission {
    /// A row that grants nothing.
    pub fn denied(module_code: ModuleCode, resource_type: ResourceType) -> Self {
        Self {
            module_code,
            resource_type,
            can_create: false,
            can_read: false,
            can_update: false,
            can_delete: false,
        }
    }

    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Create => self.can_create,
            Action::Read => self.can_read,
            Action::Update => self.can_update,
            Action::Delete => self.can_delete,
        }
    }

    /// OR another row's flags into this one (same key, duplicate source rows).
    pub(crate) fn absorb(&mut self, other: &ResolvedPermission) {
        self.can_create |= other.can_create;
        self.can_read |= other.can_read;
        self.can_update |= other.can_update;
        self.can_delete |= other.can_delete;
    }

    /// Granted actions, in `Action::ALL` order.
    pub fn granted_actions(&self) -> Vec<Action> {
        Action::ALL.into_iter().filter(|a| self.allows(*a)).collect()
    }
}
