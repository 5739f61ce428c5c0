//! `keystone-auth`: pure authorization model for the multi-tenant platform.
//!
//! No IO: records come in already fetched, decisions come out as plain
//! booleans.

pub mod access;
pub mod admin_context;
pub mod authorize;
pub mod credentials;
pub mod modules;
pub mod organization;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod session;

pub use access::AccessContext;
pub use admin_context::{AdminContext, effective_organization_id};
pub use authorize::{
    AuthorizationExplanation, DecidedBy, DenialKind, DenialReason, can, explain, has_module,
};
pub use credentials::{
    BOOTSTRAP_ACCOUNTS, BootstrapAccount, Credential, LoginError, LoginOutcome, match_bootstrap,
};
pub use modules::{ModuleSubscription, SubscriptionStatus, active_modules};
pub use organization::{
    Membership, MembershipStatus, Organization, OrganizationStatus, Position, ResolvedMembership,
};
pub use permissions::{Action, ModuleCode, ResolvedPermission, ResourceType};
pub use principal::{Principal, PrincipalIdentity, normalize_identifier};
pub use roles::{
    OverrideStrategy, PermissionTable, PositionOverrideGrant, RoleGrant, aggregate_permissions,
};
pub use session::Session;
