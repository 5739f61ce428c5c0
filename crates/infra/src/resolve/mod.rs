//! Resolution pipeline: identity, membership, module gate, permissions.
//!
//! Every step logs a `StoreError` at `warn` with the failing step. Membership,
//! modules and permissions then yield their empty value; identity hands the
//! error back so login can refuse instead of falling back to bootstrap.

pub mod identity;
pub mod membership;
pub mod modules;
pub mod permissions;

pub use identity::resolve_identity;
pub use membership::resolve_membership;
pub use modules::resolve_modules;
pub use permissions::resolve_permissions;
