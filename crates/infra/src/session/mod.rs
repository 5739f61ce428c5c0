//! Session assembly and lifecycle.

pub mod admin_switch;
pub mod builder;
pub mod manager;

pub use admin_switch::{AdminContextSwitch, SyncOutcome, deep_link_query, org_slug_from_query};
pub use builder::SessionBuilder;
pub use manager::{BOOTSTRAP_PRINCIPAL_ID, SessionManager};
