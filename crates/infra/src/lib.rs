//! Infrastructure layer: record store adapters, identifier persistence,
//! session resolution and lifecycle, config.

pub mod config;
pub mod identifier_store;
pub mod resolve;
pub mod session;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::{AuthConfig, ConfigError, Environment};
pub use identifier_store::{
    FileIdentifierStore, IdentifierStore, IdentifierStoreError, InMemoryIdentifierStore,
    PersistedIdentifier,
};
pub use session::{
    AdminContextSwitch, BOOTSTRAP_PRINCIPAL_ID, SessionBuilder, SessionManager, SyncOutcome,
    deep_link_query, org_slug_from_query,
};
pub use store::{InMemoryRecordStore, NewPrincipal, PostgresRecordStore, RecordStore, StoreError};
