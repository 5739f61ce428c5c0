//! Credential verification and the bootstrap allow-list.
//!
//! KNOWN DEFECT: credentials are stored and compared as plaintext, and a fixed
//! bootstrap allow-list is accepted when the store has no matching principal.
//! Moving to salted hashing or removing the allow-list is a product decision
//! that has not been made yet; do not change either silently.

use thiserror::Error;

/// A stored credential.
///
/// `Debug` is redacted and there is no `Serialize` impl.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Plaintext equality check (see module docs).
    pub fn matches(&self, supplied: &str) -> bool {
        !self.0.is_empty() && self.0 == supplied
    }

    /// Raw stored value, for the write path only. Never log it.
    pub fn expose_plaintext(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Fixed identifier/credential pair accepted when the store has no match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapAccount {
    pub identifier: &'static str,
    pub credential: &'static str,
}

pub const BOOTSTRAP_ACCOUNTS: &[BootstrapAccount] = &[
    BootstrapAccount {
        identifier: "admin",
        credential: "admin",
    },
    BootstrapAccount {
        identifier: "admin@localhost",
        credential: "admin",
    },
];

/// Look up a bootstrap pair. Only consulted after the store lookup found nothing.
pub fn match_bootstrap(identifier: &str, credential: &str) -> Option<&'static BootstrapAccount> {
    let wanted = crate::principal::normalize_identifier(identifier);
    BOOTSTRAP_ACCOUNTS
        .iter()
        .find(|account| account.identifier == wanted && account.credential == credential)
}

/// Successful login result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    /// Logged in, but the principal must set a new credential before continuing.
    MustChangeCredential,
}

/// Login failure reasons.
///
/// Unknown identifiers and wrong credentials share one variant so callers
/// cannot enumerate identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoginError {
    #[error("identifier and credential are required")]
    MissingCredentials,

    #[error("invalid identifier or credential")]
    InvalidCredentials,

    #[error("dev login is disabled in production")]
    DevLoginDisabled,

    /// A later login or logout started while this one awaited the store.
    #[error("login superseded by a later login or logout")]
    Superseded,
}
