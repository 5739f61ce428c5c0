//! Environment-driven configuration.
//!
//! | variable | default |
//! |----------|---------|
//! | `KEYSTONE_ENV` | `production` |
//! | `DATABASE_URL` | unset |
//! | `KEYSTONE_IDENTIFIER_FILE` | `.keystone/session.json` |
//! | `KEYSTONE_BOOTSTRAP_LOGIN` | `true` |
//! | `KEYSTONE_POSITION_OVERRIDES` | `replace-covered` |
//! | `KEYSTONE_ORG_QUERY_PARAM` | `org` |
//! | `KEYSTONE_LOG_FORMAT` | `json` |
//! | `KEYSTONE_LOG_LEVEL` | `info` |

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use keystone_auth::OverrideStrategy;
use keystone_observability::{LogConfig, LogFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {variable}: {message}")]
    Invalid {
        variable: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub environment: Environment,
    pub database_url: Option<String>,
    pub identifier_path: PathBuf,
    /// Accept the bootstrap allow-list when the store has no matching principal.
    pub bootstrap_login: bool,
    pub position_overrides: OverrideStrategy,
    pub org_query_param: String,
    pub log: LogConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            database_url: None,
            identifier_path: PathBuf::from(".keystone/session.json"),
            bootstrap_login: true,
            position_overrides: OverrideStrategy::default(),
            org_query_param: "org".to_string(),
            log: LogConfig::default(),
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = AuthConfig::default();

        if let Some(raw) = get("KEYSTONE_ENV") {
            config.environment = parse("KEYSTONE_ENV", &raw)?;
        }
        config.database_url = get("DATABASE_URL");
        if let Some(raw) = get("KEYSTONE_IDENTIFIER_FILE") {
            config.identifier_path = PathBuf::from(raw);
        }
        if let Some(raw) = get("KEYSTONE_BOOTSTRAP_LOGIN") {
            config.bootstrap_login = parse_bool("KEYSTONE_BOOTSTRAP_LOGIN", &raw)?;
        }
        if let Some(raw) = get("KEYSTONE_POSITION_OVERRIDES") {
            config.position_overrides = parse("KEYSTONE_POSITION_OVERRIDES", &raw)?;
        }
        if let Some(raw) = get("KEYSTONE_ORG_QUERY_PARAM") {
            config.org_query_param = raw.trim().to_string();
        }
        if let Some(raw) = get("KEYSTONE_LOG_FORMAT") {
            config.log.format = parse::<LogFormat>("KEYSTONE_LOG_FORMAT", &raw)?;
        }
        if let Some(raw) = get("KEYSTONE_LOG_LEVEL") {
            config.log.level = raw.trim().to_string();
        }

        Ok(config)
    }
}

fn parse<T>(variable: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::Invalid {
        variable,
        message: e.to_string(),
    })
}

fn parse_bool(variable: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            variable,
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}
