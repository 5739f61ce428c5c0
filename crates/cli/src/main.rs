//! `keystone-authctl`: log in against the record store and probe permissions.
//!
//! Only the login identifier is kept between invocations (in
//! `KEYSTONE_IDENTIFIER_FILE`); every other command restores the session from
//! the store first, so grant changes show up immediately.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use keystone_auth::{AccessContext, Action, LoginOutcome};
use keystone_infra::{
    AuthConfig, FileIdentifierStore, PostgresRecordStore, SessionManager, SyncOutcome,
    deep_link_query,
};

#[derive(Debug, Parser)]
#[command(name = "keystone-authctl", version, about = "Inspect keystone sessions and permissions")]
struct Cli {
    /// Act inside this organization (platform admins only)
    #[arg(long, global = true, value_name = "SLUG")]
    org: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Verify a credential and remember the identifier
    Login {
        /// Email or nickname
        identifier: String,

        #[arg(long, env = "KEYSTONE_CREDENTIAL", hide_env_values = true)]
        credential: String,
    },

    /// Forget the remembered identifier
    Logout,

    /// Log in as a development admin (non-production builds only)
    #[cfg(feature = "dev-login")]
    DevLogin,

    #[command(flatten)]
    Query(Query),
}

/// Commands answered from a restored session.
#[derive(Debug, Subcommand)]
enum Query {
    /// Show the current principal and organization
    Whoami,

    /// Check whether an action is allowed
    Can {
        action: Action,
        module: String,
        resource: String,
    },

    /// Check whether a module is available
    HasModule { module: String },

    /// Explain an authorization decision
    Explain {
        action: String,
        module: String,
        resource: String,
    },
}

type Manager = SessionManager<PostgresRecordStore, FileIdentifierStore>;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = AuthConfig::from_env().context("invalid configuration")?;
    keystone_observability::init(&config.log);

    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set")?;
    let store = PostgresRecordStore::connect(database_url)
        .await
        .context("failed to connect to the record store")?;
    let manager = SessionManager::new(
        Arc::new(store),
        FileIdentifierStore::new(&config.identifier_path),
        &config,
    );

    run(cli, &config, &manager).await
}

async fn run(cli: Cli, config: &AuthConfig, manager: &Manager) -> Result<ExitCode> {
    let query = match cli.command {
        Command::Login {
            identifier,
            credential,
        } => {
            match manager.login(&identifier, &credential).await? {
                LoginOutcome::Success => println!("logged in"),
                LoginOutcome::MustChangeCredential => {
                    println!("logged in; the credential must be changed before continuing")
                }
            }
            if manager.session().is_some_and(|s| s.ephemeral) {
                println!("note: bootstrap sessions are not remembered between invocations");
            }
            return Ok(ExitCode::SUCCESS);
        }
        Command::Logout => {
            manager.logout();
            println!("logged out");
            return Ok(ExitCode::SUCCESS);
        }
        #[cfg(feature = "dev-login")]
        Command::DevLogin => {
            manager.dev_login().await?;
            println!("logged in (dev)");
            return Ok(ExitCode::SUCCESS);
        }
        Command::Query(query) => query,
    };

    if !manager.restore_session().await {
        bail!("not logged in; run `keystone-authctl login <identifier>` first");
    }
    if let Some(slug) = cli.org.as_deref() {
        let url_query = deep_link_query(&config.org_query_param, slug);
        match manager.sync_admin_context_from_url(&url_query).await {
            SyncOutcome::Selected(_) | SyncOutcome::AlreadySelected => {}
            SyncOutcome::NotAdmin => bail!("--org is only available to platform admins"),
            SyncOutcome::NotFound => bail!("no organization with slug '{slug}'"),
            other => bail!("could not select organization '{slug}': {other:?}"),
        }
    }

    let access = manager.access();
    let allowed = match query {
        Query::Whoami => {
            print_whoami(&access, cli.json)?;
            return Ok(ExitCode::SUCCESS);
        }
        Query::Can {
            action,
            module,
            resource,
        } => print_verdict(access.can(action, &module, &resource)),
        Query::HasModule { module } => print_verdict(access.has_module(&module)),
        Query::Explain {
            action,
            module,
            resource,
        } => {
            let explanation = access.explain(&action, &module, &resource);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&explanation)?);
            } else {
                println!("{}", explanation.reason);
            }
            explanation.granted
        }
    };

    Ok(if allowed { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn print_verdict(allowed: bool) -> bool {
    println!("{}", if allowed { "allowed" } else { "denied" });
    allowed
}

fn print_whoami(access: &AccessContext, json: bool) -> Result<()> {
    let Some(session) = access.session() else {
        bail!("not logged in");
    };

    if json {
        let view = serde_json::json!({
            "principal": session.principal,
            "organization": session.organization,
            "position": session.position,
            "modules": session.modules,
            "permissions": session.permissions.to_vec(),
            "admin_context": access.admin_context(),
            "effective_organization_id": access.effective_organization_id(),
        });
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("principal:    {} ({})", session.principal.email, session.principal.id);
    if session.is_platform_admin() {
        println!("role:         platform admin");
    } else if session.is_organization_owner() {
        println!("role:         organization owner");
    }
    match &session.organization {
        Some(org) => println!("organization: {} ({})", org.name, org.slug),
        None => println!("organization: -"),
    }
    if let Some(selected) = access.admin_context().selected_organization() {
        println!("acting in:    {} ({})", selected.name, selected.slug);
    }
    if let Some(position) = &session.position {
        println!("position:     {}", position.name);
    }
    let modules: Vec<&str> = session.modules.iter().map(|m| m.as_str()).collect();
    println!("modules:      {}", modules.join(", "));
    for row in session.permissions.iter() {
        let actions: Vec<&str> = row.granted_actions().iter().map(|a| a.as_str()).collect();
        println!(
            "  {}:{} [{}]",
            row.module_code,
            row.resource_type,
            actions.join(",")
        );
    }
    Ok(())
}
