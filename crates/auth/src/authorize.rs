//! Authorization decisions over an assembled [`Session`].
//!
//! - No IO
//! - No panics
//! - Never an error: a failed check is a plain `false`

use serde::Serialize;

use crate::permissions::Action;
use crate::session::Session;

/// Whether the session may use `module` at all.
pub fn has_module(session: Option<&Session>, module: &str) -> bool {
    match session {
        None => false,
        Some(s) if s.is_platform_admin() => true,
        Some(s) => s.is_subscribed(module),
    }
}

/// Whether the session may perform `action` on `resource` inside `module`.
///
/// Precedence: platform admin, then the module gate, then organization
/// ownership, then the resource grant row.
pub fn can(session: Option<&Session>, action: Action, module: &str, resource: &str) -> bool {
    decide(session, action, module, resource).0
}

fn decide(
    session: Option<&Session>,
    action: Action,
    module: &str,
    resource: &str,
) -> (bool, DecidedBy) {
    let Some(session) = session else {
        return (false, DecidedBy::NoSession);
    };
    if session.is_platform_admin() {
        return (true, DecidedBy::PlatformAdmin);
    }
    if !has_module(Some(session), module) {
        return (false, DecidedBy::ModuleGate);
    }
    if session.is_organization_owner() {
        return (true, DecidedBy::OrganizationOwner);
    }
    let granted = session
        .permission(module, resource)
        .is_some_and(|row| row.allows(action));
    (granted, DecidedBy::ResourceGrant)
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Which rule settled a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecidedBy {
    NoSession,
    UnknownAction,
    PlatformAdmin,
    ModuleGate,
    OrganizationOwner,
    ResourceGrant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    NoSession,
    UnknownAction,
    ModuleNotSubscribed,
    MissingGrant,
    ActionNotGranted,
}

/// Detailed reason why authorization was denied.
#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

/// Detailed explanation of an authorization decision.
///
/// Answers "why was this allowed/denied?" without changing the outcome:
/// `granted` always equals what [`can`] returns for the same inputs.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub action: String,
    pub module: String,
    pub resource: String,
    pub granted: bool,
    pub decided_by: DecidedBy,
    pub reason: String,
    pub denial: Option<DenialReason>,
}

/// Explain a `can` decision. Takes the action as a string so unknown actions
/// can be explained too.
pub fn explain(
    session: Option<&Session>,
    action: &str,
    module: &str,
    resource: &str,
) -> AuthorizationExplanation {
    let parsed = action.parse::<Action>();

    let (granted, decided_by) = match (&parsed, session) {
        (_, None) => (false, DecidedBy::NoSession),
        (Err(_), Some(_)) => (false, DecidedBy::UnknownAction),
        (Ok(a), Some(_)) => decide(session, *a, module, resource),
    };

    let key = format!("{module}:{resource}");
    let (reason, denial) = match decided_by {
        DecidedBy::NoSession => (
            "No active session".to_string(),
            Some(DenialReason {
                kind: DenialKind::NoSession,
                message: "Authorization requires a logged-in principal".to_string(),
                suggestions: vec!["Log in, or restore the persisted session".to_string()],
            }),
        ),
        DecidedBy::UnknownAction => (
            format!("Action '{action}' is not one of create/read/update/delete"),
            Some(DenialReason {
                kind: DenialKind::UnknownAction,
                message: format!("Unrecognized action '{action}'"),
                suggestions: vec!["Use one of: create, read, update, delete".to_string()],
            }),
        ),
        DecidedBy::PlatformAdmin => (
            "Principal is a platform admin (all modules, all actions)".to_string(),
            None,
        ),
        DecidedBy::ModuleGate => (
            format!("Organization has no active subscription for module '{module}'"),
            Some(DenialReason {
                kind: DenialKind::ModuleNotSubscribed,
                message: format!("Module '{module}' is not subscribed"),
                suggestions: vec![format!(
                    "Activate a subscription for '{module}' on the organization"
                )],
            }),
        ),
        DecidedBy::OrganizationOwner => (
            format!("Principal owns the organization and module '{module}' is subscribed"),
            None,
        ),
        DecidedBy::ResourceGrant => {
            let row = session.and_then(|s| s.permission(module, resource));
            match row {
                Some(_) if granted => (format!("Grant on '{key}' allows '{action}'"), None),
                Some(row) => {
                    let held: Vec<&str> = row.granted_actions().iter().map(|a| a.as_str()).collect();
                    (
                        format!("Grant on '{key}' does not allow '{action}' (allows: {held:?})"),
                        Some(DenialReason {
                            kind: DenialKind::ActionNotGranted,
                            message: format!("Missing '{action}' on '{key}'"),
                            suggestions: vec![
                                format!("Add '{action}' to the role grant for '{key}'"),
                                format!("Add a position override for '{key}'"),
                            ],
                        }),
                    )
                }
                None => (
                    format!("No grant row for '{key}'"),
                    Some(DenialReason {
                        kind: DenialKind::MissingGrant,
                        message: format!("No permission row for '{key}'"),
                        suggestions: vec![
                            format!("Grant '{key}' on the position's default role"),
                            format!("Add a position override for '{key}'"),
                        ],
                    }),
                ),
            }
        }
    };

    AuthorizationExplanation {
        action: action.to_string(),
        module: module.to_string(),
        resource: resource.to_string(),
        granted,
        decided_by,
        reason,
        denial,
    }
}
