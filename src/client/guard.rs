//! Route gating from the client auth state.

use super::machine::{ClientAuthState, Phase};

pub const LOGIN_PATH: &str = "/login";
pub const DASHBOARD_PATH: &str = "/dashboard";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Verification is still running; show a spinner, decide nothing yet.
    Loading,
    /// Send the user to the login page, remembering where they were going.
    RedirectToLogin { from: String },
    /// Replace-navigate to this path.
    Redirect(String),
    Render,
}

/// Views that need a signed-in user. `location` is the path (and query)
/// being visited.
pub fn guard_protected(state: &ClientAuthState, location: &str) -> GuardDecision {
    match state.phase {
        Phase::Idle | Phase::Checking => GuardDecision::Loading,
        Phase::Authenticated if state.is_authenticated() => GuardDecision::Render,
        _ => GuardDecision::RedirectToLogin {
            from: location.to_string(),
        },
    }
}

/// Login and register pages: pointless once signed in.
pub fn guard_public(state: &ClientAuthState) -> GuardDecision {
    if state.is_authenticated() {
        GuardDecision::Redirect(DASHBOARD_PATH.to_string())
    } else {
        GuardDecision::Render
    }
}

/// `/` goes to the dashboard or the login page once the state is known.
pub fn guard_root(state: &ClientAuthState) -> GuardDecision {
    match state.phase {
        Phase::Idle | Phase::Checking => GuardDecision::Loading,
        _ if state.is_authenticated() => GuardDecision::Redirect(DASHBOARD_PATH.to_string()),
        _ => GuardDecision::Redirect(LOGIN_PATH.to_string()),
    }
}

fn is_login_path(path: &str) -> bool {
    path.strip_prefix(LOGIN_PATH)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?', '#']))
}

/// Where to go after signing in. Only same-site paths are honoured; a
/// missing, absolute or protocol-relative location falls back to the
/// dashboard.
pub fn post_login_destination(from: Option<&str>) -> String {
    match from {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.starts_with("/\\")
                && !is_login_path(path) =>
        {
            path.to_string()
        }
        _ => DASHBOARD_PATH.to_string(),
    }
}
