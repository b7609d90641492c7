//! Decision engine — one verdict per request.
//!
//! DESIGN
//! ======
//! `decide` is a pure function of the request view, its classification, the
//! session snapshot, and the resolved login outcome. It never touches the
//! store or the response: session mutations come back as explicit
//! [`SessionEffect`]s and the response shape as an [`Action`], both applied
//! by the middleware. Every branch is table-testable, and no resolution
//! state survives the request.
//!
//! TRADE-OFFS
//! ==========
//! The engine reads the snapshot taken at the start of the request, so a
//! concurrent login on the same session is not observed mid-decision. That
//! window is inherent to cookie sessions and harmless here: the worst case
//! is one extra trip through the login view.

use axum::http::{Method, StatusCode};

use crate::gate::classify::RequestClass;
use crate::gate::config::GateConfig;
use crate::gate::session::{Identity, SessionData};
use crate::services::login::{Credentials, LoginError, LoginService};

/// Body sent with the programmatic 401.
pub const AUTH_REQUIRED_MESSAGE: &str = "Authorization required";

// =============================================================================
// REQUEST VIEW + LOGIN OUTCOME
// =============================================================================

/// Owned per-request view of everything the engine may consult.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    /// Request path, query string excluded.
    pub path: String,
    /// `X-Requested-With: XMLHttpRequest` was present.
    pub is_ajax: bool,
}

/// Result of credential verification for a login submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(Identity),
    Rejected,
}

// =============================================================================
// ACTIONS + EFFECTS
// =============================================================================

/// What happens to the request. Exactly one per request; the chain is
/// resumed only by `Allow` and `Forward`, and only `Allow` reaches the
/// originally requested handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Resume the chain toward the requested handler, attaching the identity
    /// when present.
    Allow { identity: Option<Identity> },
    /// Internal dispatch: rewrite the request path and resume the chain.
    /// No client round-trip; the browser URL stays put.
    Forward(String),
    /// Client-visible redirect (303 See Other).
    Redirect(String),
    /// Terminate with a status and a short plain-text body.
    Reject {
        status: StatusCode,
        message: &'static str,
    },
    /// Terminate leaving the response untouched.
    NoOp,
}

/// Session mutations requested by a decision. Applied in order, before the
/// action executes, so a redirect target read from the snapshot is already
/// consumed by the time the client follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    /// Remember the path to replay after a successful login.
    StorePreAuthUrl(String),
    /// Mark the session authenticated.
    StoreIdentity(Identity),
    /// Drop the replay path; it is single-use.
    ClearPreAuthUrl,
    /// Destroy the session outright.
    Invalidate,
}

/// A complete per-request verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub effects: Vec<SessionEffect>,
}

impl Decision {
    fn act(action: Action) -> Self {
        Self {
            action,
            effects: Vec::new(),
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Decide what happens to one request. Pure: no I/O, no clock.
///
/// `session` is the snapshot loaded at the start of the request (`None`
/// when no live session exists). `login` carries the verification result
/// and is only consulted for [`RequestClass::LoginSubmission`].
#[must_use]
pub fn decide(
    ctx: &RequestContext,
    class: RequestClass,
    session: Option<&SessionData>,
    login: Option<&LoginOutcome>,
    config: &GateConfig,
) -> Decision {
    // Authenticated callers pass through everywhere. The login and logout
    // endpoints deliberately fall to downstream handlers in this state.
    if let Some(identity) = session.and_then(|s| s.identity.as_ref()) {
        return Decision::act(Action::Allow {
            identity: Some(identity.clone()),
        });
    }

    match class {
        RequestClass::Protected => {
            if ctx.is_ajax {
                return Decision::act(Action::Reject {
                    status: StatusCode::UNAUTHORIZED,
                    message: AUTH_REQUIRED_MESSAGE,
                });
            }
            let mut effects = Vec::new();
            // Only GETs are worth replaying after login; the forward itself
            // is not method-gated.
            if ctx.method == Method::GET {
                effects.push(SessionEffect::StorePreAuthUrl(ctx.path.clone()));
            }
            Decision {
                action: Action::Forward(config.login_view.clone()),
                effects,
            }
        }
        RequestClass::LoginSubmission => match login {
            Some(LoginOutcome::Authenticated(identity)) => {
                let target = session
                    .and_then(|s| s.pre_auth_url.clone())
                    .unwrap_or_else(|| config.post_login_target.clone());
                Decision {
                    action: Action::Redirect(target),
                    effects: vec![
                        SessionEffect::StoreIdentity(identity.clone()),
                        SessionEffect::ClearPreAuthUrl,
                    ],
                }
            }
            // No outcome means the submission never reached verification;
            // treat it like a rejection.
            Some(LoginOutcome::Rejected) | None => {
                Decision::act(Action::Redirect(config.login_error_target.clone()))
            }
        },
        RequestClass::Logout => Decision {
            action: Action::Redirect(config.logged_out_target.clone()),
            effects: vec![SessionEffect::Invalidate],
        },
        RequestClass::Other => Decision::act(Action::Allow { identity: None }),
    }
}

// =============================================================================
// LOGIN SUB-FLOW
// =============================================================================

/// Resolve a login submission against the credential service.
///
/// Missing or unparseable credentials short-circuit to `Rejected` without a
/// service call.
///
/// # Errors
///
/// Propagates [`LoginError::Backend`] untouched; the caller surfaces it as a
/// server fault, never as a failed login.
pub async fn login_outcome(
    credentials: Option<Credentials>,
    service: &dyn LoginService,
) -> Result<LoginOutcome, LoginError> {
    let Some(creds) = credentials else {
        return Ok(LoginOutcome::Rejected);
    };
    match service.login(&creds.username, &creds.password).await? {
        Some(identity) => Ok(LoginOutcome::Authenticated(identity)),
        None => Ok(LoginOutcome::Rejected),
    }
}

#[cfg(test)]
#[path = "decision_test.rs"]
mod tests;
