//! Session gate — per-request authentication enforcement.
//!
//! SYSTEM CONTEXT
//! ==============
//! Wrapped around the whole router, so every inbound request passes through
//! before route matching and a forward's rewritten URI is matched fresh. Per
//! request: read the session cookie, load the snapshot, classify, resolve
//! the login sub-flow when one applies, ask the decision engine for a
//! verdict, apply its session effects, then execute the action.
//! Handlers downstream see the resolved identity as a request extension.
//!
//! ARCHITECTURE
//! ============
//! This module is the only place that touches the store, the cookie jar, or
//! the response. Classification and the verdict itself live in pure
//! submodules and know nothing about HTTP plumbing.

pub mod classify;
pub mod config;
pub mod decision;
pub mod policy;
#[cfg(feature = "postgres-sessions")]
pub mod postgres;
pub mod session;

use axum::extract::{FromRequest, Request, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

pub use config::GateConfig;
pub use session::Identity;

use crate::gate::classify::RequestClass;
use crate::gate::decision::{Action, LoginOutcome, RequestContext, SessionEffect};
use crate::gate::session::{SessionData, SessionError, SessionId};
use crate::services::login::{Credentials, LoginError};
use crate::state::AppState;

/// Cookie carrying the opaque session id.
pub const SESSION_COOKIE: &str = "session_id";

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

fn cookie_secure() -> bool {
    env_bool("COOKIE_SECURE").unwrap_or(false)
}

pub(crate) fn session_cookie(id: &SessionId) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.as_str().to_owned()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(cookie_secure())
        .build()
}

pub(crate) fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(cookie_secure())
        .max_age(Duration::ZERO)
        .build()
}

fn is_ajax(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "XMLHttpRequest")
}

// =============================================================================
// ERROR TYPE
// =============================================================================

/// Backend faults surfaced by the gate. Never covers auth outcomes: a
/// rejected login or a missing session is routed by the engine, not errored.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error("forward target is not a valid uri: {0:?}")]
    ForwardTarget(String),
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "gate backend failure");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    }
}

// =============================================================================
// IDENTITY EXTRACTOR
// =============================================================================

/// Identity attached by the gate for the lifetime of one request.
/// Use as a handler parameter to require an authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

/// The gate middleware. Compose it around the router, as in
/// `middleware::from_fn_with_state(state, gate).layer(router)`, and serve
/// the result through `axum::ServiceExt::into_make_service`. It must sit
/// outside the router: layers attached to the router itself run after route
/// matching, which would leave a forward stuck in the originally matched
/// handler.
///
/// # Errors
///
/// Returns [`GateError`] when the session store or the login backend fails;
/// rendered as a plain 500.
pub async fn gate(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, GateError> {
    // Session snapshot for this request. A cookie pointing at a dead
    // session reads the same as no cookie at all.
    let mut session_id = None;
    let mut snapshot = None;
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let id = SessionId::from(cookie.value());
        if let Some(data) = state.sessions.load(&id).await? {
            session_id = Some(id);
            snapshot = Some(data);
        }
    }

    let ctx = RequestContext {
        method: req.method().clone(),
        path: req.uri().path().to_owned(),
        is_ajax: is_ajax(req.headers()),
    };
    let class = classify::classify(&ctx.method, &ctx.path, &state.gate);
    let authenticated = snapshot.as_ref().is_some_and(|s| s.identity.is_some());

    // Anonymous credential POST: the only flow that consumes the body, and
    // it never resumes the chain, so the request can be taken apart here.
    if class == RequestClass::LoginSubmission && !authenticated {
        let credentials = read_credentials(req).await;
        let submitted_user = credentials.as_ref().map(|c| c.username.clone());
        let outcome = decision::login_outcome(credentials, state.login.as_ref()).await?;
        match (&outcome, submitted_user.as_deref()) {
            (LoginOutcome::Authenticated(identity), _) => {
                tracing::info!(username = %identity.username, "login accepted");
            }
            (LoginOutcome::Rejected, Some(username)) => {
                tracing::warn!(%username, "login rejected");
            }
            (LoginOutcome::Rejected, None) => {
                tracing::warn!("login submission without readable credentials");
            }
        }

        let decision = decision::decide(&ctx, class, snapshot.as_ref(), Some(&outcome), &state.gate);
        let jar = apply_effects(&state, jar, session_id, snapshot, &decision.effects).await?;
        return Ok(terminal(jar, decision.action));
    }

    let decision = decision::decide(&ctx, class, snapshot.as_ref(), None, &state.gate);
    let jar = apply_effects(&state, jar, session_id, snapshot, &decision.effects).await?;

    match decision.action {
        Action::Allow { identity } => {
            match identity {
                Some(identity) => {
                    req.extensions_mut().insert(CurrentUser(identity));
                }
                None => {
                    // A stale attachment must not leak through an anonymous
                    // allow.
                    req.extensions_mut().remove::<CurrentUser>();
                }
            }
            let response = next.run(req).await;
            Ok((jar, response).into_response())
        }
        Action::Forward(target) => {
            tracing::debug!(from = %ctx.path, to = %target, "forwarding to login view");
            let uri: Uri = target
                .parse()
                .map_err(|_| GateError::ForwardTarget(target.clone()))?;
            *req.uri_mut() = uri;
            req.extensions_mut().remove::<CurrentUser>();
            let response = next.run(req).await;
            Ok((jar, response).into_response())
        }
        action => Ok(terminal(jar, action)),
    }
}

/// Render a chain-terminating action.
fn terminal(jar: CookieJar, action: Action) -> Response {
    match action {
        Action::Redirect(target) => {
            tracing::debug!(to = %target, "redirecting");
            (jar, Redirect::to(&target)).into_response()
        }
        Action::Reject { status, message } => {
            tracing::debug!(%status, "rejecting programmatic request");
            (status, jar, message).into_response()
        }
        Action::NoOp => (jar, ()).into_response(),
        Action::Allow { .. } | Action::Forward(_) => {
            // Chain-resuming actions are executed before this point; landing
            // here is an upstream bug.
            tracing::error!("chain-resuming action reached terminal rendering");
            (StatusCode::INTERNAL_SERVER_ERROR, jar, "internal error").into_response()
        }
    }
}

/// Pull `j_username`/`j_password` out of a form body. Anything unreadable
/// (wrong content type, missing field, bad encoding) is `None`, which the
/// sub-flow treats as a rejection.
async fn read_credentials(req: Request) -> Option<Credentials> {
    match axum::extract::Form::<Credentials>::from_request(req, &()).await {
        Ok(axum::extract::Form(credentials)) => Some(credentials),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "unreadable login submission body");
            None
        }
    }
}

/// Apply session effects, creating the session lazily on the first write.
/// Returns the jar carrying any cookie delta.
async fn apply_effects(
    state: &AppState,
    jar: CookieJar,
    session_id: Option<SessionId>,
    snapshot: Option<SessionData>,
    effects: &[SessionEffect],
) -> Result<CookieJar, GateError> {
    if effects.is_empty() {
        return Ok(jar);
    }

    // Invalidate destroys rather than writes; the engine never combines it
    // with store effects.
    if effects.contains(&SessionEffect::Invalidate) {
        if let Some(id) = &session_id {
            state.sessions.invalidate(id).await?;
            tracing::info!("session invalidated");
        }
        if jar.get(SESSION_COOKIE).is_some() {
            return Ok(jar.add(clear_session_cookie()));
        }
        return Ok(jar);
    }

    let mut data = snapshot.unwrap_or_default();
    for effect in effects {
        match effect {
            SessionEffect::StorePreAuthUrl(path) => data.pre_auth_url = Some(path.clone()),
            SessionEffect::StoreIdentity(identity) => data.identity = Some(identity.clone()),
            SessionEffect::ClearPreAuthUrl => data.pre_auth_url = None,
            SessionEffect::Invalidate => {}
        }
    }

    match session_id {
        Some(id) => {
            state.sessions.save(&id, data).await?;
            Ok(jar)
        }
        None => {
            let id = state.sessions.create().await?;
            state.sessions.save(&id, data).await?;
            Ok(jar.add(session_cookie(&id)))
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
