//! Demo host pages around and behind the gate.
//!
//! Rendering is not the point here; these handlers exist so forwards and
//! redirects land on real endpoints and the identity plumbing is visible.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;

use crate::gate::session::{Identity, SessionId};
use crate::gate::{self, CurrentUser, SESSION_COOKIE};
use crate::state::AppState;

/// `GET /` — public landing page.
pub async fn home() -> Html<&'static str> {
    Html(
        "<h1>gatehouse</h1>\
         <ul>\
         <li><a href=\"/app/secured/view/index\">secured area</a></li>\
         <li><a href=\"/app/login\">log in</a></li>\
         </ul>",
    )
}

/// `GET|POST /app/login` — login form. Registered for POST as well so a
/// forwarded non-GET request still renders the view.
pub async fn login_view(State(state): State<AppState>) -> Html<String> {
    let action = &state.gate.login_submit_path;
    Html(format!(
        "<h1>Log in</h1>\
         <form method=\"post\" action=\"{action}\">\
         <label>Username <input name=\"j_username\"></label>\
         <label>Password <input type=\"password\" name=\"j_password\"></label>\
         <button type=\"submit\">Log in</button>\
         </form>"
    ))
}

/// `GET /app/login/error` — rejected-login view.
pub async fn login_error() -> Html<&'static str> {
    Html("<h1>Login failed</h1><p><a href=\"/app/login\">Try again</a></p>")
}

/// `GET /app/login/loggedOut` — post-logout view.
pub async fn logged_out() -> Html<&'static str> {
    Html("<h1>Logged out</h1><p><a href=\"/app/login\">Log in again</a></p>")
}

/// `GET /app/login/logout` — logout for authenticated callers.
///
/// The gate only owns this path for anonymous sessions; authenticated
/// requests pass through and end here.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    user: CurrentUser,
) -> Result<Response, StatusCode> {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        // Identity without a cookie cannot happen via the gate; nothing to end.
        return Ok(Redirect::to(&state.gate.logged_out_target).into_response());
    };
    let id = SessionId::from(cookie.value());
    state
        .sessions
        .invalidate(&id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    tracing::info!(username = %user.0.username, "user logged out");

    let jar = jar.add(gate::clear_session_cookie());
    Ok((jar, Redirect::to(&state.gate.logged_out_target)).into_response())
}

/// `GET /app/secured/view/index` — post-login landing page.
pub async fn secured_index(user: CurrentUser) -> Html<String> {
    let username = &user.0.username;
    Html(format!(
        "<h1>Welcome, {username}</h1>\
         <ul>\
         <li><a href=\"/app/secured/view/profile\">profile</a></li>\
         <li><a href=\"/app/login/logout\">log out</a></li>\
         </ul>"
    ))
}

/// `GET /app/secured/view/profile` — second protected page; exists so the
/// return-to-requested-page flow has somewhere other than the index to land.
pub async fn secured_profile(user: CurrentUser) -> Html<String> {
    let username = &user.0.username;
    let user_id = user.0.user_id;
    Html(format!(
        "<h1>Profile</h1><p>{username} ({user_id})</p>\
         <p><a href=\"/app/secured/view/index\">back</a></p>"
    ))
}

/// `GET /app/secured/api/me` — identity of the caller, for programmatic
/// clients. Anonymous AJAX callers never reach this; the gate 401s them.
pub async fn me(user: CurrentUser) -> Json<Identity> {
    Json(user.0)
}

#[cfg(test)]
#[path = "pages_test.rs"]
mod tests;
