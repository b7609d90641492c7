//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The session gate wraps this router from the outside rather than sitting
//! on it as a layer. Middleware attached with `Router::layer` runs after
//! route matching, so a forward's URI rewrite would land back in the
//! already-matched handler; wrapped around the router, the gate runs first
//! and `Next` re-enters matching. See `main.rs` for the composition. The
//! demo pages are mounted at the gate's default endpoints; mounting is host
//! business, so moving the gate config means moving these routes with it.

pub mod pages;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Demo host pages. Callers compose the session gate around the returned
/// router; serving it bare would leave every path ungated.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::home))
        .route("/healthz", get(healthz))
        .route("/app/login", get(pages::login_view).post(pages::login_view))
        .route("/app/login/error", get(pages::login_error))
        .route("/app/login/loggedOut", get(pages::logged_out))
        .route("/app/login/logout", get(pages::logout))
        .route("/app/secured/view/index", get(pages::secured_index))
        .route("/app/secured/view/profile", get(pages::secured_profile))
        .route("/app/secured/api/me", get(pages::me))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
