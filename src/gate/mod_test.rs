use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, header};
use axum::middleware;
use tower::{Layer, ServiceExt};

use super::*;
use crate::gate::session::SessionStore;
use crate::routes;
use crate::services::login::{LoginService, StaticLoginService};
use crate::state::test_helpers::{
    seed_authenticated_session, seed_pre_auth_session, test_app_state, test_app_state_with,
};

/// Run one request through the gate composed around the demo router, the
/// same shape `main` serves. Rebuilding per call is fine: the store inside
/// `state` is shared across clones, so every call sees one session space.
async fn send(state: &AppState, req: Request<Body>) -> Response {
    let app = middleware::from_fn_with_state(state.clone(), gate).layer(routes::app(state.clone()));
    app.oneshot(req).await.unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

fn get_with_cookie(path: &str, session: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header(header::COOKIE, format!("session_id={session}"))
        .body(Body::empty())
        .unwrap()
}

fn ajax_get(path: &str, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri(path)
        .header("x-requested-with", "XMLHttpRequest");
    if let Some(session) = session {
        builder = builder.header(header::COOKIE, format!("session_id={session}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn login_post(body: &str, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/j_security_check")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(session) = session {
        builder = builder.header(header::COOKIE, format!("session_id={session}"));
    }
    builder.body(Body::from(body.to_owned())).unwrap()
}

fn session_cookie_value(res: &Response) -> Option<String> {
    let set_cookie = res.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    let pair = set_cookie.split(';').next()?;
    pair.strip_prefix("session_id=").map(str::to_owned)
}

fn location(res: &Response) -> &str {
    res.headers()
        .get(header::LOCATION)
        .expect("redirect should carry a location")
        .to_str()
        .unwrap()
}

async fn body_text(res: Response) -> String {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// =============================================================================
// ANONYMOUS ACCESS TO PROTECTED RESOURCES
// =============================================================================

#[tokio::test]
async fn anonymous_get_of_protected_page_forwards_to_login() {
    let state = test_app_state();

    let res = send(&state, get("/app/secured/view/index")).await;

    // Same-request forward: the login view renders under the original URL,
    // not the output of the route the URL originally named.
    assert_eq!(res.status(), StatusCode::OK);
    let session = session_cookie_value(&res).expect("gate should start a session");

    let stored = state
        .sessions
        .load(&SessionId::from(session.as_str()))
        .await
        .unwrap()
        .expect("session should exist");
    assert_eq!(stored.pre_auth_url.as_deref(), Some("/app/secured/view/index"));
    assert!(stored.identity.is_none());

    let body = body_text(res).await;
    assert!(body.contains("j_username"));
    assert!(body.contains("j_password"));
    assert!(!body.contains("Welcome"));
}

#[tokio::test]
async fn forward_from_an_unrouted_path_still_renders_login() {
    let state = test_app_state();

    // No handler owns this path. The rewrite must re-enter route matching
    // to find the login view instead of falling through to the 404.
    let res = send(&state, get("/app/secured/reports/q3")).await;

    assert_eq!(res.status(), StatusCode::OK);
    let session = session_cookie_value(&res).expect("gate should start a session");
    let body = body_text(res).await;
    assert!(body.contains("j_username"));

    let stored = state
        .sessions
        .load(&SessionId::from(session.as_str()))
        .await
        .unwrap()
        .expect("session should exist");
    assert_eq!(stored.pre_auth_url.as_deref(), Some("/app/secured/reports/q3"));
}

#[tokio::test]
async fn session_cookie_is_host_scoped_and_http_only() {
    let state = test_app_state();

    let res = send(&state, get("/app/secured/view/index")).await;

    let set_cookie = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Path=/"));
}

#[tokio::test]
async fn forwarded_post_renders_login_without_capturing() {
    let state = test_app_state();

    let req = Request::builder()
        .method(Method::POST)
        .uri("/app/secured/api/update")
        .body(Body::empty())
        .unwrap();
    let res = send(&state, req).await;

    // The forward is not method-gated, but only GETs are captured, so no
    // session is created for this request at all.
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get(header::SET_COOKIE).is_none());
    let body = body_text(res).await;
    assert!(body.contains("j_username"));
}

#[tokio::test]
async fn ajax_protected_request_gets_401_with_message() {
    let state = test_app_state();

    let res = send(&state, ajax_get("/app/secured/api/me", None)).await;

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(res.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(body_text(res).await, "Authorization required");
}

#[tokio::test]
async fn dead_session_cookie_reads_as_anonymous() {
    let state = test_app_state();

    let res = send(&state, get_with_cookie("/app/secured/view/index", "deadbeef")).await;

    assert_eq!(res.status(), StatusCode::OK);
    let fresh = session_cookie_value(&res).expect("a fresh session should be started");
    assert_ne!(fresh, "deadbeef");
}

// =============================================================================
// LOGIN FLOW
// =============================================================================

#[tokio::test]
async fn login_replays_the_captured_page_and_clears_the_capture() {
    let state = test_app_state();

    // 1. Anonymous visit to a protected page captures it.
    let res = send(&state, get("/app/secured/view/profile")).await;
    let session = session_cookie_value(&res).expect("session started");

    // 2. Valid credentials on that session redirect back to the capture.
    let res = send(
        &state,
        login_post("j_username=kermit&j_password=thefrog", Some(&session)),
    )
    .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/app/secured/view/profile");

    // 3. The same cookie now reaches the protected page.
    let res = send(&state, get_with_cookie("/app/secured/view/profile", &session)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(body_text(res).await.contains("Profile"));

    // The capture is single-use.
    let stored = state
        .sessions
        .load(&SessionId::from(session.as_str()))
        .await
        .unwrap()
        .expect("session should exist");
    assert!(stored.pre_auth_url.is_none());
    assert_eq!(stored.identity.unwrap().username, "kermit");
}

#[tokio::test]
async fn login_without_capture_lands_on_the_default_target() {
    let state = test_app_state();

    let res = send(&state, login_post("j_username=kermit&j_password=thefrog", None)).await;

    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/app/secured/view/index");
    // The session is created on demand to hold the identity.
    assert!(session_cookie_value(&res).is_some());
}

#[tokio::test]
async fn rejected_credentials_redirect_to_the_error_view() {
    let state = test_app_state();

    let res = send(&state, login_post("j_username=kermit&j_password=wrong", None)).await;

    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/app/login/error");
    // A failed login stores nothing.
    assert!(res.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn unreadable_login_body_is_a_rejection_not_a_fault() {
    let state = test_app_state();

    let req = Request::builder()
        .method(Method::POST)
        .uri("/j_security_check")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("not a form"))
        .unwrap();
    let res = send(&state, req).await;

    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/app/login/error");
}

#[tokio::test]
async fn missing_form_field_is_a_rejection() {
    let state = test_app_state();

    let res = send(&state, login_post("j_username=kermit", None)).await;

    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/app/login/error");
}

// =============================================================================
// AUTHENTICATED TRAFFIC
// =============================================================================

#[tokio::test]
async fn authenticated_session_reaches_protected_pages() {
    let state = test_app_state();
    let session = seed_authenticated_session(&state, "kermit").await;

    let res = send(&state, get_with_cookie("/app/secured/view/index", session.as_str())).await;

    assert_eq!(res.status(), StatusCode::OK);
    assert!(body_text(res).await.contains("Welcome, kermit"));
}

#[tokio::test]
async fn authenticated_ajax_reaches_the_identity_endpoint() {
    let state = test_app_state();
    let session = seed_authenticated_session(&state, "kermit").await;

    let res = send(&state, ajax_get("/app/secured/api/me", Some(session.as_str()))).await;

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_text(res).await).unwrap();
    assert_eq!(body["username"], "kermit");
}

#[tokio::test]
async fn authenticated_login_submission_passes_through_to_the_router() {
    let state = test_app_state();
    let session = seed_authenticated_session(&state, "kermit").await;

    // No handler owns the submit path downstream, so the router 404s; the
    // gate itself no longer intercepts an authenticated POST there.
    let res = send(
        &state,
        login_post("j_username=x&j_password=y", Some(session.as_str())),
    )
    .await;

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// LOGOUT
// =============================================================================

#[tokio::test]
async fn anonymous_logout_invalidates_and_redirects() {
    let state = test_app_state();
    let session = seed_pre_auth_session(&state, "/app/secured/view/index").await;

    let res = send(&state, get_with_cookie("/app/login/logout", session.as_str())).await;

    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/app/login/loggedOut");
    let set_cookie = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.starts_with("session_id="));
    assert!(set_cookie.contains("Max-Age=0"));
    assert_eq!(state.sessions.load(&session).await.unwrap(), None);
}

#[tokio::test]
async fn authenticated_logout_reaches_the_downstream_handler() {
    let state = test_app_state();
    let session = seed_authenticated_session(&state, "kermit").await;

    let res = send(&state, get_with_cookie("/app/login/logout", session.as_str())).await;

    // The downstream handler ends the session and sends the same redirect.
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/app/login/loggedOut");
    assert_eq!(state.sessions.load(&session).await.unwrap(), None);
}

// =============================================================================
// PUBLIC TRAFFIC + FAULTS
// =============================================================================

#[tokio::test]
async fn public_paths_pass_untouched() {
    let state = test_app_state();

    let res = send(&state, get("/")).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get(header::SET_COOKIE).is_none());

    let res = send(&state, get("/healthz")).await;
    assert_eq!(res.status(), StatusCode::OK);
}

struct FailingStore;

#[async_trait::async_trait]
impl SessionStore for FailingStore {
    async fn load(&self, _id: &SessionId) -> Result<Option<SessionData>, SessionError> {
        Err(SessionError::Backend("store offline".to_owned()))
    }

    async fn create(&self) -> Result<SessionId, SessionError> {
        Err(SessionError::Backend("store offline".to_owned()))
    }

    async fn save(&self, _id: &SessionId, _data: SessionData) -> Result<(), SessionError> {
        Err(SessionError::Backend("store offline".to_owned()))
    }

    async fn invalidate(&self, _id: &SessionId) -> Result<(), SessionError> {
        Err(SessionError::Backend("store offline".to_owned()))
    }
}

#[tokio::test]
async fn session_store_failure_surfaces_as_500() {
    let login = StaticLoginService::with_users(&[("kermit", "thefrog")]);
    let state = AppState::new(Arc::new(FailingStore), Arc::new(login), GateConfig::default());

    let res = send(&state, get_with_cookie("/app/secured/view/index", "whatever")).await;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(res).await, "internal error");
}

struct FailingLogin;

#[async_trait::async_trait]
impl LoginService for FailingLogin {
    async fn login(&self, _username: &str, _password: &str) -> Result<Option<Identity>, LoginError> {
        Err(LoginError::Backend("directory down".to_owned()))
    }
}

#[tokio::test]
async fn login_backend_failure_surfaces_as_500_not_a_rejection() {
    let sessions = crate::gate::session::MemorySessionStore::with_ttl(std::time::Duration::from_secs(60));
    let state = AppState::new(Arc::new(sessions), Arc::new(FailingLogin), GateConfig::default());

    let res = send(&state, login_post("j_username=kermit&j_password=thefrog", None)).await;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(res).await, "internal error");
}

#[tokio::test]
async fn unparseable_forward_target_is_an_internal_fault() {
    let config = GateConfig {
        login_view: "/app login".to_owned(),
        ..GateConfig::default()
    };
    let state = test_app_state_with(config);

    let res = send(&state, get("/app/secured/view/index")).await;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(res).await, "internal error");
}

// =============================================================================
// EXTRACTOR + TERMINAL RENDERING
// =============================================================================

#[tokio::test]
async fn current_user_extractor_requires_the_gate_extension() {
    use axum::extract::FromRequestParts;

    let req = Request::builder().uri("/x").body(()).unwrap();
    let (mut parts, ()) = req.into_parts();

    let rejected = CurrentUser::from_request_parts(&mut parts, &()).await;
    assert!(matches!(rejected, Err(StatusCode::UNAUTHORIZED)));

    parts.extensions.insert(CurrentUser(Identity {
        user_id: uuid::Uuid::new_v4(),
        username: "kermit".to_owned(),
    }));
    let accepted = CurrentUser::from_request_parts(&mut parts, &()).await.unwrap();
    assert_eq!(accepted.0.username, "kermit");
}

#[tokio::test]
async fn noop_terminates_with_an_untouched_response() {
    let res = terminal(CookieJar::new(), Action::NoOp);
    assert_eq!(res.status(), StatusCode::OK);
    assert!(body_text(res).await.is_empty());
}

#[tokio::test]
async fn chain_resuming_action_in_terminal_is_an_internal_fault() {
    let res = terminal(CookieJar::new(), Action::Allow { identity: None });
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn ajax_detection_is_exact() {
    let mut headers = HeaderMap::new();
    headers.insert("x-requested-with", "XMLHttpRequest".parse().unwrap());
    assert!(is_ajax(&headers));

    headers.insert("x-requested-with", "xmlhttprequest".parse().unwrap());
    assert!(!is_ajax(&headers));

    assert!(!is_ajax(&HeaderMap::new()));
}
