//! Request classifier — which gate flow a request belongs to.

use axum::http::Method;

use crate::gate::config::GateConfig;
use crate::gate::policy;

/// Gate-relevant request classes.
///
/// `Protected` is only acted on for anonymous callers; authenticated
/// requests pass through before classification matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Touches a protected resource.
    Protected,
    /// Credential POST to the login submit endpoint.
    LoginSubmission,
    /// Logout endpoint, any method.
    Logout,
    /// No gate flow; passes through untouched.
    Other,
}

/// Classify a request. Pure and idempotent; precedence is
/// protected, then login submission, then logout.
#[must_use]
pub fn classify(method: &Method, path: &str, config: &GateConfig) -> RequestClass {
    if policy::requires_auth(path, config) {
        return RequestClass::Protected;
    }
    if method == Method::POST && path == config.login_submit_path {
        return RequestClass::LoginSubmission;
    }
    if path == config.logout_path {
        return RequestClass::Logout;
    }
    RequestClass::Other
}

#[cfg(test)]
#[path = "classify_test.rs"]
mod tests;
