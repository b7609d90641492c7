//! Gate configuration — protected-path marker and flow endpoints.
//!
//! DESIGN
//! ======
//! All targets are resolved to absolute request paths once, at construction:
//! the context path is applied here and nowhere else, so the classifier and
//! the decision engine compare plain strings. Forward-vs-redirect is carried
//! by the action type, not by prefixes inside these values.

const DEFAULT_PROTECTED_MARKER: &str = "/app/secured/";
const DEFAULT_LOGIN_SUBMIT: &str = "j_security_check";
const DEFAULT_LOGOUT: &str = "app/login/logout";
const DEFAULT_LOGIN_VIEW: &str = "app/login";
const DEFAULT_POST_LOGIN: &str = "app/secured/view/index";
const DEFAULT_LOGIN_ERROR: &str = "app/login/error";
const DEFAULT_LOGGED_OUT: &str = "app/login/loggedOut";

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GateConfigError {
    #[error("GATE_CONTEXT_PATH must be empty or start with '/' and not end with '/': {0:?}")]
    InvalidContextPath(String),
    #[error("GATE_PROTECTED_MARKER must not be empty")]
    EmptyMarker,
    #[error("{key} must be an absolute path starting with '/': {value:?}")]
    RelativePath { key: &'static str, value: String },
}

// =============================================================================
// CONFIG
// =============================================================================

/// Resolved gate endpoints. Every path field is absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// Application mount prefix (`""` when served at the root).
    pub context_path: String,
    /// Substring marking protected resources.
    pub protected_marker: String,
    /// POST endpoint carrying login credentials.
    pub login_submit_path: String,
    /// Logout endpoint, any method.
    pub logout_path: String,
    /// Login form view, target of the internal forward.
    pub login_view: String,
    /// Landing page after login when no pre-auth URL is stored.
    pub post_login_target: String,
    /// Redirect target after a rejected login.
    pub login_error_target: String,
    /// Redirect target after logout.
    pub logged_out_target: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::with_context_path("")
    }
}

impl GateConfig {
    /// Default endpoints resolved under the given context path.
    #[must_use]
    pub fn with_context_path(context_path: &str) -> Self {
        Self {
            context_path: context_path.to_owned(),
            protected_marker: DEFAULT_PROTECTED_MARKER.to_owned(),
            login_submit_path: resolved(context_path, DEFAULT_LOGIN_SUBMIT),
            logout_path: resolved(context_path, DEFAULT_LOGOUT),
            login_view: resolved(context_path, DEFAULT_LOGIN_VIEW),
            post_login_target: resolved(context_path, DEFAULT_POST_LOGIN),
            login_error_target: resolved(context_path, DEFAULT_LOGIN_ERROR),
            logged_out_target: resolved(context_path, DEFAULT_LOGGED_OUT),
        }
    }

    /// Build from environment variables.
    ///
    /// - `GATE_CONTEXT_PATH`: mount prefix applied to the defaults
    /// - `GATE_PROTECTED_MARKER`: protected-path substring
    /// - `GATE_LOGIN_SUBMIT_PATH`, `GATE_LOGOUT_PATH`, `GATE_LOGIN_VIEW`,
    ///   `GATE_POST_LOGIN_TARGET`, `GATE_LOGIN_ERROR_TARGET`,
    ///   `GATE_LOGGED_OUT_TARGET`: absolute-path overrides, taken verbatim
    ///
    /// # Errors
    ///
    /// Returns an error when an override is not an absolute path, the marker
    /// is empty, or the context path is malformed.
    pub fn from_env() -> Result<Self, GateConfigError> {
        let context_path = std::env::var("GATE_CONTEXT_PATH").unwrap_or_default();
        validate_context_path(&context_path)?;

        let mut config = Self::with_context_path(&context_path);
        if let Ok(marker) = std::env::var("GATE_PROTECTED_MARKER") {
            if marker.is_empty() {
                return Err(GateConfigError::EmptyMarker);
            }
            config.protected_marker = marker;
        }
        override_path(&mut config.login_submit_path, "GATE_LOGIN_SUBMIT_PATH")?;
        override_path(&mut config.logout_path, "GATE_LOGOUT_PATH")?;
        override_path(&mut config.login_view, "GATE_LOGIN_VIEW")?;
        override_path(&mut config.post_login_target, "GATE_POST_LOGIN_TARGET")?;
        override_path(&mut config.login_error_target, "GATE_LOGIN_ERROR_TARGET")?;
        override_path(&mut config.logged_out_target, "GATE_LOGGED_OUT_TARGET")?;
        Ok(config)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn resolved(context_path: &str, suffix: &str) -> String {
    format!("{context_path}/{suffix}")
}

fn validate_context_path(context_path: &str) -> Result<(), GateConfigError> {
    let well_formed =
        context_path.is_empty() || (context_path.starts_with('/') && !context_path.ends_with('/'));
    if well_formed {
        Ok(())
    } else {
        Err(GateConfigError::InvalidContextPath(context_path.to_owned()))
    }
}

fn override_path(slot: &mut String, key: &'static str) -> Result<(), GateConfigError> {
    if let Ok(value) = std::env::var(key) {
        if !value.starts_with('/') {
            return Err(GateConfigError::RelativePath { key, value });
        }
        *slot = value;
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
