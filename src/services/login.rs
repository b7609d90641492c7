//! Credential verification service.
//!
//! DESIGN
//! ======
//! `Ok(None)` from [`LoginService::login`] means "credentials rejected" and
//! is handled locally by the gate (error-view redirect). `Err` means the
//! backing store itself failed and must surface as a server fault, never as
//! a failed login.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::gate::session::Identity;

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("credential backend failure: {0}")]
    Backend(String),
}

// =============================================================================
// CREDENTIALS
// =============================================================================

/// Login form fields, named as the submit endpoint expects them.
#[derive(Clone, serde::Deserialize)]
pub struct Credentials {
    #[serde(rename = "j_username")]
    pub username: String,
    #[serde(rename = "j_password")]
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// SERVICE TRAIT
// =============================================================================

/// Pluggable credential verification. Enables mocking in tests and wiring a
/// real user directory behind the gate.
#[async_trait::async_trait]
pub trait LoginService: Send + Sync {
    /// Verify a username/password pair.
    ///
    /// Returns the resolved identity on success, `None` on rejection.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Backend`] when the backing store is
    /// unreachable or misbehaves.
    async fn login(&self, username: &str, password: &str) -> Result<Option<Identity>, LoginError>;
}

// =============================================================================
// STATIC SERVICE
// =============================================================================

fn digest(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    let bytes = hasher.finalize();
    bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()
}

struct StaticUser {
    user_id: Uuid,
    password_digest: String,
}

/// In-memory username table seeded from the environment.
///
/// Fixture-grade verifier so the crate runs standalone; user ids are minted
/// per process. Real deployments implement [`LoginService`] over their own
/// directory.
pub struct StaticLoginService {
    users: HashMap<String, StaticUser>,
}

impl StaticLoginService {
    /// Build from `AUTH_USERS` (`"alice:wonderland,bob:builder"`).
    ///
    /// Malformed entries are skipped with a warning; an empty table rejects
    /// every login.
    #[must_use]
    pub fn from_env() -> Self {
        let raw = std::env::var("AUTH_USERS").unwrap_or_default();
        let service = Self::from_list(&raw);
        if service.users.is_empty() {
            tracing::warn!("AUTH_USERS is empty; all logins will be rejected");
        }
        service
    }

    /// Build from an explicit user list (tests, embedded use).
    #[must_use]
    pub fn with_users(users: &[(&str, &str)]) -> Self {
        let users = users
            .iter()
            .map(|(username, password)| {
                ((*username).to_owned(), StaticUser {
                    user_id: Uuid::new_v4(),
                    password_digest: digest(password),
                })
            })
            .collect();
        Self { users }
    }

    fn from_list(raw: &str) -> Self {
        let mut users = HashMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((username, password)) = entry.split_once(':') else {
                tracing::warn!(entry, "skipping malformed AUTH_USERS entry");
                continue;
            };
            if username.is_empty() || password.is_empty() {
                tracing::warn!(entry, "skipping malformed AUTH_USERS entry");
                continue;
            }
            users.insert(username.to_owned(), StaticUser {
                user_id: Uuid::new_v4(),
                password_digest: digest(password),
            });
        }
        Self { users }
    }
}

#[async_trait::async_trait]
impl LoginService for StaticLoginService {
    async fn login(&self, username: &str, password: &str) -> Result<Option<Identity>, LoginError> {
        let Some(user) = self.users.get(username) else {
            return Ok(None);
        };
        if user.password_digest != digest(password) {
            return Ok(None);
        }
        Ok(Some(Identity {
            user_id: user.user_id,
            username: username.to_owned(),
        }))
    }
}

#[cfg(test)]
#[path = "login_test.rs"]
mod tests;
