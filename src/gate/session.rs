//! Session layer — identity, opaque session ids, and the store seam.
//!
//! DESIGN
//! ======
//! A session is two typed slots: the authenticated identity and the URL the
//! client originally asked for before being sent to login. Stores hand out
//! ids explicitly (`create`) and never materialize a session on `load`, so
//! "no cookie" and "dead cookie" both read as `None` and the gate decides
//! what to do about it.
//!
//! TRADE-OFFS
//! ==========
//! `save` is last-write-wins. Concurrent requests on one session can race on
//! the pre-auth slot; losing a stored return URL degrades to the default
//! post-login page, which is acceptable for a login flow.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rand::Rng;
use uuid::Uuid;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Resolved principal attached to authenticated requests.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Identity {
    /// Unique user identifier.
    pub user_id: Uuid,
    /// Login name, as verified.
    pub username: String,
}

// =============================================================================
// SESSION ID + DATA
// =============================================================================

/// Opaque session identifier, a 32-byte hex token.
///
/// Client-supplied values (cookie contents) are wrapped as-is; validity is
/// decided by the store lookup, not by the type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a cryptographically random session id.
    #[must_use]
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::rng().random();
        Self(bytes_to_hex(&bytes))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

/// Per-session state: the two slots the gate reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionData {
    /// Authenticated identity, once login succeeded.
    pub identity: Option<Identity>,
    /// Path requested before the login forward, replayed after login.
    pub pre_auth_url: Option<String>,
}

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session backend failure: {0}")]
    Backend(String),
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Pluggable session storage. Enables mocking in tests and swapping the
/// in-memory default for a shared backend.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a session snapshot. `None` for unknown, expired, or
    /// invalidated ids.
    async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError>;

    /// Create a fresh, empty session and return its id.
    async fn create(&self) -> Result<SessionId, SessionError>;

    /// Replace the session state. Unknown ids are an error at the caller's
    /// level, not here: saving against a dead id recreates nothing and is
    /// dropped silently by implementations that prune on expiry.
    async fn save(&self, id: &SessionId, data: SessionData) -> Result<(), SessionError>;

    /// Destroy the session and all its state. Unknown ids are a no-op.
    async fn invalidate(&self, id: &SessionId) -> Result<(), SessionError>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

struct StoredSession {
    data: SessionData,
    expires_at: Instant,
}

/// Process-local session store with a fixed TTL from creation.
///
/// Default backend; suitable for a single instance. Expired entries are
/// dropped on access rather than by a sweeper.
#[derive(Clone)]
pub struct MemorySessionStore {
    inner: Arc<Mutex<HashMap<SessionId, StoredSession>>>,
    ttl: Duration,
}

impl MemorySessionStore {
    /// Build with the TTL from `SESSION_TTL_SECS` (default 86400).
    #[must_use]
    pub fn new() -> Self {
        let ttl_secs = env_parse("SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS);
        Self::with_ttl(Duration::from_secs(ttl_secs))
    }

    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, StoredSession>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Internal: load with explicit timestamp (for testing).
    fn load_at(&self, id: &SessionId, now: Instant) -> Option<SessionData> {
        let mut map = self.lock();
        match map.get(id) {
            Some(entry) if entry.expires_at > now => Some(entry.data.clone()),
            Some(_) => {
                map.remove(id);
                None
            }
            None => None,
        }
    }

    fn create_at(&self, now: Instant) -> SessionId {
        let id = SessionId::generate();
        self.lock().insert(
            id.clone(),
            StoredSession {
                data: SessionData::default(),
                expires_at: now + self.ttl,
            },
        );
        id
    }

    fn save_at(&self, id: &SessionId, data: SessionData, now: Instant) {
        let mut map = self.lock();
        if let Some(entry) = map.get_mut(id) {
            if entry.expires_at > now {
                entry.data = data;
            } else {
                map.remove(id);
            }
        }
    }

    fn remove(&self, id: &SessionId) {
        self.lock().remove(id);
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError> {
        Ok(self.load_at(id, Instant::now()))
    }

    async fn create(&self) -> Result<SessionId, SessionError> {
        Ok(self.create_at(Instant::now()))
    }

    async fn save(&self, id: &SessionId, data: SessionData) -> Result<(), SessionError> {
        self.save_at(id, data, Instant::now());
        Ok(())
    }

    async fn invalidate(&self, id: &SessionId) -> Result<(), SessionError> {
        self.remove(id);
        Ok(())
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
