//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into handlers and the gate middleware via the
//! `State` extractor. The session store and the login service sit behind
//! trait objects so deployments can swap backends without touching the
//! gate itself.

use std::sync::Arc;

use crate::gate::config::GateConfig;
use crate::gate::session::SessionStore;
use crate::services::login::LoginService;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum — all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    /// Session persistence behind the gate.
    pub sessions: Arc<dyn SessionStore>,
    /// Credential verification backend.
    pub login: Arc<dyn LoginService>,
    /// Resolved gate endpoints and protected-path marker.
    pub gate: Arc<GateConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStore>, login: Arc<dyn LoginService>, gate: GateConfig) -> Self {
        Self { sessions, login, gate: Arc::new(gate) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
