//! Access policy — which paths demand an authenticated caller.

use crate::gate::config::GateConfig;

/// True iff the path names a protected resource.
///
/// Containment match on the configured marker, so everything nested under
/// the protected subtree is covered without enumerating resources. Pure;
/// no I/O.
#[must_use]
pub fn requires_auth(path: &str, config: &GateConfig) -> bool {
    path.contains(&config.protected_marker)
}

#[cfg(test)]
#[path = "policy_test.rs"]
mod tests;
