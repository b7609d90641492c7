use super::*;

#[test]
fn secured_subtree_requires_auth() {
    let cfg = GateConfig::default();
    assert!(requires_auth("/app/secured/view/index", &cfg));
    assert!(requires_auth("/app/secured/api/me", &cfg));
    assert!(requires_auth("/app/secured/", &cfg));
}

#[test]
fn marker_matches_anywhere_in_the_path() {
    let cfg = GateConfig::default();
    assert!(requires_auth("/portal/app/secured/view/index", &cfg));
}

#[test]
fn bare_marker_prefix_without_slash_is_public() {
    // "/app/secured" does not contain the trailing-slash marker.
    let cfg = GateConfig::default();
    assert!(!requires_auth("/app/secured", &cfg));
    assert!(!requires_auth("/app/securedish/view", &cfg));
}

#[test]
fn login_and_logout_endpoints_are_public() {
    let cfg = GateConfig::default();
    assert!(!requires_auth("/app/login", &cfg));
    assert!(!requires_auth("/app/login/error", &cfg));
    assert!(!requires_auth("/app/login/logout", &cfg));
    assert!(!requires_auth("/j_security_check", &cfg));
    assert!(!requires_auth("/", &cfg));
}

#[test]
fn custom_marker_is_honored() {
    let cfg = GateConfig {
        protected_marker: "/members/".to_owned(),
        ..GateConfig::default()
    };
    assert!(requires_auth("/members/home", &cfg));
    assert!(!requires_auth("/app/secured/view/index", &cfg));
}
