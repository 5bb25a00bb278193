//! Auth scheme enablement and credential token configuration.
//!
//! The concrete auth schemes (password hashing, SCRAM, OAuth) are out of
//! scope as *cryptography design* (spec.md §1 Non-goals), but the scheme
//! registry and the token expiry knob are part of the `Session`/`AuthHandler`
//! contract (SPEC_FULL.md §B.3) and live here, the way the teacher's
//! `SecurityConfig` hosts `RateLimitConfig`/`HeuristicsConfig` even though
//! the detection algorithms themselves are elsewhere.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Auth scheme names this node accepts in `{login scheme=...}`.
    #[serde(default = "default_schemes")]
    pub auth_schemes: Vec<String>,
    /// Secret used to sign issued auth tokens. Must be set in production;
    /// an ephemeral one is generated (and a warning logged) otherwise.
    #[serde(default = "default_token_secret")]
    pub token_secret: String,
    /// Token lifetime in seconds. The token clock is local wall time (no
    /// skew tolerance is assumed — SPEC_FULL.md Open Question D.3).
    #[serde(default = "default_token_expires_in_secs")]
    pub token_expires_in_secs: i64,
    /// Reject connections that did not negotiate TLS.
    #[serde(default)]
    pub require_tls: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            auth_schemes: default_schemes(),
            token_secret: default_token_secret(),
            token_expires_in_secs: default_token_expires_in_secs(),
            require_tls: false,
        }
    }
}

/// One configured auth scheme, named the way `{login scheme=...}` requests
/// look it up in the `AuthHandler` registry.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSchemeConfig {
    pub name: String,
    #[serde(default)]
    pub params: toml::Table,
}

fn default_schemes() -> Vec<String> {
    vec!["basic".to_string(), "token".to_string()]
}

fn default_token_secret() -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;
    let secret: String = rand::thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect();
    tracing::warn!(
        "no [security].token_secret configured — using an ephemeral random secret; \
         issued tokens will not validate across a restart. Set one for production."
    );
    secret
}

fn default_token_expires_in_secs() -> i64 {
    30 * 24 * 3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schemes_include_basic() {
        let cfg = SecurityConfig::default();
        assert!(cfg.auth_schemes.iter().any(|s| s == "basic"));
    }

    #[test]
    fn default_token_secret_is_32_chars() {
        assert_eq!(default_token_secret().len(), 32);
    }
}
