//! ICE server plumbing for the P2P video-call state machine.
//!
//! spec.md §4.8 describes the call state machine but not how ICE server URLs
//! reach the client; SPEC_FULL.md §B.4 adds this ambient config, grounded in
//! `original_source/server/calls.go`'s `callConfig`/`iceServer` loading.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub ice_servers: Vec<IceServer>,
    /// Call-establishment timeout in seconds (§4.8 default: 30s).
    #[serde(default = "default_establishment_timeout_secs")]
    pub establishment_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

fn default_establishment_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_default_is_thirty_seconds() {
        let cfg: CallsConfig = toml::from_str("enabled = true").unwrap();
        assert_eq!(cfg.establishment_timeout_secs, 30);
    }
}
