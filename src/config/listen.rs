//! Client-facing transport listener configuration.
//!
//! Kept close to the teacher's `listen.rs`: one struct per transport, plain
//! TCP for long-poll HTTP, TLS, and WebSocket. The wire grammar spoken over
//! these listeners is out of scope (spec.md §1); only bind/TLS/CORS shape
//! lives here.

use serde::Deserialize;
use std::net::SocketAddr;

/// Plain (non-TLS) listener, used for long-poll HTTP and plaintext
/// WebSocket in development.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    pub address: SocketAddr,
}

/// Client certificate authentication mode for the TLS listener.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClientAuth {
    #[default]
    None,
    Optional,
    Required,
}

/// TLS listener configuration. ACME issuance is a Non-goal (spec.md §1); the
/// listener accepts a pre-provisioned cert/key path only.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    pub address: SocketAddr,
    pub cert_path: String,
    pub key_path: String,
    #[serde(default)]
    pub client_auth: ClientAuth,
    pub ca_path: Option<String>,
}

/// WebSocket listener configuration for local sessions.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    pub address: SocketAddr,
    #[serde(default)]
    pub allow_origins: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_auth_default_is_none() {
        assert_eq!(ClientAuth::default(), ClientAuth::None);
    }

    #[test]
    fn listen_config_deserialize() {
        let toml_str = r#"address = "0.0.0.0:6060""#;
        let cfg: ListenConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.address.port(), 6060);
    }

    #[test]
    fn tls_config_deserialize_defaults() {
        let toml_str = r#"
            address = "0.0.0.0:6061"
            cert_path = "/path/to/cert.pem"
            key_path = "/path/to/key.pem"
        "#;
        let cfg: TlsConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.client_auth, ClientAuth::None);
        assert!(cfg.ca_path.is_none());
    }
}
