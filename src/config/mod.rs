//! Configuration loading and management.
//!
//! Split into submodules by concern, the way the teacher splits `config/`:
//! - [`types`]: `Config`, `ServerConfig`, `ClusterConfig`/`PeerConfig`.
//! - [`listen`]: client-facing transports (websocket, TLS, long-poll HTTP).
//! - [`security`]: auth schemes, token secret/expiry, TLS requirements.
//! - [`limits`]: quotas (message size, file upload size, subscriber counts).
//! - [`calls`]: ICE server plumbing and call-establishment timeout.
//! - [`validation`]: startup validation, returning all errors found at once.

mod calls;
mod defaults;
mod limits;
mod listen;
mod security;
mod types;
mod validation;

pub use calls::{CallsConfig, IceServer};
pub use limits::LimitsConfig;
pub use listen::{ClientAuth, ListenConfig, TlsConfig, WebSocketConfig};
pub use security::{AuthSchemeConfig, SecurityConfig};
pub use types::{ClusterConfig, Config, DatabaseConfig, LogFormat, PeerConfig, ServerConfig};
pub use validation::{validate, ValidationError};

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: Box<toml::de::Error> },
}

impl Config {
    /// Load and parse a TOML config file from `path`.
    pub fn load(path: &str) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(Path::new(path)).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source: Box::new(source),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses() {
        let toml_str = r#"
[server]
name = "n1"
data_center = "local"

[cluster]
listen = "0.0.0.0:12000"

[listen]
address = "0.0.0.0:6060"

[database]
path = "topicd.db"
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.server.name, "n1");
        assert!(cfg.cluster.peers.is_empty());
    }
}
