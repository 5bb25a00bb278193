//! Configuration validation, run once at startup after parsing.

use super::Config;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("server.name must not equal any entry in cluster.peers (that is this node, not a peer)")]
    SelfListedAsPeer,
    #[error("cluster.peers contains a duplicate name: {0}")]
    DuplicatePeerName(String),
    #[error("tls.cert_path does not exist: {0}")]
    TlsCertNotFound(String),
    #[error("tls.key_path does not exist: {0}")]
    TlsKeyNotFound(String),
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
    #[error("security.require_tls is set but no [tls] listener is configured")]
    TlsRequiredButNotConfigured,
}

/// Validate a configuration, returning every error found rather than the
/// first one, matching the teacher's `validate()`.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    if config.cluster.peers.iter().any(|p| p.name == config.server.name) {
        errors.push(ValidationError::SelfListedAsPeer);
    }
    let mut seen = std::collections::HashSet::new();
    for peer in &config.cluster.peers {
        if !seen.insert(peer.name.clone()) {
            errors.push(ValidationError::DuplicatePeerName(peer.name.clone()));
        }
    }

    if let Some(ref tls) = config.tls {
        if !Path::new(&tls.cert_path).exists() {
            errors.push(ValidationError::TlsCertNotFound(tls.cert_path.clone()));
        }
        if !Path::new(&tls.key_path).exists() {
            errors.push(ValidationError::TlsKeyNotFound(tls.key_path.clone()));
        }
    } else if config.security.require_tls {
        errors.push(ValidationError::TlsRequiredButNotConfigured);
    }

    if let Some(ref db) = config.database {
        let db_path = Path::new(&db.path);
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::DatabasePathInvalid(db.path.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_valid_config() -> String {
        r#"
[server]
name = "n1"

[cluster]
listen = "127.0.0.1:12000"

[listen]
address = "127.0.0.1:6060"
"#
        .to_string()
    }

    #[test]
    fn valid_config_passes() {
        let config: Config = toml::from_str(&minimal_valid_config()).unwrap();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn empty_server_name_fails() {
        let toml_str = minimal_valid_config().replace(r#"name = "n1""#, r#"name = """#);
        let config: Config = toml::from_str(&toml_str).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::MissingServerName)));
    }

    #[test]
    fn self_listed_as_peer_fails() {
        let mut toml_str = minimal_valid_config();
        toml_str.push_str("\n[[cluster.peers]]\nname = \"n1\"\naddress = \"127.0.0.1:12001\"\n");
        let config: Config = toml::from_str(&toml_str).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::SelfListedAsPeer)));
    }

    #[test]
    fn missing_tls_cert_fails() {
        let mut toml_str = minimal_valid_config();
        toml_str.push_str("\n[tls]\naddress = \"127.0.0.1:6061\"\ncert_path = \"/nonexistent/cert.pem\"\nkey_path = \"/nonexistent/key.pem\"\n");
        let config: Config = toml::from_str(&toml_str).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::TlsCertNotFound(_))));
    }
}
