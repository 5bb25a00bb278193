//! Core configuration type definitions.

use super::calls::CallsConfig;
use super::limits::LimitsConfig;
use super::listen::{ListenConfig, TlsConfig, WebSocketConfig};
use super::security::SecurityConfig;
use serde::Deserialize;

/// Top-level configuration, matching the teacher's single `Config` struct
/// assembled from per-concern submodules.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cluster: ClusterConfig,
    pub listen: ListenConfig,
    pub tls: Option<TlsConfig>,
    pub websocket: Option<WebSocketConfig>,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub calls: CallsConfig,
    pub database: Option<DatabaseConfig>,
}

/// Log output format, same enum shape as the teacher's.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Node identity. `name` is this node's ring member name and also the value
/// every cluster RPC envelope carries as `node`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    /// Free-form label for metrics/logs (e.g. the deployment's data center).
    #[serde(default)]
    pub data_center: String,
    /// Prometheus metrics HTTP port. `0` or absent disables the endpoint.
    pub metrics_port: Option<u16>,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Max client protocol version string, echoed back in `{ctrl}` on `{hi}`.
    #[serde(default = "default_server_version")]
    pub version: String,
}

fn default_server_version() -> String {
    "0.1".to_string()
}

/// The cluster plane: this node's RPC listen address, the full peer set, and
/// ring/failover tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Address this node's `Cluster` RPC server binds to.
    pub listen: std::net::SocketAddr,
    /// Every *other* member of the cluster. An empty list means single-node.
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
    #[serde(default = "default_vnodes")]
    pub vnodes_per_node: u32,
    /// Fixed reconnect interval for a down `ClusterNode`, in milliseconds.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Failover ping interval, in milliseconds.
    #[serde(default = "default_failover_ping_interval_ms")]
    pub failover_ping_interval_ms: u64,
    /// Consecutive missed pings before a peer is declared down.
    #[serde(default = "default_failover_miss_threshold")]
    pub failover_miss_threshold: u32,
}

fn default_vnodes() -> u32 {
    20
}

fn default_reconnect_interval_ms() -> u64 {
    200
}

fn default_failover_ping_interval_ms() -> u64 {
    5_000
}

fn default_failover_miss_threshold() -> u32 {
    3
}

/// One other cluster member, named the way the teacher's `LinkBlock` names
/// an S2S peer, generalized: topicd peers are symmetric (no autoconnect
/// direction to configure — `ClusterNode` always dials every named peer).
#[derive(Debug, Clone, Deserialize)]
pub struct PeerConfig {
    pub name: String,
    pub address: std::net::SocketAddr,
}

/// SQLite persistence adapter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_default_is_pretty() {
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }
}
