//! Prometheus metrics for topicd.
//!
//! Mirrors the teacher's single global `Registry` plus `lazy_static`
//! counters/gauges, narrowed to what this actor model can actually observe:
//! live topics and sessions on this node, cluster peer liveness/partition
//! status (gauges already owned by [`crate::cluster::Cluster`], registered
//! here), and outbound RPC latency.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

use crate::cluster::Cluster;
use crate::hub::Hub;
use crate::session::SessionStore;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    /// Locally-mastered topics with a running actor.
    pub static ref TOPICS_LIVE: IntGauge = IntGauge::new(
        "topicd_topics_live",
        "Topic actors currently running on this node"
    ).unwrap();

    /// Locally-terminated client sessions (any transport).
    pub static ref SESSIONS_LIVE: IntGauge = IntGauge::new(
        "topicd_sessions_live",
        "Client sessions currently attached to this node"
    ).unwrap();

    /// Sessions another node has attached to a topic this node masters.
    pub static ref CLUSTER_PROXY_SESSIONS: IntGauge = IntGauge::new(
        "topicd_cluster_proxy_sessions",
        "Remote sessions currently attached to topics this node masters"
    ).unwrap();
}

/// Registers the process-wide counters/gauges plus the ones
/// [`Cluster`] already owns (`live_peers`, `partitioned`, `rpc_latency`).
/// Call once at startup, before any metric is recorded.
pub fn init(cluster: &Cluster) {
    REGISTRY.register(Box::new(TOPICS_LIVE.clone())).unwrap();
    REGISTRY.register(Box::new(SESSIONS_LIVE.clone())).unwrap();
    REGISTRY.register(Box::new(CLUSTER_PROXY_SESSIONS.clone())).unwrap();

    let (live_peers, partitioned) = cluster.prometheus_gauges();
    REGISTRY.register(Box::new(live_peers)).unwrap();
    REGISTRY.register(Box::new(partitioned)).unwrap();
    REGISTRY.register(Box::new(cluster.prometheus_rpc_latency())).unwrap();
}

/// Refreshes the sampled gauges from live state. Spawned as a periodic
/// background task next to the other long-lived loops in `main`.
pub fn sample(hub: &Hub, sessions: &SessionStore) {
    TOPICS_LIVE.set(hub.topic_count() as i64);
    SESSIONS_LIVE.set(sessions.count() as i64);
    CLUSTER_PROXY_SESSIONS.set(hub.remote_proxy_session_count() as i64);
}

/// Spawns the periodic sampler. One instance per process.
pub fn spawn_sampler(hub: Arc<Hub>, sessions: Arc<SessionStore>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(10));
        loop {
            ticker.tick().await;
            sample(&hub, &sessions);
        }
    });
}

/// Gathers and encodes every registered metric in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
