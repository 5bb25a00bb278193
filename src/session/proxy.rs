//! Bookkeeping for sessions a peer node has attached to topics we master.
//!
//! A `ClusterProxySession` isn't a connection of its own — the connection
//! lives on the origin node, and `Hub::spawn_proxy_forwarder` already does
//! the actual delivery back across `Cluster.Proxy`. This registry is the
//! observability/GC layer spec.md §4.3 expects to sit next to that: a
//! record of which `(origin_node, sid)` pairs are currently attached here,
//! so a dead peer's entries don't linger forever and `/metrics` can report
//! how many cluster-proxy sessions this node is carrying.
//!
//! Grounded in `state/matrix.rs`'s client registry, narrowed to the remote
//! half: instead of an outbound channel, each entry carries only what the
//! master side already has about the origin (`uid`, `is_background`) plus a
//! last-touched timestamp.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info};
use wire_proto::uid::Uid;

use crate::cluster::Cluster;

const SWEEP_INTERVAL: Duration = Duration::from_secs(5);
/// An entry surviving three sweeps with no touch and a node that's gone
/// from the active set is almost certainly a restarted or partitioned peer
/// that will never send a matching leave.
const STALE_AFTER: Duration = Duration::from_secs(15);

#[derive(Clone, Copy, Debug)]
struct ProxyRecord {
    uid: Uid,
    is_background: bool,
    last_seen: Instant,
}

/// Keyed by `(origin_node, sid)` — the same pair `Hub::remote_join` already
/// uses to name a forwarder task.
#[derive(Default)]
pub struct ClusterProxyRegistry {
    sessions: DashMap<(String, String), ProxyRecord>,
}

impl ClusterProxyRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(ClusterProxyRegistry { sessions: DashMap::new() })
    }

    /// Record (or refresh) a remote session attaching through us. Called
    /// once per `Cluster.Master` join; there is no per-message heartbeat, so
    /// `last_seen` is really "last (re)joined", not "last active".
    pub fn touch(&self, origin_node: &str, sid: &str, uid: Uid, is_background: bool) {
        self.sessions.insert((origin_node.to_string(), sid.to_string()), ProxyRecord { uid, is_background, last_seen: Instant::now() });
    }

    pub fn remove(&self, origin_node: &str, sid: &str) {
        self.sessions.remove(&(origin_node.to_string(), sid.to_string()));
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Drops every entry whose origin node fell out of the active set, plus
    /// any entry that's outlived `STALE_AFTER` regardless (a join that was
    /// immediately followed by silence, e.g. an aborted handshake).
    fn sweep(&self, active_nodes: &std::collections::HashSet<String>) {
        let now = Instant::now();
        let stale: Vec<(String, String)> = self
            .sessions
            .iter()
            .filter(|e| !active_nodes.contains(&e.key().0) || now.duration_since(e.value().last_seen) > STALE_AFTER)
            .map(|e| e.key().clone())
            .collect();
        for key in &stale {
            self.sessions.remove(key);
        }
        if !stale.is_empty() {
            debug!(dropped = stale.len(), remaining = self.sessions.len(), "cluster-proxy session bookkeeping swept");
        }
    }

    /// Spawns the periodic sweep. One instance per process, started next to
    /// `Hub::spawn`.
    pub fn spawn_sweeper(self: Arc<Self>, cluster: Arc<Cluster>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                self.sweep(&cluster.active_nodes());
            }
        });
        info!("cluster-proxy session bookkeeping sweeper started");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_then_remove_round_trips() {
        let registry = ClusterProxyRegistry::new();
        registry.touch("node-b", "sid-1", Uid(7), false);
        assert_eq!(registry.count(), 1);
        registry.remove("node-b", "sid-1");
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn sweep_drops_entries_from_inactive_nodes() {
        let registry = ClusterProxyRegistry::new();
        registry.touch("node-gone", "sid-1", Uid(7), false);
        registry.touch("node-live", "sid-2", Uid(8), false);
        let active: std::collections::HashSet<String> = ["node-live".to_string()].into_iter().collect();
        registry.sweep(&active);
        assert_eq!(registry.count(), 1);
    }
}
