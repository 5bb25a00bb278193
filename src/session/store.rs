//! `SessionStore`: process-wide registry of locally-terminated sessions,
//! keyed by session id.
//!
//! Grounded in `state/matrix.rs`'s client-handle map: a concurrent map from
//! connection id to its outbound half, generalized from IRC nicknames to
//! opaque session ids, with the two cleanup hooks the cluster layer and
//! `Failover` already call against it.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};
use wire_proto::client::ServerMsg;
use wire_proto::rpc::ProxyResp;
use wire_proto::uid::Uid;

use crate::cluster::Cluster;

struct SessionEntry {
    uid: Uid,
    outbound: mpsc::Sender<ServerMsg>,
}

pub struct SessionStore {
    sessions: DashMap<String, SessionEntry>,
    cluster: Arc<Cluster>,
}

impl SessionStore {
    pub fn new(cluster: Arc<Cluster>) -> Arc<Self> {
        Arc::new(SessionStore { sessions: DashMap::new(), cluster })
    }

    /// Registers (or re-registers, after a successful `{login}`) the
    /// connection's outbound channel under its session id.
    pub fn register(&self, sid: String, uid: Uid, outbound: mpsc::Sender<ServerMsg>) {
        self.sessions.insert(sid, SessionEntry { uid, outbound });
    }

    pub fn remove(&self, sid: &str) {
        self.sessions.remove(sid);
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn uid_of(&self, sid: &str) -> Option<Uid> {
        self.sessions.get(sid).map(|e| e.uid)
    }

    pub fn outbound(&self, sid: &str) -> Option<mpsc::Sender<ServerMsg>> {
        self.sessions.get(sid).map(|e| e.outbound.clone())
    }

    /// `Cluster.Proxy` inbound: a remote topic master replying to one of our
    /// sessions that it proxies through that node (spec.md §6: this RPC
    /// carries no response the caller waits on, it's a fire-and-forget
    /// delivery back to session-local state).
    pub async fn deliver_proxy_response(&self, resp: ProxyResp) {
        if let Some(out) = self.outbound(&resp.from_sid) {
            let _ = out.send(resp.srv_msg).await;
        } else {
            debug!(sid = %resp.from_sid, "proxy response for unknown local session, dropped");
        }
    }

    /// A peer's fingerprint changed between two envelopes (spec.md §4.4):
    /// it restarted and forgot whatever proxy subscriptions it used to hold
    /// on our behalf. Local sessions here are unaffected by a remote
    /// restart — this is only a bookkeeping/observability hook; the actual
    /// teardown of stale master-side state lives in
    /// `Hub::invalidate_proxies_of_node`, spawned separately from
    /// `Cluster::admit`.
    pub fn node_restarted(&self, node: &str, fingerprint: u64) {
        info!(node = %node, fingerprint, "cluster peer restarted, proxy bookkeeping invalidated");
    }

    /// Failover: local sessions are not tied to any one cluster node's
    /// availability, so there's nothing to reclaim here today. Kept as the
    /// named hook spec.md §4.5 expects `Failover` to call after a
    /// membership change, in case that stops being true (e.g. once a
    /// connection affinity scheme is added).
    pub fn garbage_collect_proxy_sessions(&self, active: &HashSet<String>) {
        let _ = active;
        debug!(sessions = self.sessions.len(), "session store GC pass (local sessions are node-independent)");
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }
}
