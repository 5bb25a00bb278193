//! The cluster plane: ring maintenance, the inbound RPC server, routing
//! decisions, and (optionally) failover.
//!
//! Grounded in `sync::manager::SyncManager` (peer bookkeeping, per-peer
//! connection management) and `sync::topology::TopologyGraph` (membership
//! view), re-purposed from S2S hop routing to consistent-hash topic
//! ownership. The inbound side — accepting connections and dispatching
//! tagged RPC frames — mirrors `sync::network`'s accept loop, minus the
//! line-protocol/TLS negotiation a federated IRC link needs.

pub mod failover;
pub mod node;
pub mod ring;

pub use ring::Ring;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{info, warn};
use wire_proto::codec::MsgPackCodec;
use wire_proto::rpc::{ClusterReq, ClusterResp, Envelope, ProxyTopicMessage, UserCacheReq};

use crate::config::ClusterConfig;
use crate::hub::Hub;
use crate::session::SessionStore;
use node::ClusterNode;

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct Frame {
    pub method: String,
    pub payload: Vec<u8>,
}

/// The RPC server + routing brain for one node.
pub struct Cluster {
    self_name: String,
    listen_addr: SocketAddr,
    config: ClusterConfig,
    fingerprint: u64,
    ring: RwLock<Ring>,
    nodes: DashMap<String, Arc<ClusterNode>>,
    /// Fingerprint last observed per sender — detects a peer restart
    /// (spec.md §4.4: "remembered value nonzero and differs").
    peer_fingerprints: DashMap<String, u64>,
    active_nodes: RwLock<HashSet<String>>,
    hub: OnceLock<Weak<Hub>>,
    sessions: OnceLock<Weak<SessionStore>>,
    live_peers_gauge: prometheus::IntGauge,
    partitioned_gauge: prometheus::IntGauge,
    rpc_latency: prometheus::Histogram,
}

/// Monotonic per-process-start token. A plain counter would repeat across
/// restarts on the same machine; combining wall-clock nanos with a PID is
/// enough to make two runs of the same binary disagree (original `clusterInit`
/// uses the process start time for the same purpose).
fn compute_fingerprint() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0);
    let salt = COUNTER.fetch_add(1, Ordering::Relaxed);
    nanos ^ (std::process::id() as u64).rotate_left(32) ^ salt
}

impl Cluster {
    pub fn new(self_name: String, config: ClusterConfig) -> Arc<Self> {
        let mut ring = Ring::new(config.vnodes_per_node);
        let mut members: Vec<String> = config.peers.iter().map(|p| p.name.clone()).collect();
        members.push(self_name.clone());
        ring.set_members(members.clone());

        let live_peers_gauge = prometheus::IntGauge::new("topicd_cluster_live_peers", "Connected cluster peers").unwrap();
        let partitioned_gauge = prometheus::IntGauge::new("topicd_cluster_partitioned", "1 if this node is in the minority partition").unwrap();
        let rpc_latency = prometheus::Histogram::with_opts(prometheus::HistogramOpts::new(
            "topicd_cluster_rpc_latency_seconds",
            "Round-trip latency of outbound Cluster.* RPC calls",
        ))
        .unwrap();

        let cluster = Arc::new(Cluster {
            listen_addr: config.listen,
            self_name,
            fingerprint: compute_fingerprint(),
            ring: RwLock::new(ring),
            nodes: DashMap::new(),
            peer_fingerprints: DashMap::new(),
            active_nodes: RwLock::new(members.into_iter().collect()),
            hub: OnceLock::new(),
            sessions: OnceLock::new(),
            live_peers_gauge,
            partitioned_gauge,
            rpc_latency,
            config,
        });

        for peer in &cluster.config.peers {
            let live_gauge = cluster.live_peers_gauge.clone();
            let node = ClusterNode::start(
                peer.name.clone(),
                peer.address,
                std::time::Duration::from_millis(cluster.config.reconnect_interval_ms),
                live_gauge,
            );
            cluster.nodes.insert(peer.name.clone(), node);
        }

        cluster
    }

    /// Two-phase wiring: `Hub`/`SessionStore` are constructed after
    /// `Cluster` (they hold an `Arc<Cluster>`), so the back-reference is
    /// filled in once, right after both exist. Matches spec.md §9's
    /// "Runtime value threaded through constructors" guidance — this is the
    /// one exception, an atomic pointer RPC handlers reach through.
    pub fn bind_runtime(&self, hub: &Arc<Hub>, sessions: &Arc<SessionStore>) {
        let _ = self.hub.set(Arc::downgrade(hub));
        let _ = self.sessions.set(Arc::downgrade(sessions));
    }

    fn hub(&self) -> Option<Arc<Hub>> {
        self.hub.get().and_then(Weak::upgrade)
    }

    fn sessions(&self) -> Option<Arc<SessionStore>> {
        self.sessions.get().and_then(Weak::upgrade)
    }

    pub fn self_name(&self) -> &str {
        &self.self_name
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn signature(&self) -> String {
        self.ring.read().signature().to_string()
    }

    pub fn worker_id(&self) -> u8 {
        self.ring.read().worker_id(&self.self_name)
    }

    /// `None` is the explicit "topic is local" sentinel (spec.md §9 Open
    /// Question 2): `Ring.Get` returning our own name collapses to `None`
    /// rather than `Some(self_name)` so callers can match on it directly.
    pub fn node_for_topic(&self, name: &str) -> Option<String> {
        let ring = self.ring.read();
        match ring.get(name) {
            Some(owner) if owner == self.self_name => None,
            Some(owner) => Some(owner.to_string()),
            None => None,
        }
    }

    pub fn is_remote_topic(&self, name: &str) -> bool {
        self.node_for_topic(name).is_some()
    }

    /// Rejection-sample random topic names until one happens to hash to
    /// this node, for `{sub new}`/`{sub p2p...}` group/p2p creation.
    pub fn gen_local_topic_name(&self, prefix: &str) -> String {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        loop {
            let suffix: String = (0..10).map(|_| rng.sample(rand::distributions::Alphanumeric) as char).collect();
            let name = format!("{prefix}{suffix}");
            if self.node_for_topic(&name).is_none() {
                return name;
            }
        }
    }

    pub fn is_partitioned(&self) -> bool {
        let configured = self.config.peers.len() + 1;
        let active = self.active_nodes.read().len();
        Ring::is_partitioned(configured, active)
    }

    fn node(&self, name: &str) -> Option<Arc<ClusterNode>> {
        self.nodes.get(name).map(|n| n.clone())
    }

    fn envelope<T>(&self, payload: T) -> Envelope<T> {
        Envelope::new(self.self_name.clone(), self.signature(), self.fingerprint, payload)
    }

    // ---- outbound calls, one per spec.md §6 RPC method ----

    pub async fn call_master(&self, node_name: &str, req: ClusterReq) -> bool {
        let started = std::time::Instant::now();
        let result = match self.node(node_name) {
            Some(node) => node.call_master(self.envelope(req)).await.map(|r| r.rejected).unwrap_or(true),
            None => true,
        };
        self.rpc_latency.observe(started.elapsed().as_secs_f64());
        result
    }

    pub async fn call_topic_master(&self, node_name: &str, req: ClusterReq) -> bool {
        let started = std::time::Instant::now();
        let result = match self.node(node_name) {
            Some(node) => node.call_topic_master(self.envelope(req)).await.map(|r| r.rejected).unwrap_or(true),
            None => true,
        };
        self.rpc_latency.observe(started.elapsed().as_secs_f64());
        result
    }

    pub async fn call_route(&self, node_name: &str, req: ClusterReq) -> bool {
        let started = std::time::Instant::now();
        let result = match self.node(node_name) {
            Some(node) => node.call_route(self.envelope(req)).await.map(|r| r.rejected).unwrap_or(true),
            None => true,
        };
        self.rpc_latency.observe(started.elapsed().as_secs_f64());
        result
    }

    pub async fn call_user_cache_update(&self, node_name: &str, req: UserCacheReq) -> bool {
        let started = std::time::Instant::now();
        let result = match self.node(node_name) {
            Some(node) => node.call_user_cache_update(self.envelope(req)).await.map(|r| r.rejected).unwrap_or(true),
            None => true,
        };
        self.rpc_latency.observe(started.elapsed().as_secs_f64());
        result
    }

    pub async fn send_proxy(&self, node_name: &str, resp: wire_proto::rpc::ProxyResp) {
        if let Some(node) = self.node(node_name)
            && let Ok(bytes) = wire_proto::rpc::to_wire(&resp)
        {
            node.send_proxy(bytes).await;
        }
    }

    pub async fn send_topic_proxy(&self, node_name: &str, resp: wire_proto::rpc::TopicProxyResp) {
        if let Some(node) = self.node(node_name)
            && let Ok(bytes) = wire_proto::rpc::to_wire(&resp)
        {
            node.send_topic_proxy(bytes).await;
        }
    }

    /// Rehash over exactly `members` (used both at init and by failover).
    pub fn rehash(&self, members: Vec<String>) {
        self.ring.write().set_members(members);
        info!(signature = %self.signature(), "cluster ring rehashed");
    }

    /// Live peer count, for the liveness gauge the teacher's `metrics.rs`
    /// pattern would expose.
    pub fn live_peer_count(&self) -> i64 {
        self.nodes.iter().filter(|n| n.is_connected()).count() as i64
    }

    pub fn update_partition_gauge(&self) {
        self.partitioned_gauge.set(if self.is_partitioned() { 1 } else { 0 });
    }

    /// Exposes the gauges constructed in [`Cluster::new`] so `metrics::init`
    /// can register them with the process-wide Prometheus registry.
    pub fn prometheus_gauges(&self) -> (prometheus::IntGauge, prometheus::IntGauge) {
        (self.live_peers_gauge.clone(), self.partitioned_gauge.clone())
    }

    pub fn prometheus_rpc_latency(&self) -> prometheus::Histogram {
        self.rpc_latency.clone()
    }

    // ---- inbound RPC server ----

    pub async fn serve(self: Arc<Self>) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        info!(addr = %self.listen_addr, "cluster RPC listener bound");
        loop {
            let (socket, peer_addr) = listener.accept().await?;
            let cluster = self.clone();
            tokio::spawn(async move {
                if let Err(e) = cluster.serve_conn(socket).await {
                    warn!(%peer_addr, error = %e, "cluster RPC connection ended");
                }
            });
        }
    }

    async fn serve_conn(self: Arc<Self>, socket: TcpStream) -> std::io::Result<()> {
        let mut framed = Framed::new(socket, MsgPackCodec::<Frame>::default());
        while let Some(frame) = framed.next().await {
            let frame = frame?;
            if let Some(resp) = self.dispatch(&frame).await {
                framed.send(resp).await?;
            }
        }
        Ok(())
    }

    /// Common signature/fingerprint check every inbound envelope goes
    /// through before its payload is honored (spec.md §4.4, §4.5).
    fn admit<T>(&self, env: &Envelope<T>) -> bool {
        if env.signature != self.signature() {
            warn!(from = %env.node, "ring signature mismatch, rejecting cluster RPC");
            return false;
        }
        let remembered = self.peer_fingerprints.get(&env.node).map(|r| *r);
        if let Some(prev) = remembered
            && prev != 0
            && prev != env.fingerprint
            && let Some(sessions) = self.sessions()
        {
            info!(node = %env.node, "peer fingerprint changed, sweeping stale proxy sessions");
            sessions.node_restarted(&env.node, env.fingerprint);
        }
        self.peer_fingerprints.insert(env.node.clone(), env.fingerprint);
        true
    }

    async fn dispatch(&self, frame: &Frame) -> Option<Frame> {
        match frame.method.as_str() {
            "Cluster.Master" => {
                let env: Envelope<ClusterReq> = wire_proto::rpc::from_wire(&frame.payload).ok()?;
                let rejected = if !self.admit(&env) {
                    true
                } else {
                    self.handle_master(env.node.clone(), env.payload).await
                };
                Some(self.wrap_resp(rejected))
            }
            "Cluster.TopicMaster" => {
                let env: Envelope<ClusterReq> = wire_proto::rpc::from_wire(&frame.payload).ok()?;
                let rejected = if !self.admit(&env) {
                    true
                } else {
                    self.handle_topic_master(env.node.clone(), env.payload).await
                };
                Some(self.wrap_resp(rejected))
            }
            "Cluster.Route" => {
                let env: Envelope<ClusterReq> = wire_proto::rpc::from_wire(&frame.payload).ok()?;
                let rejected = if !self.admit(&env) { true } else { self.handle_route(env.node.clone(), env.payload).await };
                Some(self.wrap_resp(rejected))
            }
            "Cluster.UserCacheUpdate" => {
                let env: Envelope<UserCacheReq> = wire_proto::rpc::from_wire(&frame.payload).ok()?;
                let rejected = if !self.admit(&env) {
                    true
                } else {
                    crate::usercache::handle_remote_update(&env.payload);
                    false
                };
                Some(self.wrap_resp(rejected))
            }
            "Cluster.Proxy" => {
                let resp: wire_proto::rpc::ProxyResp = wire_proto::rpc::from_wire(&frame.payload).ok()?;
                if let Some(sessions) = self.sessions() {
                    sessions.deliver_proxy_response(resp).await;
                }
                None
            }
            "Cluster.TopicProxy" => {
                let resp: wire_proto::rpc::TopicProxyResp = wire_proto::rpc::from_wire(&frame.payload).ok()?;
                if let Some(hub) = self.hub() {
                    hub.deliver_topic_proxy_response(resp).await;
                }
                None
            }
            other => {
                warn!(method = other, "unknown cluster RPC method");
                None
            }
        }
    }

    fn wrap_resp(&self, rejected: bool) -> Frame {
        let resp = ClusterResp { rejected };
        Frame { method: "resp".into(), payload: wire_proto::rpc::to_wire(&resp).unwrap_or_default() }
    }

    /// `Cluster.Master`: a proxy forwarding a session-level message for a
    /// topic this node masters (today: join requests bearing a session
    /// snapshot; `Hub::join` does the rest).
    async fn handle_master(&self, from_node: String, req: ClusterReq) -> bool {
        let Some(hub) = self.hub() else { return true };
        hub.remote_join(from_node, req).await.is_err()
    }

    /// `Cluster.TopicMaster`: a topic-proxy forwarding a mutating operation
    /// to the topic actor this node masters.
    async fn handle_topic_master(&self, from_node: String, req: ClusterReq) -> bool {
        let Some(hub) = self.hub() else { return true };
        let Some(topic_msg) = req.topic_msg else { return true };
        let topic_name = topic_name_of(&topic_msg);
        hub.forward_to_master(from_node, &topic_name, req.sess.sid.clone(), topic_msg).await.is_err()
    }

    /// `Cluster.Route`: intra-cluster routing of a server message to its
    /// topic's node, used for orphan/offline delivery (Hub's `route`).
    async fn handle_route(&self, from_node: String, req: ClusterReq) -> bool {
        let Some(hub) = self.hub() else { return true };
        let Some(srv_msg) = req.srv_msg else { return true };
        hub.route_remote(from_node, req.sess, srv_msg).await.is_err()
    }

    /// Failover subsystem entry point: recompute `active_nodes` and rehash.
    pub fn set_active_nodes(&self, active: HashSet<String>) {
        *self.active_nodes.write() = active.clone();
        let mut members: Vec<String> = active.into_iter().collect();
        members.sort();
        self.rehash(members);
        self.update_partition_gauge();
    }

    pub fn active_nodes(&self) -> HashSet<String> {
        self.active_nodes.read().clone()
    }

    pub fn peer_names(&self) -> Vec<String> {
        self.config.peers.iter().map(|p| p.name.clone()).collect()
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }
}

fn topic_name_of(msg: &ProxyTopicMessage) -> String {
    match msg {
        ProxyTopicMessage::Join(j) => j.topic.clone(),
        ProxyTopicMessage::Broadcast(b) => b.topic.clone(),
        ProxyTopicMessage::Meta(m) => m.topic.clone(),
        ProxyTopicMessage::Leave(l) => l.topic.clone(),
        ProxyTopicMessage::UaChange(u) => u.topic.clone(),
        ProxyTopicMessage::DeferredNotification(d) => d.topic.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeerConfig;

    fn test_config() -> ClusterConfig {
        ClusterConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            peers: vec![PeerConfig { name: "n2".into(), address: "127.0.0.1:1".parse().unwrap() }],
            vnodes_per_node: 20,
            reconnect_interval_ms: 200,
            failover_ping_interval_ms: 5000,
            failover_miss_threshold: 3,
        }
    }

    #[test]
    fn local_topic_resolves_to_none() {
        let cluster = Cluster::new("n1".into(), test_config());
        // with n1/n2 in the ring, some keys land on n1 (None) and some on n2 (Some)
        let mut saw_local = false;
        let mut saw_remote = false;
        for i in 0..200 {
            match cluster.node_for_topic(&format!("grp{i}")) {
                None => saw_local = true,
                Some(_) => saw_remote = true,
            }
        }
        assert!(saw_local && saw_remote);
    }

    #[test]
    fn gen_local_topic_name_always_resolves_locally() {
        let cluster = Cluster::new("n1".into(), test_config());
        let name = cluster.gen_local_topic_name("grp");
        assert!(cluster.node_for_topic(&name).is_none());
        assert!(name.starts_with("grp"));
    }

    #[test]
    fn single_node_cluster_is_never_partitioned() {
        let cluster = Cluster::new("solo".into(), ClusterConfig { peers: vec![], ..test_config() });
        assert!(!cluster.is_partitioned());
    }
}
