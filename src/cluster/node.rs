//! `ClusterNode`: the outbound RPC client to one peer.
//!
//! Grounded in `sync::manager::SyncManager`'s per-peer reconnect loop, with
//! the S2S-specific TLS/handshake/burst machinery stripped out: the cluster
//! RPC plane is a flat length-delimited `rmp-serde` stream
//! (`wire_proto::codec::MsgPackCodec`) over plain TCP between trusted nodes
//! on a private network, not a federated transport, so there is no
//! handshake negotiation to mirror.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};
use wire_proto::codec::MsgPackCodec;
use wire_proto::rpc::{ClusterReq, ClusterResp, Envelope, UserCacheReq};

/// One call queued to the peer's reconnect-managed connection. The request
/// is pre-encoded as an envelope of the appropriate payload type; replies
/// come back as raw bytes that the caller decodes (`ClusterResp` for every
/// two-way RPC method this node issues).
enum Call {
    Master(Envelope<ClusterReq>, oneshot::Sender<Option<ClusterResp>>),
    TopicMaster(Envelope<ClusterReq>, oneshot::Sender<Option<ClusterResp>>),
    Route(Envelope<ClusterReq>, oneshot::Sender<Option<ClusterResp>>),
    UserCacheUpdate(Envelope<UserCacheReq>, oneshot::Sender<Option<ClusterResp>>),
    /// One-way: `Cluster.Proxy` / `Cluster.TopicProxy` carry no reply the
    /// caller waits on (spec.md §6: "unused" response column).
    Proxy(Vec<u8>),
    TopicProxy(Vec<u8>),
}

/// Wire-level request frame: a method tag plus its msgpack-encoded payload,
/// so one TCP stream can carry every RPC method symmetrically.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
struct Frame {
    method: &'static str,
    payload: Vec<u8>,
}

const RECONNECT_INTERVAL_DEFAULT: Duration = Duration::from_millis(200);

/// Outbound connection state to one other cluster member.
pub struct ClusterNode {
    pub name: String,
    addr: std::net::SocketAddr,
    connected: Arc<AtomicBool>,
    reconnecting: Arc<AtomicBool>,
    /// Fingerprint last observed for this peer; used to detect restarts
    /// (spec.md §4.4 step 2 of receiver-side checks, mirrored here so a
    /// caller can also notice *our* peer restarted between calls).
    pub remembered_fingerprint: Arc<AtomicU64>,
    call_tx: mpsc::Sender<Call>,
    done_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl ClusterNode {
    pub fn start(name: String, addr: std::net::SocketAddr, reconnect_interval: Duration, live_gauge: prometheus::IntGauge) -> Arc<Self> {
        let (call_tx, call_rx) = mpsc::channel(256);
        let (done_tx, done_rx) = oneshot::channel();
        let connected = Arc::new(AtomicBool::new(false));
        let reconnecting = Arc::new(AtomicBool::new(false));
        let remembered_fingerprint = Arc::new(AtomicU64::new(0));

        let node = Arc::new(ClusterNode {
            name: name.clone(),
            addr,
            connected: connected.clone(),
            reconnecting: reconnecting.clone(),
            remembered_fingerprint: remembered_fingerprint.clone(),
            call_tx,
            done_tx: Mutex::new(Some(done_tx)),
        });

        tokio::spawn(run_loop(name, addr, reconnect_interval, connected, reconnecting, call_rx, done_rx, live_gauge));
        node
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub async fn call_master(&self, req: Envelope<ClusterReq>) -> Option<ClusterResp> {
        let (tx, rx) = oneshot::channel();
        if self.call_tx.send(Call::Master(req, tx)).await.is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }

    pub async fn call_topic_master(&self, req: Envelope<ClusterReq>) -> Option<ClusterResp> {
        let (tx, rx) = oneshot::channel();
        if self.call_tx.send(Call::TopicMaster(req, tx)).await.is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }

    pub async fn call_route(&self, req: Envelope<ClusterReq>) -> Option<ClusterResp> {
        let (tx, rx) = oneshot::channel();
        if self.call_tx.send(Call::Route(req, tx)).await.is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }

    pub async fn call_user_cache_update(&self, req: Envelope<UserCacheReq>) -> Option<ClusterResp> {
        let (tx, rx) = oneshot::channel();
        if self.call_tx.send(Call::UserCacheUpdate(req, tx)).await.is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }

    pub async fn send_proxy(&self, payload: Vec<u8>) {
        let _ = self.call_tx.send(Call::Proxy(payload)).await;
    }

    pub async fn send_topic_proxy(&self, payload: Vec<u8>) {
        let _ = self.call_tx.send(Call::TopicProxy(payload)).await;
    }

    pub fn shutdown(&self) {
        if let Some(tx) = self.done_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    name: String,
    addr: std::net::SocketAddr,
    reconnect_interval: Duration,
    connected: Arc<AtomicBool>,
    reconnecting: Arc<AtomicBool>,
    mut call_rx: mpsc::Receiver<Call>,
    mut done_rx: oneshot::Receiver<()>,
    live_gauge: prometheus::IntGauge,
) {
    let mut stream: Option<Framed<TcpStream, MsgPackCodec<Frame>>> = None;

    loop {
        if stream.is_none() {
            reconnecting.store(true, Ordering::Relaxed);
            tokio::select! {
                _ = &mut done_rx => return,
                res = TcpStream::connect(addr) => {
                    match res {
                        Ok(tcp) => {
                            info!(peer = %name, %addr, "cluster node connected");
                            connected.store(true, Ordering::Relaxed);
                            reconnecting.store(false, Ordering::Relaxed);
                            live_gauge.inc();
                            stream = Some(Framed::new(tcp, MsgPackCodec::default()));
                        }
                        Err(e) => {
                            debug!(peer = %name, error = %e, "cluster node connect failed, will retry");
                            tokio::select! {
                                _ = tokio::time::sleep(reconnect_interval) => {}
                                _ = &mut done_rx => return,
                            }
                            continue;
                        }
                    }
                }
            }
        }

        let Some(framed) = stream.as_mut() else { continue };

        tokio::select! {
            _ = &mut done_rx => return,
            maybe_call = call_rx.recv() => {
                let Some(call) = maybe_call else { return };
                let outcome = match call {
                    Call::Master(req, reply) => send_and_await(framed, "Cluster.Master", &req, reply).await,
                    Call::TopicMaster(req, reply) => send_and_await(framed, "Cluster.TopicMaster", &req, reply).await,
                    Call::Route(req, reply) => send_and_await(framed, "Cluster.Route", &req, reply).await,
                    Call::UserCacheUpdate(req, reply) => send_and_await(framed, "Cluster.UserCacheUpdate", &req, reply).await,
                    Call::Proxy(payload) => send_one_way(framed, "Cluster.Proxy", payload).await,
                    Call::TopicProxy(payload) => send_one_way(framed, "Cluster.TopicProxy", payload).await,
                };
                if !outcome {
                    warn!(peer = %name, "cluster node call failed, reconnecting");
                    connected.store(false, Ordering::Relaxed);
                    live_gauge.dec();
                    stream = None;
                }
            }
        }
    }
}

async fn send_and_await<T: serde::Serialize>(
    framed: &mut Framed<TcpStream, MsgPackCodec<Frame>>,
    method: &'static str,
    req: &Envelope<T>,
    reply: oneshot::Sender<Option<ClusterResp>>,
) -> bool {
    let Ok(payload) = wire_proto::rpc::to_wire(req) else {
        let _ = reply.send(None);
        return true;
    };
    if framed.send(Frame { method, payload }).await.is_err() {
        let _ = reply.send(None);
        return false;
    }
    match framed.next().await {
        Some(Ok(frame)) => {
            let resp: Option<ClusterResp> = wire_proto::rpc::from_wire(&frame.payload).ok();
            let _ = reply.send(resp);
            true
        }
        _ => {
            let _ = reply.send(None);
            false
        }
    }
}

async fn send_one_way(framed: &mut Framed<TcpStream, MsgPackCodec<Frame>>, method: &'static str, payload: Vec<u8>) -> bool {
    framed.send(Frame { method, payload }).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_over_rmp() {
        let frame = Frame { method: "Cluster.Master", payload: vec![1, 2, 3] };
        let bytes = wire_proto::rpc::to_wire(&frame).unwrap();
        let back: Frame = wire_proto::rpc::from_wire(&bytes).unwrap();
        assert_eq!(back.method, "Cluster.Master");
        assert_eq!(back.payload, vec![1, 2, 3]);
    }
}
