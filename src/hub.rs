//! `Hub`: the process-wide topic registry and the seam between the cluster
//! RPC plane and locally running topic actors.
//!
//! Grounded in `state/matrix.rs`'s channel registry: a concurrent map from
//! name to actor handle, load-or-create on first touch, and a single place
//! that knows how to route a request to "the topic" regardless of whether
//! that topic happens to live on this node or a peer's.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use wire_proto::client::{Ctrl, Meta, RequestId, ServerMsg, TopicDesc};
use wire_proto::rpc::{ClusterReq, ProxyResp, ProxyTopicMessage, TopicProxyResp};
use wire_proto::uid::Uid;

use crate::cluster::Cluster;
use crate::db::Database;
use crate::error::{TopicError, TopicResult};
use crate::session::proxy::ClusterProxyRegistry;
use crate::topic::{self, AccessMode, SessionJoin, Topic, TopicEvent, TopicHandle};

/// Control-plane events a topic actor (or the failover subsystem) sends back
/// to the hub, outside the request/response RPC shape the topic mailbox
/// otherwise uses.
pub enum HubEvent {
    /// A topic actor is exiting (idle timeout, or `{del what=topic}`
    /// completed) and must be removed from the registry before it's gone.
    Unreg { name: String, reply: oneshot::Sender<()> },
}

/// `node` for a topic-proxy we spawned locally, so failover's
/// `invalidate_proxy_subs` can find proxies whose master went away.
struct ProxyEntry {
    master_node: String,
}

pub struct Hub {
    topics: DashMap<String, mpsc::Sender<TopicEvent>>,
    proxies: DashMap<String, ProxyEntry>,
    db: Database,
    cluster: Arc<Cluster>,
    event_tx: mpsc::Sender<HubEvent>,
    /// Bookkeeping for sessions peer nodes have attached to topics we
    /// master; see [`crate::session::proxy`].
    remote_sessions: Arc<ClusterProxyRegistry>,
    /// Threaded into every topic actor this hub spawns, as its call
    /// establishment timer (spec.md §4.8).
    call_timeout: std::time::Duration,
}

impl Hub {
    pub fn spawn(db: Database, cluster: Arc<Cluster>, call_timeout: std::time::Duration) -> Arc<Hub> {
        let (event_tx, event_rx) = mpsc::channel(256);
        let remote_sessions = ClusterProxyRegistry::new();
        remote_sessions.clone().spawn_sweeper(cluster.clone());
        let hub = Arc::new(Hub {
            topics: DashMap::new(),
            proxies: DashMap::new(),
            db,
            cluster,
            event_tx,
            remote_sessions,
            call_timeout,
        });
        tokio::spawn(Hub::run_events(hub.clone(), event_rx));
        hub
    }

    /// Count of remote sessions currently attached to topics this node
    /// masters, exposed for `/metrics`.
    pub fn remote_proxy_session_count(&self) -> usize {
        self.remote_sessions.count()
    }

    async fn run_events(hub: Arc<Hub>, mut rx: mpsc::Receiver<HubEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                HubEvent::Unreg { name, reply } => {
                    hub.topics.remove(&name);
                    hub.proxies.remove(&name);
                    debug!(topic = %name, "hub deregistered topic");
                    let _ = reply.send(());
                }
            }
        }
    }

    pub fn event_sender(&self) -> mpsc::Sender<HubEvent> {
        self.event_tx.clone()
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Load-or-create the local actor for `name`. Callers must already know
    /// this node masters `name` (or are intentionally spawning a proxy via
    /// `spawn_proxy`); resolving category/ownership from a bare client
    /// request is a session-layer concern.
    async fn topic_init_or_get(&self, name: &str, original: &str, requester: Uid) -> TopicResult<mpsc::Sender<TopicEvent>> {
        if let Some(existing) = self.topics.get(name) {
            return Ok(existing.value().clone());
        }

        if self.db.topics().get(name).await.map_err(|e| TopicError::Internal(e.to_string()))?.is_none() {
            let cat = topic::category_from_name(name);
            let (acc_auth, acc_anon) = topic::access::default_access(cat);
            let owner = if cat == topic::TopicCategory::Grp { requester } else { Uid::ZERO };
            self.db.topics().create(name, owner, acc_auth, acc_anon).await.map_err(|e| TopicError::Internal(e.to_string()))?;
        }

        let sender = Topic::spawn(
            name.to_string(),
            original.to_string(),
            requester,
            self.db.clone(),
            self.cluster.clone(),
            self.event_tx.clone(),
            None,
            self.call_timeout,
        );
        self.topics.insert(name.to_string(), sender.clone());
        info!(topic = %name, "hub spawned local topic actor");
        Ok(sender)
    }

    fn spawn_proxy(&self, name: &str, master_node: String, requester: Uid) -> mpsc::Sender<TopicEvent> {
        let sender = Topic::spawn(
            name.to_string(),
            name.to_string(),
            requester,
            self.db.clone(),
            self.cluster.clone(),
            self.event_tx.clone(),
            Some(master_node.clone()),
            self.call_timeout,
        );
        self.topics.insert(name.to_string(), sender.clone());
        self.proxies.insert(name.to_string(), ProxyEntry { master_node });
        sender
    }

    /// A local session's `{sub}`: join `name`, transparently proxying to the
    /// owning node when `Cluster.node_for_topic` says it isn't us.
    pub async fn join(
        &self,
        name: &str,
        original: &str,
        requester: Uid,
        want_mode: Option<AccessMode>,
        sid: String,
        id: Option<wire_proto::client::RequestId>,
        outbound: mpsc::Sender<ServerMsg>,
    ) -> TopicResult<TopicHandle> {
        match self.cluster.node_for_topic(name) {
            None => {
                let mailbox = self.topic_init_or_get(name, original, requester).await?;
                let (reply_tx, reply_rx) = oneshot::channel();
                mailbox
                    .send(TopicEvent::Join(SessionJoin { id, sid, uid: requester, want_mode, outbound, reply: reply_tx }))
                    .await
                    .map_err(|_| TopicError::TopicNotFound(name.to_string()))?;
                reply_rx.await.map_err(|_| TopicError::Internal("topic actor dropped join reply".into()))?
            }
            Some(master) => {
                let mailbox = match self.topics.get(name) {
                    Some(existing) => existing.value().clone(),
                    None => self.spawn_proxy(name, master.clone(), requester),
                };

                let req = ClusterReq {
                    cli_msg: None,
                    srv_msg: None,
                    topic_msg: Some(ProxyTopicMessage::Join(wire_proto::rpc::JoinReq {
                        topic: name.to_string(),
                        sess: wire_proto::rpc::SessionRef {
                            sid: sid.clone(),
                            uid: requester,
                            auth_lvl: 0,
                            is_background: false,
                            user_agent: String::new(),
                            remote_addr: String::new(),
                            lang: String::new(),
                        },
                        want_mode,
                    })),
                    sess: wire_proto::rpc::SessionRef {
                        sid: sid.clone(),
                        uid: requester,
                        auth_lvl: 0,
                        is_background: false,
                        user_agent: String::new(),
                        remote_addr: String::new(),
                        lang: String::new(),
                    },
                    rcpt_to: None,
                    done: false,
                };

                if self.cluster.call_master(&master, req).await {
                    return Err(TopicError::ClusterDesync);
                }

                let (reply_tx, reply_rx) = oneshot::channel();
                mailbox
                    .send(TopicEvent::Join(SessionJoin { id, sid, uid: requester, want_mode, outbound, reply: reply_tx }))
                    .await
                    .map_err(|_| TopicError::TopicNotFound(name.to_string()))?;
                reply_rx.await.map_err(|_| TopicError::Internal("proxy actor dropped join reply".into()))?
            }
        }
    }

    /// `Cluster.Master` inbound: a proxy forwarded a session's join to us,
    /// the master. Joins the synthesized remote session into the local
    /// topic actor and wires its outbound replies back over `Cluster.Proxy`.
    pub async fn remote_join(&self, from_node: String, req: ClusterReq) -> TopicResult<()> {
        let Some(ProxyTopicMessage::Join(join)) = req.topic_msg else {
            return Err(TopicError::Malformed("Cluster.Master requires a Join payload".into()));
        };
        let mailbox = self.topic_init_or_get(&join.topic, &join.topic, join.sess.uid).await?;
        self.remote_sessions.touch(&from_node, &join.sess.sid, join.sess.uid, join.sess.is_background);
        let outbound = self.spawn_proxy_forwarder(from_node, join.sess.sid.clone());

        let (reply_tx, reply_rx) = oneshot::channel();
        mailbox
            .send(TopicEvent::Join(SessionJoin {
                // The origin's real sub request id doesn't cross the wire in
                // `JoinReq` today; the origin already received its ctrl ack
                // from its own local topic-proxy's `handle_join`, so this
                // synthesized join's ctrl (delivered back over
                // `Cluster.Proxy`) only needs to be harmless, not correlated.
                id: None,
                sid: join.sess.sid.clone(),
                uid: join.sess.uid,
                want_mode: join.want_mode,
                outbound,
                reply: reply_tx,
            }))
            .await
            .map_err(|_| TopicError::TopicNotFound(join.topic.clone()))?;
        reply_rx.await.map_err(|_| TopicError::Internal("topic actor dropped remote join reply".into()))?
    }

    /// `Cluster.TopicMaster` inbound: a proxy forwarded a mutating op
    /// (broadcast/meta/leave/...) to the topic actor we master.
    pub async fn forward_to_master(&self, from_node: String, topic_name: &str, sid: String, msg: ProxyTopicMessage) -> TopicResult<()> {
        let mailbox = self.topics.get(topic_name).map(|e| e.value().clone()).ok_or_else(|| TopicError::TopicNotFound(topic_name.to_string()))?;
        let _ = sid;
        let (reply_tx, reply_rx) = oneshot::channel();
        mailbox
            .send(TopicEvent::MasterReq { from_node, msg, reply: reply_tx })
            .await
            .map_err(|_| TopicError::TopicNotFound(topic_name.to_string()))?;
        reply_rx.await.map_err(|_| TopicError::Internal("topic actor dropped master-req reply".into()))?
    }

    /// `Cluster.Route`: hand an already-addressed server message to whatever
    /// locally-mastered topic it names (used for orphan/offline delivery —
    /// a sender's own node doesn't master the destination topic). When the
    /// target is an unloaded `me` topic and the payload is persistable
    /// `{data}`, it's written directly to storage with a freshly assigned
    /// seq and acknowledged `{ctrl 202}` rather than dropped as not-found
    /// (spec.md §4.6 `route`).
    pub async fn route_remote(&self, from_node: String, sess: wire_proto::rpc::SessionRef, srv_msg: ServerMsg) -> TopicResult<()> {
        let Some(topic_name) = server_msg_topic(&srv_msg).map(str::to_string) else {
            return Err(TopicError::Malformed("routed message carries no topic".into()));
        };

        if let Some(mailbox) = self.topics.get(&topic_name).map(|e| e.value().clone()) {
            return mailbox
                .send(TopicEvent::ProxyResp(TopicProxyResp {
                    srv_msg,
                    orig_request_type: wire_proto::rpc::ProxyRequestType::DeferredNotification,
                    from_sid: String::new(),
                    rcpt_to: None,
                    uid: Uid::ZERO,
                    is_background: false,
                }))
                .await
                .map_err(|_| TopicError::TopicNotFound(topic_name.clone()));
        }

        if topic::category_from_name(&topic_name) == topic::TopicCategory::Me {
            if let ServerMsg::Data(data) = &srv_msg {
                let from = data.from.unwrap_or(Uid::ZERO);
                self.persist_offline_data(&topic_name, from, &data.content).await?;
                self.cluster
                    .send_proxy(&from_node, wire_proto::rpc::ProxyResp {
                        srv_msg: ServerMsg::Ctrl(Ctrl::accepted(None, Some(topic_name))),
                        from_sid: sess.sid,
                    })
                    .await;
                return Ok(());
            }
        }

        Err(TopicError::TopicNotFound(topic_name))
    }

    /// Writes a `{data}` payload directly to storage for a `me` topic that
    /// has no live actor, assigning the next seq and advancing the topic's
    /// `lastId` the same way `Topic::handle_broadcast` would.
    async fn persist_offline_data(&self, name: &str, from: Uid, content: &serde_json::Value) -> TopicResult<i64> {
        let record = self
            .db
            .topics()
            .get(name)
            .await
            .map_err(|e| TopicError::Internal(e.to_string()))?
            .ok_or_else(|| TopicError::TopicNotFound(name.to_string()))?;
        let seq = record.last_id + 1;
        self.db.messages().insert(name, seq, from, content).await.map_err(|e| TopicError::Internal(e.to_string()))?;
        self.db.topics().bump_seq(name, seq, record.clear_id).await.map_err(|e| TopicError::Internal(e.to_string()))?;
        Ok(seq)
    }

    /// Hub's `replyTopicDescBasic`: answer `{get desc}` for a topic with no
    /// live actor straight from storage, without joining the requester.
    pub async fn offline_meta(&self, name: &str, get_id: Option<RequestId>) -> TopicResult<Meta> {
        let (public, created, updated) = self
            .db
            .topics()
            .basic_desc(name)
            .await
            .map_err(|e| TopicError::Internal(e.to_string()))?
            .ok_or_else(|| TopicError::TopicNotFound(name.to_string()))?;
        Ok(Meta {
            id: get_id,
            topic: name.to_string(),
            desc: Some(TopicDesc {
                created: chrono::DateTime::from_timestamp(created, 0),
                updated: chrono::DateTime::from_timestamp(updated, 0),
                public,
                private: None,
                acc_auth: None,
                acc_anon: None,
                seq: 0,
            }),
            sub: Vec::new(),
            tags: Vec::new(),
        })
    }

    /// `Cluster.TopicProxy` inbound: the master's authoritative fanout,
    /// delivered to our local proxy actor for the named topic.
    pub async fn deliver_topic_proxy_response(&self, resp: TopicProxyResp) {
        let Some(topic_name) = server_msg_topic(&resp.srv_msg).map(str::to_string) else {
            warn!("Cluster.TopicProxy payload carries no topic, dropped");
            return;
        };
        if let Some(mailbox) = self.topics.get(&topic_name).map(|e| e.value().clone()) {
            let _ = mailbox.send(TopicEvent::ProxyResp(resp)).await;
        }
    }

    /// Spawns a small forwarding task that turns local `ServerMsg` sends
    /// into `Cluster.Proxy` calls back to the originating node — the
    /// "outbound" half of a session that only the master's `Topic` knows
    /// about as a remote.
    fn spawn_proxy_forwarder(&self, to_node: String, from_sid: String) -> mpsc::Sender<ServerMsg> {
        let (tx, mut rx) = mpsc::channel(64);
        let cluster = self.cluster.clone();
        tokio::spawn(async move {
            while let Some(srv_msg) = rx.recv().await {
                cluster.send_proxy(&to_node, ProxyResp { srv_msg, from_sid: from_sid.clone() }).await;
            }
        });
        tx
    }

    /// Failover: tell every local topic-proxy whose master node is no
    /// longer active that its link is gone, and drop it from the registry.
    /// Grounded in spec.md §4.5's `invalidateProxySubs`.
    pub async fn invalidate_proxy_subs(&self, active: &HashSet<String>) {
        let stale: Vec<String> = self
            .proxies
            .iter()
            .filter(|e| !active.contains(&e.value().master_node))
            .map(|e| e.key().clone())
            .collect();

        for name in stale {
            if let Some((_, mailbox)) = self.topics.remove(&name) {
                let (ack_tx, ack_rx) = oneshot::channel();
                if mailbox.send(TopicEvent::Exit(ack_tx)).await.is_ok() {
                    let _ = ack_rx.await;
                }
            }
            self.proxies.remove(&name);
            warn!(topic = %name, "proxy topic invalidated, master node unreachable");
        }
    }

    /// Tells every locally running topic actor to exit, for graceful
    /// process shutdown.
    pub async fn shutdown(&self) {
        let names: Vec<String> = self.topics.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Some((_, mailbox)) = self.topics.remove(&name) {
                let (ack_tx, ack_rx) = oneshot::channel();
                if mailbox.send(TopicEvent::Exit(ack_tx)).await.is_ok() {
                    let _ = ack_rx.await;
                }
            }
        }
    }
}

fn server_msg_topic(msg: &ServerMsg) -> Option<&str> {
    match msg {
        ServerMsg::Ctrl(c) => c.topic.as_deref(),
        ServerMsg::Data(d) => Some(&d.topic),
        ServerMsg::Meta(m) => Some(&m.topic),
        ServerMsg::Pres(p) => Some(&p.topic),
        ServerMsg::Info(i) => Some(&i.topic),
    }
}
