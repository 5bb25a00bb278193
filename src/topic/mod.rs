//! The per-conversation actor: the single-writer unit that owns subscriber
//! state, sequence numbering, presence, and broadcast fanout.
//!
//! Grounded in `state/actor.rs`'s `ChannelActor`: one `mpsc` mailbox per
//! topic, a `tokio::spawn`-ed `run()` loop, and an explicit `ActorState`
//! (`Active`/`Draining`) so a concurrent lookup never hands out a reference
//! to a topic that is already tearing down.

pub mod access;
pub mod meta;
pub mod video_call;

use crate::cluster::Cluster;
use crate::db::Database;
use crate::error::{TopicError, TopicResult};
use access::AccessMode;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use wire_proto::client::{Ctrl, Pres, PresWhat, ServerMsg};
use wire_proto::rpc::{BroadcastReq, JoinReq, LeaveReq, MetaReq, ProxyRequestType, ProxyTopicMessage, TopicProxyResp, UaChangeReq};
use wire_proto::uid::Uid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopicCategory {
    Me,
    Fnd,
    P2p,
    Grp,
    Sys,
}

/// Category is entirely determined by the name prefix, matching Hub's
/// `topicInit` branching.
pub fn category_from_name(name: &str) -> TopicCategory {
    if name == "me" || name.starts_with("usr") {
        TopicCategory::Me
    } else if name == "fnd" {
        TopicCategory::Fnd
    } else if name.starts_with("p2p") {
        TopicCategory::P2p
    } else if name.starts_with("sys") {
        TopicCategory::Sys
    } else {
        TopicCategory::Grp
    }
}

/// Idle eviction window, category-dependent. `me`/`fnd` never idle out on
/// their own (they are per-user singletons): the hub keeps them as long as
/// the owning user process is conceivably reachable.
fn idle_window(cat: TopicCategory) -> Option<Duration> {
    match cat {
        TopicCategory::Me | TopicCategory::Fnd => None,
        TopicCategory::P2p | TopicCategory::Grp => Some(Duration::from_secs(900)),
        TopicCategory::Sys => None,
    }
}

#[derive(Clone, Debug, Default)]
pub struct PerUserState {
    pub public: Option<serde_json::Value>,
    pub private: Option<serde_json::Value>,
    pub mode_want: AccessMode,
    pub mode_given: AccessMode,
    pub read_id: i64,
    pub recv_id: i64,
    pub clear_id: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

pub struct SessionJoin {
    pub id: Option<wire_proto::client::RequestId>,
    pub sid: String,
    pub uid: Uid,
    pub want_mode: Option<AccessMode>,
    pub outbound: mpsc::Sender<ServerMsg>,
    pub reply: oneshot::Sender<TopicResult<TopicHandle>>,
}

pub struct UaChange {
    pub uid: Uid,
    pub user_agent: String,
}

/// The handle a session keeps per `(session, topic)` pair: the mailbox by
/// which it talks to the topic for leave/meta/broadcast operations.
#[derive(Clone)]
pub struct TopicHandle {
    pub topic_name: String,
    pub mailbox: mpsc::Sender<TopicEvent>,
}

pub enum TopicEvent {
    Join(SessionJoin),
    Leave { sid: String, unsub: bool, reply: Option<oneshot::Sender<TopicResult<()>>> },
    Broadcast { from: Uid, from_sid: String, msg: wire_proto::client::ClientMsg, reply: oneshot::Sender<TopicResult<()>> },
    Meta { from: Uid, from_sid: String, msg: wire_proto::client::ClientMsg, reply: oneshot::Sender<TopicResult<()>> },
    UaChange(UaChange),
    /// Inbound from this topic's master, when this replica is a proxy.
    ProxyResp(TopicProxyResp),
    /// Inbound from a topic-proxy, when this replica is the master.
    MasterReq { from_node: String, msg: ProxyTopicMessage, reply: oneshot::Sender<TopicResult<()>> },
    Exit(oneshot::Sender<()>),
}

struct AttachedSession {
    sid: String,
    uid: Uid,
    outbound: mpsc::Sender<ServerMsg>,
}

enum ActorState {
    Active,
    Draining,
}

pub struct Topic {
    name: String,
    original: String,
    cat: TopicCategory,
    owner: Uid,
    access_auth: AccessMode,
    access_anon: AccessMode,
    last_id: i64,
    clear_id: i64,
    public: Option<serde_json::Value>,
    tags: Vec<String>,
    per_user: HashMap<Uid, PerUserState>,
    sessions: Vec<AttachedSession>,
    is_proxy: bool,
    master_node: Option<String>,
    current_call: Option<video_call::VideoCall>,
    call_timeout: Duration,
    call_deadline: Option<Instant>,
    state: ActorState,
    db: Database,
    cluster: Arc<Cluster>,
    hub_tx: mpsc::Sender<crate::hub::HubEvent>,
    self_tx: mpsc::Sender<TopicEvent>,
    mailbox_rx: mpsc::Receiver<TopicEvent>,
    /// `(node, sid)` pairs attached through a topic-proxy on another node.
    /// Populated only when this replica is the master; empty on proxies.
    remote_sessions: Vec<(String, String)>,
}

/// Mailbox capacity for high-volume events; control events use an
/// effectively unbounded depth of 1 so `exit`/`unreg` are never dropped.
const BROADCAST_MAILBOX_DEPTH: usize = 256;

impl Topic {
    /// Load-or-create and spawn. Mirrors Hub's `topicInit`.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        name: String,
        original: String,
        requester: Uid,
        db: Database,
        cluster: Arc<Cluster>,
        hub_tx: mpsc::Sender<crate::hub::HubEvent>,
        master_node: Option<String>,
        call_timeout: Duration,
    ) -> mpsc::Sender<TopicEvent> {
        let cat = category_from_name(&name);
        let (acc_auth, acc_anon) = access::default_access(cat);
        let (tx, rx) = mpsc::channel(BROADCAST_MAILBOX_DEPTH);

        let owner = if cat == TopicCategory::Grp { requester } else { Uid::ZERO };
        let is_proxy = master_node.is_some();

        let topic = Topic {
            name: name.clone(),
            original,
            cat,
            owner,
            access_auth: acc_auth,
            access_anon: acc_anon,
            last_id: 0,
            clear_id: 0,
            public: None,
            tags: Vec::new(),
            per_user: HashMap::new(),
            sessions: Vec::new(),
            is_proxy,
            master_node,
            current_call: None,
            call_timeout,
            call_deadline: None,
            state: ActorState::Active,
            db,
            cluster,
            hub_tx,
            self_tx: tx.clone(),
            mailbox_rx: rx,
            remote_sessions: Vec::new(),
        };

        tokio::spawn(topic.run());
        tx
    }

    #[instrument(skip(self), fields(topic = %self.name))]
    async fn run(mut self) {
        info!("topic actor started");
        let idle = idle_window(self.cat);
        loop {
            let idle_sleep = async {
                match idle {
                    Some(d) if self.sessions.is_empty() => tokio::time::sleep(d).await,
                    _ => std::future::pending::<()>().await,
                }
            };
            let call_sleep = async {
                match self.call_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                Some(event) = self.mailbox_rx.recv() => {
                    if self.handle_event(event).await {
                        break;
                    }
                }
                _ = call_sleep => {
                    self.handle_call_timeout().await;
                }
                _ = idle_sleep => {
                    debug!("idle timeout, self-unregistering");
                    let (ack_tx, ack_rx) = oneshot::channel();
                    if self.hub_tx.send(crate::hub::HubEvent::Unreg { name: self.name.clone(), reply: ack_tx }).await.is_ok() {
                        let _ = ack_rx.await;
                    }
                    break;
                }
                else => break,
            }
        }
        self.on_exit(None).await;
    }

    /// Returns `true` when the actor should stop after this event.
    async fn handle_event(&mut self, event: TopicEvent) -> bool {
        match event {
            TopicEvent::Join(j) => {
                self.handle_join(j).await;
                false
            }
            TopicEvent::Leave { sid, unsub, reply } => {
                let result = self.handle_leave(&sid, unsub).await;
                if let Some(r) = reply {
                    let _ = r.send(result);
                }
                false
            }
            TopicEvent::Broadcast { from, from_sid, msg, reply } => {
                let result = self.handle_broadcast(from, &from_sid, msg).await;
                let _ = reply.send(result);
                false
            }
            TopicEvent::Meta { from, from_sid, msg, reply } => {
                let result = self.handle_meta(from, &from_sid, msg).await;
                // `{del what=topic}` signals its own completion by erroring
                // with `TopicNotFound` after it has already sent the client
                // reply and told Hub to deregister us; that's this actor's
                // cue to stop, same as an explicit `exit`.
                let should_stop = matches!(result, Err(TopicError::TopicNotFound(_)));
                let _ = reply.send(result);
                return should_stop;
            }
            TopicEvent::UaChange(change) => {
                self.handle_ua_change(change).await;
                false
            }
            TopicEvent::ProxyResp(resp) => {
                self.apply_proxy_resp(resp).await;
                false
            }
            TopicEvent::MasterReq { from_node, msg, reply } => {
                let result = self.handle_master_req(from_node, msg).await;
                let _ = reply.send(result);
                false
            }
            TopicEvent::Exit(ack) => {
                self.state = ActorState::Draining;
                self.on_exit(Some(ack)).await;
                true
            }
        }
    }

    async fn handle_join(&mut self, j: SessionJoin) {
        let mut want = j.want_mode.unwrap_or(self.access_auth);
        let mut given = self.access_auth;
        // The creator of a group topic always holds Owner, in both want and
        // given, regardless of the default access mask (invariant 5:
        // `modeWant & modeGiven ⊇ Owner`).
        if !self.owner.is_zero() && j.uid == self.owner {
            want = want | AccessMode::OWNER;
            given = given | AccessMode::OWNER;
        }
        let effective = AccessMode::effective(want, given);
        if effective.is_none() && !j.uid.is_zero() {
            let _ = j.reply.send(Err(TopicError::PermissionDenied));
            return;
        }

        let now = Utc::now();
        let is_new = !self.per_user.contains_key(&j.uid);
        self.per_user.entry(j.uid).or_insert_with(|| PerUserState {
            mode_want: want,
            mode_given: given,
            created: now,
            updated: now,
            ..Default::default()
        });

        self.sessions.push(AttachedSession { sid: j.sid.clone(), uid: j.uid, outbound: j.outbound.clone() });

        let ctrl = ServerMsg::Ctrl(Ctrl::ok(j.id.clone(), Some(self.name.clone())));
        let _ = j.outbound.try_send(ctrl);

        if effective.contains(AccessMode::PRESENCE) {
            self.fan_out_pres(PresWhat::On, Some(&j.sid)).await;
        }

        if is_new && self.cat == TopicCategory::P2p {
            debug!(uid = %j.uid, "first-time p2p join, mirror subscription created implicitly via perUser");
        }

        let handle = TopicHandle { topic_name: self.name.clone(), mailbox: self.self_tx.clone() };
        let _ = j.reply.send(Ok(handle));
    }

    async fn handle_leave(&mut self, sid: &str, unsub: bool) -> TopicResult<()> {
        if self.is_proxy {
            let fwd = ProxyTopicMessage::Leave(LeaveReq { topic: self.name.clone(), sid: sid.to_string(), unsub });
            self.forward_to_master(fwd, sid, Uid::ZERO).await?;
        }
        let leaver_uid = self.sessions.iter().find(|s| s.sid == sid).map(|s| s.uid);
        self.sessions.retain(|s| s.sid != sid);
        self.remote_sessions.retain(|(_, s)| s != sid);

        if self.cat == TopicCategory::P2p {
            let involved = leaver_uid.is_some_and(|uid| self.current_call.as_ref().is_some_and(|c| c.involves(uid)));
            if involved {
                self.call_deadline = None;
                if let Some(seq) = self.current_call.as_ref().map(|c| c.seq()) {
                    if let Some(outcome) = video_call::disconnect(&mut self.current_call, seq) {
                        if let Some(replacement) = outcome.replacement {
                            if let Err(e) = self.db.messages().insert_replacement(&self.name, seq, &replacement).await {
                                error!(topic = %self.name, error = %e, "failed to persist call disconnect replacement");
                            }
                        }
                        if let Some(info_what) = outcome.notify {
                            let info = ServerMsg::Info(wire_proto::client::Info {
                                topic: self.name.clone(),
                                from: leaver_uid.unwrap_or(Uid::ZERO),
                                what: info_what.into(),
                                seq,
                            });
                            for s in &self.sessions {
                                let _ = s.outbound.try_send(info.clone());
                            }
                        }
                    }
                }
            }
        }

        if unsub {
            // uid lookup by sid is a session-store concern in the full
            // system; here we drop by sid only, matching what a proxy-less
            // local leave can know directly.
            self.fan_out_pres(PresWhat::Off, Some(sid)).await;
        }
        Ok(())
    }

    async fn handle_broadcast(&mut self, from: Uid, from_sid: &str, msg: wire_proto::client::ClientMsg) -> TopicResult<()> {
        use wire_proto::client::ClientMsg;
        if self.is_proxy {
            let fwd = ProxyTopicMessage::Broadcast(BroadcastReq { topic: self.name.clone(), from, from_sid: from_sid.to_string(), msg });
            return self.forward_to_master(fwd, from_sid, from).await;
        }
        match msg {
            ClientMsg::Pub(p) => {
                let given = self.per_user.get(&from).map(|u| u.mode_given).unwrap_or(AccessMode::NONE);
                let want = self.per_user.get(&from).map(|u| u.mode_want).unwrap_or(AccessMode::NONE);
                if !access::requires_write(AccessMode::effective(want, given)) {
                    return Err(TopicError::PermissionDenied);
                }
                self.last_id += 1;
                let seq = self.last_id;
                self.db.messages().insert(&self.name, seq, from, &p.content).await.map_err(|e| TopicError::Internal(e.to_string()))?;

                let data = ServerMsg::Data(wire_proto::client::Data {
                    topic: self.name.clone(),
                    from: Some(from),
                    seq,
                    head: p.head,
                    content: p.content,
                });
                let _span = crate::telemetry::create_broadcast_span(&self.name, &from.to_string(), self.sessions.len()).entered();
                for s in &self.sessions {
                    if p.no_echo && s.sid == from_sid {
                        continue;
                    }
                    let reader_mode = self.per_user.get(&s.uid).map(|u| AccessMode::effective(u.mode_want, u.mode_given)).unwrap_or(AccessMode::NONE);
                    if !access::requires_read(reader_mode) {
                        continue;
                    }
                    let _ = s.outbound.try_send(data.clone());
                }
                if let Some(u) = self.per_user.get_mut(&from) {
                    u.recv_id = seq;
                    u.read_id = seq;
                }
                self.fan_out_remote(data, None, ProxyRequestType::Broadcast, from, false).await;
                Ok(())
            }
            ClientMsg::Note(n) => {
                self.handle_note(from, from_sid, n).await
            }
            _ => Err(TopicError::Malformed("unexpected message on broadcast mailbox".into())),
        }
    }

    async fn handle_note(&mut self, from: Uid, from_sid: &str, note: wire_proto::client::Note) -> TopicResult<()> {
        use wire_proto::client::{CallEvent, NoteWhat};
        match note.what {
            NoteWhat::Recv | NoteWhat::Read => {
                if let Some(u) = self.per_user.get_mut(&from) {
                    let slot = if note.what == NoteWhat::Recv { &mut u.recv_id } else { &mut u.read_id };
                    if note.seq <= *slot {
                        return Ok(()); // idempotent: replay of an old receipt is a no-op
                    }
                    *slot = note.seq;
                }
                let info = ServerMsg::Info(wire_proto::client::Info {
                    topic: self.name.clone(),
                    from,
                    what: if note.what == NoteWhat::Recv { "recv".into() } else { "read".into() },
                    seq: note.seq,
                });
                for s in &self.sessions {
                    if s.sid == from_sid {
                        continue;
                    }
                    let _ = s.outbound.try_send(info.clone());
                }
                self.fan_out_remote(info, None, ProxyRequestType::Broadcast, from, false).await;
                Ok(())
            }
            NoteWhat::Kp => Ok(()),
            NoteWhat::Call(event) => self.handle_call_event(from, from_sid, event, note.seq).await,
        }
    }

    async fn handle_call_event(
        &mut self,
        from: Uid,
        from_sid: &str,
        event: wire_proto::client::CallEvent,
        seq: i64,
    ) -> TopicResult<()> {
        if self.cat != TopicCategory::P2p {
            return Err(TopicError::Malformed("video calls are p2p-only".into()));
        }
        let is_invite = matches!(event, wire_proto::client::CallEvent::Invite);
        let is_accept = matches!(event, wire_proto::client::CallEvent::Accept);
        let outcome = video_call::drive(&mut self.current_call, from, event, seq)?;
        if is_invite {
            self.call_deadline = Some(Instant::now() + self.call_timeout);
        } else if is_accept || outcome.terminal {
            self.call_deadline = None;
        }
        if let Some(replacement) = outcome.replacement {
            self.db
                .messages()
                .insert_replacement(&self.name, seq, &replacement)
                .await
                .map_err(|e| TopicError::Internal(e.to_string()))?;
        }
        if let Some(info_what) = outcome.notify {
            let info = ServerMsg::Info(wire_proto::client::Info {
                topic: self.name.clone(),
                from,
                what: info_what.into(),
                seq,
            });
            for s in &self.sessions {
                if outcome.to_sender_too || s.sid != from_sid {
                    let _ = s.outbound.try_send(info.clone());
                }
            }
        }
        if outcome.terminal {
            self.current_call = None;
        }
        Ok(())
    }

    /// The establishment timer armed on `invite` elapsed with no `accept`.
    async fn handle_call_timeout(&mut self) {
        self.call_deadline = None;
        let Some(caller) = self.current_call.as_ref().map(|c| c.caller()) else { return };
        let Some(seq) = self.current_call.as_ref().map(|c| c.seq()) else { return };
        let Some(outcome) = video_call::timeout(&mut self.current_call) else { return };
        if let Some(replacement) = outcome.replacement {
            if let Err(e) = self.db.messages().insert_replacement(&self.name, seq, &replacement).await {
                error!(topic = %self.name, error = %e, "failed to persist call timeout replacement");
            }
        }
        if let Some(info_what) = outcome.notify {
            let info = ServerMsg::Info(wire_proto::client::Info {
                topic: self.name.clone(),
                from: caller,
                what: info_what.into(),
                seq,
            });
            for s in &self.sessions {
                let _ = s.outbound.try_send(info.clone());
            }
        }
        if outcome.terminal {
            self.current_call = None;
        }
    }

    async fn handle_meta(&mut self, from: Uid, from_sid: &str, msg: wire_proto::client::ClientMsg) -> TopicResult<()> {
        if self.is_proxy {
            let fwd = ProxyTopicMessage::Meta(MetaReq { topic: self.name.clone(), from, from_sid: from_sid.to_string(), msg });
            return self.forward_to_master(fwd, from_sid, from).await;
        }
        meta::dispatch(self, from, from_sid, msg).await
    }

    /// Repackages a mutating op as a `ProxyTopicMessage` and relays it to
    /// this topic's master via `Cluster.TopicMaster` (spec.md §4.7, invariant
    /// 6). The authoritative reply, if any, arrives later and asynchronously
    /// on this actor's `proxy` mailbox (`TopicEvent::ProxyResp`) — this call
    /// only reports whether the relay itself was honored.
    async fn forward_to_master(&self, msg: ProxyTopicMessage, from_sid: &str, uid: Uid) -> TopicResult<()> {
        let master = self.master_node.clone().ok_or_else(|| TopicError::Internal("proxy topic has no master node".into()))?;
        let req = wire_proto::rpc::ClusterReq {
            cli_msg: None,
            srv_msg: None,
            topic_msg: Some(msg),
            sess: wire_proto::rpc::SessionRef {
                sid: from_sid.to_string(),
                uid,
                auth_lvl: 0,
                is_background: false,
                user_agent: String::new(),
                remote_addr: String::new(),
                lang: String::new(),
            },
            rcpt_to: None,
            done: false,
        };
        if self.cluster.call_topic_master(&master, req).await {
            return Err(TopicError::ClusterDesync);
        }
        Ok(())
    }

    async fn handle_ua_change(&mut self, _change: UaChange) {}

    async fn apply_proxy_resp(&mut self, resp: TopicProxyResp) {
        for s in &self.sessions {
            if let Some(rcpt) = &resp.rcpt_to {
                if rcpt != &s.sid {
                    continue;
                }
            }
            let _ = s.outbound.try_send(resp.srv_msg.clone());
        }
    }

    async fn handle_master_req(&mut self, from_node: String, msg: ProxyTopicMessage) -> TopicResult<()> {
        match msg {
            ProxyTopicMessage::Broadcast(BroadcastReq { from, from_sid, msg, .. }) => {
                self.handle_broadcast(from, &from_sid, msg).await
            }
            ProxyTopicMessage::Meta(MetaReq { from, from_sid, msg, .. }) => self.handle_meta(from, &from_sid, msg).await,
            ProxyTopicMessage::Join(JoinReq { sess, want_mode, .. }) => {
                let want = want_mode.unwrap_or(self.access_auth);
                let given = self.access_auth;
                let effective = AccessMode::effective(want, given);
                if effective.is_none() && !sess.uid.is_zero() {
                    return Err(TopicError::PermissionDenied);
                }
                let now = Utc::now();
                self.per_user.entry(sess.uid).or_insert_with(|| PerUserState {
                    mode_want: want,
                    mode_given: given,
                    created: now,
                    updated: now,
                    ..Default::default()
                });
                self.remote_sessions.retain(|(_, sid)| sid != &sess.sid);
                self.remote_sessions.push((from_node, sess.sid));
                Ok(())
            }
            ProxyTopicMessage::Leave(LeaveReq { sid, unsub, .. }) => self.handle_leave(&sid, unsub).await,
            ProxyTopicMessage::UaChange(UaChangeReq { uid, user_agent, .. }) => {
                self.handle_ua_change(UaChange { uid, user_agent }).await;
                Ok(())
            }
            ProxyTopicMessage::DeferredNotification(_) => Ok(()),
        }
    }

    /// Fans an authoritative message out to every node holding a
    /// topic-proxy for this topic, once per distinct node (the proxy itself
    /// fans out to its own locally attached sessions on `rcpt_to: None`).
    async fn fan_out_remote(&self, srv_msg: ServerMsg, rcpt_to: Option<String>, orig_request_type: ProxyRequestType, uid: Uid, is_background: bool) {
        let mut seen = std::collections::HashSet::new();
        for (node, sid) in &self.remote_sessions {
            if !seen.insert(node.clone()) {
                continue;
            }
            let resp = TopicProxyResp {
                srv_msg: srv_msg.clone(),
                orig_request_type,
                from_sid: sid.clone(),
                rcpt_to: rcpt_to.clone(),
                uid,
                is_background,
            };
            self.cluster.send_topic_proxy(node, resp).await;
        }
    }

    async fn fan_out_pres(&self, what: PresWhat, exclude_sid: Option<&str>) {
        let pres = ServerMsg::Pres(Pres {
            topic: self.name.clone(),
            src: None,
            what,
            seq: Some(self.last_id),
            user_agent: None,
        });
        for s in &self.sessions {
            if exclude_sid == Some(s.sid.as_str()) {
                continue;
            }
            let _ = s.outbound.try_send(pres.clone());
        }
    }

    async fn on_exit(&mut self, ack: Option<oneshot::Sender<()>>) {
        self.fan_out_pres(PresWhat::Term, None).await;
        warn!(topic = %self.name, "topic actor exiting");
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn is_proxy(&self) -> bool {
        self.is_proxy
    }

    pub(crate) fn session_outbound(&self, sid: &str) -> Option<&mpsc::Sender<ServerMsg>> {
        self.sessions.iter().find(|s| s.sid == sid).map(|s| &s.outbound)
    }

    pub(crate) async fn notify_acs_change(&self) {
        self.fan_out_pres(PresWhat::Acs, None).await;
    }
}

/// Concurrent, process-wide registry of live topics, read by many and
/// written only through Hub's serialized event loop.
pub type TopicRegistry = DashMap<String, mpsc::Sender<TopicEvent>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_from_name_matches_prefixes() {
        assert_eq!(category_from_name("me"), TopicCategory::Me);
        assert_eq!(category_from_name("usrABC"), TopicCategory::Me);
        assert_eq!(category_from_name("fnd"), TopicCategory::Fnd);
        assert_eq!(category_from_name("p2pABCDEF"), TopicCategory::P2p);
        assert_eq!(category_from_name("grpXYZ"), TopicCategory::Grp);
    }

    #[test]
    fn idle_window_is_none_for_singletons() {
        assert!(idle_window(TopicCategory::Me).is_none());
        assert!(idle_window(TopicCategory::Grp).is_some());
    }
}
