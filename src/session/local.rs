//! `LocalSession`: the per-connection actor a transport (websocket,
//! long-poll, gRPc) drives. Reads decoded client frames off its inbound
//! mailbox, dispatches each to the right collaborator, and writes replies
//! to its outbound mailbox for the transport to flush out.
//!
//! Grounded in `state/session.rs`'s per-connection struct plus
//! `state/actor.rs`'s `run()`/mailbox shape: one `tokio::spawn`-ed loop per
//! connection, `select!`-ing inbound frames against a stop signal, same as
//! every other actor in this process.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, warn};
use wire_proto::client::{
    Acc, Ctrl, Del, Get, Hi, Leave, Login, Note, NoteWhat, Pub, RequestId, ServerMsg, Set, ClientMsg,
};
use wire_proto::uid::Uid;

use crate::cluster::Cluster;
use crate::config::LimitsConfig;
use crate::db::Database;
use crate::error::{TopicError, TopicResult};
use crate::hub::Hub;
use crate::session::auth::{AuthRegistry, TokenAuth};
use crate::session::rate_limit::RateLimiter;
use crate::session::store::SessionStore;
use crate::topic::{self, TopicCategory, TopicEvent, TopicHandle};
use crate::usercache;

/// Which transport is driving this session (spec.md §4.3's protocol
/// variant; `cluster-proxy`/`multiplexed-child` are represented by
/// [`crate::session::proxy`] and a future gRPC stream demuxer respectively,
/// not by this enum).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    WebSocket,
    LongPoll,
    Grpc,
}

const INBOUND_DEPTH: usize = 64;

/// What a transport holds onto: the inbound half to feed decoded frames
/// in, and a way to ask the session to tear down (transport closed, or a
/// server-initiated kick).
pub struct SessionHandle {
    pub sid: String,
    pub inbound_tx: mpsc::Sender<ClientMsg>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl SessionHandle {
    /// Idempotent past the first call — a transport's read and write
    /// halves may both notice the connection died and both try to stop it.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

pub struct LocalSession {
    sid: String,
    #[allow(dead_code)]
    protocol: Protocol,
    uid: Uid,
    auth_lvl: u8,
    user_agent: String,
    #[allow(dead_code)]
    remote_addr: String,
    lang: String,
    dev_id: Option<String>,
    platform: Option<String>,
    in_flight: u32,
    outbound_tx: mpsc::Sender<ServerMsg>,
    subs: HashMap<String, TopicHandle>,
    limiter: RateLimiter,
    limits: LimitsConfig,
    hub: Arc<Hub>,
    db: Database,
    cluster: Arc<Cluster>,
    auth: Arc<AuthRegistry>,
    token_auth: Arc<TokenAuth>,
    uid_key: u64,
    sessions: Arc<SessionStore>,
}

impl LocalSession {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        sid: String,
        protocol: Protocol,
        remote_addr: String,
        hub: Arc<Hub>,
        db: Database,
        cluster: Arc<Cluster>,
        auth: Arc<AuthRegistry>,
        token_auth: Arc<TokenAuth>,
        limits: LimitsConfig,
        uid_key: u64,
        sessions: Arc<SessionStore>,
    ) -> (SessionHandle, mpsc::Receiver<ServerMsg>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_DEPTH);
        let (outbound_tx, outbound_rx) = mpsc::channel(limits.session_outbound_depth);
        let (stop_tx, stop_rx) = oneshot::channel();

        sessions.register(sid.clone(), Uid::ZERO, outbound_tx.clone());

        let session = LocalSession {
            sid: sid.clone(),
            protocol,
            uid: Uid::ZERO,
            auth_lvl: 0,
            user_agent: String::new(),
            remote_addr,
            lang: String::new(),
            dev_id: None,
            platform: None,
            in_flight: 0,
            outbound_tx,
            subs: HashMap::new(),
            // 20 messages/sec sustained, bursts to 40 — generous enough
            // that no legitimate client trips it, tight enough to blunt a
            // runaway loop. A per-scheme/config override is future work.
            limiter: RateLimiter::new(20.0, 40.0),
            limits,
            hub,
            db,
            cluster,
            auth,
            token_auth,
            uid_key,
            sessions,
        };

        tokio::spawn(session.run(inbound_rx, stop_rx));
        (SessionHandle { sid, inbound_tx, stop_tx: Some(stop_tx) }, outbound_rx)
    }

    #[instrument(skip_all, fields(sid = %self.sid))]
    async fn run(mut self, mut inbound_rx: mpsc::Receiver<ClientMsg>, mut stop_rx: oneshot::Receiver<()>) {
        debug!("session started");
        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                maybe_msg = inbound_rx.recv() => {
                    match maybe_msg {
                        Some(msg) => self.dispatch(msg).await,
                        None => break,
                    }
                }
            }
        }
        let sid = self.sid.clone();
        self.teardown().await;
        self.sessions.remove(&sid);
        debug!("session ended");
    }

    async fn dispatch(&mut self, msg: ClientMsg) {
        if !self.limiter.check() {
            self.reply_err(id_of(&msg), topic_of(&msg), TopicError::RateLimited);
            return;
        }

        self.in_flight += 1;
        let (id, topic) = (id_of(&msg), topic_of(&msg));
        let result = match msg {
            ClientMsg::Hi(hi) => self.handle_hi(hi).await,
            ClientMsg::Acc(acc) => self.handle_acc(acc).await,
            ClientMsg::Login(login) => self.handle_login(login).await,
            ClientMsg::Sub(sub) => self.handle_sub(sub).await,
            ClientMsg::Leave(leave) => self.handle_leave(leave).await,
            ClientMsg::Pub(p) => self.handle_pub(p).await,
            ClientMsg::Get(g) => self.handle_get(g).await,
            ClientMsg::Set(s) => self.handle_set(s).await,
            ClientMsg::Del(d) => self.handle_del(d).await,
            ClientMsg::Note(n) => {
                self.handle_note(n).await;
                self.in_flight = self.in_flight.saturating_sub(1);
                return;
            }
        };
        self.in_flight = self.in_flight.saturating_sub(1);
        if let Err(e) = result {
            self.reply_err(id, topic, e);
        }
    }

    fn reply_ctrl(&self, ctrl: Ctrl) {
        let _ = self.outbound_tx.try_send(ServerMsg::Ctrl(ctrl));
    }

    fn reply_err(&self, id: Option<RequestId>, topic: Option<String>, err: TopicError) {
        warn!(error = %err, code = err.error_code(), "request failed");
        self.reply_ctrl(err.to_ctrl(id, topic));
    }

    async fn handle_hi(&mut self, hi: Hi) -> TopicResult<()> {
        self.user_agent = hi.ua.unwrap_or_default();
        self.lang = hi.lang.unwrap_or_default();
        self.dev_id = hi.dev_id;
        self.platform = hi.platform;
        // 201, not 200: `{hi}` establishes the session, it doesn't complete
        // an existing one.
        self.reply_ctrl(Ctrl {
            id: hi.id,
            topic: None,
            code: 201,
            text: "created".into(),
            params: BTreeMap::from([("ver".to_string(), serde_json::json!(hi.ver))]),
        });
        Ok(())
    }

    async fn handle_acc(&mut self, acc: Acc) -> TopicResult<()> {
        let handler = self
            .auth
            .get(&acc.scheme)
            .ok_or_else(|| TopicError::Malformed(format!("unknown auth scheme '{}'", acc.scheme)))?;

        let creating_new = acc.user.as_deref().map(|u| u == "new").unwrap_or(true);
        let uid = if creating_new {
            if !handler.is_unique(&acc.secret).await? {
                return Err(TopicError::Malformed("login name already taken".into()));
            }
            let (access_auth, access_anon) = topic::access::default_access(TopicCategory::Me);
            let uid = Uid(usercache::next_uid(self.cluster.worker_id()));
            self.db.users().create(uid, access_auth, access_anon).await.map_err(|e| TopicError::Internal(e.to_string()))?;
            if !acc.tags.is_empty() {
                self.db.users().set_tags(uid, &acc.tags).await.map_err(|e| TopicError::Internal(e.to_string()))?;
            }
            handler.add_record(uid, &acc.secret).await?;
            usercache::bump(uid, 1);
            uid
        } else {
            if self.uid.is_zero() {
                return Err(TopicError::AuthRequired);
            }
            handler.update_record(self.uid, &acc.secret).await?;
            self.uid
        };

        let mut params = BTreeMap::new();
        params.insert("uid".to_string(), serde_json::json!(uid.encode(self.uid_key)));
        if acc.login || creating_new {
            self.uid = uid;
            self.auth_lvl = 1;
            self.sessions.register(self.sid.clone(), uid, self.outbound_tx.clone());
            params.insert("token".to_string(), serde_json::json!(self.token_auth.issue(uid)));
        }

        self.reply_ctrl(Ctrl { id: acc.id, topic: None, code: 200, text: "ok".into(), params });
        Ok(())
    }

    async fn handle_login(&mut self, login: Login) -> TopicResult<()> {
        let handler = self
            .auth
            .get(&login.scheme)
            .ok_or_else(|| TopicError::Malformed(format!("unknown auth scheme '{}'", login.scheme)))?;
        let uid = handler.authenticate(&login.secret).await?;
        self.uid = uid;
        self.auth_lvl = 1;
        self.sessions.register(self.sid.clone(), uid, self.outbound_tx.clone());

        let mut params = BTreeMap::new();
        params.insert("uid".to_string(), serde_json::json!(uid.encode(self.uid_key)));
        params.insert("token".to_string(), serde_json::json!(self.token_auth.issue(uid)));
        self.reply_ctrl(Ctrl { id: login.id, topic: None, code: 200, text: "ok".into(), params });
        Ok(())
    }

    /// Turns the client-visible alias (`new`, `usrXXX`, `me`, `fnd`,
    /// `grpXXX`) into the routable topic name the hub/ring understand,
    /// following spec.md §3's `me|fnd|usr…/p2p…|new|grp…` prefix rules.
    fn canonicalize(&self, requested: &str) -> TopicResult<String> {
        if requested == "me" || requested == "fnd" {
            return Ok(requested.to_string());
        }
        if requested == "new" || requested.starts_with("new") {
            return Ok(self.cluster.gen_local_topic_name("grp"));
        }
        if let Some(rest) = requested.strip_prefix("usr") {
            let peer = Uid::decode(rest, self.uid_key).ok_or_else(|| TopicError::Malformed("malformed usr topic name".into()))?;
            if peer.is_zero() || peer == self.uid {
                return Err(TopicError::Malformed("cannot p2p with self".into()));
            }
            let (lo, hi) = if self.uid.0 <= peer.0 { (self.uid.0, peer.0) } else { (peer.0, self.uid.0) };
            return Ok(format!("p2p{lo:016x}{hi:016x}"));
        }
        Ok(requested.to_string())
    }

    async fn handle_sub(&mut self, sub: wire_proto::client::Sub) -> TopicResult<()> {
        if self.uid.is_zero() {
            return Err(TopicError::AuthRequired);
        }
        let name = self.canonicalize(&sub.topic)?;
        if let Some(handle) = self.subs.get(&name) {
            // already attached, re-issue the ack the way a bare resub does
            self.reply_ctrl(Ctrl::ok(sub.id, Some(sub.topic.clone())));
            let _ = handle;
            return Ok(());
        }

        let handle = self
            .hub
            .join(&name, &sub.topic, self.uid, sub.want_mode, self.sid.clone(), sub.id.clone(), self.outbound_tx.clone())
            .await?;
        self.subs.insert(name, handle);
        Ok(())
    }

    async fn handle_leave(&mut self, leave: Leave) -> TopicResult<()> {
        let name = self.canonicalize(&leave.topic)?;
        let handle = self.subs.get(&name).ok_or_else(|| TopicError::TopicNotFound(leave.topic.clone()))?.clone();
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .mailbox
            .send(TopicEvent::Leave { sid: self.sid.clone(), unsub: leave.unsub, reply: Some(reply_tx) })
            .await
            .map_err(|_| TopicError::TopicNotFound(leave.topic.clone()))?;
        reply_rx.await.map_err(|_| TopicError::Internal("topic actor dropped leave reply".into()))??;
        if leave.unsub {
            self.subs.remove(&name);
        }
        self.reply_ctrl(Ctrl::ok(leave.id, Some(leave.topic)));
        Ok(())
    }

    async fn handle_pub(&mut self, p: Pub) -> TopicResult<()> {
        if self.uid.is_zero() {
            return Err(TopicError::AuthRequired);
        }
        let content_len = p.content.to_string().len();
        if content_len > self.limits.max_message_size {
            return Err(TopicError::TooLarge);
        }
        let name = self.canonicalize(&p.topic)?;
        let handle = self.subs.get(&name).ok_or_else(|| TopicError::TopicNotFound(p.topic.clone()))?.clone();
        let id = p.id.clone();
        let topic_name = p.topic.clone();
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .mailbox
            .send(TopicEvent::Broadcast { from: self.uid, from_sid: self.sid.clone(), msg: ClientMsg::Pub(p), reply: reply_tx })
            .await
            .map_err(|_| TopicError::TopicNotFound(topic_name.clone()))?;
        reply_rx.await.map_err(|_| TopicError::Internal("topic actor dropped pub reply".into()))??;
        self.reply_ctrl(Ctrl::ok(id, Some(topic_name)));
        Ok(())
    }

    async fn handle_note(&mut self, note: Note) {
        let name = match self.canonicalize(&note.topic) {
            Ok(n) => n,
            Err(_) => return,
        };
        let Some(handle) = self.subs.get(&name) else { return };
        let (reply_tx, _reply_rx) = oneshot::channel();
        let _ = handle
            .mailbox
            .send(TopicEvent::Broadcast {
                from: self.uid,
                from_sid: self.sid.clone(),
                msg: ClientMsg::Note(note),
                reply: reply_tx,
            })
            .await;
    }

    async fn handle_get(&mut self, get: Get) -> TopicResult<()> {
        self.meta_roundtrip(get.id.clone(), get.topic.clone(), ClientMsg::Get(get)).await
    }

    async fn handle_set(&mut self, set: Set) -> TopicResult<()> {
        self.meta_roundtrip(set.id.clone(), set.topic.clone(), ClientMsg::Set(set)).await
    }

    async fn handle_del(&mut self, del: Del) -> TopicResult<()> {
        self.meta_roundtrip(del.id.clone(), del.topic.clone(), ClientMsg::Del(del)).await
    }

    /// `{get}`/`{set}`/`{del}` share the same shape: forward to the topic's
    /// meta mailbox, let the topic send its own `{meta}`/`{ctrl}` content
    /// directly to our outbound queue, and only react here if it errored.
    async fn meta_roundtrip(&mut self, id: Option<RequestId>, topic: String, msg: ClientMsg) -> TopicResult<()> {
        let name = self.canonicalize(&topic)?;
        let Some(handle) = self.subs.get(&name).cloned() else {
            // Not subscribed: a bare `{get desc}` can still be answered from
            // storage without materializing the topic actor, matching
            // `replyTopicDescBasic`. Anything else on an unloaded topic is a
            // genuine not-found.
            if let ClientMsg::Get(get) = &msg {
                if get.what.split_whitespace().any(|w| w == "desc") {
                    let meta = self.hub.offline_meta(&name, id).await?;
                    let _ = self.outbound_tx.try_send(ServerMsg::Meta(meta));
                    return Ok(());
                }
            }
            return Err(TopicError::TopicNotFound(topic));
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .mailbox
            .send(TopicEvent::Meta { from: self.uid, from_sid: self.sid.clone(), msg, reply: reply_tx })
            .await
            .map_err(|_| TopicError::Internal("topic actor mailbox closed".into()))?;
        let result = reply_rx.await.map_err(|_| TopicError::Internal("topic actor dropped meta reply".into()))?;
        match result {
            Ok(()) => Ok(()),
            Err(TopicError::TopicNotFound(name)) => {
                // `{del what=topic}` tears the topic down after replying;
                // drop our handle so a later op doesn't hit a dead mailbox.
                self.subs.remove(&name);
                let _ = id;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn teardown(&mut self) {
        for (name, handle) in self.subs.drain() {
            let _ = handle.mailbox.send(TopicEvent::Leave { sid: self.sid.clone(), unsub: false, reply: None }).await;
            debug!(topic = %name, "session detached on teardown");
        }
    }
}

fn id_of(msg: &ClientMsg) -> Option<RequestId> {
    match msg {
        ClientMsg::Hi(m) => m.id.clone(),
        ClientMsg::Acc(m) => m.id.clone(),
        ClientMsg::Login(m) => m.id.clone(),
        ClientMsg::Sub(m) => m.id.clone(),
        ClientMsg::Leave(m) => m.id.clone(),
        ClientMsg::Pub(m) => m.id.clone(),
        ClientMsg::Get(m) => m.id.clone(),
        ClientMsg::Set(m) => m.id.clone(),
        ClientMsg::Del(m) => m.id.clone(),
        ClientMsg::Note(_) => None,
    }
}

fn topic_of(msg: &ClientMsg) -> Option<String> {
    match msg {
        ClientMsg::Hi(_) | ClientMsg::Acc(_) | ClientMsg::Login(_) => None,
        ClientMsg::Sub(m) => Some(m.topic.clone()),
        ClientMsg::Leave(m) => Some(m.topic.clone()),
        ClientMsg::Pub(m) => Some(m.topic.clone()),
        ClientMsg::Get(m) => Some(m.topic.clone()),
        ClientMsg::Set(m) => Some(m.topic.clone()),
        ClientMsg::Del(m) => Some(m.topic.clone()),
        ClientMsg::Note(m) => Some(m.topic.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_carries_no_request_id() {
        let note = Note { topic: "grpAAA".into(), what: NoteWhat::Kp, seq: 0 };
        assert_eq!(id_of(&ClientMsg::Note(note)), None);
    }
}
