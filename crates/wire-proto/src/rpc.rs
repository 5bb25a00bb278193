//! Intra-cluster RPC payloads: `Cluster.Master`, `Cluster.TopicMaster`,
//! `Cluster.Proxy`, `Cluster.TopicProxy`, `Cluster.Route`,
//! `Cluster.UserCacheUpdate`, plus the `ProxyTopicMessage` tagged union they
//! carry.
//!
//! Every request is wrapped in [`Envelope`], which carries `{node, signature,
//! fingerprint}` so the receiver can reject stale or foreign calls before
//! looking at the payload at all.

use crate::client::{ClientMsg, ServerMsg};
use crate::uid::Uid;
use serde::{Deserialize, Serialize};

/// Wraps every cluster RPC request with the three fields a receiver checks
/// before honoring the call: the sender's node name, its ring signature (for
/// agreement-on-membership), and its process fingerprint (for
/// restart detection).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub node: String,
    pub signature: String,
    pub fingerprint: u64,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(node: impl Into<String>, signature: impl Into<String>, fingerprint: u64, payload: T) -> Self {
        Envelope { node: node.into(), signature: signature.into(), fingerprint, payload }
    }
}

/// Minimal remote-visible shape of the originating session; enough for the
/// master side to route replies and to seed a synthesized proxy session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRef {
    pub sid: String,
    pub uid: Uid,
    pub auth_lvl: u8,
    pub is_background: bool,
    pub user_agent: String,
    pub remote_addr: String,
    pub lang: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterReq {
    pub cli_msg: Option<ClientMsg>,
    pub srv_msg: Option<ServerMsg>,
    pub topic_msg: Option<ProxyTopicMessage>,
    pub sess: SessionRef,
    pub rcpt_to: Option<String>,
    pub done: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterResp {
    pub rejected: bool,
}

/// Response carried back over `Cluster.Proxy`: a server message destined for
/// one originating session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyResp {
    pub srv_msg: ServerMsg,
    pub from_sid: String,
}

/// Response carried back over `Cluster.TopicProxy`: a broadcast or reply that
/// a topic-proxy fans out to its locally attached sessions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopicProxyResp {
    pub srv_msg: ServerMsg,
    pub orig_request_type: ProxyRequestType,
    pub from_sid: String,
    pub rcpt_to: Option<String>,
    pub uid: Uid,
    pub is_background: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyRequestType {
    Join,
    Broadcast,
    Meta,
    Leave,
    UaChange,
    DeferredNotification,
}

/// `ProxyTopicMessage`: a tagged union of the operations a topic-proxy can
/// forward to its topic-master. Explicit variants (rather than one struct
/// with a grab-bag of optional fields) keep the wire encoding total.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ProxyTopicMessage {
    Join(JoinReq),
    Broadcast(BroadcastReq),
    Meta(MetaReq),
    Leave(LeaveReq),
    UaChange(UaChangeReq),
    DeferredNotification(DefrNotifReq),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoinReq {
    pub topic: String,
    pub sess: SessionRef,
    pub want_mode: Option<crate::access::AccessMode>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BroadcastReq {
    pub topic: String,
    pub from: Uid,
    pub from_sid: String,
    pub msg: ClientMsg,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetaReq {
    pub topic: String,
    pub from: Uid,
    pub from_sid: String,
    pub msg: ClientMsg,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeaveReq {
    pub topic: String,
    pub sid: String,
    pub unsub: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UaChangeReq {
    pub topic: String,
    pub uid: Uid,
    pub user_agent: String,
}

/// A deferred push/notification that could not be delivered while the topic
/// was unloaded and is replayed once it materializes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DefrNotifReq {
    pub topic: String,
    pub what: String,
    pub seq: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserCacheReq {
    pub user_id_list: Vec<Uid>,
    pub inc: i32,
    pub push_rcpt: Option<PushReceipt>,
    pub node: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushReceipt {
    pub topic: String,
    pub seq: i64,
    /// Per-recipient delivery info, split by the caller so each home node
    /// receives only the slice for its own users.
    pub to: std::collections::BTreeMap<Uid, PushRecipient>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushRecipient {
    pub delivered: bool,
}

/// Serialize an RPC payload to the cluster plane's wire format.
pub fn to_wire<T: Serialize>(value: &T) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec_named(value)
}

/// Deserialize an RPC payload from the cluster plane's wire format.
pub fn from_wire<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, rmp_serde::decode::Error> {
    rmp_serde::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_over_rmp() {
        let env = Envelope::new("n1", "sig-a", 42, UserCacheReq {
            user_id_list: vec![Uid(1), Uid(2)],
            inc: 1,
            push_rcpt: None,
            node: "n1".into(),
        });
        let bytes = to_wire(&env).unwrap();
        let back: Envelope<UserCacheReq> = from_wire(&bytes).unwrap();
        assert_eq!(back.fingerprint, 42);
        assert_eq!(back.payload.user_id_list.len(), 2);
    }
}
