//! Client-facing envelope: typed `{hi, acc, login, sub, leave, pub, get, set,
//! del, note}` requests and `{ctrl, data, meta, pres, info}` replies.
//!
//! The wire grammar itself (exact JSON/binary framing used by a particular
//! transport) is a collaborator's concern; what lives here is the typed
//! shape every session and topic actor agrees on once a frame has been
//! decoded.

use crate::access::AccessMode;
use crate::uid::Uid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type RequestId = String;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "what", rename_all = "lowercase")]
pub enum ClientMsg {
    Hi(Hi),
    Acc(Acc),
    Login(Login),
    Sub(Sub),
    Leave(Leave),
    Pub(Pub),
    Get(Get),
    Set(Set),
    Del(Del),
    Note(Note),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hi {
    pub id: Option<RequestId>,
    pub ver: String,
    pub ua: Option<String>,
    pub dev_id: Option<String>,
    pub platform: Option<String>,
    pub lang: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Acc {
    pub id: Option<RequestId>,
    pub user: Option<String>,
    pub scheme: String,
    pub secret: Vec<u8>,
    pub login: bool,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Login {
    pub id: Option<RequestId>,
    pub scheme: String,
    pub secret: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sub {
    pub id: Option<RequestId>,
    pub topic: String,
    pub want_mode: Option<AccessMode>,
    pub set_desc_public: Option<serde_json::Value>,
    pub set_desc_private: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Leave {
    pub id: Option<RequestId>,
    pub topic: String,
    pub unsub: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pub {
    pub id: Option<RequestId>,
    pub topic: String,
    pub no_echo: bool,
    pub head: BTreeMap<String, serde_json::Value>,
    pub content: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Get {
    pub id: Option<RequestId>,
    pub topic: String,
    /// Bitmask over `desc|sub|tags|cred|data`, encoded as a space-joined
    /// keyword string on the wire the way the spec's `what` field is.
    pub what: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Set {
    pub id: Option<RequestId>,
    pub topic: String,
    pub what: String,
    pub desc_public: Option<serde_json::Value>,
    pub desc_private: Option<serde_json::Value>,
    pub sub_user: Option<Uid>,
    pub sub_mode: Option<AccessMode>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Del {
    pub id: Option<RequestId>,
    pub topic: String,
    pub what: DelWhat,
    pub del_seq: Vec<SeqRange>,
    pub hard: bool,
    pub user: Option<Uid>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelWhat {
    Msg,
    Topic,
    Sub,
    Cred,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SeqRange {
    pub low: i64,
    pub hi: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Note {
    pub topic: String,
    pub what: NoteWhat,
    pub seq: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoteWhat {
    Recv,
    Read,
    Kp,
    Call(CallEvent),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallEvent {
    Invite,
    Ringing,
    Accept,
    Offer,
    Answer,
    IceCandidate,
    HangUp,
}

// ---- server -> client replies ----

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "what", rename_all = "lowercase")]
pub enum ServerMsg {
    Ctrl(Ctrl),
    Data(Data),
    Meta(Meta),
    Pres(Pres),
    Info(Info),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ctrl {
    pub id: Option<RequestId>,
    pub topic: Option<String>,
    /// HTTP-style status: 1xx info, 2xx success, 3xx redirect, 4xx client
    /// error, 5xx server error.
    pub code: u16,
    pub text: String,
    pub params: BTreeMap<String, serde_json::Value>,
}

impl Ctrl {
    pub fn ok(id: Option<RequestId>, topic: Option<String>) -> Self {
        Ctrl { id, topic, code: 200, text: "ok".into(), params: BTreeMap::new() }
    }

    pub fn accepted(id: Option<RequestId>, topic: Option<String>) -> Self {
        Ctrl { id, topic, code: 202, text: "accepted".into(), params: BTreeMap::new() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Data {
    pub topic: String,
    pub from: Option<Uid>,
    pub seq: i64,
    pub head: BTreeMap<String, serde_json::Value>,
    pub content: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Meta {
    pub id: Option<RequestId>,
    pub topic: String,
    pub desc: Option<TopicDesc>,
    pub sub: Vec<SubDesc>,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TopicDesc {
    pub created: Option<chrono::DateTime<chrono::Utc>>,
    pub updated: Option<chrono::DateTime<chrono::Utc>>,
    pub public: Option<serde_json::Value>,
    pub private: Option<serde_json::Value>,
    pub acc_auth: Option<AccessMode>,
    pub acc_anon: Option<AccessMode>,
    pub seq: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubDesc {
    pub user: Uid,
    pub updated: chrono::DateTime<chrono::Utc>,
    pub mode_want: AccessMode,
    pub mode_given: AccessMode,
    pub read_id: i64,
    pub recv_id: i64,
    pub public: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pres {
    pub topic: String,
    pub src: Option<String>,
    pub what: PresWhat,
    pub seq: Option<i64>,
    pub user_agent: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresWhat {
    On,
    Off,
    Term,
    Upd,
    Acs,
    Msg,
    Read,
    Recv,
    Gone,
    Tags,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Info {
    pub topic: String,
    pub from: Uid,
    pub what: String,
    pub seq: i64,
}
