//! Wire types shared between client sessions and the intra-cluster RPC plane.
//!
//! Two families of tagged variants live here: the client-facing envelope
//! (`{hi, acc, login, sub, leave, pub, get, set, del, note}` requests and
//! `{ctrl, data, meta, pres, info}` responses) and the cluster RPC payloads
//! (`ClusterReq`/`ClusterResp`/`ProxyTopicMessage`/`UserCacheReq`). Both are
//! plain `serde`-derived enums so any self-describing encoding works; the
//! cluster plane uses `rmp-serde`, matching the rest of this stack.

pub mod access;
pub mod client;
#[cfg(feature = "tokio")]
pub mod codec;
pub mod rpc;
pub mod uid;

pub use access::AccessMode;
pub use uid::Uid;
