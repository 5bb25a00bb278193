//! Push-notification dispatch boundary: resolves which users need a push
//! for an offline/background delivery and records the outcome.
//!
//! The concrete provider call (APNs/FCM/webpush wire formats) is a Non-goal
//! per spec.md §1; what stays in scope regardless (SPEC_FULL.md §C) is the
//! dispatch boundary itself — structured logging and the receipt shape
//! `Cluster.UserCacheUpdate` already carries piggybacked push state in.
//! Grounded in the teacher's `UserManager` routing-by-node pattern,
//! repurposed from S2S hop routing to push-provider fanout.

use tracing::{info, warn};
use wire_proto::rpc::PushReceipt;
use wire_proto::uid::Uid;

/// A user's home node for push-delivery purposes is wherever their `me`
/// topic masters — the same ring lookup a session's own `{sub me}` uses.
pub fn home_node(cluster: &crate::cluster::Cluster, uid: Uid) -> Option<String> {
    cluster.node_for_topic(&format!("usr{}", uid.0))
}

/// Dispatch a push for one topic message to `recipients`. The provider call
/// itself is stubbed (always "delivered"); this still exercises the
/// structured-logging/error boundary a real provider integration would need.
pub async fn dispatch(topic: &str, seq: i64, recipients: &[Uid]) -> PushReceipt {
    let mut to = std::collections::BTreeMap::new();
    for uid in recipients {
        info!(topic, seq, uid = %uid, "push dispatched (provider integration stubbed)");
        to.insert(*uid, wire_proto::rpc::PushRecipient { delivered: true });
    }
    PushReceipt { topic: topic.to_string(), seq, to }
}

/// `Cluster.UserCacheUpdate` carried a push receipt from a peer: log any
/// recipients that came back undelivered. There is nothing further to
/// reconcile against with the provider call stubbed.
pub fn record_receipt(receipt: &PushReceipt) {
    if receipt.to.values().any(|r| !r.delivered) {
        warn!(topic = %receipt.topic, seq = receipt.seq, "push receipt reports undelivered recipients");
    }
}
