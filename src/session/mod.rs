//! Per-connection session actors: `local` (a transport-terminated client
//! connection) and the bookkeeping half of a cluster-proxy session that
//! represents one on another node (`proxy`).
//!
//! Grounded in `state/session.rs`'s typestate plus `state/actor.rs`'s
//! mailbox style, generalized from one IRC connection to the protocol-
//! agnostic `{hi, acc, login, sub, ...}` request/reply cycle spec.md §4.3
//! describes.

pub mod auth;
pub mod local;
pub mod proxy;
pub mod rate_limit;
pub mod store;

pub use local::{LocalSession, Protocol, SessionHandle};
pub use store::SessionStore;

/// Derives the `Uid` display-obfuscation key from the configured token
/// secret, so restarting with the same `[security].token_secret` keeps
/// handing out the same external uid strings. A dedicated config knob
/// would be one more thing to keep in sync with `token_secret`; deriving
/// it keeps the two inputs down to one.
pub fn uid_key_from_secret(secret: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    secret.hash(&mut hasher);
    hasher.finish()
}
