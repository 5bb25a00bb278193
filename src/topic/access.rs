//! Access mode algebra and the default masks a new topic is created with.

pub use wire_proto::access::AccessMode;

/// Defaults assigned to a brand-new topic's `accessAuth`/`accessAnon` masks,
/// keyed by category. Auth users get read+write+presence by default; anon
/// (pre-auth) access is closed except for `fnd`, which must accept anonymous
/// search probes.
pub fn default_access(cat: crate::topic::TopicCategory) -> (AccessMode, AccessMode) {
    use crate::topic::TopicCategory::*;
    match cat {
        Me => ("JRWPAS".parse().unwrap(), AccessMode::NONE),
        Fnd => ("JRWPAS".parse().unwrap(), AccessMode::NONE),
        P2p => ("JRWPAS".parse().unwrap(), AccessMode::NONE),
        Grp => ("JRWPS".parse().unwrap(), AccessMode::NONE),
        Sys => (AccessMode::NONE, AccessMode::NONE),
    }
}

pub fn requires_write(mode: AccessMode) -> bool {
    mode.contains(AccessMode::WRITE)
}

pub fn requires_read(mode: AccessMode) -> bool {
    mode.contains(AccessMode::READ)
}

pub fn requires_share(mode: AccessMode) -> bool {
    mode.contains(AccessMode::SHARE)
}

pub fn requires_owner(mode: AccessMode) -> bool {
    mode.contains(AccessMode::OWNER)
}
