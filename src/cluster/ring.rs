//! Consistent-hash ring: name → node map with a deterministic membership
//! signature.
//!
//! Grounded in the shape of `sync::topology`'s `DashMap<ServerId, ServerInfo>`
//! membership view, but the routing algorithm itself is new: topology.rs
//! models a spanning tree for S2S hop routing, while this needs classic
//! consistent hashing so a topic name resolves to the same owning node on
//! every member without shipping the whole ring.

use std::collections::BTreeMap;
use std::hash::Hasher;
use twox_hash_fallback::XxHash64;

mod twox_hash_fallback {
    //! Tiny FNV-1a-style 64-bit hash so the ring doesn't need an extra
    //! dependency solely for virtual-node placement. Not cryptographic;
    //! only needs to spread keys evenly.
    pub struct XxHash64(u64);

    impl XxHash64 {
        pub fn new() -> Self {
            XxHash64(0xcbf29ce484222325)
        }
    }

    impl super::Hasher for XxHash64 {
        fn write(&mut self, bytes: &[u8]) {
            for &b in bytes {
                self.0 ^= b as u64;
                self.0 = self.0.wrapping_mul(0x100000001b3);
            }
        }

        fn finish(&self) -> u64 {
            self.0
        }
    }
}

const DEFAULT_VNODES: u32 = 20;

/// Consistent-hash ring over the current cluster membership.
#[derive(Clone, Debug, Default)]
pub struct Ring {
    vnodes_per_node: u32,
    /// virtual-node hash -> real node name
    ring: BTreeMap<u64, String>,
    members: Vec<String>,
    signature: String,
}

fn hash_str(s: &str) -> u64 {
    let mut h = XxHash64::new();
    h.write(s.as_bytes());
    h.finish()
}

impl Ring {
    pub fn new(vnodes_per_node: u32) -> Self {
        Ring { vnodes_per_node, ring: BTreeMap::new(), members: Vec::new(), signature: String::new() }
    }

    pub fn with_default_replicas() -> Self {
        Self::new(DEFAULT_VNODES)
    }

    /// Rebuild the ring for exactly this member set (not incremental — the
    /// whole point is that membership changes are rare and atomic).
    pub fn set_members<I: IntoIterator<Item = S>, S: Into<String>>(&mut self, names: I) {
        let mut members: Vec<String> = names.into_iter().map(Into::into).collect();
        members.sort();
        members.dedup();

        let mut ring = BTreeMap::new();
        for name in &members {
            for i in 0..self.vnodes_per_node {
                let key = format!("{name}#{i}");
                ring.insert(hash_str(&key), name.clone());
            }
        }

        self.signature = Self::compute_signature(&members);
        self.ring = ring;
        self.members = members;
    }

    fn compute_signature(sorted_members: &[String]) -> String {
        let mut h = XxHash64::new();
        for m in sorted_members {
            h.write(m.as_bytes());
            h.write(b"\0");
        }
        format!("{:016x}", h.finish())
    }

    /// Resolve a topic/key name to its owning node. Empty ring has no owner.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.ring.is_empty() {
            return None;
        }
        let h = hash_str(key);
        let owner = self
            .ring
            .range(h..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, name)| name.as_str());
        owner
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Snowflake-style worker id: this node's rank in the sorted member
    /// list, used to keep locally-generated `Uid`s unique across the
    /// cluster. Grounded in the original `clusterInit`'s `sort.SearchStrings`
    /// derivation of `workerId`.
    pub fn worker_id(&self, self_name: &str) -> u8 {
        self.members.binary_search(&self_name.to_string()).map(|i| i as u8).unwrap_or(0)
    }

    /// `true` when `active.len()` is at or below a bare majority of the full
    /// configured membership — the local node is in the minority side of a
    /// partition and should refuse new writes (policy enforced by the
    /// caller; this only reports the bit).
    pub fn is_partitioned(total_configured: usize, active: usize) -> bool {
        active <= total_configured.div_ceil(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_fixed_membership() {
        let mut r1 = Ring::with_default_replicas();
        r1.set_members(["n1", "n2", "n3"]);
        let mut r2 = Ring::with_default_replicas();
        r2.set_members(["n3", "n1", "n2"]);
        assert_eq!(r1.signature(), r2.signature());
        for key in ["grpAAA", "p2pABCDEF", "usrXYZ", "me"] {
            assert_eq!(r1.get(key), r2.get(key));
        }
    }

    #[test]
    fn signature_changes_on_membership_change() {
        let mut r = Ring::with_default_replicas();
        r.set_members(["n1", "n2", "n3"]);
        let sig_before = r.signature().to_string();
        r.set_members(["n1", "n3"]);
        assert_ne!(sig_before, r.signature());
    }

    #[test]
    fn removing_a_node_remaps_a_bounded_fraction() {
        let mut r = Ring::with_default_replicas();
        r.set_members(["n1", "n2", "n3", "n4"]);
        let keys: Vec<String> = (0..2000).map(|i| format!("grp{i}")).collect();
        let before: Vec<_> = keys.iter().map(|k| r.get(k).unwrap().to_string()).collect();

        r.set_members(["n1", "n2", "n3"]);
        let after: Vec<_> = keys.iter().map(|k| r.get(k).unwrap().to_string()).collect();

        let changed = before.iter().zip(&after).filter(|(a, b)| a != b).count();
        // Removing one of four nodes should remap roughly 1/4 of keys, not
        // all of them. Allow generous slack since this is a statistical
        // property, not an exact one.
        assert!(changed < keys.len() / 2, "too many keys remapped: {changed}/{}", keys.len());
    }

    #[test]
    fn empty_ring_has_no_owner() {
        let r = Ring::with_default_replicas();
        assert_eq!(r.get("anything"), None);
    }

    #[test]
    fn worker_id_is_sorted_rank() {
        let mut r = Ring::with_default_replicas();
        r.set_members(["b", "a", "c"]);
        assert_eq!(r.worker_id("a"), 0);
        assert_eq!(r.worker_id("b"), 1);
        assert_eq!(r.worker_id("c"), 2);
    }

    #[test]
    fn partition_bit() {
        assert!(Ring::is_partitioned(5, 2));
        assert!(!Ring::is_partitioned(5, 3));
    }
}
