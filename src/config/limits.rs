//! Quota configuration: the concrete numbers behind the "quota/limit" error
//! class (§7) — payload too large, queue full.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Largest `{pub}`/`{set desc}` JSON payload accepted, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// `maxFileUploadSize` from §6's media HTTP contract.
    #[serde(default = "default_max_file_upload_size")]
    pub max_file_upload_size: u64,
    /// Largest number of subscribers a single group topic may carry.
    #[serde(default = "default_max_subscriber_count")]
    pub max_subscriber_count: usize,
    /// High-volume mailbox depth (`broadcast`, `route`) per topic actor.
    #[serde(default = "default_broadcast_mailbox_depth")]
    pub broadcast_mailbox_depth: usize,
    /// Session outbound queue depth before `queueOut` starts dropping.
    #[serde(default = "default_session_outbound_depth")]
    pub session_outbound_depth: usize,
    /// Maximum tags a topic or user may carry.
    #[serde(default = "default_max_tag_count")]
    pub max_tag_count: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            max_file_upload_size: default_max_file_upload_size(),
            max_subscriber_count: default_max_subscriber_count(),
            broadcast_mailbox_depth: default_broadcast_mailbox_depth(),
            session_outbound_depth: default_session_outbound_depth(),
            max_tag_count: default_max_tag_count(),
        }
    }
}

fn default_max_message_size() -> usize {
    256 * 1024
}

fn default_max_file_upload_size() -> u64 {
    32 * 1024 * 1024
}

fn default_max_subscriber_count() -> usize {
    32_000
}

fn default_broadcast_mailbox_depth() -> usize {
    256
}

fn default_session_outbound_depth() -> usize {
    2_048
}

fn default_max_tag_count() -> usize {
    16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = LimitsConfig::default();
        assert!(cfg.max_message_size > 0);
        assert!(cfg.max_file_upload_size > cfg.max_message_size as u64);
    }
}
