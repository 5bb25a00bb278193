//! Unified error handling for topicd.
//!
//! Mirrors the error taxonomy a session actually reports to a client: every
//! variant maps to an HTTP-style `{ctrl code}` so handlers never have to
//! invent a status ad hoc.

use thiserror::Error;
use tokio::sync::mpsc;
use wire_proto::client::ServerMsg;

/// Errors surfaced while processing one client request inside a session or
/// topic actor. Never unwinds the actor: every variant is caught at the
/// dispatch site and turned into a `{ctrl}` reply plus a log line.
#[derive(Debug, Error)]
pub enum TopicError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("topic not found: {0}")]
    TopicNotFound(String),

    #[error("permission denied")]
    PermissionDenied,

    #[error("rate limited")]
    RateLimited,

    #[error("authentication required")]
    AuthRequired,

    #[error("invalid credentials")]
    AuthInvalid,

    #[error("credentials expired")]
    AuthExpired,

    #[error("payload too large")]
    TooLarge,

    #[error("outbound queue full")]
    QueueFull,

    #[error("persistence timeout")]
    PersistenceTimeout,

    #[error("remote node unreachable: {0}")]
    NodeUnreachable(String),

    #[error("ring signature mismatch, remote master out of sync")]
    ClusterDesync,

    #[error("a call is already in progress on this topic")]
    CallBusy,

    #[error("send error: {0}")]
    Send(#[from] mpsc::error::SendError<ServerMsg>),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TopicError {
    /// HTTP-style status this error should be reported to the client as.
    pub fn ctrl_code(&self) -> u16 {
        match self {
            Self::Malformed(_) => 400,
            Self::TopicNotFound(_) => 404,
            Self::PermissionDenied => 403,
            Self::RateLimited => 429,
            Self::AuthRequired => 401,
            Self::AuthInvalid => 401,
            Self::AuthExpired => 401,
            Self::TooLarge => 413,
            Self::QueueFull => 429,
            Self::PersistenceTimeout => 503,
            Self::NodeUnreachable(_) => 502,
            Self::ClusterDesync => 502,
            Self::CallBusy => 409,
            Self::Send(_) => 500,
            Self::Internal(_) => 500,
        }
    }

    /// Metric label, stable across message text changes.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::TopicNotFound(_) => "topic_not_found",
            Self::PermissionDenied => "permission_denied",
            Self::RateLimited => "rate_limited",
            Self::AuthRequired => "auth_required",
            Self::AuthInvalid => "auth_invalid",
            Self::AuthExpired => "auth_expired",
            Self::TooLarge => "too_large",
            Self::QueueFull => "queue_full",
            Self::PersistenceTimeout => "persistence_timeout",
            Self::NodeUnreachable(_) => "node_unreachable",
            Self::ClusterDesync => "cluster_desync",
            Self::CallBusy => "call_busy",
            Self::Send(_) => "send_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Build the `{ctrl}` reply a session sends back for this error.
    pub fn to_ctrl(&self, id: Option<String>, topic: Option<String>) -> wire_proto::client::Ctrl {
        wire_proto::client::Ctrl {
            id,
            topic,
            code: self.ctrl_code(),
            text: self.to_string(),
            params: Default::default(),
        }
    }

    /// Whether a transient error is worth a local retry (reconnect loops
    /// only — never a user-visible retry per the cluster-desync policy).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PersistenceTimeout | Self::NodeUnreachable(_))
    }
}

pub type TopicResult<T> = Result<T, TopicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_desync_maps_to_5xx_and_is_not_retried() {
        let err = TopicError::ClusterDesync;
        assert_eq!(err.ctrl_code(), 502);
        assert!(!err.is_transient());
    }

    #[test]
    fn quota_errors_map_to_4xx() {
        assert_eq!(TopicError::TooLarge.ctrl_code(), 413);
        assert_eq!(TopicError::RateLimited.ctrl_code(), 429);
    }

    #[test]
    fn error_codes_are_stable_metric_labels() {
        assert_eq!(TopicError::AuthRequired.error_code(), "auth_required");
        assert_eq!(TopicError::CallBusy.error_code(), "call_busy");
    }
}
