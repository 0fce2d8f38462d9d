//! Error kinds surfaced by the control plane
//!
//! Per-host and per-record failures are contained at the dispatch and
//! pipeline boundaries; these variants mostly end up in logs rather than
//! in caller-visible `Err` values.

use thiserror::Error;

/// Errors produced by the coordinator core
#[derive(Debug, Error)]
pub enum PodiumError {
    /// An agent RPC failed or timed out
    #[error("host {host} unreachable: {reason}")]
    HostUnreachable { host: String, reason: String },

    /// No registered agent owns the endpoint
    #[error("no host found for endpoint {0}")]
    UnresolvedEndpoint(String),

    /// A bounded record queue rejected a record
    #[error("{queue} queue is full, dropping {record}")]
    QueueFull { queue: &'static str, record: String },

    /// Malformed intent or rule field
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// Latency reduction requested with an unsupported method
    #[error("unknown reduction method: {0}")]
    UnknownReductionMethod(String),

    /// Configuration could not be read or a parameter could not be set
    #[error("configuration error: {0}")]
    Config(String),

    /// A record blob from an agent could not be decoded
    #[error("failed to decode records: {0}")]
    Decode(#[from] serde_json::Error),
}

impl PodiumError {
    pub fn unreachable(host: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::HostUnreachable {
            host: host.into(),
            reason: reason.to_string(),
        }
    }
}

pub type PodiumResult<T> = std::result::Result<T, PodiumError>;
