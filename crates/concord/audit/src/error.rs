use concord_types::{ChainHash, HashError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("chain conflict: entry was prepared on {expected} but the head is now {actual}; retry against the new head")]
    ChainConflict {
        expected: ChainHash,
        actual: ChainHash,
    },

    #[error("integrity violation at seq {seq}: {reason}")]
    IntegrityViolation { seq: u64, reason: String },

    #[error("audit store unavailable: {0}")]
    Unavailable(String),

    #[error("audit log is read-only with {pending} queued payloads")]
    ReadOnly { pending: usize },

    #[error("audit queue full ({0} payloads pending)")]
    QueueFull(usize),

    #[error("invalid range {from}..={to} (log holds {len} entries)")]
    InvalidRange { from: u64, to: u64, len: u64 },

    #[error("no entry at seq {0}")]
    EntryNotFound(u64),

    #[error("seq {0} is not covered by any checkpoint yet")]
    NotCheckpointed(u64),

    #[error("anchor rejected: {0}")]
    AnchorRejected(String),

    #[error("hash error: {0}")]
    Hash(#[from] HashError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
