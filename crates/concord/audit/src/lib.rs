//! # concord-audit
//!
//! Append-only, hash-chained audit log for the Meta-Concord governance engine.
//!
//! Every entry satisfies `this_hash = H(prev_hash || payload)`. There is no
//! update or delete path: `AuditLog` is the only writer of its entries, and the
//! append path is the single point of mutual exclusion in the engine.
//!
//! ## Components
//!
//! - **AuditLog**: serialized append with compare-and-swap on `prev_hash`
//!   (`prepare`/`commit`, `append_after`), chain verification, integrity halt
//! - **Merkle checkpoints**: periodic roots over committed ranges and
//!   inclusion proofs for single entries
//! - **AuditStore**: persistence backends (memory, JSON lines file)
//! - **ExternalAnchor**: fire-and-forget publication of checkpoint roots
//!
//! When the store stops accepting writes the log degrades to read-only and
//! queues payloads handed to [`AuditLog::record`] until [`AuditLog::recover`]
//! flushes them.

#![deny(unsafe_code)]

pub mod anchor;
pub mod entry;
pub mod error;
pub mod log;
pub mod merkle;
pub mod store;

pub use anchor::{AnchorAck, ExternalAnchor, RecordingAnchor};
pub use entry::{
    compute_entry_hash, AnchorPosition, AuditKind, AuditLogEntry, AuditPayload, PendingEntry,
};
pub use error::AuditError;
pub use log::{AuditConfig, AuditLog, Checkpoint, IntegrityReport, RecordOutcome};
pub use merkle::{merkle_root, verify_inclusion, MerkleProof, ProofStep, Side};
pub use store::{AuditStore, FileAuditStore, MemoryAuditStore};
