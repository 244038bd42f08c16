//! Publication of checkpoint roots to an external tamper-evidence system.
//!
//! Anchoring is a boundary call: the internal chain is correct without it,
//! and a failed publication is logged rather than propagated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use concord_types::ChainHash;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::AuditError;

/// Acknowledgement returned by an external anchor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorAck {
    pub root: ChainHash,
    pub external_ref: String,
    pub acknowledged_at: DateTime<Utc>,
    /// Opaque receipt issued by the external system.
    pub receipt: String,
}

#[async_trait]
pub trait ExternalAnchor: Send + Sync {
    async fn anchor(&self, root: ChainHash, external_ref: &str) -> Result<AnchorAck, AuditError>;
}

/// Anchor that keeps publications in memory.
#[derive(Default)]
pub struct RecordingAnchor {
    published: RwLock<Vec<AnchorAck>>,
}

impl RecordingAnchor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<AnchorAck> {
        self.published.read().clone()
    }
}

#[async_trait]
impl ExternalAnchor for RecordingAnchor {
    async fn anchor(&self, root: ChainHash, external_ref: &str) -> Result<AnchorAck, AuditError> {
        if external_ref.trim().is_empty() {
            return Err(AuditError::AnchorRejected("empty external reference".into()));
        }
        let mut published = self.published.write();
        let ack = AnchorAck {
            root,
            external_ref: external_ref.to_string(),
            acknowledged_at: Utc::now(),
            receipt: format!("anchor-{}", published.len() + 1),
        };
        published.push(ack.clone());
        Ok(ack)
    }
}
