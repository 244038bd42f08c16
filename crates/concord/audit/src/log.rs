use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use concord_types::{ChainHash, Clock, SystemClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::anchor::{AnchorAck, ExternalAnchor};
use crate::entry::{compute_entry_hash, AnchorPosition, AuditLogEntry, AuditPayload, PendingEntry};
use crate::error::AuditError;
use crate::merkle::{self, MerkleProof};
use crate::store::{AuditStore, MemoryAuditStore};

/// Audit log tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// A Merkle checkpoint closes every `checkpoint_interval` entries. 0 disables.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    /// Payloads held while the store is unavailable.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,

    /// Publish each checkpoint root through the external anchor, if one is set.
    #[serde(default = "default_true")]
    pub anchor_checkpoints: bool,
}

fn default_checkpoint_interval() -> u64 {
    16
}

fn default_max_pending() -> usize {
    10_000
}

fn default_true() -> bool {
    true
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: default_checkpoint_interval(),
            max_pending: default_max_pending(),
            anchor_checkpoints: true,
        }
    }
}

/// Merkle root over a closed, committed range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub index: u64,
    pub from_seq: u64,
    pub to_seq: u64,
    pub root: ChainHash,
    pub created_at: DateTime<Utc>,
}

/// First integrity failure found by `verify_chain`; execution halts until reviewed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub seq: u64,
    pub reason: String,
    pub detected_at: DateTime<Utc>,
}

/// Result of [`AuditLog::record`].
#[derive(Clone, Debug, PartialEq)]
pub enum RecordOutcome {
    Committed(AuditLogEntry),
    /// Store unavailable; the payload waits in the queue at this depth.
    Queued { pending: usize },
}

impl RecordOutcome {
    pub fn entry(&self) -> Option<&AuditLogEntry> {
        match self {
            RecordOutcome::Committed(entry) => Some(entry),
            RecordOutcome::Queued { .. } => None,
        }
    }
}

#[derive(Default)]
struct LogState {
    entries: Vec<AuditLogEntry>,
    checkpoints: Vec<Checkpoint>,
    pending: VecDeque<AuditPayload>,
    read_only: bool,
    halted: Option<IntegrityReport>,
}

impl LogState {
    fn head(&self) -> ChainHash {
        self.entries
            .last()
            .map(|e| e.this_hash)
            .unwrap_or(ChainHash::GENESIS)
    }

    fn position(&self) -> AnchorPosition {
        AnchorPosition {
            seq: self.entries.len() as u64 + 1,
            prev_hash: self.head(),
        }
    }
}

/// Append-only, hash-chained audit log.
///
/// All writes go through one mutex; `prepare`/`commit` and `append_after`
/// additionally compare-and-swap on `prev_hash`, so two writers that read the
/// same head can never both produce a child of it.
pub struct AuditLog {
    state: Mutex<LogState>,
    store: Arc<dyn AuditStore>,
    config: AuditConfig,
    anchor: Option<Arc<dyn ExternalAnchor>>,
    clock: Arc<dyn Clock>,
}

impl AuditLog {
    pub fn new(config: AuditConfig, store: Arc<dyn AuditStore>) -> Self {
        Self {
            state: Mutex::new(LogState::default()),
            store,
            config,
            anchor: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(AuditConfig::default(), Arc::new(MemoryAuditStore::new()))
    }

    /// Reopen a log over a store that already holds entries.
    ///
    /// Entries are not verified here; call [`AuditLog::verify_all`].
    pub fn open(config: AuditConfig, store: Arc<dyn AuditStore>) -> Result<Self, AuditError> {
        let entries = store.load()?;
        let checkpoints = rebuild_checkpoints(&entries, config.checkpoint_interval);
        info!(
            store = store.name(),
            entries = entries.len(),
            checkpoints = checkpoints.len(),
            "Audit log opened"
        );
        Ok(Self {
            state: Mutex::new(LogState {
                entries,
                checkpoints,
                ..Default::default()
            }),
            store,
            config,
            anchor: None,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_anchor(mut self, anchor: Arc<dyn ExternalAnchor>) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// Time source for integrity reports.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    // ===== APPEND PATH =====

    pub fn head(&self) -> ChainHash {
        self.state.lock().head()
    }

    /// Slot the next committed entry will occupy.
    pub fn position(&self) -> AnchorPosition {
        self.state.lock().position()
    }

    pub fn len(&self) -> u64 {
        self.state.lock().entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Build an entry against the current head without committing it.
    pub fn prepare(&self, payload: AuditPayload) -> Result<PendingEntry, AuditError> {
        PendingEntry::build(self.position(), payload)
    }

    /// Commit a prepared entry. Fails with `ChainConflict` if the head moved.
    pub fn commit(&self, pending: PendingEntry) -> Result<AuditLogEntry, AuditError> {
        let mut state = self.state.lock();
        self.commit_locked(&mut state, pending)
    }

    /// Serialized append against whatever the head is.
    pub fn append(&self, payload: AuditPayload) -> Result<AuditLogEntry, AuditError> {
        let mut state = self.state.lock();
        let pending = PendingEntry::build(state.position(), payload)?;
        self.commit_locked(&mut state, pending)
    }

    /// Append only if the head is still `expected_prev`.
    pub fn append_after(
        &self,
        expected_prev: ChainHash,
        payload: AuditPayload,
    ) -> Result<AuditLogEntry, AuditError> {
        let mut state = self.state.lock();
        let head = state.head();
        if head != expected_prev {
            warn!(expected = %expected_prev, actual = %head, "Audit append lost the head race");
            return Err(AuditError::ChainConflict {
                expected: expected_prev,
                actual: head,
            });
        }
        let pending = PendingEntry::build(state.position(), payload)?;
        self.commit_locked(&mut state, pending)
    }

    fn commit_locked(
        &self,
        state: &mut LogState,
        pending: PendingEntry,
    ) -> Result<AuditLogEntry, AuditError> {
        if state.read_only {
            return Err(AuditError::ReadOnly {
                pending: state.pending.len(),
            });
        }

        let position = state.position();
        if pending.prev_hash != position.prev_hash || pending.seq != position.seq {
            warn!(
                seq = pending.seq,
                expected = %pending.prev_hash,
                actual = %position.prev_hash,
                "Audit commit rejected: prepared on a stale head"
            );
            return Err(AuditError::ChainConflict {
                expected: pending.prev_hash,
                actual: position.prev_hash,
            });
        }

        if compute_entry_hash(&pending.prev_hash, &pending.payload)? != pending.this_hash {
            return Err(AuditError::IntegrityViolation {
                seq: pending.seq,
                reason: "prepared entry hash does not match its payload".into(),
            });
        }

        let mut entry = AuditLogEntry {
            seq: pending.seq,
            payload: pending.payload,
            prev_hash: pending.prev_hash,
            this_hash: pending.this_hash,
            merkle_root_ref: None,
        };

        let checkpoint = self.checkpoint_closed_by(state, &entry);
        if let Some(cp) = &checkpoint {
            entry.merkle_root_ref = Some(cp.index);
        }

        if let Err(err) = self.store.persist(&entry) {
            state.read_only = true;
            error!(
                seq = entry.seq,
                store = self.store.name(),
                error = %err,
                "Audit store rejected write; log is now read-only"
            );
            return Err(err);
        }

        debug!(seq = entry.seq, kind = ?entry.payload.kind, subject = %entry.payload.subject, "Audit entry committed");
        state.entries.push(entry.clone());

        if let Some(cp) = checkpoint {
            info!(
                index = cp.index,
                from = cp.from_seq,
                to = cp.to_seq,
                root = %cp.root,
                "Merkle checkpoint closed"
            );
            if self.config.anchor_checkpoints {
                self.anchor_externally(cp.root, format!("checkpoint-{}", cp.index));
            }
            state.checkpoints.push(cp);
        }

        Ok(entry)
    }

    fn checkpoint_closed_by(&self, state: &LogState, entry: &AuditLogEntry) -> Option<Checkpoint> {
        let interval = self.config.checkpoint_interval;
        if interval == 0 || entry.seq % interval != 0 {
            return None;
        }
        let from_seq = entry.seq - interval + 1;
        let mut hashes: Vec<ChainHash> = state.entries[(from_seq - 1) as usize..]
            .iter()
            .map(|e| e.this_hash)
            .collect();
        hashes.push(entry.this_hash);
        let root = merkle::merkle_root(&hashes)?;
        Some(Checkpoint {
            index: entry.seq / interval,
            from_seq,
            to_seq: entry.seq,
            root,
            created_at: entry.payload.recorded_at,
        })
    }

    // ===== DEGRADED MODE =====

    /// Append, or queue the payload if the store is unavailable.
    ///
    /// Auditing is never skipped: a payload either commits or waits in the
    /// queue until [`AuditLog::recover`].
    pub fn record(&self, payload: AuditPayload) -> Result<RecordOutcome, AuditError> {
        let mut state = self.state.lock();
        if state.read_only {
            return self.enqueue(&mut state, payload);
        }
        let pending = PendingEntry::build(state.position(), payload.clone())?;
        match self.commit_locked(&mut state, pending) {
            Ok(entry) => Ok(RecordOutcome::Committed(entry)),
            Err(AuditError::Unavailable(reason)) => {
                warn!(%reason, "Audit payload queued while store is unavailable");
                self.enqueue(&mut state, payload)
            }
            Err(err) => Err(err),
        }
    }

    fn enqueue(
        &self,
        state: &mut LogState,
        payload: AuditPayload,
    ) -> Result<RecordOutcome, AuditError> {
        if state.pending.len() >= self.config.max_pending {
            return Err(AuditError::QueueFull(state.pending.len()));
        }
        state.pending.push_back(payload);
        Ok(RecordOutcome::Queued {
            pending: state.pending.len(),
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.state.lock().read_only
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Leave read-only mode and flush queued payloads in order.
    ///
    /// Stops at the first failure, leaving the rest queued and the log read-only.
    pub fn recover(&self) -> Result<usize, AuditError> {
        let mut state = self.state.lock();
        state.read_only = false;
        let mut flushed = 0;
        while let Some(payload) = state.pending.pop_front() {
            let pending = PendingEntry::build(state.position(), payload.clone())?;
            if let Err(err) = self.commit_locked(&mut state, pending) {
                state.pending.push_front(payload);
                state.read_only = true;
                return Err(err);
            }
            flushed += 1;
        }
        info!(flushed, "Audit log recovered; writes re-enabled");
        Ok(flushed)
    }

    // ===== READ PATH =====

    pub fn entry(&self, seq: u64) -> Option<AuditLogEntry> {
        let state = self.state.lock();
        seq.checked_sub(1)
            .and_then(|i| state.entries.get(i as usize))
            .cloned()
    }

    pub fn entries(&self, from: u64, to: u64) -> Result<Vec<AuditLogEntry>, AuditError> {
        let state = self.state.lock();
        check_range(state.entries.len() as u64, from, to)?;
        Ok(state.entries[(from - 1) as usize..to as usize].to_vec())
    }

    pub fn all_entries(&self) -> Vec<AuditLogEntry> {
        self.state.lock().entries.clone()
    }

    // ===== INTEGRITY =====

    /// Recompute hashes over `from..=to`. A mismatch halts execution trust.
    pub fn verify_chain(&self, from: u64, to: u64) -> Result<(), AuditError> {
        let mut state = self.state.lock();
        check_range(state.entries.len() as u64, from, to)?;
        let result = verify_entries(&state.entries, from, to);
        if let Err(AuditError::IntegrityViolation { seq, reason }) = &result {
            error!(seq, %reason, "Audit chain integrity violation; execution halted");
            if state.halted.is_none() {
                state.halted = Some(IntegrityReport {
                    seq: *seq,
                    reason: reason.clone(),
                    detected_at: self.clock.now(),
                });
            }
        }
        result
    }

    pub fn verify_all(&self) -> Result<(), AuditError> {
        let len = self.len();
        if len == 0 {
            return Ok(());
        }
        self.verify_chain(1, len)
    }

    pub fn integrity_halt(&self) -> Option<IntegrityReport> {
        self.state.lock().halted.clone()
    }

    pub fn is_halted(&self) -> bool {
        self.state.lock().halted.is_some()
    }

    /// Clear the halt after manual review of the affected range.
    pub fn acknowledge_review(&self) -> Option<IntegrityReport> {
        let cleared = self.state.lock().halted.take();
        if let Some(report) = &cleared {
            info!(seq = report.seq, "Integrity halt acknowledged after review");
        }
        cleared
    }

    // ===== MERKLE =====

    pub fn compute_merkle_root(&self, from: u64, to: u64) -> Result<ChainHash, AuditError> {
        let state = self.state.lock();
        check_range(state.entries.len() as u64, from, to)?;
        let hashes: Vec<ChainHash> = state.entries[(from - 1) as usize..to as usize]
            .iter()
            .map(|e| e.this_hash)
            .collect();
        merkle::merkle_root(&hashes).ok_or(AuditError::InvalidRange {
            from,
            to,
            len: state.entries.len() as u64,
        })
    }

    pub fn prove_inclusion(&self, seq: u64, from: u64, to: u64) -> Result<MerkleProof, AuditError> {
        let state = self.state.lock();
        let len = state.entries.len() as u64;
        check_range(len, from, to)?;
        if seq < from || seq > to {
            return Err(AuditError::InvalidRange { from, to, len });
        }
        let hashes: Vec<ChainHash> = state.entries[(from - 1) as usize..to as usize]
            .iter()
            .map(|e| e.this_hash)
            .collect();
        let steps = merkle::proof_steps(&hashes, (seq - from) as usize)
            .ok_or(AuditError::EntryNotFound(seq))?;
        let root = merkle::merkle_root(&hashes).ok_or(AuditError::EntryNotFound(seq))?;
        Ok(MerkleProof {
            seq,
            from_seq: from,
            to_seq: to,
            steps,
            root,
        })
    }

    /// Proof of `seq` against the checkpoint that covers it.
    pub fn prove_against_checkpoint(&self, seq: u64) -> Result<MerkleProof, AuditError> {
        let checkpoint = self
            .checkpoints()
            .into_iter()
            .find(|cp| cp.from_seq <= seq && seq <= cp.to_seq)
            .ok_or(AuditError::NotCheckpointed(seq))?;
        self.prove_inclusion(seq, checkpoint.from_seq, checkpoint.to_seq)
    }

    pub fn verify_inclusion(&self, entry: &AuditLogEntry, proof: &MerkleProof) -> bool {
        merkle::verify_inclusion(entry, proof)
    }

    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.state.lock().checkpoints.clone()
    }

    pub fn latest_checkpoint(&self) -> Option<Checkpoint> {
        self.state.lock().checkpoints.last().cloned()
    }

    // ===== ANCHORING =====

    /// Fire-and-forget publication of a root to the external anchor.
    ///
    /// Returns the spawned task so callers may await the ack; `None` when no
    /// anchor is configured or no tokio runtime is available.
    pub fn anchor_externally(
        &self,
        root: ChainHash,
        external_ref: impl Into<String>,
    ) -> Option<JoinHandle<Result<AnchorAck, AuditError>>> {
        let external_ref = external_ref.into();
        let Some(anchor) = self.anchor.clone() else {
            debug!(%root, %external_ref, "No external anchor configured");
            return None;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%root, %external_ref, "No async runtime; external anchoring skipped");
            return None;
        };
        Some(runtime.spawn(async move {
            let result = anchor.anchor(root, &external_ref).await;
            match &result {
                Ok(ack) => info!(%root, receipt = %ack.receipt, "Root anchored externally"),
                Err(err) => warn!(%root, error = %err, "External anchoring failed"),
            }
            result
        }))
    }

    #[cfg(test)]
    fn tamper<F: FnOnce(&mut AuditLogEntry)>(&self, seq: u64, f: F) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get_mut((seq - 1) as usize) {
            f(entry);
        }
    }
}

fn check_range(len: u64, from: u64, to: u64) -> Result<(), AuditError> {
    if from == 0 || from > to || to > len {
        return Err(AuditError::InvalidRange { from, to, len });
    }
    Ok(())
}

fn verify_entries(entries: &[AuditLogEntry], from: u64, to: u64) -> Result<(), AuditError> {
    for seq in from..=to {
        let entry = &entries[(seq - 1) as usize];
        if entry.seq != seq {
            return Err(AuditError::IntegrityViolation {
                seq,
                reason: format!("expected seq {seq}, found {}", entry.seq),
            });
        }
        let expected_prev = if seq == 1 {
            ChainHash::GENESIS
        } else {
            entries[(seq - 2) as usize].this_hash
        };
        if entry.prev_hash != expected_prev {
            return Err(AuditError::IntegrityViolation {
                seq,
                reason: "previous hash link mismatch".into(),
            });
        }
        if !entry.hash_matches()? {
            return Err(AuditError::IntegrityViolation {
                seq,
                reason: "entry hash does not match H(prev_hash || payload)".into(),
            });
        }
    }
    Ok(())
}

fn rebuild_checkpoints(entries: &[AuditLogEntry], interval: u64) -> Vec<Checkpoint> {
    if interval == 0 {
        return Vec::new();
    }
    entries
        .chunks_exact(interval as usize)
        .filter_map(|chunk| {
            let hashes: Vec<ChainHash> = chunk.iter().map(|e| e.this_hash).collect();
            let first = chunk.first()?;
            let last = chunk.last()?;
            Some(Checkpoint {
                index: last.seq / interval,
                from_seq: first.seq,
                to_seq: last.seq,
                root: merkle::merkle_root(&hashes)?,
                created_at: last.payload.recorded_at,
            })
        })
        .collect()
}
