//! Persistence backends for committed audit entries.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::entry::AuditLogEntry;
use crate::error::AuditError;

/// Durable home of committed entries. Append-only: there is no update or delete.
pub trait AuditStore: Send + Sync {
    /// Persist one committed entry. A failure means the entry was not stored.
    fn persist(&self, entry: &AuditLogEntry) -> Result<(), AuditError>;

    /// Every stored entry, in sequence order.
    fn load(&self) -> Result<Vec<AuditLogEntry>, AuditError>;

    fn name(&self) -> &'static str;
}

/// In-memory store, used for tests and embedded deployments.
///
/// Can be switched offline to exercise the read-only degradation path.
pub struct MemoryAuditStore {
    entries: RwLock<Vec<AuditLogEntry>>,
    available: AtomicBool,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate a storage outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditStore for MemoryAuditStore {
    fn persist(&self, entry: &AuditLogEntry) -> Result<(), AuditError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("memory store offline".into()));
        }
        self.entries.write().push(entry.clone());
        Ok(())
    }

    fn load(&self) -> Result<Vec<AuditLogEntry>, AuditError> {
        Ok(self.entries.read().clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// JSON-lines file store with append-only writes.
pub struct FileAuditStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAuditStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditStore for FileAuditStore {
    fn persist(&self, entry: &AuditLogEntry) -> Result<(), AuditError> {
        let line = serde_json::to_string(entry)?;
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AuditError::Unavailable(format!("{}: {e}", self.path.display())))?;
        let write_line = |file: &mut File| -> std::io::Result<()> {
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
            file.flush()
        };
        write_line(&mut file)
            .map_err(|e| AuditError::Unavailable(format!("{}: {e}", self.path.display())))
    }

    fn load(&self) -> Result<Vec<AuditLogEntry>, AuditError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
