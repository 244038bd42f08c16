//! Audit files edited on disk between runs.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use concord_audit::{AuditConfig, AuditError, AuditLog, FileAuditStore};
use concord_decision::{DecisionError, DecisionPayload};
use concord_engine::{Effect, GovernanceConfig, GovernanceError, StorageConfig};
use concord_tests::helpers::{egress_change, standard_roster, TestEngine};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn file_config(path: &Path) -> GovernanceConfig {
    GovernanceConfig {
        storage: StorageConfig::File {
            path: path.to_path_buf(),
        },
        ..Default::default()
    }
}

/// Run one narrowing decision against a file-backed log.
fn populate(path: &Path) -> u64 {
    let t = TestEngine::with_config(file_config(path), standard_roster());
    t.bootstrap_agent();
    t.pass(
        "h-1",
        DecisionPayload::CapabilityRestriction(egress_change(&["api.approved-service.com"])),
    );
    t.engine.audit().len()
}

fn edit_lines(path: &Path, edit: impl FnOnce(&mut Vec<serde_json::Value>)) {
    let text = fs::read_to_string(path).unwrap();
    let mut lines: Vec<serde_json::Value> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    edit(&mut lines);
    let mut out = String::new();
    for line in &lines {
        out.push_str(&serde_json::to_string(line).unwrap());
        out.push('\n');
    }
    fs::write(path, out).unwrap();
}

fn reopen(path: &Path) -> AuditLog {
    let store = FileAuditStore::new(path).unwrap();
    AuditLog::open(AuditConfig::default(), Arc::new(store)).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_untouched_file_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let len = populate(&path);

    let log = reopen(&path);
    assert_eq!(log.len(), len);
    log.verify_all().unwrap();
}

#[test]
fn test_edited_subject_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    populate(&path);
    edit_lines(&path, |lines| {
        lines[1]["payload"]["subject"] = serde_json::json!("nothing-to-see");
    });

    let log = reopen(&path);
    match log.verify_all() {
        Err(AuditError::IntegrityViolation { seq, .. }) => assert_eq!(seq, 2),
        other => panic!("edit went unnoticed: {other:?}"),
    }
    assert_eq!(log.integrity_halt().map(|r| r.seq), Some(2));
}

#[test]
fn test_deleted_entry_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    populate(&path);
    edit_lines(&path, |lines| {
        lines.remove(1);
    });

    let log = reopen(&path);
    assert!(matches!(
        log.verify_all(),
        Err(AuditError::IntegrityViolation { seq: 2, .. })
    ));
}

#[test]
fn test_halt_blocks_execution_until_reviewed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    populate(&path);
    edit_lines(&path, |lines| {
        lines[1]["payload"]["subject"] = serde_json::json!("nothing-to-see");
    });

    let t = TestEngine::with_config(file_config(&path), standard_roster());
    t.bootstrap_agent();
    let id = t.propose(
        "h-1",
        DecisionPayload::CapabilityRestriction(egress_change(&["api.approved-service.com"])),
    );
    t.approve_all(&id);
    assert!(t.engine.finalize(&id).unwrap().approved());

    assert!(t.engine.audit().verify_all().is_err());
    assert!(matches!(
        t.engine.execute(&id),
        Err(GovernanceError::Decision(DecisionError::IntegrityHalt { seq: 2 }))
    ));

    let report = t.engine.audit().acknowledge_review().unwrap();
    assert_eq!(report.seq, 2);
    let execution = t.engine.execute(&id).unwrap();
    assert!(matches!(execution.effect, Effect::ScopeUpdated { .. }));
}
