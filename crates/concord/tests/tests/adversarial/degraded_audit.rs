//! Running with the audit store down: reads and checks continue, governance
//! writes stop, and nothing is skipped once the store returns.

use std::sync::Arc;

use concord_audit::{AuditConfig, AuditLog, MemoryAuditStore};
use concord_decision::{DecisionError, DecisionPayload, Proposal};
use concord_enforcement::{ActionRequest, EnforcementError};
use concord_engine::GovernanceError;
use concord_tests::helpers::{agent, egress_change, standard_roster, TestEngine};
use concord_types::{PartyId, ScopeId, VoteChoice};

fn degraded() -> (TestEngine, Arc<MemoryAuditStore>) {
    let store = Arc::new(MemoryAuditStore::new());
    let audit = Arc::new(AuditLog::new(AuditConfig::default(), store.clone()));
    let t = TestEngine::over_audit(audit, standard_roster());
    t.bootstrap_agent();
    (t, store)
}

#[test]
fn test_denials_are_queued_while_store_is_down() {
    let (t, store) = degraded();
    let committed = t.engine.audit().len();
    store.set_available(false);

    assert!(!t.check(ActionRequest::new("shell")).allowed);
    assert!(t.engine.audit().is_read_only());
    assert_eq!(t.engine.audit().pending_len(), 1);
    assert_eq!(t.engine.audit().len(), committed);

    // Queued, not dropped: the next denial lands behind the first.
    assert!(!t.check(ActionRequest::new("delete_prod")).allowed);
    assert_eq!(t.engine.audit().pending_len(), 2);
    assert!(t.check(ActionRequest::new("search")).allowed);
}

#[test]
fn test_governance_writes_refused_while_read_only() {
    let (t, store) = degraded();
    let id = t.propose(
        "h-1",
        DecisionPayload::CapabilityRestriction(egress_change(&["api.approved-service.com"])),
    );
    store.set_available(false);
    t.check(ActionRequest::new("shell"));

    let proposal = Proposal::new(
        "h-2",
        DecisionPayload::CapabilityRestriction(egress_change(&["*.internal"])),
    )
    .rationale("tighten egress")
    .impact("fewer hosts");
    assert!(matches!(
        t.engine.propose(proposal),
        Err(GovernanceError::Decision(DecisionError::ReadOnly))
    ));
    assert!(matches!(
        t.engine
            .cast_vote(&id, &PartyId::new("h-1"), VoteChoice::Approve),
        Err(GovernanceError::Decision(DecisionError::ReadOnly))
    ));
    assert!(matches!(
        t.engine.bootstrap_scope(
            ScopeId::new("agent-8"),
            Default::default(),
            Default::default()
        ),
        Err(GovernanceError::Enforcement(EnforcementError::ReadOnly))
    ));
    // State reads stay available.
    assert_eq!(t.engine.get_current_scope_state(&agent()).unwrap().version, 1);
}

#[test]
fn test_recovery_flushes_queue_in_order() {
    let (t, store) = degraded();
    let committed = t.engine.audit().len();
    store.set_available(false);
    t.check(ActionRequest::new("shell"));
    t.check(ActionRequest::new("delete_prod"));

    // Still down: recovery fails and the log stays read-only.
    assert!(t.engine.audit().recover().is_err());
    assert!(t.engine.audit().is_read_only());
    assert_eq!(t.engine.audit().pending_len(), 2);

    store.set_available(true);
    assert_eq!(t.engine.audit().recover().unwrap(), 2);
    assert!(!t.engine.audit().is_read_only());
    assert_eq!(t.engine.audit().len(), committed + 2);
    t.engine.audit().verify_all().unwrap();

    let flushed = t.engine.audit().entries(committed + 1, committed + 2).unwrap();
    assert!(flushed[0].payload.body.to_string().contains("shell"));
    assert!(flushed[1].payload.body.to_string().contains("delete_prod"));

    t.pass(
        "h-1",
        DecisionPayload::CapabilityRestriction(egress_change(&["api.approved-service.com"])),
    );
}
