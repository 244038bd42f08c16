//! Reference scenarios: the canonical D2 restriction, class dissent,
//! emergency expiry, filing escalation and the audit head race.

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Duration;
use concord_audit::{AuditError, AuditKind, AuditLog, AuditPayload};
use concord_decision::{
    DecisionError, DecisionPayload, Grounds, GroundsCategory, Proposal, RejectionReason,
};
use concord_emergency::{EmergencyEnd, EmergencyPhase};
use concord_enforcement::{ActionRequest, DenialReason};
use concord_engine::{Effect, GovernanceError};
use concord_tests::helpers::{
    agent, egress_change, enter, standard_roster, t0, triad_roster, TestEngine,
};
use concord_types::{DecisionId, DecisionState, PartyClass, PartyId, VoteChoice};

use VoteChoice::{Approve, Reject};

/// A D2 capability restriction passes 3/1 with every class
/// assenting and narrows network egress.
#[test]
fn test_capability_restriction_narrows_egress() {
    let t = TestEngine::new(standard_roster());
    t.bootstrap_agent();
    assert!(t.check(ActionRequest::new("fetch").egress("api.external.com")).allowed);

    let id = t
        .engine
        .propose(
            Proposal::new(
                "h-1",
                DecisionPayload::CapabilityRestriction(egress_change(&[
                    "api.approved-service.com",
                ])),
            )
            .with_id("dec-042")
            .rationale("exfiltration risk")
            .impact("egress limited to one vetted service"),
        )
        .unwrap();
    assert_eq!(id, DecisionId::new("dec-042"));
    t.vote(
        &id,
        &[("h-1", Approve), ("h-2", Reject), ("a-1", Approve), ("i-1", Approve)],
    );

    let finalization = t.engine.finalize(&id).unwrap();
    assert!(finalization.approved());
    let threshold = &finalization.tally.threshold;
    assert_eq!(threshold.approval_ratio, 0.75);
    assert!(threshold.approval_ratio >= threshold.threshold_required);
    assert!(threshold.class_wise_assent.all());

    let execution = t.engine.execute(&id).unwrap();
    assert_eq!(t.engine.decision_state(&id).unwrap(), DecisionState::Executed);
    let Effect::ScopeUpdated { snapshot } = &execution.effect else {
        panic!("expected a permanent scope update, got {:?}", execution.effect);
    };
    let manifest = snapshot.manifest.as_ref().unwrap();
    assert_eq!(manifest.network_egress, vec!["api.approved-service.com".to_string()]);
    assert_eq!(snapshot.last_applied, Some(execution.evidence.ep_id));

    // The EP occupies the audit slot it names.
    let anchor = execution.evidence.audit_anchor_ref;
    let entry = t.engine.audit().entry(anchor.seq).unwrap();
    assert_eq!(entry.payload.kind, AuditKind::EvidencePackage);
    assert_eq!(entry.prev_hash, anchor.prev_hash);

    let wire = serde_json::to_value(&execution.evidence).unwrap();
    assert_eq!(wire["decision_type"], "D2");
    for field in [
        "ep_id",
        "decision_id",
        "participants",
        "quorum_proof",
        "threshold_proof",
        "rationale",
        "impact_statement",
        "timestamps",
        "audit_anchor_ref",
        "cm_diff",
    ] {
        assert!(wire.get(field).is_some(), "EP is missing {field}");
    }

    let denied = t.check(ActionRequest::new("fetch").egress("api.external.com"));
    assert_eq!(
        denied.denial,
        Some(DenialReason::EgressBlocked {
            host: "api.external.com".into()
        })
    );
    assert!(t.check(ActionRequest::new("fetch").egress("api.approved-service.com")).allowed);
}

/// The same motion with the only I-class voter rejecting is
/// rejected despite a 0.75 approval ratio.
#[test]
fn test_single_dissenting_class_rejects() {
    let t = TestEngine::new(standard_roster());
    t.bootstrap_agent();
    let id = t.propose(
        "h-1",
        DecisionPayload::CapabilityRestriction(egress_change(&["api.approved-service.com"])),
    );
    t.vote(
        &id,
        &[("h-1", Approve), ("h-2", Approve), ("a-1", Approve), ("i-1", Reject)],
    );

    let finalization = t.engine.finalize(&id).unwrap();
    assert!(!finalization.approved());
    assert_eq!(finalization.outcome, DecisionState::Rejected);
    assert_eq!(finalization.tally.threshold.approval_ratio, 0.75);
    assert!(!*finalization
        .tally
        .threshold
        .class_wise_assent
        .get(PartyClass::Infrastructure));
    assert_eq!(
        finalization.tally.rejections,
        vec![RejectionReason::ClassDidNotAssent {
            class: PartyClass::Infrastructure
        }]
    );
    assert_eq!(
        finalization.tally.rejections[0].to_string(),
        "class I did not assent"
    );

    assert!(matches!(
        t.engine.execute(&id),
        Err(GovernanceError::Decision(DecisionError::NotApproved { .. }))
    ));
    let state = t.engine.get_current_scope_state(&agent()).unwrap();
    assert_eq!(state.version, 1);
}

/// A unanimous tri-class emergency entry activates at once; at
/// its deadline with no renewal the engine is back to normal and the
/// emergency overlay is gone.
#[test]
fn test_emergency_overlay_reverts_at_deadline() {
    let t = TestEngine::new(triad_roster());
    t.bootstrap_agent();

    let id = t
        .engine
        .propose(
            Proposal::new("h-1", enter(600, vec![egress_change(&["internal.only"])]))
                .with_id("dec-043")
                .rationale("active intrusion")
                .impact("agent isolated for ten minutes"),
        )
        .unwrap();
    assert_eq!(
        t.engine.emergency().snapshot().unwrap().phase,
        EmergencyPhase::EmergencyProposed
    );
    t.approve_all(&id);
    assert!(t.engine.finalize(&id).unwrap().approved());
    let execution = t.engine.execute(&id).unwrap();

    let Effect::EmergencyEntered {
        epoch,
        overlays,
        refused_overlays,
    } = &execution.effect
    else {
        panic!("expected emergency entry, got {:?}", execution.effect);
    };
    assert_eq!(epoch.deadline, t0() + Duration::seconds(600));
    assert_eq!(overlays.len(), 1);
    assert!(refused_overlays.is_empty());
    assert!(!t.check(ActionRequest::new("fetch").egress("api.external.com")).allowed);
    assert!(t.check(ActionRequest::new("fetch").egress("internal.only")).allowed);

    t.clock.advance_secs(599);
    assert!(!t.check(ActionRequest::new("fetch").egress("api.external.com")).allowed);

    t.clock.advance_secs(1);
    assert!(t.check(ActionRequest::new("fetch").egress("api.external.com")).allowed);
    let snapshot = t.engine.emergency().snapshot().unwrap();
    assert_eq!(snapshot.phase, EmergencyPhase::Normal);
    let record = t.engine.emergency().epoch(1).unwrap();
    assert_eq!(record.ended_at, Some(t0() + Duration::seconds(600)));
    assert_eq!(record.end, Some(EmergencyEnd::Expired));

    let state = t.engine.get_current_scope_state(&agent()).unwrap();
    assert!(state.overlays.is_empty());
    assert_eq!(
        state.manifest.unwrap().network_egress,
        vec!["*.external.com".to_string()]
    );
    assert_eq!(t.engine.enforcement().emergency_epoch(), None);
}

/// Identical objections cost escalating bonds and a fourth
/// filing inside the rate window is refused.
#[test]
fn test_repeat_objections_escalate_and_are_rate_limited() {
    let t = TestEngine::new(standard_roster());
    t.bootstrap_agent();
    let id = t
        .engine
        .propose(
            Proposal::new(
                "h-1",
                DecisionPayload::CapabilityRestriction(egress_change(&[
                    "api.approved-service.com",
                ])),
            )
            .with_id("dec-042")
            .rationale("exfiltration risk")
            .impact("egress limited"),
        )
        .unwrap();
    t.approve_all(&id);
    t.engine.finalize(&id).unwrap();

    let objector = PartyId::new("a-1");
    let grounds = Grounds::new(
        GroundsCategory::Procedural,
        "voting window closed early without notice",
    );
    let bonds: Vec<u64> = (0..3)
        .map(|_| {
            t.engine
                .file_objection(&id, &objector, grounds.clone())
                .unwrap()
                .bond_required
        })
        .collect();
    assert_eq!(bonds[0], 0);
    assert!(bonds[1] > bonds[0]);
    assert!(bonds[2] > bonds[1]);

    match t.engine.file_objection(&id, &objector, grounds.clone()) {
        Err(GovernanceError::Decision(DecisionError::TooManyRequests { party, .. })) => {
            assert_eq!(party, objector);
        }
        other => panic!("expected TooManyRequests, got {other:?}"),
    }

    // Empty grounds are inadmissible regardless of rate.
    assert!(matches!(
        t.engine.file_objection(
            &id,
            &PartyId::new("h-2"),
            Grounds::new(GroundsCategory::Other, "  ")
        ),
        Err(GovernanceError::Decision(
            DecisionError::InadmissibleGrounds(_)
        ))
    ));
}

/// Two entries prepared against the same head; exactly one
/// commits and the other must retry against the new head.
#[test]
fn test_conflicting_appends_resolve_to_one_winner() {
    let log = Arc::new(AuditLog::in_memory());
    log.append(payload("genesis")).unwrap();

    let head = log.head();
    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = ["left", "right"]
        .into_iter()
        .map(|subject| {
            let log = log.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                log.append_after(head, payload(subject))
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = results.into_iter().find_map(Result::err).unwrap();
    let AuditError::ChainConflict { expected, actual } = loser else {
        panic!("expected ChainConflict, got {loser:?}");
    };
    assert_eq!(expected, head);
    assert_eq!(actual, log.head());

    log.append_after(log.head(), payload("retry")).unwrap();
    assert_eq!(log.len(), 3);
    log.verify_all().unwrap();
}

fn payload(subject: &str) -> AuditPayload {
    AuditPayload::new(
        AuditKind::Informational,
        subject,
        t0(),
        &serde_json::json!({ "note": subject }),
    )
    .unwrap()
}

/// Prepared entries go stale once another writer commits.
#[test]
fn test_prepared_entry_goes_stale() {
    let log = AuditLog::in_memory();
    let stale = log.prepare(payload("first")).unwrap();
    log.append(payload("second")).unwrap();
    assert!(matches!(
        log.commit(stale),
        Err(AuditError::ChainConflict { .. })
    ));
}
