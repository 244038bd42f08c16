//! Evidence Packages that were altered after anchoring, replayed, lifted
//! from another log or presented under the wrong decision type.

use concord_decision::{DecisionError, DecisionPayload};
use concord_enforcement::{ActionRequest, EnforcementError};
use concord_engine::{Effect, Execution, GovernanceError};
use concord_tests::helpers::{egress_change, enter, standard_roster, triad_roster, TestEngine};
use concord_types::DecisionType;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn narrowed() -> (TestEngine, Execution) {
    let t = TestEngine::new(standard_roster());
    t.bootstrap_agent();
    let execution = t.pass(
        "h-1",
        DecisionPayload::CapabilityRestriction(egress_change(&["api.approved-service.com"])),
    );
    (t, execution)
}

fn external_fetch() -> ActionRequest {
    ActionRequest::new("fetch").egress("data.external.com")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_widened_motion_is_not_sanctioned() {
    let (t, execution) = narrowed();
    assert!(!t.check(external_fetch()).allowed);

    let mut forged = execution.evidence.clone();
    forged.motion = DecisionPayload::CapabilityRestriction(egress_change(&["*"]));
    forged.cm_diff = forged.motion.scope_change().and_then(|c| c.cm_diff.clone());

    let err = t.engine.apply(&forged).unwrap_err();
    assert!(
        matches!(
            err,
            GovernanceError::Enforcement(EnforcementError::NotSanctioned(_))
        ),
        "{err}"
    );
    assert!(!t.check(external_fetch()).allowed);
}

#[test]
fn test_edited_rationale_breaks_signatures() {
    let (t, execution) = narrowed();
    let authority = t.engine.decisions().signatures().clone();
    assert!(!execution.evidence.signatures.is_empty());
    execution
        .evidence
        .verify_signatures(authority.as_ref())
        .unwrap();

    let mut forged = execution.evidence.clone();
    forged.rationale = "approved unanimously by everyone".into();
    assert!(matches!(
        forged.verify_signatures(authority.as_ref()),
        Err(DecisionError::InvalidSignature(_))
    ));
}

#[test]
fn test_replayed_package_is_refused() {
    let (t, execution) = narrowed();
    let err = t.engine.apply(&execution.evidence).unwrap_err();
    assert!(matches!(
        err,
        GovernanceError::Enforcement(EnforcementError::AlreadyApplied(ep_id))
            if ep_id == execution.evidence.ep_id
    ));
}

#[test]
fn test_package_from_another_log_is_refused() {
    let (_, execution) = narrowed();

    let other = TestEngine::new(standard_roster());
    other.bootstrap_agent();
    let err = other.engine.apply(&execution.evidence).unwrap_err();
    assert!(matches!(
        err,
        GovernanceError::Enforcement(EnforcementError::NotSanctioned(_))
    ));
    assert!(other.check(external_fetch()).allowed);
}

#[test]
fn test_emergency_overlay_cannot_become_permanent() {
    let t = TestEngine::new(triad_roster());
    t.bootstrap_agent();
    let execution = t.pass(
        "h-1",
        enter(600, vec![egress_change(&["api.approved-service.com"])]),
    );
    let Effect::EmergencyEntered { overlays, .. } = &execution.effect else {
        panic!("expected emergency entry, got {:?}", execution.effect);
    };
    assert_eq!(overlays.len(), 1);

    let changes = execution.evidence.overlay_changes().unwrap();
    let err = t
        .engine
        .enforcement()
        .apply_capability_manifest(&changes[0])
        .unwrap_err();
    assert!(matches!(
        err,
        EnforcementError::WrongDecisionType {
            actual: DecisionType::D3,
            ..
        }
    ));
}
