//! Decision lifecycle paths beyond the reference scenarios: admission,
//! appeals, retrospective judgment and the finalize cutover.

use concord_decision::{
    DecisionError, DecisionPayload, EmergencyMotion, Grounds, GroundsCategory, StructuralChange,
};
use concord_engine::{Effect, GovernanceError, ILLEGITIMATE_EMERGENCY_SANCTION};
use concord_registry::RegistrationRequest;
use concord_tests::helpers::{agent, egress_change, enter, renew, standard_roster, TestEngine};
use concord_types::{DecisionState, PartyId, ScopeId, VoteChoice};

use VoteChoice::Approve;

#[test]
fn test_admission_through_structural_decision() {
    let t = TestEngine::new(standard_roster());
    let registration = RegistrationRequest::new("a-2", "A", Some(vec![]))
        .validate()
        .unwrap();
    let execution = t.pass(
        "h-1",
        DecisionPayload::Structural(StructuralChange::Admission(registration)),
    );
    assert_eq!(
        execution.effect,
        Effect::PartyAdmitted {
            party_id: PartyId::new("a-2")
        }
    );
    assert!(t.engine.registry().is_registered(&PartyId::new("a-2")));

    // The new member votes on the next decision.
    let id = t.propose(
        "a-2",
        DecisionPayload::Informational {
            summary: "a-2 onboarded".into(),
        },
    );
    assert!(t.engine.decision_state(&id).is_ok());
}

#[test]
fn test_invalid_registration_never_reaches_a_vote() {
    assert!(RegistrationRequest::new("x-1", "Q", Some(vec![])).validate().is_err());
    assert!(RegistrationRequest::new("x-1", "H", None).validate().is_err());
}

#[test]
fn test_overturned_appeal_blocks_execution() {
    let t = TestEngine::new(standard_roster());
    t.bootstrap_agent();
    let id = t.propose(
        "h-1",
        DecisionPayload::CapabilityRestriction(egress_change(&["api.approved-service.com"])),
    );
    t.approve_all(&id);
    t.engine.finalize(&id).unwrap();
    t.engine
        .file_appeal(
            &id,
            &PartyId::new("a-1"),
            Grounds::new(GroundsCategory::Substantive, "breaks the nightly sync job"),
        )
        .unwrap();
    assert_eq!(t.engine.decision_state(&id).unwrap(), DecisionState::Appealed);

    let resolution = t.engine.resolve_appeal(&id, false, "sync job is essential").unwrap();
    assert!(!resolution.upheld);
    assert!(t.engine.execute(&id).is_err());
    assert_eq!(t.engine.get_current_scope_state(&agent()).unwrap().version, 1);
}

#[test]
fn test_illegitimate_emergency_sanctions_its_proposers() {
    let t = TestEngine::new(standard_roster());
    t.pass("h-1", enter(600, vec![]));
    t.pass("a-1", renew(1, 3_600));
    t.pass(
        "i-1",
        DecisionPayload::Emergency(EmergencyMotion::Exit {
            reason: "no intrusion found".into(),
        }),
    );

    let sanctioned = t
        .engine
        .record_judgment(1, false, "entry was not justified")
        .unwrap();
    let scopes: Vec<ScopeId> = sanctioned.iter().map(|s| s.scope.clone()).collect();
    assert_eq!(
        scopes,
        vec![
            ScopeId::party(&PartyId::new("a-1")),
            ScopeId::party(&PartyId::new("h-1"))
        ]
    );
    for snapshot in sanctioned {
        assert_eq!(
            snapshot.sanction.map(|s| s.level),
            Some(ILLEGITIMATE_EMERGENCY_SANCTION)
        );
    }
}

#[test]
fn test_rejected_votes_cannot_change_after_finalize() {
    let t = TestEngine::new(standard_roster());
    let id = t.propose(
        "h-1",
        DecisionPayload::CapabilityRestriction(egress_change(&["a.example"])),
    );
    t.vote(&id, &[("h-1", Approve), ("h-2", Approve), ("a-1", Approve)]);
    t.engine.finalize(&id).unwrap();
    assert!(matches!(
        t.engine.cast_vote(&id, &PartyId::new("i-1"), Approve),
        Err(GovernanceError::Decision(DecisionError::VotingClosed { .. }))
    ));
}
