//! Many threads writing through one engine at once.

use std::sync::{Arc, Barrier};
use std::thread;

use concord_decision::DecisionPayload;
use concord_emergency::EmergencyError;
use concord_enforcement::{ActionContext, ActionRequest};
use concord_engine::{Effect, GovernanceError};
use concord_tests::helpers::{
    agent_constraints, agent_manifest, egress_change, enter, renew, standard_roster,
    triad_roster, TestEngine,
};
use concord_types::{PartyId, ScopeId, VoteChoice};

#[test]
fn test_parallel_votes_tally_once_per_party() {
    let t = TestEngine::new(standard_roster());
    let id = t.propose(
        "h-1",
        DecisionPayload::CapabilityRestriction(egress_change(&["api.approved-service.com"])),
    );

    let voters: Vec<PartyId> = t
        .engine
        .registry()
        .parties()
        .into_iter()
        .map(|p| p.party_id)
        .collect();
    // Every party votes twice, from two threads.
    let barrier = Arc::new(Barrier::new(voters.len() * 2));
    let handles: Vec<_> = voters
        .iter()
        .chain(voters.iter())
        .cloned()
        .map(|party_id| {
            let engine = t.engine.clone();
            let barrier = barrier.clone();
            let id = id.clone();
            thread::spawn(move || {
                barrier.wait();
                engine.cast_vote(&id, &party_id, VoteChoice::Approve)
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let finalization = t.engine.finalize(&id).unwrap();
    assert!(finalization.approved());
    assert_eq!(finalization.tally.threshold.total_votes, voters.len());
    assert_eq!(finalization.tally.threshold.approvals, voters.len());
}

#[test]
fn test_parallel_denials_keep_the_chain_intact() {
    const SCOPES: usize = 8;
    const CHECKS: usize = 10;

    let t = TestEngine::new(standard_roster());
    for i in 0..SCOPES {
        t.engine
            .bootstrap_scope(
                ScopeId::new(format!("agent-{i}")),
                agent_manifest(),
                agent_constraints(),
            )
            .unwrap();
    }
    let before = t.engine.audit().len();

    let barrier = Arc::new(Barrier::new(SCOPES));
    let handles: Vec<_> = (0..SCOPES)
        .map(|i| {
            let engine = t.engine.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let context = ActionContext::new(ScopeId::new(format!("agent-{i}")));
                barrier.wait();
                for _ in 0..CHECKS {
                    let decision = engine
                        .check_action_allowed(&ActionRequest::new("delete_prod"), &context)
                        .unwrap();
                    assert!(!decision.allowed);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let audit = t.engine.audit();
    assert_eq!(audit.len(), before + (SCOPES * CHECKS) as u64);
    audit.verify_all().unwrap();
}

#[test]
fn test_racing_renewals_accept_exactly_one() {
    let t = TestEngine::new(triad_roster());
    t.pass("h-1", enter(600, vec![]));

    let first = t.propose("h-1", renew(1, 300));
    let second = t.propose("a-1", renew(1, 300));
    for id in [&first, &second] {
        t.approve_all(id);
        assert!(t.engine.finalize(id).unwrap().approved());
    }

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [first, second]
        .into_iter()
        .map(|id| {
            let engine = t.engine.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                engine.execute(&id)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let accepted = results
        .iter()
        .filter(|r| matches!(r, Ok(e) if matches!(e.effect, Effect::EmergencyRenewed { .. })))
        .count();
    let conflicts = results
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(GovernanceError::Emergency(EmergencyError::RenewalConflict {
                    expected: 2,
                    got: 1
                }))
            )
        })
        .count();
    assert_eq!((accepted, conflicts), (1, 1));
    assert_eq!(t.engine.emergency().next_renewal_index().unwrap(), 2);
}
