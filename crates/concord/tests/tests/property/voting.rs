//! Property tests: quorum, class-wise assent and finalize idempotence over
//! arbitrary vote distributions.

use concord_decision::DecisionPayload;
use concord_tests::helpers::{egress_change, party, TestEngine};
use concord_types::{DecisionState, Party, PartyClass, PartyId, VoteChoice};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

const ROSTER: [(&str, PartyClass); 6] = [
    ("h-1", PartyClass::Human),
    ("h-2", PartyClass::Human),
    ("a-1", PartyClass::Artificial),
    ("a-2", PartyClass::Artificial),
    ("i-1", PartyClass::Infrastructure),
    ("i-2", PartyClass::Infrastructure),
];

fn roster() -> Vec<Party> {
    ROSTER.iter().map(|(id, class)| party(id, *class)).collect()
}

/// `None` means the party stayed away.
fn arb_ballot() -> impl Strategy<Value = Option<VoteChoice>> {
    prop_oneof![
        Just(None),
        Just(Some(VoteChoice::Approve)),
        Just(Some(VoteChoice::Reject)),
        Just(Some(VoteChoice::Abstain)),
    ]
}

fn arb_ballots() -> impl Strategy<Value = Vec<Option<VoteChoice>>> {
    prop::collection::vec(arb_ballot(), ROSTER.len())
}

fn run(ballots: &[Option<VoteChoice>]) -> (TestEngine, concord_types::DecisionId) {
    let t = TestEngine::new(roster());
    let id = t.propose(
        "h-1",
        DecisionPayload::CapabilityRestriction(egress_change(&["api.approved-service.com"])),
    );
    for ((party_id, _), ballot) in ROSTER.iter().zip(ballots) {
        if let Some(choice) = ballot {
            t.engine
                .cast_vote(&id, &PartyId::new(*party_id), *choice)
                .unwrap();
        }
    }
    (t, id)
}

fn present_in(class: PartyClass, ballots: &[Option<VoteChoice>]) -> bool {
    ROSTER
        .iter()
        .zip(ballots)
        .any(|((_, c), b)| *c == class && b.is_some())
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A class with nobody present means no quorum and no approval.
    #[test]
    fn absent_class_never_approves(ballots in arb_ballots()) {
        let (t, id) = run(&ballots);
        let finalization = t.engine.finalize(&id).unwrap();

        if PartyClass::ALL.iter().any(|c| !present_in(*c, &ballots)) {
            prop_assert!(!finalization.tally.quorum.satisfied);
            prop_assert_eq!(finalization.outcome, DecisionState::Rejected);
        }
    }

    /// Any dissenting class rejects the decision whatever the overall ratio.
    #[test]
    fn no_unilateral_class_capture(ballots in arb_ballots()) {
        let (t, id) = run(&ballots);
        let finalization = t.engine.finalize(&id).unwrap();

        if !finalization.tally.threshold.class_wise_assent.all() {
            prop_assert_eq!(finalization.outcome, DecisionState::Rejected);
        }
        if finalization.approved() {
            prop_assert!(finalization.tally.quorum.satisfied);
            prop_assert!(finalization.tally.threshold.satisfied);
            for class in PartyClass::ALL {
                prop_assert!(*finalization.tally.threshold.class_wise_assent.get(class));
            }
        }
    }

    /// A second finalize returns the stored result unchanged.
    #[test]
    fn finalize_is_idempotent(ballots in arb_ballots(), later in 0i64..200_000) {
        let (t, id) = run(&ballots);
        let first = t.engine.finalize(&id).unwrap();
        t.clock.advance_secs(later);
        let second = t.engine.finalize(&id).unwrap();

        prop_assert_eq!(&first.tally.quorum, &second.tally.quorum);
        prop_assert_eq!(&first.tally.threshold, &second.tally.threshold);
        prop_assert_eq!(first, second);
    }
}
