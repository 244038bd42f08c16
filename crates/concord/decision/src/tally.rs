//! Quorum and threshold evaluation.
//!
//! Failures here are outcomes, not errors: they resolve a decision to
//! `Rejected` and each one names the invariant that was not met.

use std::collections::BTreeMap;
use std::fmt;

use concord_types::{PartyClass, PartyId, PerClass, VoteChoice};
use serde::{Deserialize, Serialize};

use crate::policy::TypePolicy;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumProof {
    pub present_parties: Vec<PartyId>,
    pub class_counts: PerClass<usize>,
    pub satisfied: bool,
    /// Registered parties missing from a full-roll vote.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub absent_parties: Vec<PartyId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdProof {
    pub total_votes: usize,
    pub approvals: usize,
    pub rejections: usize,
    pub abstentions: usize,
    /// approvals / (approvals + rejections); abstentions count toward presence only.
    pub approval_ratio: f64,
    pub threshold_required: f64,
    pub class_wise_assent: PerClass<bool>,
    pub satisfied: bool,
}

/// The specific invariant a rejected decision failed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    QuorumNotSatisfied { class: PartyClass },
    TooFewParticipants { present: usize, required: usize },
    FullRollAbsent { absent: Vec<PartyId> },
    ThresholdNotSatisfied { approval_ratio: f64, threshold_required: f64 },
    ClassDidNotAssent { class: PartyClass },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::QuorumNotSatisfied { class } => {
                write!(f, "quorum not satisfied: no class {class} party present")
            }
            RejectionReason::TooFewParticipants { present, required } => {
                write!(f, "quorum not satisfied: {present} present, {required} required")
            }
            RejectionReason::FullRollAbsent { absent } => {
                let ids: Vec<&str> = absent.iter().map(PartyId::as_str).collect();
                write!(f, "quorum not satisfied: full roll required, absent {}", ids.join(", "))
            }
            RejectionReason::ThresholdNotSatisfied {
                approval_ratio,
                threshold_required,
            } => write!(
                f,
                "threshold not satisfied: approval ratio {approval_ratio:.4} below required {threshold_required:.4}"
            ),
            RejectionReason::ClassDidNotAssent { class } => {
                write!(f, "class {class} did not assent")
            }
        }
    }
}

/// One counted ballot: the party's class is fixed when the vote is cast.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ballot {
    pub class: PartyClass,
    pub choice: VoteChoice,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TallyResult {
    pub quorum: QuorumProof,
    pub threshold: ThresholdProof,
    pub rejections: Vec<RejectionReason>,
}

impl TallyResult {
    pub fn approved(&self) -> bool {
        self.rejections.is_empty()
    }
}

#[derive(Default, Clone, Copy)]
struct ClassVotes {
    present: usize,
    approvals: usize,
    rejections: usize,
}

/// Evaluate a consistent snapshot of ballots against a type policy.
///
/// `full_roll` lists every registered party when the decision requires all of
/// them to be present (admissions).
pub fn tally(
    ballots: &BTreeMap<PartyId, Ballot>,
    policy: &TypePolicy,
    full_roll: Option<&[PartyId]>,
) -> TallyResult {
    let mut per_class: PerClass<ClassVotes> = PerClass::default();
    let (mut approvals, mut rejections, mut abstentions) = (0usize, 0usize, 0usize);

    for ballot in ballots.values() {
        let class = per_class.get_mut(ballot.class);
        class.present += 1;
        match ballot.choice {
            VoteChoice::Approve => {
                class.approvals += 1;
                approvals += 1;
            }
            VoteChoice::Reject => {
                class.rejections += 1;
                rejections += 1;
            }
            VoteChoice::Abstain => abstentions += 1,
        }
    }

    let mut reasons = Vec::new();

    let class_counts = PerClass::new(
        per_class.human.present,
        per_class.artificial.present,
        per_class.infrastructure.present,
    );
    for (class, count) in class_counts.iter() {
        if *count == 0 {
            reasons.push(RejectionReason::QuorumNotSatisfied { class });
        }
    }
    let present = ballots.len();
    if present < policy.min_participants {
        reasons.push(RejectionReason::TooFewParticipants {
            present,
            required: policy.min_participants,
        });
    }
    let absent_parties: Vec<PartyId> = full_roll
        .map(|roll| {
            roll.iter()
                .filter(|id| !ballots.contains_key(*id))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    if !absent_parties.is_empty() {
        reasons.push(RejectionReason::FullRollAbsent {
            absent: absent_parties.clone(),
        });
    }
    let quorum_satisfied = reasons.is_empty();

    let decisive = approvals + rejections;
    let approval_ratio = if decisive == 0 {
        0.0
    } else {
        approvals as f64 / decisive as f64
    };
    let threshold_required = policy.threshold.ratio();
    let ratio_met = policy.threshold.is_met(approvals, decisive);
    if !ratio_met {
        reasons.push(RejectionReason::ThresholdNotSatisfied {
            approval_ratio,
            threshold_required,
        });
    }

    // A class assents when it cast at least one approval and no more
    // rejections than approvals.
    let assent_of = |v: &ClassVotes| v.approvals > 0 && v.approvals >= v.rejections;
    let class_wise_assent = PerClass::new(
        assent_of(&per_class.human),
        assent_of(&per_class.artificial),
        assent_of(&per_class.infrastructure),
    );
    for class in class_wise_assent.failing() {
        reasons.push(RejectionReason::ClassDidNotAssent { class });
    }

    let mut present_parties: Vec<PartyId> = ballots.keys().cloned().collect();
    present_parties.sort();

    TallyResult {
        quorum: QuorumProof {
            present_parties,
            class_counts,
            satisfied: quorum_satisfied,
            absent_parties,
        },
        threshold: ThresholdProof {
            total_votes: present,
            approvals,
            rejections,
            abstentions,
            approval_ratio,
            threshold_required,
            class_wise_assent,
            satisfied: ratio_met && class_wise_assent.all(),
        },
        rejections: reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DecisionConfig;
    use concord_types::DecisionType;

    fn d2() -> TypePolicy {
        DecisionConfig::default()
            .policy(DecisionType::D2)
            .cloned()
            .unwrap()
    }

    fn ballots(votes: &[(&str, PartyClass, VoteChoice)]) -> BTreeMap<PartyId, Ballot> {
        votes
            .iter()
            .map(|(id, class, choice)| {
                (
                    PartyId::new(*id),
                    Ballot {
                        class: *class,
                        choice: *choice,
                    },
                )
            })
            .collect()
    }

    use PartyClass::{Artificial as A, Human as H, Infrastructure as I};
    use VoteChoice::{Abstain, Approve, Reject};

    #[test]
    fn three_of_four_with_every_class_assenting_approves() {
        let result = tally(
            &ballots(&[
                ("h-1", H, Approve),
                ("h-2", H, Reject),
                ("a-1", A, Approve),
                ("i-1", I, Approve),
            ]),
            &d2(),
            None,
        );
        assert!(result.approved(), "{:?}", result.rejections);
        assert_eq!(result.quorum.class_counts, PerClass::new(2, 1, 1));
        assert_eq!(result.threshold.approval_ratio, 0.75);
        assert!(result.threshold.class_wise_assent.all());
        assert!(result.threshold.satisfied);
    }

    #[test]
    fn single_dissenting_class_rejects_despite_ratio() {
        let result = tally(
            &ballots(&[
                ("h-1", H, Approve),
                ("h-2", H, Approve),
                ("a-1", A, Approve),
                ("i-1", I, Reject),
            ]),
            &d2(),
            None,
        );
        assert!(!result.approved());
        assert_eq!(result.threshold.approval_ratio, 0.75);
        assert!(!result.threshold.class_wise_assent.infrastructure);
        assert_eq!(
            result.rejections,
            vec![RejectionReason::ClassDidNotAssent { class: I }]
        );
        assert_eq!(result.rejections[0].to_string(), "class I did not assent");
    }

    #[test]
    fn missing_class_fails_quorum() {
        let result = tally(
            &ballots(&[
                ("h-1", H, Approve),
                ("h-2", H, Approve),
                ("a-1", A, Approve),
            ]),
            &d2(),
            None,
        );
        assert!(!result.quorum.satisfied);
        assert!(result
            .rejections
            .contains(&RejectionReason::QuorumNotSatisfied { class: I }));
    }

    #[test]
    fn abstentions_count_for_presence_not_ratio() {
        let result = tally(
            &ballots(&[
                ("h-1", H, Approve),
                ("a-1", A, Approve),
                ("i-1", I, Approve),
                ("i-2", I, Abstain),
            ]),
            &d2(),
            None,
        );
        assert!(result.approved());
        assert_eq!(result.threshold.total_votes, 4);
        assert_eq!(result.threshold.abstentions, 1);
        assert_eq!(result.threshold.approval_ratio, 1.0);
    }

    #[test]
    fn abstaining_class_does_not_assent() {
        let result = tally(
            &ballots(&[
                ("h-1", H, Approve),
                ("a-1", A, Approve),
                ("i-1", I, Abstain),
            ]),
            &d2(),
            None,
        );
        assert!(result.quorum.satisfied);
        assert!(result
            .rejections
            .contains(&RejectionReason::ClassDidNotAssent { class: I }));
    }

    #[test]
    fn full_roll_names_absent_parties() {
        let roll = vec![
            PartyId::new("a-1"),
            PartyId::new("h-1"),
            PartyId::new("h-2"),
            PartyId::new("i-1"),
        ];
        let result = tally(
            &ballots(&[
                ("h-1", H, Approve),
                ("a-1", A, Approve),
                ("i-1", I, Approve),
            ]),
            &d2(),
            Some(&roll),
        );
        assert!(!result.quorum.satisfied);
        assert_eq!(result.quorum.absent_parties, vec![PartyId::new("h-2")]);
    }

    #[test]
    fn below_threshold_is_named() {
        let result = tally(
            &ballots(&[
                ("h-1", H, Approve),
                ("h-2", H, Reject),
                ("a-1", A, Approve),
                ("a-2", A, Reject),
                ("i-1", I, Approve),
                ("i-2", I, Reject),
            ]),
            &d2(),
            None,
        );
        assert!(matches!(
            result.rejections.as_slice(),
            [RejectionReason::ThresholdNotSatisfied { .. }]
        ));
        assert!(result.rejections[0]
            .to_string()
            .starts_with("threshold not satisfied"));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn arb_ballots() -> impl Strategy<Value = BTreeMap<PartyId, Ballot>> {
            let class = prop_oneof![Just(H), Just(A), Just(I)];
            let choice = prop_oneof![Just(Approve), Just(Reject), Just(Abstain)];
            prop::collection::vec((class, choice), 0..12).prop_map(|votes| {
                votes
                    .into_iter()
                    .enumerate()
                    .map(|(i, (class, choice))| (PartyId::new(format!("p-{i}")), Ballot { class, choice }))
                    .collect()
            })
        }

        proptest! {
            /// Abstentions count toward presence but never toward the ratio.
            #[test]
            fn ratio_ignores_abstentions(ballots in arb_ballots()) {
                let result = tally(&ballots, &d2(), None);
                let proof = &result.threshold;
                prop_assert_eq!(proof.total_votes, ballots.len());
                prop_assert_eq!(proof.approvals + proof.rejections + proof.abstentions, ballots.len());
                let decisive = proof.approvals + proof.rejections;
                if decisive > 0 {
                    prop_assert_eq!(proof.approval_ratio, proof.approvals as f64 / decisive as f64);
                }
            }

            #[test]
            fn approval_needs_an_approver_in_every_class(ballots in arb_ballots()) {
                let result = tally(&ballots, &d2(), None);
                if result.approved() {
                    for class in PartyClass::ALL {
                        prop_assert!(ballots
                            .values()
                            .any(|b| b.class == class && b.choice == Approve));
                    }
                }
            }
        }
    }
}
