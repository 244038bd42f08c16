use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use concord_audit::{AuditError, AuditKind, AuditLog, AuditLogEntry, AuditPayload, PendingEntry};
use concord_registry::PartyRegistry;
use concord_types::{
    Clock, DecisionId, DecisionState, DecisionType, EpId, PartyClass, PartyId, Vote, VoteChoice,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::DecisionError;
use crate::evidence::{EvidenceBuilder, EvidencePackage, EvidenceTimestamps, Participant};
use crate::filing::{FilingDesk, FilingKind, FilingReceipt, Grounds};
use crate::policy::{DecisionConfig, Threshold, TypePolicy};
use crate::proposal::{DecisionPayload, Proposal, StructuralChange};
use crate::signer::{PartySignature, SignatureAuthority};
use crate::tally::{tally, Ballot, TallyResult};

/// Per-proposal adjustments to the type policy.
#[derive(Clone, Debug, Default)]
pub struct ProposalOptions {
    /// Replace the type's voting window.
    pub voting_window_secs: Option<u64>,
    /// Raise the approval bar. Never lowers the type's threshold.
    pub threshold: Option<Threshold>,
}

/// A vote together with the voter's class at the time it was cast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastBallot {
    pub vote: Vote,
    pub class: PartyClass,
}

/// Stored outcome of `finalize`; returned unchanged on every later call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Finalization {
    pub decision_id: DecisionId,
    pub outcome: DecisionState,
    pub tally: TallyResult,
    pub finalized_at: DateTime<Utc>,
}

impl Finalization {
    pub fn approved(&self) -> bool {
        self.outcome == DecisionState::Approved
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppealResolution {
    pub upheld: bool,
    pub rationale: String,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppealRecord {
    pub receipt: FilingReceipt,
    pub resolution: Option<AppealResolution>,
}

/// One decision and everything recorded about it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub decision_id: DecisionId,
    pub decision_type: DecisionType,
    pub proposer: PartyId,
    pub state: DecisionState,
    pub created_at: DateTime<Utc>,
    pub rationale: String,
    pub impact_statement: String,
    pub payload: DecisionPayload,
    /// Effective policy; `None` for D0.
    pub policy: Option<TypePolicy>,
    pub voting_opens_at: DateTime<Utc>,
    pub voting_closes_at: DateTime<Utc>,
    pub votes: BTreeMap<PartyId, CastBallot>,
    pub finalization: Option<Finalization>,
    pub evidence: Option<EvidencePackage>,
    pub objections: Vec<FilingReceipt>,
    pub appeal: Option<AppealRecord>,
}

impl Decision {
    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.finalization
            .as_ref()
            .filter(|f| f.approved())
            .map(|f| f.finalized_at)
    }

    /// Latest instant the decision may still be executed.
    pub fn execution_deadline(&self) -> Option<DateTime<Utc>> {
        Some(self.approved_at()? + self.policy.as_ref()?.execution_window())
    }

    /// Objections and appeals close at `approved_at` plus the appeal window.
    pub fn appeal_deadline(&self) -> Option<DateTime<Utc>> {
        Some(self.approved_at()? + self.policy.as_ref()?.appeal_window())
    }

    pub fn is_executable(&self) -> bool {
        match self.state {
            DecisionState::Approved => true,
            DecisionState::Resolved => {
                self.evidence.is_none()
                    && self
                        .appeal
                        .as_ref()
                        .and_then(|a| a.resolution.as_ref())
                        .is_some_and(|r| r.upheld)
            }
            _ => false,
        }
    }

    fn conflict_subjects(&self) -> Vec<String> {
        let mut subjects = self.payload.conflict_subjects();
        subjects.push(self.proposer.to_string());
        subjects
    }

    fn ballots(&self) -> BTreeMap<PartyId, Ballot> {
        self.votes
            .iter()
            .map(|(id, cast)| {
                (
                    id.clone(),
                    Ballot {
                        class: cast.class,
                        choice: cast.vote.choice,
                    },
                )
            })
            .collect()
    }
}

/// Decisions touched by a sweep.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SweepReport {
    pub opened: Vec<DecisionId>,
    pub finalized: Vec<(DecisionId, DecisionState)>,
    pub expired: Vec<DecisionId>,
}

/// Decision Engine: proposal lifecycle, voting, tallying, execution and
/// appeals.
///
/// Each decision is an independent state machine behind its own mutex, so
/// concurrent votes on one decision are atomic per party and a tally always
/// sees a consistent snapshot. Decisions share only the registry and the
/// audit log.
pub struct DecisionEngine {
    config: DecisionConfig,
    registry: Arc<PartyRegistry>,
    audit: Arc<AuditLog>,
    signatures: Arc<dyn SignatureAuthority>,
    clock: Arc<dyn Clock>,
    filings: FilingDesk,
    decisions: DashMap<DecisionId, Arc<Mutex<Decision>>>,
}

impl DecisionEngine {
    pub fn new(
        config: DecisionConfig,
        registry: Arc<PartyRegistry>,
        audit: Arc<AuditLog>,
        signatures: Arc<dyn SignatureAuthority>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let filings = FilingDesk::new(config.filing.clone());
        Self {
            config,
            registry,
            audit,
            signatures,
            clock,
            filings,
            decisions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PartyRegistry> {
        &self.registry
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn signatures(&self) -> &Arc<dyn SignatureAuthority> {
        &self.signatures
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ===== PROPOSALS =====

    pub fn propose(&self, proposal: Proposal) -> Result<DecisionId, DecisionError> {
        self.propose_with(proposal, ProposalOptions::default())
    }

    /// Accept a proposal from a registered party.
    ///
    /// D0 proposals are logged as informational entries and never voted on.
    pub fn propose_with(
        &self,
        proposal: Proposal,
        options: ProposalOptions,
    ) -> Result<DecisionId, DecisionError> {
        self.ensure_writable()?;
        self.registry.require(&proposal.proposer)?;
        proposal.payload.validate()?;
        if let DecisionPayload::Structural(StructuralChange::Admission(registration)) =
            &proposal.payload
        {
            self.registry.check_candidate(registration)?;
        }

        let decision_id = proposal
            .decision_id
            .clone()
            .unwrap_or_else(DecisionId::generate);
        let decision_type = proposal.decision_type();
        let now = self.clock.now();

        let policy = self.config.policy(decision_type).map(|base| {
            let mut policy = base.clone();
            if let Some(window) = options.voting_window_secs {
                policy.voting_window_secs = window;
            }
            if let Some(threshold) = options.threshold {
                policy.threshold = policy.threshold.stricter(threshold);
            }
            policy
        });
        let (state, opens_at, closes_at) = match &policy {
            Some(policy) => {
                let opens_at = now + policy.voting_delay();
                let state = if policy.voting_delay_secs == 0 {
                    DecisionState::Voting
                } else {
                    DecisionState::Proposed
                };
                (state, opens_at, opens_at + policy.voting_window())
            }
            None => (DecisionState::Executed, now, now),
        };

        let decision = Decision {
            decision_id: decision_id.clone(),
            decision_type,
            proposer: proposal.proposer.clone(),
            state,
            created_at: now,
            rationale: proposal.rationale.clone(),
            impact_statement: proposal.impact_statement.clone(),
            payload: proposal.payload.clone(),
            policy,
            voting_opens_at: opens_at,
            voting_closes_at: closes_at,
            votes: BTreeMap::new(),
            finalization: None,
            evidence: None,
            objections: Vec::new(),
            appeal: None,
        };

        match self.decisions.entry(decision_id.clone()) {
            Entry::Occupied(_) => return Err(DecisionError::Duplicate(decision_id)),
            Entry::Vacant(slot) => {
                if decision_type == DecisionType::D0 {
                    self.audit.append(AuditPayload::new(
                        AuditKind::Informational,
                        decision_id.to_string(),
                        now,
                        &proposal,
                    )?)?;
                }
                slot.insert(Arc::new(Mutex::new(decision)));
            }
        }

        info!(
            decision_id = %decision_id,
            decision_type = %decision_type,
            proposer = %proposal.proposer,
            state = %state,
            "Decision proposed"
        );
        Ok(decision_id)
    }

    // ===== VOTING =====

    /// Record a vote, replacing the party's earlier vote on this decision.
    pub fn cast_vote(
        &self,
        decision_id: &DecisionId,
        party_id: &PartyId,
        choice: VoteChoice,
    ) -> Result<Vote, DecisionError> {
        self.ensure_writable()?;
        let party = self.registry.require(party_id)?;
        let slot = self.slot(decision_id)?;
        let mut decision = slot.lock();
        let now = self.clock.now();
        self.refresh(&mut decision, now)?;

        match decision.state {
            DecisionState::Proposed => {
                return Err(DecisionError::VotingNotOpen {
                    decision_id: decision_id.clone(),
                    opens_at: decision.voting_opens_at,
                })
            }
            DecisionState::Voting if now < decision.voting_closes_at => {}
            state => {
                return Err(DecisionError::VotingClosed {
                    decision_id: decision_id.clone(),
                    state,
                })
            }
        }

        if let Some(subject) = decision
            .conflict_subjects()
            .into_iter()
            .find(|s| party.has_conflict_with(s))
        {
            warn!(decision_id = %decision_id, party = %party_id, %subject, "Vote refused: declared conflict");
            return Err(DecisionError::ConflictOfInterest {
                party: party_id.clone(),
                subject,
            });
        }

        let vote = Vote {
            decision_id: decision_id.clone(),
            party_id: party_id.clone(),
            choice,
            timestamp: now,
        };
        let replaced = decision
            .votes
            .insert(
                party_id.clone(),
                CastBallot {
                    vote: vote.clone(),
                    class: party.class,
                },
            )
            .is_some();
        debug!(decision_id = %decision_id, party = %party_id, ?choice, replaced, "Vote cast");
        Ok(vote)
    }

    /// Quorum and threshold evaluation over a consistent snapshot of votes.
    pub fn tally(&self, decision_id: &DecisionId) -> Result<TallyResult, DecisionError> {
        let slot = self.slot(decision_id)?;
        let decision = slot.lock();
        if let Some(finalization) = &decision.finalization {
            return Ok(finalization.tally.clone());
        }
        let policy = self.require_policy(&decision)?;
        let roll = self.full_roll(&decision);
        Ok(tally(&decision.ballots(), policy, roll.as_deref()))
    }

    /// Close voting and resolve the decision to `Approved` or `Rejected`.
    ///
    /// Idempotent: later calls return the stored result without re-tallying.
    pub fn finalize(&self, decision_id: &DecisionId) -> Result<Finalization, DecisionError> {
        let slot = self.slot(decision_id)?;
        let mut decision = slot.lock();
        if let Some(finalization) = &decision.finalization {
            return Ok(finalization.clone());
        }
        self.ensure_writable()?;
        let now = self.clock.now();
        self.refresh(&mut decision, now)?;
        self.finalize_locked(&mut decision, now)
    }

    fn finalize_locked(
        &self,
        decision: &mut Decision,
        now: DateTime<Utc>,
    ) -> Result<Finalization, DecisionError> {
        match decision.state {
            DecisionState::Voting => {}
            DecisionState::Proposed => {
                return Err(DecisionError::VotingNotOpen {
                    decision_id: decision.decision_id.clone(),
                    opens_at: decision.voting_opens_at,
                })
            }
            state => {
                return Err(DecisionError::VotingClosed {
                    decision_id: decision.decision_id.clone(),
                    state,
                })
            }
        }

        let policy = self.require_policy(decision)?;
        let roll = self.full_roll(decision);
        let result = tally(&decision.ballots(), policy, roll.as_deref());
        let finalized_at = now.min(decision.voting_closes_at);
        let outcome = if result.approved() {
            DecisionState::Approved
        } else {
            DecisionState::Rejected
        };

        if outcome == DecisionState::Rejected {
            let reasons: Vec<String> = result.rejections.iter().map(ToString::to_string).collect();
            self.audit.record(AuditPayload::new(
                AuditKind::DecisionRejected,
                decision.decision_id.to_string(),
                now,
                &json!({
                    "decision_id": decision.decision_id,
                    "decision_type": decision.decision_type,
                    "reasons": reasons,
                    "tally": result,
                }),
            )?)?;
            info!(
                decision_id = %decision.decision_id,
                reasons = %reasons.join("; "),
                "Decision rejected"
            );
        } else {
            info!(
                decision_id = %decision.decision_id,
                approval_ratio = result.threshold.approval_ratio,
                "Decision approved"
            );
        }

        let finalization = Finalization {
            decision_id: decision.decision_id.clone(),
            outcome,
            tally: result,
            finalized_at,
        };
        decision.state = outcome;
        decision.finalization = Some(finalization.clone());
        Ok(finalization)
    }

    // ===== EXECUTION =====

    /// Assemble, sign and anchor the Evidence Package of an approved decision.
    pub fn execute(&self, decision_id: &DecisionId) -> Result<EvidencePackage, DecisionError> {
        if let Some(report) = self.audit.integrity_halt() {
            warn!(decision_id = %decision_id, seq = report.seq, "Execution refused: integrity halt");
            return Err(DecisionError::IntegrityHalt { seq: report.seq });
        }
        self.ensure_writable()?;

        let slot = self.slot(decision_id)?;
        let mut decision = slot.lock();
        let now = self.clock.now();
        self.refresh(&mut decision, now)?;

        if decision.state == DecisionState::Expired {
            return Err(DecisionError::Expired(decision_id.clone()));
        }
        if !decision.is_executable() {
            return Err(DecisionError::NotApproved {
                decision_id: decision_id.clone(),
                state: decision.state,
            });
        }
        let finalization = decision
            .finalization
            .clone()
            .ok_or(DecisionError::EvidenceIncomplete {
                field: "threshold_proof",
            })?;

        // Held until the party lands, so a racing admission of the same
        // candidate fails before anchoring anything.
        let admission = match &decision.payload {
            DecisionPayload::Structural(StructuralChange::Admission(registration)) => {
                Some((self.registry.reserve(registration)?, registration.clone()))
            }
            _ => None,
        };

        let participants: Vec<Participant> = decision
            .votes
            .values()
            .map(|cast| Participant {
                party_id: cast.vote.party_id.clone(),
                class: cast.class,
                choice: cast.vote.choice,
                voted_at: cast.vote.timestamp,
            })
            .collect();

        let mut evidence = EvidenceBuilder::new()
            .ep_id(EpId::generate())
            .decision(decision.decision_id.clone(), decision.proposer.clone())
            .participants(participants)
            .proofs(
                finalization.tally.quorum.clone(),
                finalization.tally.threshold.clone(),
            )
            .rationale(decision.rationale.clone())
            .impact_statement(decision.impact_statement.clone())
            .motion(decision.payload.clone())
            .timestamps(EvidenceTimestamps {
                proposed_at: decision.created_at,
                voting_started_at: decision.voting_opens_at,
                voting_ended_at: finalization.finalized_at,
                approved_at: finalization.finalized_at,
                executed_at: now,
            })
            .anchor(self.audit.position())
            .build()?;
        evidence.signatures = self.collect_signatures(&evidence)?;

        let entry = self.anchor(&mut evidence)?;
        decision.state = DecisionState::Executed;
        decision.evidence = Some(evidence.clone());
        info!(
            decision_id = %decision_id,
            ep_id = %evidence.ep_id,
            seq = entry.seq,
            signatures = evidence.signatures.len(),
            "Decision executed; evidence anchored"
        );

        if let Some((hold, registration)) = admission {
            let party =
                self.registry
                    .admit(&registration, decision_id, evidence.ep_id, now)?;
            drop(hold);
            self.audit.record(AuditPayload::new(
                AuditKind::PartyAdmitted,
                party.party_id.to_string(),
                now,
                &party,
            )?)?;
        }

        Ok(evidence)
    }

    fn collect_signatures(
        &self,
        evidence: &EvidencePackage,
    ) -> Result<Vec<PartySignature>, DecisionError> {
        let digest = evidence.signing_digest()?;
        Ok(evidence
            .participants
            .iter()
            .filter(|p| p.choice == VoteChoice::Approve)
            .filter_map(|p| self.signatures.signer_for(&p.party_id))
            .map(|signer| signer.sign(digest.as_bytes()))
            .collect())
    }

    /// Commit the package at the current head, retrying on head races.
    fn anchor(&self, evidence: &mut EvidencePackage) -> Result<AuditLogEntry, DecisionError> {
        let attempts = self.config.anchor_attempts.max(1);
        let mut last_error = DecisionError::ReadOnly;
        for attempt in 1..=attempts {
            let position = self.audit.position();
            evidence.audit_anchor_ref = position;
            let payload = AuditPayload::new(
                AuditKind::EvidencePackage,
                evidence.decision_id.to_string(),
                evidence.timestamps.executed_at,
                &*evidence,
            )?;
            match self.audit.commit(PendingEntry::build(position, payload)?) {
                Ok(entry) => return Ok(entry),
                Err(err @ AuditError::ChainConflict { .. }) => {
                    debug!(decision_id = %evidence.decision_id, attempt, "Evidence anchor lost head race; retrying");
                    last_error = err.into();
                }
                Err(AuditError::ReadOnly { .. } | AuditError::Unavailable(_)) => {
                    return Err(DecisionError::ReadOnly)
                }
                Err(err) => return Err(err.into()),
            }
        }
        warn!(decision_id = %evidence.decision_id, attempts, "Evidence anchoring gave up");
        Err(last_error)
    }

    // ===== OBJECTIONS & APPEALS =====

    pub fn file_objection(
        &self,
        decision_id: &DecisionId,
        party_id: &PartyId,
        grounds: Grounds,
    ) -> Result<FilingReceipt, DecisionError> {
        self.file(FilingKind::Objection, decision_id, party_id, grounds)
    }

    /// Appeal an approved or executed decision, moving it to `Appealed`.
    pub fn file_appeal(
        &self,
        decision_id: &DecisionId,
        party_id: &PartyId,
        grounds: Grounds,
    ) -> Result<FilingReceipt, DecisionError> {
        self.file(FilingKind::Appeal, decision_id, party_id, grounds)
    }

    fn file(
        &self,
        kind: FilingKind,
        decision_id: &DecisionId,
        party_id: &PartyId,
        grounds: Grounds,
    ) -> Result<FilingReceipt, DecisionError> {
        self.ensure_writable()?;
        self.registry.require(party_id)?;
        grounds.validate()?;
        let slot = self.slot(decision_id)?;
        let mut decision = slot.lock();
        let now = self.clock.now();
        self.refresh(&mut decision, now)?;

        let admissible_state = match kind {
            FilingKind::Objection => matches!(
                decision.state,
                DecisionState::Proposed
                    | DecisionState::Voting
                    | DecisionState::Approved
                    | DecisionState::Executed
                    | DecisionState::Appealed
            ),
            FilingKind::Appeal => matches!(
                decision.state,
                DecisionState::Approved | DecisionState::Executed
            ),
        };
        if !admissible_state {
            return Err(DecisionError::NotAppealable {
                decision_id: decision_id.clone(),
                state: decision.state,
            });
        }
        if let Some(closed_at) = decision.appeal_deadline() {
            if now > closed_at {
                return Err(DecisionError::WindowClosed {
                    decision_id: decision_id.clone(),
                    closed_at,
                });
            }
        }

        let receipt =
            self.filings
                .admit_with(kind, decision_id, party_id, grounds, now, |receipt| {
                    self.audit.record(AuditPayload::new(
                        AuditKind::Filing,
                        decision_id.to_string(),
                        now,
                        receipt,
                    )?)?;
                    Ok(())
                })?;

        match kind {
            FilingKind::Objection => decision.objections.push(receipt.clone()),
            FilingKind::Appeal => {
                decision.state = DecisionState::Appealed;
                decision.appeal = Some(AppealRecord {
                    receipt: receipt.clone(),
                    resolution: None,
                });
            }
        }
        info!(
            decision_id = %decision_id,
            party = %party_id,
            ?kind,
            bond = receipt.bond_required,
            "Filing accepted"
        );
        Ok(receipt)
    }

    /// Close a pending appeal. An upheld, not-yet-executed decision stays
    /// executable until its execution deadline; an overturned one never executes.
    pub fn resolve_appeal(
        &self,
        decision_id: &DecisionId,
        upheld: bool,
        rationale: impl Into<String>,
    ) -> Result<AppealResolution, DecisionError> {
        let rationale = rationale.into();
        if rationale.trim().is_empty() {
            return Err(DecisionError::InadmissibleGrounds(
                "appeal resolution rationale is empty".into(),
            ));
        }
        self.ensure_writable()?;
        let slot = self.slot(decision_id)?;
        let mut decision = slot.lock();
        if decision.state != DecisionState::Appealed {
            return Err(DecisionError::NoPendingAppeal(decision_id.clone()));
        }
        let now = self.clock.now();
        let resolution = AppealResolution {
            upheld,
            rationale,
            resolved_at: now,
        };
        self.audit.record(AuditPayload::new(
            AuditKind::AppealResolved,
            decision_id.to_string(),
            now,
            &resolution,
        )?)?;

        if let Some(appeal) = decision.appeal.as_mut() {
            appeal.resolution = Some(resolution.clone());
        }
        decision.state = DecisionState::Resolved;
        info!(decision_id = %decision_id, upheld, "Appeal resolved");
        Ok(resolution)
    }

    // ===== READ PATH =====

    pub fn decision(&self, decision_id: &DecisionId) -> Result<Decision, DecisionError> {
        let slot = self.slot(decision_id)?;
        let mut decision = slot.lock();
        if !self.audit.is_read_only() {
            self.refresh(&mut decision, self.clock.now())?;
        }
        Ok(decision.clone())
    }

    pub fn state(&self, decision_id: &DecisionId) -> Result<DecisionState, DecisionError> {
        Ok(self.decision(decision_id)?.state)
    }

    pub fn evidence(&self, decision_id: &DecisionId) -> Result<Option<EvidencePackage>, DecisionError> {
        let slot = self.slot(decision_id)?;
        let decision = slot.lock();
        Ok(decision.evidence.clone())
    }

    pub fn decision_ids(&self) -> Vec<DecisionId> {
        let mut ids: Vec<DecisionId> = self.decisions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    // ===== TIMEOUTS =====

    /// Open due votes, finalize closed ones and expire stale approvals.
    pub fn sweep(&self) -> Result<SweepReport, DecisionError> {
        let mut report = SweepReport::default();
        if self.audit.is_read_only() {
            return Ok(report);
        }
        let now = self.clock.now();
        let slots: Vec<Arc<Mutex<Decision>>> =
            self.decisions.iter().map(|e| e.value().clone()).collect();

        for slot in slots {
            let mut decision = slot.lock();
            let before = decision.state;
            self.refresh(&mut decision, now)?;
            if before == DecisionState::Proposed && decision.state == DecisionState::Voting {
                report.opened.push(decision.decision_id.clone());
            }
            if decision.state == DecisionState::Expired && before != DecisionState::Expired {
                report.expired.push(decision.decision_id.clone());
            }
            if decision.state == DecisionState::Voting && now >= decision.voting_closes_at {
                let finalization = self.finalize_locked(&mut decision, now)?;
                report
                    .finalized
                    .push((finalization.decision_id, finalization.outcome));
            }
        }
        Ok(report)
    }

    /// Apply transitions that are due at `now`.
    fn refresh(&self, decision: &mut Decision, now: DateTime<Utc>) -> Result<(), DecisionError> {
        if decision.state == DecisionState::Proposed && now >= decision.voting_opens_at {
            decision.state = DecisionState::Voting;
            debug!(decision_id = %decision.decision_id, "Voting opened");
        }

        if decision.is_executable() {
            if let Some(deadline) = decision.execution_deadline() {
                if now >= deadline {
                    self.audit.record(AuditPayload::new(
                        AuditKind::DecisionExpired,
                        decision.decision_id.to_string(),
                        now,
                        &json!({
                            "decision_id": decision.decision_id,
                            "approved_at": decision.approved_at(),
                            "deadline": deadline,
                        }),
                    )?)?;
                    decision.state = DecisionState::Expired;
                    info!(decision_id = %decision.decision_id, %deadline, "Approved decision expired unexecuted");
                }
            }
        }
        Ok(())
    }

    // ===== HELPERS =====

    fn slot(&self, decision_id: &DecisionId) -> Result<Arc<Mutex<Decision>>, DecisionError> {
        self.decisions
            .get(decision_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DecisionError::NotFound(decision_id.clone()))
    }

    fn ensure_writable(&self) -> Result<(), DecisionError> {
        if self.audit.is_read_only() {
            return Err(DecisionError::ReadOnly);
        }
        Ok(())
    }

    fn require_policy<'a>(&self, decision: &'a Decision) -> Result<&'a TypePolicy, DecisionError> {
        decision.policy.as_ref().ok_or_else(|| {
            DecisionError::MalformedProposal(format!(
                "{} decisions are not voted on",
                decision.decision_type
            ))
        })
    }

    fn full_roll(&self, decision: &Decision) -> Option<Vec<PartyId>> {
        let admission = matches!(
            decision.payload,
            DecisionPayload::Structural(StructuralChange::Admission(_))
        );
        (admission && self.config.admission_requires_full_roll).then(|| {
            self.registry
                .parties()
                .into_iter()
                .map(|p| p.party_id)
                .collect()
        })
    }
}
