//! The governance engine: one audit log shared by the decision engine, the
//! enforcement layer and the emergency circuit breaker.

use std::sync::Arc;
use std::time::Duration;

use concord_audit::{AuditLog, FileAuditStore, MemoryAuditStore};
use concord_decision::{
    AppealResolution, DecisionEngine, DecisionPayload, DigestAuthority, EmergencyMotion,
    EvidencePackage, Finalization, FilingReceipt, Grounds, MaximalChange, Proposal,
    ProposalOptions, SignatureAuthority, StructuralChange, SweepReport,
};
use concord_emergency::{EmergencyCircuitBreaker, EmergencyEpoch, EmergencyError, RenewalOutcome};
use concord_enforcement::{
    AccessDecision, ActionContext, ActionRequest, EnforcementLayer, ScopeSnapshot,
    SanctionTransition, Violation,
};
use concord_registry::PartyRegistry;
use concord_types::{
    CapabilityManifest, Clock, ConstraintSet, DecisionId, DecisionState, Party, PartyId,
    RevocationLevel, SanctionLevel, ScopeId, SystemClock, Vote, VoteChoice,
};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{GovernanceConfig, StorageConfig};
use crate::error::{GovernanceError, GovernanceResult};

/// Sanction imposed on every proposer of an emergency later judged
/// illegitimate.
pub const ILLEGITIMATE_EMERGENCY_SANCTION: SanctionLevel = SanctionLevel::S3;

/// What executing a decision changed.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    /// The candidate joined the roster when the decision executed.
    PartyAdmitted { party_id: PartyId },
    /// Permanent CM/CS change.
    ScopeUpdated { snapshot: ScopeSnapshot },
    /// Change made during an emergency, discarded when it ends.
    OverlayApplied { snapshot: ScopeSnapshot },
    SanctionReversed { snapshot: ScopeSnapshot },
    ExceptionGranted { scope: ScopeId, action: String },
    EmergencyEntered {
        epoch: EmergencyEpoch,
        overlays: Vec<ScopeSnapshot>,
        /// Entry overlays the scope refused, with the reason.
        refused_overlays: Vec<(ScopeId, String)>,
    },
    EmergencyRenewed { outcome: RenewalOutcome },
    EmergencyExited { epoch: u64, discarded: Vec<ScopeId> },
}

/// An executed decision and its effect.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Execution {
    pub evidence: EvidencePackage,
    pub effect: Effect,
}

/// Everything one sweep touched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SweepSummary {
    pub decisions: SweepReport,
    pub emergency_expired: Option<u64>,
    pub overlays_discarded: Vec<ScopeId>,
    pub sanction_transitions: Vec<SanctionTransition>,
    /// Emergency entries whose vote failed or lapsed.
    pub withdrawn_entries: Vec<DecisionId>,
}

impl SweepSummary {
    pub fn is_empty(&self) -> bool {
        self.decisions == SweepReport::default()
            && self.emergency_expired.is_none()
            && self.overlays_discarded.is_empty()
            && self.sanction_transitions.is_empty()
            && self.withdrawn_entries.is_empty()
    }
}

/// Builder for [`GovernanceEngine`].
pub struct GovernanceEngineBuilder {
    config: GovernanceConfig,
    genesis: Vec<Party>,
    clock: Option<Arc<dyn Clock>>,
    signatures: Option<Arc<dyn SignatureAuthority>>,
    audit: Option<Arc<AuditLog>>,
}

impl GovernanceEngineBuilder {
    /// Genesis roster, admitted without a vote.
    pub fn genesis(mut self, parties: impl IntoIterator<Item = Party>) -> Self {
        self.genesis.extend(parties);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn signatures(mut self, authority: Arc<dyn SignatureAuthority>) -> Self {
        self.signatures = Some(authority);
        self
    }

    /// Use an existing audit log instead of opening one from the storage config.
    pub fn audit_log(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn build(self) -> GovernanceResult<GovernanceEngine> {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let audit = match self.audit {
            Some(audit) => audit,
            None => Arc::new(open_audit_log(&config)?.with_clock(clock.clone())),
        };
        let signatures = self.signatures.unwrap_or_else(|| {
            Arc::new(DigestAuthority::with_parties(
                self.genesis.iter().map(|p| &p.party_id),
            ))
        });
        let registry = Arc::new(PartyRegistry::with_genesis(self.genesis));

        let decisions = DecisionEngine::new(
            config.decision.clone(),
            registry.clone(),
            audit.clone(),
            signatures,
            clock.clone(),
        );
        let enforcement =
            EnforcementLayer::new(config.enforcement.clone(), audit.clone(), clock.clone());
        let emergency =
            EmergencyCircuitBreaker::new(config.emergency.clone(), audit.clone(), clock.clone());

        info!(
            parties = registry.len(),
            audit_entries = audit.len(),
            "Governance engine ready"
        );
        Ok(GovernanceEngine {
            config,
            audit,
            registry,
            decisions,
            enforcement,
            emergency,
        })
    }
}

fn open_audit_log(config: &GovernanceConfig) -> GovernanceResult<AuditLog> {
    match &config.storage {
        StorageConfig::Memory => Ok(AuditLog::new(
            config.audit.clone(),
            Arc::new(MemoryAuditStore::new()),
        )),
        StorageConfig::File { path } => {
            let store = FileAuditStore::new(path.clone())?;
            let log = AuditLog::open(config.audit.clone(), Arc::new(store))?;
            info!(path = %path.display(), entries = log.len(), "Audit log opened");
            Ok(log)
        }
    }
}

/// Meta-Concord governance engine.
///
/// Routes executed Evidence Packages to the component they sanction and
/// keeps the enforcement layer's emergency gate in step with the circuit
/// breaker.
pub struct GovernanceEngine {
    config: GovernanceConfig,
    audit: Arc<AuditLog>,
    registry: Arc<PartyRegistry>,
    decisions: DecisionEngine,
    enforcement: EnforcementLayer,
    emergency: EmergencyCircuitBreaker,
}

impl GovernanceEngine {
    pub fn builder(config: GovernanceConfig) -> GovernanceEngineBuilder {
        GovernanceEngineBuilder {
            config,
            genesis: Vec::new(),
            clock: None,
            signatures: None,
            audit: None,
        }
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn registry(&self) -> &Arc<PartyRegistry> {
        &self.registry
    }

    pub fn decisions(&self) -> &DecisionEngine {
        &self.decisions
    }

    pub fn enforcement(&self) -> &EnforcementLayer {
        &self.enforcement
    }

    pub fn emergency(&self) -> &EmergencyCircuitBreaker {
        &self.emergency
    }

    // ===== DECISIONS =====

    /// Submit a proposal.
    ///
    /// An emergency entry marks the breaker `EmergencyProposed`; a renewal
    /// is held to the escalated renewal threshold.
    pub fn propose(&self, mut proposal: Proposal) -> GovernanceResult<DecisionId> {
        match &proposal.payload {
            DecisionPayload::Emergency(EmergencyMotion::Enter { .. }) => {
                let decision_id = proposal
                    .decision_id
                    .get_or_insert_with(DecisionId::generate)
                    .clone();
                self.emergency.note_proposed(&decision_id)?;
                match self.decisions.propose(proposal) {
                    Ok(id) => Ok(id),
                    Err(err) => {
                        self.emergency.withdraw_proposal(&decision_id)?;
                        Err(err.into())
                    }
                }
            }
            DecisionPayload::Emergency(EmergencyMotion::Renew { renewal_index, .. }) => {
                let expected = self.emergency.next_renewal_index()?;
                if *renewal_index != expected {
                    return Err(EmergencyError::RenewalConflict {
                        expected,
                        got: *renewal_index,
                    }
                    .into());
                }
                let threshold = self.emergency.required_renewal_threshold(expected)?;
                debug!(
                    renewal_index = expected,
                    numerator = threshold.numerator,
                    denominator = threshold.denominator,
                    "Renewal threshold escalated"
                );
                let options = ProposalOptions {
                    threshold: Some(threshold),
                    ..Default::default()
                };
                Ok(self.decisions.propose_with(proposal, options)?)
            }
            _ => Ok(self.decisions.propose(proposal)?),
        }
    }

    pub fn cast_vote(
        &self,
        decision_id: &DecisionId,
        party_id: &PartyId,
        choice: VoteChoice,
    ) -> GovernanceResult<Vote> {
        Ok(self.decisions.cast_vote(decision_id, party_id, choice)?)
    }

    /// Close voting. A failed emergency entry returns the breaker to `Normal`.
    pub fn finalize(&self, decision_id: &DecisionId) -> GovernanceResult<Finalization> {
        let finalization = self.decisions.finalize(decision_id)?;
        if !finalization.approved() && self.emergency.withdraw_proposal(decision_id)? {
            info!(decision_id = %decision_id, "Emergency entry withdrawn after failed vote");
        }
        Ok(finalization)
    }

    /// Execute an approved decision and apply what it sanctions.
    pub fn execute(&self, decision_id: &DecisionId) -> GovernanceResult<Execution> {
        let evidence = self.decisions.execute(decision_id)?;
        let effect = self.apply(&evidence)?;
        Ok(Execution { evidence, effect })
    }

    /// Apply an anchored Evidence Package.
    ///
    /// `execute` calls this; call it directly to retry an effect that
    /// failed after the package was anchored.
    pub fn apply(&self, evidence: &EvidencePackage) -> GovernanceResult<Effect> {
        self.reconcile_emergency()?;
        match &evidence.motion {
            DecisionPayload::Informational { .. } => Err(GovernanceError::NothingToExecute(
                evidence.decision_id.to_string(),
            )),
            DecisionPayload::Structural(StructuralChange::Admission(registration)) => {
                Ok(Effect::PartyAdmitted {
                    party_id: registration.candidate_id.clone(),
                })
            }
            DecisionPayload::Structural(StructuralChange::Amendment(_))
            | DecisionPayload::CapabilityRestriction(_)
            | DecisionPayload::Maximal(MaximalChange::Constitutional(_)) => {
                let change = evidence.sanctioned_change()?.ok_or_else(|| {
                    GovernanceError::NothingToExecute(evidence.decision_id.to_string())
                })?;
                match self.enforcement.emergency_epoch() {
                    Some(epoch) => Ok(Effect::OverlayApplied {
                        snapshot: self.enforcement.apply_overlay(&change, epoch)?,
                    }),
                    None => Ok(Effect::ScopeUpdated {
                        snapshot: self.enforcement.apply_capability_manifest(&change)?,
                    }),
                }
            }
            DecisionPayload::SanctionReversal { .. } => Ok(Effect::SanctionReversed {
                snapshot: self
                    .enforcement
                    .apply_sanction_reversal(&evidence.reference()?)?,
            }),
            DecisionPayload::Maximal(MaximalChange::IrreversibleAction { scope, action, .. }) => {
                self.enforcement
                    .grant_irreversible_exception(&evidence.reference()?)?;
                Ok(Effect::ExceptionGranted {
                    scope: scope.clone(),
                    action: action.clone(),
                })
            }
            DecisionPayload::Emergency(EmergencyMotion::Enter { .. }) => {
                self.enter_emergency(evidence)
            }
            DecisionPayload::Emergency(EmergencyMotion::Renew { .. }) => {
                Ok(Effect::EmergencyRenewed {
                    outcome: self.emergency.renew(evidence)?,
                })
            }
            DecisionPayload::Emergency(EmergencyMotion::Exit { .. }) => {
                let epoch = self.emergency.exit(evidence)?;
                let discarded = self.enforcement.end_emergency(epoch)?;
                Ok(Effect::EmergencyExited { epoch, discarded })
            }
        }
    }

    fn enter_emergency(&self, evidence: &EvidencePackage) -> GovernanceResult<Effect> {
        let epoch = self.emergency.activate(evidence)?;
        self.enforcement.begin_emergency(epoch.epoch);

        let mut overlays = Vec::new();
        let mut refused_overlays = Vec::new();
        for change in evidence.overlay_changes()? {
            match self.enforcement.apply_overlay(&change, epoch.epoch) {
                Ok(snapshot) => overlays.push(snapshot),
                Err(err) => {
                    warn!(
                        scope = %change.scope(),
                        epoch = epoch.epoch,
                        error = %err,
                        "Emergency overlay refused"
                    );
                    refused_overlays.push((change.scope().clone(), err.to_string()));
                }
            }
        }
        Ok(Effect::EmergencyEntered {
            epoch,
            overlays,
            refused_overlays,
        })
    }

    pub fn file_objection(
        &self,
        decision_id: &DecisionId,
        party_id: &PartyId,
        grounds: Grounds,
    ) -> GovernanceResult<FilingReceipt> {
        Ok(self.decisions.file_objection(decision_id, party_id, grounds)?)
    }

    pub fn file_appeal(
        &self,
        decision_id: &DecisionId,
        party_id: &PartyId,
        grounds: Grounds,
    ) -> GovernanceResult<FilingReceipt> {
        Ok(self.decisions.file_appeal(decision_id, party_id, grounds)?)
    }

    pub fn resolve_appeal(
        &self,
        decision_id: &DecisionId,
        upheld: bool,
        rationale: impl Into<String>,
    ) -> GovernanceResult<AppealResolution> {
        Ok(self.decisions.resolve_appeal(decision_id, upheld, rationale)?)
    }

    pub fn decision_state(&self, decision_id: &DecisionId) -> GovernanceResult<DecisionState> {
        Ok(self.decisions.state(decision_id)?)
    }

    // ===== ENFORCEMENT =====

    pub fn bootstrap_scope(
        &self,
        scope: impl Into<ScopeId>,
        manifest: CapabilityManifest,
        constraints: ConstraintSet,
    ) -> GovernanceResult<ScopeSnapshot> {
        Ok(self
            .enforcement
            .bootstrap_scope(scope.into(), manifest, constraints)?)
    }

    /// Gate a runtime action against the scope's current state.
    pub fn check_action_allowed(
        &self,
        request: &ActionRequest,
        context: &ActionContext,
    ) -> GovernanceResult<AccessDecision> {
        self.reconcile_emergency()?;
        Ok(self.enforcement.check_action_allowed(request, context)?)
    }

    pub fn revoke_capabilities(
        &self,
        scope: &ScopeId,
        level: RevocationLevel,
        reason: &str,
    ) -> GovernanceResult<ScopeSnapshot> {
        Ok(self.enforcement.revoke_capabilities(scope, level, reason)?)
    }

    pub fn enforce_sanction(
        &self,
        scope: &ScopeId,
        level: SanctionLevel,
        reason: &str,
    ) -> GovernanceResult<ScopeSnapshot> {
        Ok(self.enforcement.enforce_sanction(scope, level, reason)?)
    }

    pub fn report_violation(
        &self,
        scope: &ScopeId,
        violation: &Violation,
    ) -> GovernanceResult<ScopeSnapshot> {
        Ok(self.enforcement.report_violation(scope, violation)?)
    }

    pub fn get_current_scope_state(&self, scope: &ScopeId) -> GovernanceResult<ScopeSnapshot> {
        self.reconcile_emergency()?;
        Ok(self.enforcement.get_current_scope_state(scope)?)
    }

    // ===== EMERGENCY =====

    /// Record the retrospective finding on an emergency epoch. An
    /// illegitimate entry sanctions every proposer of the entry and its
    /// renewals at S3.
    pub fn record_judgment(
        &self,
        epoch: u64,
        legitimate: bool,
        rationale: impl Into<String>,
    ) -> GovernanceResult<Vec<ScopeSnapshot>> {
        let rationale = rationale.into();
        let proposers = self
            .emergency
            .record_judgment(epoch, legitimate, rationale.clone())?;
        let reason = format!("emergency {epoch} judged illegitimate: {rationale}");
        let mut sanctioned = Vec::with_capacity(proposers.len());
        for party in &proposers {
            let snapshot = self.enforcement.enforce_sanction(
                &ScopeId::party(party),
                ILLEGITIMATE_EMERGENCY_SANCTION,
                &reason,
            )?;
            warn!(party = %party, epoch, "Proposer sanctioned for illegitimate emergency");
            sanctioned.push(snapshot);
        }
        Ok(sanctioned)
    }

    /// Expire a lapsed emergency and close the enforcement gate of any
    /// epoch the breaker no longer considers active.
    fn reconcile_emergency(&self) -> GovernanceResult<(Option<u64>, Vec<ScopeId>)> {
        let expired = self.emergency.expire_if_due()?;
        let active = self.emergency.active_epoch()?;
        match self.enforcement.emergency_epoch() {
            Some(epoch) if active != Some(epoch) => {
                let discarded = self.enforcement.end_emergency(epoch)?;
                Ok((expired, discarded))
            }
            _ => Ok((expired, Vec::new())),
        }
    }

    // ===== TIMEOUTS =====

    /// Run every time-driven transition once: emergency expiry, sanction
    /// decay, vote opening and closing, execution expiry.
    pub fn sweep(&self) -> GovernanceResult<SweepSummary> {
        let (emergency_expired, overlays_discarded) = self.reconcile_emergency()?;
        let sanction_transitions = self.enforcement.decay_sweep()?;
        let decisions = self.decisions.sweep()?;

        let mut withdrawn_entries = Vec::new();
        let failed = decisions
            .finalized
            .iter()
            .filter(|(_, state)| *state != DecisionState::Approved)
            .map(|(id, _)| id)
            .chain(decisions.expired.iter());
        for decision_id in failed {
            if self.emergency.withdraw_proposal(decision_id)? {
                withdrawn_entries.push(decision_id.clone());
            }
        }

        Ok(SweepSummary {
            decisions,
            emergency_expired,
            overlays_discarded,
            sanction_transitions,
            withdrawn_entries,
        })
    }
}

/// Run [`GovernanceEngine::sweep`] on a fixed interval until the task is
/// aborted.
pub fn spawn_sweeper(engine: Arc<GovernanceEngine>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match engine.sweep() {
                Ok(summary) if !summary.is_empty() => {
                    info!(
                        opened = summary.decisions.opened.len(),
                        finalized = summary.decisions.finalized.len(),
                        expired = summary.decisions.expired.len(),
                        emergency_expired = ?summary.emergency_expired,
                        sanction_transitions = summary.sanction_transitions.len(),
                        "Sweep completed"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Sweep failed");
                }
            }
        }
    })
}
