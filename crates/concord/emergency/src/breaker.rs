use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use concord_audit::{AuditKind, AuditLog, AuditPayload};
use concord_decision::{DecisionPayload, EmergencyMotion, EvidencePackage, Threshold};
use concord_types::{Clock, DecisionId, DecisionType, EpId, PartyClass, PartyId, VoteChoice};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::EmergencyError;
use crate::policy::EmergencyPolicy;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyPhase {
    Normal,
    EmergencyProposed,
    EmergencyActive,
    /// Transient: reported on a renewal, the breaker stays active.
    Renewed,
    /// Transient: reported on expiry, the breaker returns to normal.
    Expired,
}

/// One audited phase change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyTransition {
    pub epoch: Option<u64>,
    pub from: EmergencyPhase,
    pub to: EmergencyPhase,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenewalRecord {
    pub index: u32,
    pub ep_id: EpId,
    pub proposer: PartyId,
    pub approvals: usize,
    pub decisive: usize,
    pub renewed_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

impl RenewalRecord {
    /// Any later renewal must strictly beat this ratio.
    fn as_floor(&self) -> Threshold {
        Threshold {
            numerator: self.approvals as u32,
            denominator: self.decisive as u32,
            strict: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmergencyEnd {
    Expired,
    Exited { ep_id: EpId, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    pub epoch: u64,
    pub legitimate: bool,
    pub rationale: String,
    pub judged_at: DateTime<Utc>,
    /// Parties to sanction; empty when the emergency was legitimate.
    pub sanctioned: Vec<PartyId>,
}

/// History of one activation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmergencyEpoch {
    pub epoch: u64,
    pub decision_id: DecisionId,
    pub entry_ep: EpId,
    pub proposer: PartyId,
    pub reason: String,
    pub entered_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub renewals: Vec<RenewalRecord>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end: Option<EmergencyEnd>,
    pub judgment: Option<Judgment>,
}

impl EmergencyEpoch {
    fn proposers(&self) -> Vec<PartyId> {
        let mut set = BTreeSet::from([self.proposer.clone()]);
        set.extend(self.renewals.iter().map(|r| r.proposer.clone()));
        set.into_iter().collect()
    }
}

/// Post-hoc audit review opened by a renewal beyond the review-free ones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewTask {
    pub task_id: Uuid,
    pub epoch: u64,
    pub renewal_index: u32,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub findings: Option<String>,
}

impl ReviewTask {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenewalOutcome {
    pub epoch: u64,
    pub renewal: RenewalRecord,
    pub review: Option<ReviewTask>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmergencySnapshot {
    pub phase: EmergencyPhase,
    pub pending_entry: Option<DecisionId>,
    pub active: Option<EmergencyEpoch>,
    pub open_reviews: Vec<ReviewTask>,
}

struct Cell {
    phase: EmergencyPhase,
    pending: Option<DecisionId>,
    epochs: Vec<EmergencyEpoch>,
    reviews: Vec<ReviewTask>,
}

impl Cell {
    fn active_mut(&mut self) -> Option<&mut EmergencyEpoch> {
        if self.phase != EmergencyPhase::EmergencyActive {
            return None;
        }
        self.epochs.last_mut()
    }

    fn active(&self) -> Option<&EmergencyEpoch> {
        if self.phase != EmergencyPhase::EmergencyActive {
            return None;
        }
        self.epochs.last()
    }
}

/// Process-wide emergency state.
///
/// A single state cell behind one mutex: every transition, including lazy
/// expiry, happens under it, so concurrent renewals resolve to exactly one
/// accepted renewal per index.
pub struct EmergencyCircuitBreaker {
    policy: EmergencyPolicy,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    cell: Mutex<Cell>,
}

impl EmergencyCircuitBreaker {
    pub fn new(policy: EmergencyPolicy, audit: Arc<AuditLog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            audit,
            clock,
            cell: Mutex::new(Cell {
                phase: EmergencyPhase::Normal,
                pending: None,
                epochs: Vec::new(),
                reviews: Vec::new(),
            }),
        }
    }

    pub fn policy(&self) -> &EmergencyPolicy {
        &self.policy
    }

    // ===== ENTRY =====

    /// Note that an entry motion is in the vote. `Normal → EmergencyProposed`.
    pub fn note_proposed(&self, decision_id: &DecisionId) -> Result<(), EmergencyError> {
        let mut cell = self.cell.lock();
        let now = self.clock.now();
        self.expire_locked(&mut cell, now)?;
        match cell.phase {
            EmergencyPhase::EmergencyActive => {
                return Err(EmergencyError::AlreadyActive {
                    epoch: cell.epochs.len() as u64,
                })
            }
            EmergencyPhase::EmergencyProposed => {
                if let Some(pending) = &cell.pending {
                    return Err(EmergencyError::EntryPending(pending.clone()));
                }
            }
            _ => {}
        }
        self.transition(
            &mut cell,
            EmergencyPhase::EmergencyProposed,
            None,
            format!("entry proposed by {decision_id}"),
            now,
        )?;
        cell.pending = Some(decision_id.clone());
        Ok(())
    }

    /// Drop a pending entry whose vote failed. `EmergencyProposed → Normal`.
    pub fn withdraw_proposal(&self, decision_id: &DecisionId) -> Result<bool, EmergencyError> {
        let mut cell = self.cell.lock();
        if cell.pending.as_ref() != Some(decision_id) {
            return Ok(false);
        }
        let now = self.clock.now();
        cell.pending = None;
        self.transition(
            &mut cell,
            EmergencyPhase::Normal,
            None,
            format!("entry {decision_id} was not approved"),
            now,
        )?;
        Ok(true)
    }

    /// Activate under an executed D3 entry. `→ EmergencyActive`.
    pub fn activate(&self, ep: &EvidencePackage) -> Result<EmergencyEpoch, EmergencyError> {
        let motion = self.sanctioned_motion(ep)?;
        let EmergencyMotion::Enter {
            reason,
            duration_secs,
            ..
        } = motion
        else {
            return Err(EmergencyError::NotSanctioned(format!(
                "{} is not an emergency entry",
                ep.ep_id
            )));
        };
        for class in PartyClass::ALL {
            let assented = ep
                .participants
                .iter()
                .any(|p| p.class == class && p.choice == VoteChoice::Approve);
            if !assented || !*ep.threshold_proof.class_wise_assent.get(class) {
                return Err(EmergencyError::ClassDidNotAssent(class));
            }
        }

        let mut cell = self.cell.lock();
        let now = self.clock.now();
        self.expire_locked(&mut cell, now)?;
        if let Some(active) = cell.active() {
            return Err(EmergencyError::AlreadyActive {
                epoch: active.epoch,
            });
        }
        if cell.epochs.iter().any(|e| e.entry_ep == ep.ep_id) {
            return Err(EmergencyError::NotSanctioned(format!(
                "{} already activated an emergency",
                ep.ep_id
            )));
        }

        let epoch = cell.epochs.len() as u64 + 1;
        let record = EmergencyEpoch {
            epoch,
            decision_id: ep.decision_id.clone(),
            entry_ep: ep.ep_id,
            proposer: ep.proposer.clone(),
            reason: reason.clone(),
            entered_at: now,
            deadline: now + self.policy.bounded(duration_secs),
            renewals: Vec::new(),
            ended_at: None,
            end: None,
            judgment: None,
        };
        self.transition(
            &mut cell,
            EmergencyPhase::EmergencyActive,
            Some(epoch),
            reason,
            now,
        )?;
        cell.pending = None;
        cell.epochs.push(record.clone());
        warn!(epoch, deadline = %record.deadline, "Emergency active");
        Ok(record)
    }

    // ===== RENEWAL =====

    /// Index the next renewal must carry.
    pub fn next_renewal_index(&self) -> Result<u32, EmergencyError> {
        let mut cell = self.cell.lock();
        let now = self.clock.now();
        self.expire_locked(&mut cell, now)?;
        let active = cell.active().ok_or(EmergencyError::NotActive)?;
        Ok(active.renewals.len() as u32 + 1)
    }

    /// Threshold renewal `index` must meet: the scheduled one, and strictly
    /// above the ratio the previous renewal achieved.
    pub fn required_renewal_threshold(&self, index: u32) -> Result<Threshold, EmergencyError> {
        let mut cell = self.cell.lock();
        let now = self.clock.now();
        self.expire_locked(&mut cell, now)?;
        let active = cell.active().ok_or(EmergencyError::NotActive)?;
        Ok(self.required_locked(active, index))
    }

    fn required_locked(&self, active: &EmergencyEpoch, index: u32) -> Threshold {
        let scheduled = self.policy.scheduled_threshold(index);
        match active.renewals.last() {
            Some(previous) => scheduled.stricter(previous.as_floor()),
            None => scheduled,
        }
    }

    /// Extend the deadline under an executed D3 renewal.
    ///
    /// Exactly one renewal is accepted per index. Renewals beyond the
    /// review-free ones open a review task, and no further renewal is
    /// accepted while a review task of the epoch is open.
    pub fn renew(&self, ep: &EvidencePackage) -> Result<RenewalOutcome, EmergencyError> {
        let motion = self.sanctioned_motion(ep)?;
        let EmergencyMotion::Renew {
            renewal_index,
            extension_secs,
        } = motion
        else {
            return Err(EmergencyError::NotSanctioned(format!(
                "{} is not an emergency renewal",
                ep.ep_id
            )));
        };

        let mut cell = self.cell.lock();
        let now = self.clock.now();
        self.expire_locked(&mut cell, now)?;
        let active = cell.active().ok_or(EmergencyError::NotActive)?;
        let epoch = active.epoch;
        let expected = active.renewals.len() as u32 + 1;
        if renewal_index != expected {
            warn!(epoch, expected, got = renewal_index, "Emergency renewal conflict");
            return Err(EmergencyError::RenewalConflict {
                expected,
                got: renewal_index,
            });
        }
        if let Some(open) = cell.reviews.iter().find(|r| r.epoch == epoch && r.is_open()) {
            warn!(epoch, task_id = %open.task_id, "Emergency renewal blocked by open review");
            return Err(EmergencyError::SanctionEscalationBlocked {
                task_id: open.task_id,
                opened_at: open.opened_at,
            });
        }

        let approvals = ep.threshold_proof.approvals;
        let decisive = approvals + ep.threshold_proof.rejections;
        let required = self.required_locked(active, renewal_index);
        if !required.is_met(approvals, decisive) {
            return Err(EmergencyError::RenewalThresholdNotMet {
                approvals,
                decisive,
                required: required.ratio(),
            });
        }

        let deadline = active.deadline + self.policy.bounded(extension_secs);
        let renewal = RenewalRecord {
            index: renewal_index,
            ep_id: ep.ep_id,
            proposer: ep.proposer.clone(),
            approvals,
            decisive,
            renewed_at: now,
            deadline,
        };
        self.record(
            AuditKind::EmergencyTransition,
            epoch,
            now,
            &EmergencyTransition {
                epoch: Some(epoch),
                from: EmergencyPhase::EmergencyActive,
                to: EmergencyPhase::Renewed,
                reason: format!("renewal {renewal_index} until {deadline}"),
                at: now,
            },
        )?;
        let review = if renewal_index > self.policy.review_free_renewals {
            let task = ReviewTask {
                task_id: Uuid::new_v4(),
                epoch,
                renewal_index,
                opened_at: now,
                closed_at: None,
                findings: None,
            };
            self.record(AuditKind::ReviewTask, epoch, now, &task)?;
            cell.reviews.push(task.clone());
            Some(task)
        } else {
            None
        };
        if let Some(active) = cell.active_mut() {
            active.deadline = deadline;
            active.renewals.push(renewal.clone());
        }
        info!(
            epoch,
            renewal_index,
            %deadline,
            review = review.is_some(),
            "Emergency renewed"
        );
        Ok(RenewalOutcome {
            epoch,
            renewal,
            review,
        })
    }

    pub fn close_review(
        &self,
        task_id: Uuid,
        findings: impl Into<String>,
    ) -> Result<ReviewTask, EmergencyError> {
        let mut cell = self.cell.lock();
        let now = self.clock.now();
        let task = cell
            .reviews
            .iter_mut()
            .find(|r| r.task_id == task_id)
            .ok_or(EmergencyError::UnknownReview(task_id))?;
        if task.is_open() {
            task.closed_at = Some(now);
            task.findings = Some(findings.into());
        }
        let task = task.clone();
        self.record(AuditKind::ReviewTask, task.epoch, now, &task)?;
        info!(task_id = %task_id, epoch = task.epoch, "Review task closed");
        Ok(task)
    }

    pub fn reviews(&self) -> Vec<ReviewTask> {
        self.cell.lock().reviews.clone()
    }

    // ===== EXIT & EXPIRY =====

    /// End the emergency under an executed D3 exit. Returns the ended epoch.
    pub fn exit(&self, ep: &EvidencePackage) -> Result<u64, EmergencyError> {
        let motion = self.sanctioned_motion(ep)?;
        let EmergencyMotion::Exit { reason } = motion else {
            return Err(EmergencyError::NotSanctioned(format!(
                "{} is not an emergency exit",
                ep.ep_id
            )));
        };
        let mut cell = self.cell.lock();
        let now = self.clock.now();
        self.expire_locked(&mut cell, now)?;
        let epoch = cell.active().ok_or(EmergencyError::NotActive)?.epoch;
        self.transition(
            &mut cell,
            EmergencyPhase::Normal,
            Some(epoch),
            reason.clone(),
            now,
        )?;
        if let Some(record) = cell.epochs.last_mut() {
            record.ended_at = Some(now);
            record.end = Some(EmergencyEnd::Exited {
                ep_id: ep.ep_id,
                reason,
            });
        }
        info!(epoch, "Emergency exited");
        Ok(epoch)
    }

    /// Expire the active emergency if its deadline has passed. Returns the
    /// expired epoch.
    pub fn expire_if_due(&self) -> Result<Option<u64>, EmergencyError> {
        let mut cell = self.cell.lock();
        let now = self.clock.now();
        self.expire_locked(&mut cell, now)
    }

    fn expire_locked(
        &self,
        cell: &mut Cell,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>, EmergencyError> {
        let Some(active) = cell.active() else {
            return Ok(None);
        };
        if now < active.deadline {
            return Ok(None);
        }
        let (epoch, deadline) = (active.epoch, active.deadline);
        self.record(
            AuditKind::EmergencyTransition,
            epoch,
            deadline,
            &EmergencyTransition {
                epoch: Some(epoch),
                from: EmergencyPhase::EmergencyActive,
                to: EmergencyPhase::Expired,
                reason: "deadline reached without renewal".into(),
                at: deadline,
            },
        )?;
        cell.phase = EmergencyPhase::Normal;
        if let Some(record) = cell.epochs.last_mut() {
            record.ended_at = Some(deadline);
            record.end = Some(EmergencyEnd::Expired);
        }
        warn!(epoch, %deadline, "Emergency expired");
        Ok(Some(epoch))
    }

    /// Epoch of the active emergency, after lazy expiry.
    pub fn active_epoch(&self) -> Result<Option<u64>, EmergencyError> {
        let mut cell = self.cell.lock();
        let now = self.clock.now();
        self.expire_locked(&mut cell, now)?;
        Ok(cell.active().map(|a| a.epoch))
    }

    // ===== JUDGMENT =====

    /// Retrospective finding on an emergency. Returns the parties to
    /// sanction: every proposer of the entry and its renewals when the
    /// entry was illegitimate, nobody otherwise.
    pub fn record_judgment(
        &self,
        epoch: u64,
        legitimate: bool,
        rationale: impl Into<String>,
    ) -> Result<Vec<PartyId>, EmergencyError> {
        let mut cell = self.cell.lock();
        let now = self.clock.now();
        let record = cell
            .epochs
            .iter_mut()
            .find(|e| e.epoch == epoch)
            .ok_or(EmergencyError::UnknownEpoch(epoch))?;
        if record.judgment.is_some() {
            return Err(EmergencyError::AlreadyJudged(epoch));
        }
        let sanctioned = if legitimate {
            Vec::new()
        } else {
            record.proposers()
        };
        let judgment = Judgment {
            epoch,
            legitimate,
            rationale: rationale.into(),
            judged_at: now,
            sanctioned: sanctioned.clone(),
        };
        self.record(AuditKind::Judgment, epoch, now, &judgment)?;
        record.judgment = Some(judgment);
        if legitimate {
            info!(epoch, "Emergency judged legitimate");
        } else {
            warn!(epoch, parties = ?sanctioned, "Emergency judged illegitimate");
        }
        Ok(sanctioned)
    }

    // ===== READ PATH =====

    pub fn snapshot(&self) -> Result<EmergencySnapshot, EmergencyError> {
        let mut cell = self.cell.lock();
        let now = self.clock.now();
        self.expire_locked(&mut cell, now)?;
        Ok(EmergencySnapshot {
            phase: cell.phase,
            pending_entry: cell.pending.clone(),
            active: cell.active().cloned(),
            open_reviews: cell.reviews.iter().filter(|r| r.is_open()).cloned().collect(),
        })
    }

    pub fn epoch(&self, epoch: u64) -> Option<EmergencyEpoch> {
        self.cell
            .lock()
            .epochs
            .iter()
            .find(|e| e.epoch == epoch)
            .cloned()
    }

    // ===== HELPERS =====

    fn sanctioned_motion(&self, ep: &EvidencePackage) -> Result<EmergencyMotion, EmergencyError> {
        ep.reference()?.verify(&self.audit)?;
        if ep.decision_type != DecisionType::D3 || !ep.threshold_proof.satisfied {
            return Err(EmergencyError::NotSanctioned(format!(
                "{} is not an approved D3 decision",
                ep.ep_id
            )));
        }
        match &ep.motion {
            DecisionPayload::Emergency(motion) => Ok(motion.clone()),
            _ => Err(EmergencyError::NotSanctioned(format!(
                "{} carries no emergency motion",
                ep.ep_id
            ))),
        }
    }

    fn transition(
        &self,
        cell: &mut Cell,
        to: EmergencyPhase,
        epoch: Option<u64>,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<(), EmergencyError> {
        let transition = EmergencyTransition {
            epoch,
            from: cell.phase,
            to,
            reason,
            at: now,
        };
        self.record(
            AuditKind::EmergencyTransition,
            epoch.unwrap_or_default(),
            now,
            &transition,
        )?;
        info!(from = ?transition.from, to = ?to, epoch = ?epoch, "Emergency transition");
        cell.phase = to;
        Ok(())
    }

    fn record<T: Serialize>(
        &self,
        kind: AuditKind,
        epoch: u64,
        at: DateTime<Utc>,
        body: &T,
    ) -> Result<(), EmergencyError> {
        self.audit.record(AuditPayload::new(
            kind,
            format!("emergency-{epoch}"),
            at,
            body,
        )?)?;
        Ok(())
    }
}
