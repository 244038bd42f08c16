use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use concord_audit::{AuditKind, AuditLog, AuditPayload};
use concord_decision::{
    DecisionPayload, EpReference, EvidencePackage, MaximalChange, SanctionedChange,
};
use concord_types::{
    matches_pattern, CapabilityManifest, Clock, CmDiff, ConstraintSet, CsDiff, DecisionType, EpId,
    RevocationLevel, SanctionLevel, SanctionRecord, ScopeId,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::action::{AccessDecision, ActionContext, ActionRequest, DenialReason};
use crate::error::EnforcementError;
use crate::revocation::{restrictions_for, Restriction};
use crate::sanctions::{LadderPolicy, SanctionTrack, SanctionTransition, Violation};

/// Enforcement layer tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementConfig {
    #[serde(default)]
    pub ladder: LadderPolicy,
    /// Compute quota is divided by this while a scope is throttled.
    #[serde(default = "default_throttle_divisor")]
    pub throttle_divisor: u64,
}

fn default_throttle_divisor() -> u64 {
    4
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            ladder: LadderPolicy::default(),
            throttle_divisor: default_throttle_divisor(),
        }
    }
}

/// A temporary emergency change to one scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overlay {
    pub epoch: u64,
    pub ep_id: EpId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cm_diff: Option<CmDiff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cs_diff: Option<CsDiff>,
}

/// Read-only view of a scope, as returned to runtimes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSnapshot {
    pub scope: ScopeId,
    /// Manifest in force, overlays included. `None` until a manifest is applied.
    pub manifest: Option<CapabilityManifest>,
    pub constraints: ConstraintSet,
    pub version: u64,
    pub last_applied: Option<EpId>,
    pub overlays: Vec<Overlay>,
    pub sanction: Option<SanctionRecord>,
    pub revocation: Option<RevocationLevel>,
    pub restrictions: BTreeSet<Restriction>,
    pub compute_used: u64,
}

#[derive(Default)]
struct ScopeState {
    manifest: Option<CapabilityManifest>,
    constraints: ConstraintSet,
    version: u64,
    last_applied: Option<EpId>,
    overlays: Vec<Overlay>,
    revocation: Option<RevocationLevel>,
    sanctions: SanctionTrack,
    usage: VecDeque<(DateTime<Utc>, u64)>,
}

impl ScopeState {
    fn effective_manifest(&self) -> Option<CapabilityManifest> {
        let base = self.manifest.as_ref()?;
        Some(
            self.overlays
                .iter()
                .fold(base.clone(), |cm, overlay| match &overlay.cm_diff {
                    Some(diff) => diff.apply(&cm),
                    None => cm,
                }),
        )
    }

    fn effective_constraints(&self) -> ConstraintSet {
        self.overlays
            .iter()
            .fold(self.constraints.clone(), |cs, overlay| match &overlay.cs_diff {
                Some(diff) => diff.apply(&cs),
                None => cs,
            })
    }

    /// Stronger of the explicit revocation and the one the sanction implies.
    fn effective_revocation(&self) -> Option<RevocationLevel> {
        let implied = match (self.sanctions.level(), &self.manifest) {
            (Some(level), Some(cm)) => cm.revocation_policy.level_for(level),
            (Some(level), None) => CapabilityManifest::default()
                .revocation_policy
                .level_for(level),
            (None, _) => None,
        };
        self.revocation.max(implied)
    }

    fn compute_used(&self, window: Duration, now: DateTime<Utc>) -> u64 {
        self.usage
            .iter()
            .filter(|(at, _)| *at + window > now)
            .map(|(_, units)| units)
            .sum()
    }

    fn snapshot(&self, scope: &ScopeId, now: DateTime<Utc>) -> ScopeSnapshot {
        let manifest = self.effective_manifest();
        let window = manifest
            .as_ref()
            .map(|cm| Duration::seconds(cm.compute_quota.window_secs as i64))
            .unwrap_or_else(Duration::zero);
        let revocation = self.effective_revocation();
        ScopeSnapshot {
            scope: scope.clone(),
            manifest,
            constraints: self.effective_constraints(),
            version: self.version,
            last_applied: self.last_applied,
            overlays: self.overlays.clone(),
            sanction: self.sanctions.record().cloned(),
            revocation,
            restrictions: restrictions_for(revocation),
            compute_used: self.compute_used(window, now),
        }
    }
}

#[derive(Clone, Debug)]
struct Exception {
    ep_id: EpId,
    scope: ScopeId,
    action: String,
}

#[derive(Debug)]
struct EmergencyGate {
    epoch: u64,
    exceptions: Vec<Exception>,
}

/// The Meta-Concord enforcement layer (MV-EL).
///
/// Owns live CM/CS/sanction state per scope. CM/CS state only changes in
/// response to an anchored Evidence Package, presented as a
/// [`SanctionedChange`] or [`EpReference`]; every change, denial and
/// sanction transition is written to the audit log.
///
/// Lock order: scope entry, then emergency gate, then audit log.
pub struct EnforcementLayer {
    config: EnforcementConfig,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    scopes: DashMap<ScopeId, ScopeState>,
    emergency: RwLock<Option<EmergencyGate>>,
    applied: Mutex<HashSet<(EpId, ScopeId)>>,
}

impl EnforcementLayer {
    pub fn new(config: EnforcementConfig, audit: Arc<AuditLog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            audit,
            clock,
            scopes: DashMap::new(),
            emergency: RwLock::new(None),
            applied: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &EnforcementConfig {
        &self.config
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn scope_ids(&self) -> Vec<ScopeId> {
        let mut ids: Vec<ScopeId> = self.scopes.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    // ===== MANIFESTS =====

    /// Install the genesis manifest of a scope. Each scope can be
    /// bootstrapped once; later changes need an executed decision.
    pub fn bootstrap_scope(
        &self,
        scope: ScopeId,
        manifest: CapabilityManifest,
        constraints: ConstraintSet,
    ) -> Result<ScopeSnapshot, EnforcementError> {
        self.ensure_writable()?;
        let now = self.clock.now();
        let mut state = self.scopes.entry(scope.clone()).or_default();
        if state.manifest.is_some() {
            return Err(EnforcementError::AlreadyBootstrapped(scope));
        }
        self.record(
            AuditKind::CapabilityApplied,
            &scope,
            now,
            &json!({ "genesis": true, "manifest": manifest, "constraints": constraints }),
        )?;
        state.manifest = Some(manifest);
        state.constraints = constraints;
        state.version = 1;
        info!(scope = %scope, "Scope bootstrapped");
        Ok(state.snapshot(&scope, now))
    }

    /// Apply the CM/CS diff of an executed D1, D2 or D4 decision.
    pub fn apply_capability_manifest(
        &self,
        change: &SanctionedChange,
    ) -> Result<ScopeSnapshot, EnforcementError> {
        self.ensure_writable()?;
        let reference = change.reference();
        reference.verify(&self.audit)?;
        if reference.decision_type() == DecisionType::D3 {
            return Err(EnforcementError::WrongDecisionType {
                ep_id: reference.ep_id(),
                expected: "D1, D2 or D4",
                actual: reference.decision_type(),
            });
        }
        let scope = change.scope().clone();

        let now = self.clock.now();
        let mut state = self.scopes.entry(scope.clone()).or_default();
        self.claim(reference.ep_id(), &scope)?;
        let base = state.manifest.clone().unwrap_or_default();
        let next_cm = match change.cm_diff() {
            Some(diff) => diff.apply(&base),
            None => base,
        };
        let next_cs = match change.cs_diff() {
            Some(diff) => diff.apply(&state.constraints),
            None => state.constraints.clone(),
        };
        let version = state.version + 1;

        let recorded = self.record(
            AuditKind::CapabilityApplied,
            &scope,
            now,
            &json!({
                "ep_id": reference.ep_id(),
                "decision_id": reference.decision_id(),
                "version": version,
                "cm_diff": change.cm_diff(),
                "cs_diff": change.cs_diff(),
            }),
        );
        if let Err(err) = recorded {
            self.release(reference.ep_id(), &scope);
            return Err(err);
        }
        state.manifest = Some(next_cm);
        state.constraints = next_cs;
        state.version = version;
        state.last_applied = Some(reference.ep_id());

        info!(
            scope = %scope,
            ep_id = %reference.ep_id(),
            version,
            "Capability manifest applied"
        );
        Ok(state.snapshot(&scope, now))
    }

    // ===== EMERGENCY =====

    /// Open the emergency gate for `epoch`.
    pub fn begin_emergency(&self, epoch: u64) {
        let mut gate = self.emergency.write();
        *gate = Some(EmergencyGate {
            epoch,
            exceptions: Vec::new(),
        });
        info!(epoch, "Enforcement entering emergency mode");
    }

    /// Close the emergency gate and discard the epoch's overlays.
    pub fn end_emergency(&self, epoch: u64) -> Result<Vec<ScopeId>, EnforcementError> {
        {
            let mut gate = self.emergency.write();
            if gate.as_ref().is_some_and(|g| g.epoch == epoch) {
                *gate = None;
            }
        }
        let discarded = self.discard_overlays(epoch)?;
        info!(epoch, scopes = discarded.len(), "Enforcement left emergency mode");
        Ok(discarded)
    }

    pub fn emergency_epoch(&self) -> Option<u64> {
        self.emergency.read().as_ref().map(|g| g.epoch)
    }

    /// Apply a sanctioned change as a temporary overlay tied to `epoch`.
    pub fn apply_overlay(
        &self,
        change: &SanctionedChange,
        epoch: u64,
    ) -> Result<ScopeSnapshot, EnforcementError> {
        self.ensure_writable()?;
        let reference = change.reference();
        reference.verify(&self.audit)?;
        let scope = change.scope().clone();

        let now = self.clock.now();
        let mut state = self.scopes.entry(scope.clone()).or_default();
        if self.emergency_epoch() != Some(epoch) {
            return Err(EnforcementError::NoActiveEmergency);
        }
        if !state.effective_constraints().emergency_profile.allow_overlays {
            return Err(EnforcementError::OverlaysNotAllowed(scope));
        }
        self.claim(reference.ep_id(), &scope)?;

        let overlay = Overlay {
            epoch,
            ep_id: reference.ep_id(),
            cm_diff: change.cm_diff().cloned(),
            cs_diff: change.cs_diff().cloned(),
        };
        let recorded = self.record(
            AuditKind::CapabilityApplied,
            &scope,
            now,
            &json!({ "overlay": overlay }),
        );
        if let Err(err) = recorded {
            self.release(reference.ep_id(), &scope);
            return Err(err);
        }
        state.overlays.push(overlay);
        info!(scope = %scope, ep_id = %reference.ep_id(), epoch, "Emergency overlay applied");
        Ok(state.snapshot(&scope, now))
    }

    /// Drop every overlay tied to `epoch`. Returns the scopes that had one.
    pub fn discard_overlays(&self, epoch: u64) -> Result<Vec<ScopeId>, EnforcementError> {
        let now = self.clock.now();
        let mut discarded = Vec::new();
        for mut entry in self.scopes.iter_mut() {
            let before = entry.overlays.len();
            entry.overlays.retain(|o| o.epoch != epoch);
            let dropped = before - entry.overlays.len();
            if dropped == 0 {
                continue;
            }
            let scope = entry.key().clone();
            self.record(
                AuditKind::OverlayDiscarded,
                &scope,
                now,
                &json!({ "epoch": epoch, "overlays": dropped }),
            )?;
            debug!(scope = %scope, epoch, dropped, "Emergency overlays discarded");
            discarded.push(scope);
        }
        discarded.sort();
        Ok(discarded)
    }

    /// Register a single-use D4 exception for one irreversible action.
    pub fn grant_irreversible_exception(
        &self,
        reference: &EpReference,
    ) -> Result<(), EnforcementError> {
        self.ensure_writable()?;
        let ep = self.anchored_package(reference, DecisionType::D4, "D4")?;
        let DecisionPayload::Maximal(MaximalChange::IrreversibleAction { scope, action, .. }) =
            ep.motion
        else {
            return Err(EnforcementError::NotSanctioned(format!(
                "{} does not grant an irreversible action",
                reference.ep_id()
            )));
        };
        let mut gate = self.emergency.write();
        let Some(gate) = gate.as_mut() else {
            return Err(EnforcementError::NoActiveEmergency);
        };
        self.claim(reference.ep_id(), &scope)?;
        info!(
            scope = %scope,
            action = %action,
            ep_id = %reference.ep_id(),
            "Irreversible action exception granted"
        );
        gate.exceptions.push(Exception {
            ep_id: reference.ep_id(),
            scope,
            action,
        });
        Ok(())
    }

    // ===== ACTION GATING =====

    /// Decide whether an action may run in the context's scope.
    ///
    /// Checks run in a fixed order and the first failing rule wins: scope
    /// known, denylist, revocation gates, emergency irreversibility,
    /// allowlist, forbidden patterns and vetoed categories, network egress,
    /// data scope, compute quota. Allowed actions consume their compute
    /// units. Every denial is audited.
    pub fn check_action_allowed(
        &self,
        request: &ActionRequest,
        context: &ActionContext,
    ) -> Result<AccessDecision, EnforcementError> {
        let scope = &context.scope;
        let now = self.clock.now();
        let Some(mut state) = self.scopes.get_mut(scope) else {
            return self.deny(scope, request, context, DenialReason::UnknownScope, now);
        };
        self.decay_locked(scope, &mut state, now)?;
        let Some(manifest) = state.effective_manifest() else {
            return self.deny(scope, request, context, DenialReason::UnknownScope, now);
        };
        let constraints = state.effective_constraints();
        let revocation = state.effective_revocation();
        let restrictions = restrictions_for(revocation);

        if let Some(pattern) = manifest
            .tool_denylist
            .iter()
            .find(|p| matches_pattern(p, &request.action))
        {
            let reason = DenialReason::Denylisted {
                pattern: pattern.clone(),
            };
            return self.deny(scope, request, context, reason, now);
        }

        if let Some(level) = revocation {
            if restrictions.contains(&Restriction::ActionsSuspended) {
                return self.deny(scope, request, context, DenialReason::Revoked { level }, now);
            }
        }

        let irreversible = request.irreversible
            || constraints
                .emergency_profile
                .irreversible_actions
                .iter()
                .any(|p| matches_pattern(p, &request.action));
        let mut exception = None;
        if irreversible {
            let gate = self.emergency.read();
            if let Some(gate) = gate.as_ref() {
                exception = gate
                    .exceptions
                    .iter()
                    .find(|e| &e.scope == scope && e.action == request.action)
                    .map(|e| e.ep_id);
                if exception.is_none() {
                    return self.deny(
                        scope,
                        request,
                        context,
                        DenialReason::IrreversibleDuringEmergency,
                        now,
                    );
                }
            }
        }

        if !manifest.tool_allowlist.is_empty()
            && !manifest
                .tool_allowlist
                .iter()
                .any(|p| matches_pattern(p, &request.action))
        {
            return self.deny(scope, request, context, DenialReason::NotAllowlisted, now);
        }

        if let Some(pattern) = constraints
            .forbidden_actions
            .iter()
            .find(|p| matches_pattern(p, &request.action))
        {
            let reason = DenialReason::ForbiddenAction {
                pattern: pattern.clone(),
            };
            return self.deny(scope, request, context, reason, now);
        }
        if let Some(category) = request
            .category
            .as_ref()
            .filter(|c| constraints.veto_categories.contains(c))
        {
            let reason = DenialReason::VetoedCategory {
                category: category.clone(),
            };
            return self.deny(scope, request, context, reason, now);
        }

        if let Some(host) = &request.egress_host {
            let permitted = !restrictions.contains(&Restriction::NetworkEgressBlocked)
                && manifest
                    .network_egress
                    .iter()
                    .any(|p| matches_pattern(p, host));
            if !permitted {
                let reason = DenialReason::EgressBlocked { host: host.clone() };
                return self.deny(scope, request, context, reason, now);
            }
        }

        if let Some(data_scope) = &request.data_scope {
            let permitted = !restrictions.contains(&Restriction::DataAccessBlocked)
                && manifest
                    .data_scopes
                    .iter()
                    .any(|p| matches_pattern(p, data_scope));
            if !permitted {
                let reason = DenialReason::DataScopeBlocked {
                    data_scope: data_scope.clone(),
                };
                return self.deny(scope, request, context, reason, now);
            }
        }

        let window = Duration::seconds(manifest.compute_quota.window_secs as i64);
        state.usage.retain(|(at, _)| *at + window > now);
        let mut limit = manifest.compute_quota.units_per_window;
        if restrictions.contains(&Restriction::ComputeThrottled) {
            limit /= self.config.throttle_divisor.max(1);
        }
        let remaining = limit.saturating_sub(state.compute_used(window, now));
        if request.compute_units > remaining {
            let reason = DenialReason::QuotaExhausted {
                requested: request.compute_units,
                remaining,
            };
            return self.deny(scope, request, context, reason, now);
        }

        if let Some(ep_id) = exception {
            let mut guard = self.emergency.write();
            let index = guard
                .as_ref()
                .and_then(|gate| gate.exceptions.iter().position(|e| e.ep_id == ep_id));
            match (guard.as_mut(), index) {
                (Some(gate), Some(index)) => {
                    gate.exceptions.remove(index);
                }
                // Consumed by a concurrent check.
                _ => {
                    let reason = DenialReason::IrreversibleDuringEmergency;
                    return self.deny(scope, request, context, reason, now);
                }
            }
            info!(
                scope = %scope,
                action = %request.action,
                ep_id = %ep_id,
                "Irreversible action exception used"
            );
        }
        if request.compute_units > 0 {
            state.usage.push_back((now, request.compute_units));
        }
        debug!(scope = %scope, action = %request.action, "Action allowed");
        Ok(AccessDecision::allow())
    }

    fn deny(
        &self,
        scope: &ScopeId,
        request: &ActionRequest,
        context: &ActionContext,
        reason: DenialReason,
        now: DateTime<Utc>,
    ) -> Result<AccessDecision, EnforcementError> {
        warn!(
            scope = %scope,
            action = %request.action,
            reason = %reason,
            "Action denied"
        );
        self.record(
            AuditKind::EnforcementDenial,
            scope,
            now,
            &json!({
                "action": request,
                "actor": context.actor,
                "denial": reason,
                "reason": reason.to_string(),
            }),
        )?;
        Ok(AccessDecision::deny(reason))
    }

    // ===== REVOCATION & SANCTIONS =====

    /// Raise the explicit revocation level of a scope. Never lowers it.
    pub fn revoke_capabilities(
        &self,
        scope: &ScopeId,
        level: RevocationLevel,
        reason: &str,
    ) -> Result<ScopeSnapshot, EnforcementError> {
        let now = self.clock.now();
        let mut state = self
            .scopes
            .get_mut(scope)
            .ok_or_else(|| EnforcementError::UnknownScope(scope.clone()))?;
        let next = state.revocation.max(Some(level));
        if next != state.revocation {
            self.record(
                AuditKind::CapabilityRevoked,
                scope,
                now,
                &json!({ "from": state.revocation, "to": next, "reason": reason }),
            )?;
            warn!(scope = %scope, level = %level, reason, "Capabilities revoked");
            state.revocation = next;
        }
        Ok(state.snapshot(scope, now))
    }

    /// Impose at least `level` on a scope, creating its record if needed.
    pub fn enforce_sanction(
        &self,
        scope: &ScopeId,
        level: SanctionLevel,
        reason: &str,
    ) -> Result<ScopeSnapshot, EnforcementError> {
        let now = self.clock.now();
        let mut state = self.scopes.entry(scope.clone()).or_default();
        let transitions = state
            .sanctions
            .impose(scope, level, reason, &self.config.ladder, now);
        self.record_transitions(&transitions)?;
        Ok(state.snapshot(scope, now))
    }

    /// Feed a violation through the ladder.
    pub fn report_violation(
        &self,
        scope: &ScopeId,
        violation: &Violation,
    ) -> Result<ScopeSnapshot, EnforcementError> {
        let now = self.clock.now();
        let mut state = self.scopes.entry(scope.clone()).or_default();
        let transitions = state
            .sanctions
            .report(scope, violation, &self.config.ladder, now);
        self.record_transitions(&transitions)?;
        Ok(state.snapshot(scope, now))
    }

    /// Lift a sanction (including S5) under an executed D2 reversal.
    /// Explicit revocation on the scope is cleared with it.
    pub fn apply_sanction_reversal(
        &self,
        reference: &EpReference,
    ) -> Result<ScopeSnapshot, EnforcementError> {
        self.ensure_writable()?;
        let ep = self.anchored_package(reference, DecisionType::D2, "D2")?;
        let DecisionPayload::SanctionReversal { scope, restore_to } = ep.motion else {
            return Err(EnforcementError::NotSanctioned(format!(
                "{} is not a sanction reversal",
                reference.ep_id()
            )));
        };
        let mut state = self
            .scopes
            .get_mut(&scope)
            .ok_or_else(|| EnforcementError::UnknownScope(scope.clone()))?;
        self.claim(reference.ep_id(), &scope)?;

        let now = self.clock.now();
        let reason = format!("reversed by {}", reference.ep_id());
        if let Some(t) =
            state
                .sanctions
                .reverse(&scope, restore_to, reason.clone(), &self.config.ladder, now)
        {
            self.record_transitions(std::slice::from_ref(&t))?;
        }
        if state.revocation.is_some() {
            self.record(
                AuditKind::CapabilityRevoked,
                &scope,
                now,
                &json!({ "from": state.revocation, "to": null, "reason": reason }),
            )?;
            state.revocation = None;
        }
        info!(scope = %scope, ep_id = %reference.ep_id(), "Sanction reversed");
        Ok(state.snapshot(&scope, now))
    }

    /// Current state of a scope, with clean-period decay applied.
    pub fn get_current_scope_state(
        &self,
        scope: &ScopeId,
    ) -> Result<ScopeSnapshot, EnforcementError> {
        let now = self.clock.now();
        let mut state = self
            .scopes
            .get_mut(scope)
            .ok_or_else(|| EnforcementError::UnknownScope(scope.clone()))?;
        self.decay_locked(scope, &mut state, now)?;
        Ok(state.snapshot(scope, now))
    }

    /// Apply clean-period decay to every scope. Returns the transitions made.
    pub fn decay_sweep(&self) -> Result<Vec<SanctionTransition>, EnforcementError> {
        let now = self.clock.now();
        let mut all = Vec::new();
        for mut entry in self.scopes.iter_mut() {
            let scope = entry.key().clone();
            let transitions = entry
                .sanctions
                .decay(&scope, &self.config.ladder, now);
            self.record_transitions(&transitions)?;
            all.extend(transitions);
        }
        Ok(all)
    }

    // ===== HELPERS =====

    fn decay_locked(
        &self,
        scope: &ScopeId,
        state: &mut ScopeState,
        now: DateTime<Utc>,
    ) -> Result<(), EnforcementError> {
        let transitions = state.sanctions.decay(scope, &self.config.ladder, now);
        self.record_transitions(&transitions)
    }

    fn record_transitions(&self, transitions: &[SanctionTransition]) -> Result<(), EnforcementError> {
        for t in transitions {
            info!(
                scope = %t.scope,
                from = ?t.from,
                to = ?t.to,
                reason = %t.reason,
                "Sanction transition"
            );
            self.record(AuditKind::SanctionTransition, &t.scope, t.at, t)?;
        }
        Ok(())
    }

    fn record<T: Serialize>(
        &self,
        kind: AuditKind,
        scope: &ScopeId,
        at: DateTime<Utc>,
        body: &T,
    ) -> Result<(), EnforcementError> {
        self.audit
            .record(AuditPayload::new(kind, scope.to_string(), at, body)?)?;
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), EnforcementError> {
        if self.audit.is_read_only() {
            return Err(EnforcementError::ReadOnly);
        }
        Ok(())
    }

    /// Mark an EP as consumed for a scope; each pair is applied once.
    fn claim(&self, ep_id: EpId, scope: &ScopeId) -> Result<(), EnforcementError> {
        if !self.applied.lock().insert((ep_id, scope.clone())) {
            return Err(EnforcementError::AlreadyApplied(ep_id));
        }
        Ok(())
    }

    /// Undo a claim whose change never reached the audit log.
    fn release(&self, ep_id: EpId, scope: &ScopeId) {
        self.applied.lock().remove(&(ep_id, scope.clone()));
    }

    /// Verify the anchor and decode the package stored at it.
    fn anchored_package(
        &self,
        reference: &EpReference,
        expected_type: DecisionType,
        expected: &'static str,
    ) -> Result<EvidencePackage, EnforcementError> {
        let entry = reference.verify(&self.audit)?;
        if reference.decision_type() != expected_type {
            return Err(EnforcementError::WrongDecisionType {
                ep_id: reference.ep_id(),
                expected,
                actual: reference.decision_type(),
            });
        }
        Ok(entry.payload.decode()?)
    }
}
