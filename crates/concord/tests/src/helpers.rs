//! Shared test helpers for the end-to-end suites.
//!
//! Provides engine setup over a manual clock, roster fixtures and voting
//! shortcuts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use concord_audit::AuditLog;
use concord_decision::{DecisionPayload, EmergencyMotion, Proposal, ScopeChange};
use concord_enforcement::{AccessDecision, ActionContext, ActionRequest, ScopeSnapshot};
use concord_engine::{Execution, GovernanceConfig, GovernanceEngine};
use concord_types::{
    CapabilityManifest, CmDiff, ComputeQuota, ConstraintSet, DecisionId, ManualClock, Party,
    PartyClass, PartyId, ScopeId, VoteChoice,
};

/// Fixed start of every test clock.
pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

pub fn party(id: &str, class: PartyClass) -> Party {
    Party::new(id, class, vec![], t0())
}

/// `{H:2, A:1, I:1}`.
pub fn standard_roster() -> Vec<Party> {
    vec![
        party("h-1", PartyClass::Human),
        party("h-2", PartyClass::Human),
        party("a-1", PartyClass::Artificial),
        party("i-1", PartyClass::Infrastructure),
    ]
}

/// `{H:1, A:1, I:1}`.
pub fn triad_roster() -> Vec<Party> {
    vec![
        party("h-1", PartyClass::Human),
        party("a-1", PartyClass::Artificial),
        party("i-1", PartyClass::Infrastructure),
    ]
}

/// The governed agent every suite works against.
pub fn agent() -> ScopeId {
    ScopeId::new("agent-7")
}

pub fn agent_manifest() -> CapabilityManifest {
    CapabilityManifest {
        tool_allowlist: vec!["search".into(), "fetch".into(), "delete_*".into()],
        tool_denylist: vec!["delete_prod".into()],
        data_scopes: vec!["tenant/*".into()],
        network_egress: vec!["*.external.com".into()],
        compute_quota: ComputeQuota {
            units_per_window: 100,
            window_secs: 60,
        },
        ..Default::default()
    }
}

pub fn agent_constraints() -> ConstraintSet {
    ConstraintSet {
        forbidden_actions: vec!["delete_backup*".into()],
        veto_categories: vec!["self_replication".into()],
        ..Default::default()
    }
}

/// Replace the agent's egress list.
pub fn egress_change(hosts: &[&str]) -> ScopeChange {
    ScopeChange::manifest(
        agent(),
        CmDiff {
            network_egress: Some(hosts.iter().map(|h| h.to_string()).collect()),
            ..Default::default()
        },
    )
}

pub fn enter(duration_secs: u64, overlays: Vec<ScopeChange>) -> DecisionPayload {
    DecisionPayload::Emergency(EmergencyMotion::Enter {
        reason: "sensor network compromised".into(),
        duration_secs,
        overlays,
    })
}

pub fn renew(renewal_index: u32, extension_secs: u64) -> DecisionPayload {
    DecisionPayload::Emergency(EmergencyMotion::Renew {
        renewal_index,
        extension_secs,
    })
}

/// A fully wired engine over a manual clock.
pub struct TestEngine {
    pub engine: Arc<GovernanceEngine>,
    pub clock: Arc<ManualClock>,
}

impl TestEngine {
    pub fn new(roster: Vec<Party>) -> Self {
        Self::with_config(GovernanceConfig::default(), roster)
    }

    pub fn with_config(config: GovernanceConfig, roster: Vec<Party>) -> Self {
        Self::build(config, roster, None)
    }

    /// Engine over a caller-supplied audit log.
    pub fn over_audit(audit: Arc<AuditLog>, roster: Vec<Party>) -> Self {
        Self::build(GovernanceConfig::default(), roster, Some(audit))
    }

    fn build(config: GovernanceConfig, roster: Vec<Party>, audit: Option<Arc<AuditLog>>) -> Self {
        let clock = Arc::new(ManualClock::new(t0()));
        let mut builder = GovernanceEngine::builder(config)
            .genesis(roster)
            .clock(clock.clone());
        if let Some(audit) = audit {
            builder = builder.audit_log(audit);
        }
        let engine = builder.build().expect("engine builds");
        Self {
            engine: Arc::new(engine),
            clock,
        }
    }

    pub fn propose(&self, proposer: &str, payload: DecisionPayload) -> DecisionId {
        self.engine
            .propose(
                Proposal::new(proposer, payload)
                    .rationale("keep the agent inside its mandate")
                    .impact("narrows runtime capabilities"),
            )
            .expect("proposal accepted")
    }

    pub fn vote(&self, decision_id: &DecisionId, votes: &[(&str, VoteChoice)]) {
        for (party, choice) in votes {
            self.engine
                .cast_vote(decision_id, &PartyId::new(*party), *choice)
                .expect("vote accepted");
        }
    }

    pub fn approve_all(&self, decision_id: &DecisionId) {
        for party in self.engine.registry().parties() {
            self.engine
                .cast_vote(decision_id, &party.party_id, VoteChoice::Approve)
                .expect("vote accepted");
        }
    }

    /// Propose, approve unanimously, finalize and execute.
    pub fn pass(&self, proposer: &str, payload: DecisionPayload) -> Execution {
        let id = self.propose(proposer, payload);
        self.approve_all(&id);
        let finalization = self.engine.finalize(&id).expect("finalize");
        assert!(finalization.approved(), "{:?}", finalization.tally.rejections);
        self.engine.execute(&id).expect("execute")
    }

    pub fn bootstrap_agent(&self) -> ScopeSnapshot {
        self.engine
            .bootstrap_scope(agent(), agent_manifest(), agent_constraints())
            .expect("bootstrap")
    }

    /// Check an action on the agent scope.
    pub fn check(&self, request: ActionRequest) -> AccessDecision {
        self.engine
            .check_action_allowed(&request, &ActionContext::new(agent()))
            .expect("check runs")
    }
}
