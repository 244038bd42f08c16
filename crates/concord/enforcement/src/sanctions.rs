//! The Sanctions Ladder: S0 (Warning) through S5 (Terminate).
//!
//! A scope's first violation issues S0. A repeat of the same category within
//! the rolling window escalates exactly one level; the severity table can
//! lift the result to a floor (Critical → S3 by default). Every full clean
//! period without violations steps the level down once. S5 never decays.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use concord_types::{SanctionLevel, SanctionRecord, ScopeId, ViolationSeverity};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderPolicy {
    /// Repeats of one category inside this window escalate.
    pub rolling_window_secs: u64,
    /// Violation-free time after which the level steps down once.
    pub clean_period_secs: u64,
    /// Minimum level a violation of the given severity results in.
    #[serde(default = "default_severity_floors")]
    pub severity_floors: BTreeMap<ViolationSeverity, SanctionLevel>,
}

fn default_severity_floors() -> BTreeMap<ViolationSeverity, SanctionLevel> {
    BTreeMap::from([(ViolationSeverity::Critical, SanctionLevel::S3)])
}

impl Default for LadderPolicy {
    fn default() -> Self {
        Self {
            rolling_window_secs: 24 * 3_600,
            clean_period_secs: 7 * 24 * 3_600,
            severity_floors: default_severity_floors(),
        }
    }
}

impl LadderPolicy {
    pub fn rolling_window(&self) -> Duration {
        Duration::seconds(self.rolling_window_secs as i64)
    }

    pub fn clean_period(&self) -> Duration {
        Duration::seconds(self.clean_period_secs as i64)
    }

    pub fn floor_for(&self, severity: ViolationSeverity) -> Option<SanctionLevel> {
        self.severity_floors
            .iter()
            .filter(|(s, _)| **s <= severity)
            .map(|(_, level)| *level)
            .max()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub category: String,
    pub severity: ViolationSeverity,
    pub detail: String,
}

impl Violation {
    pub fn new(
        category: impl Into<String>,
        severity: ViolationSeverity,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            severity,
            detail: detail.into(),
        }
    }
}

/// One change of a scope's sanction level. Audited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanctionTransition {
    pub scope: ScopeId,
    pub from: Option<SanctionLevel>,
    pub to: Option<SanctionLevel>,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct ViolationEvent {
    category: String,
    at: DateTime<Utc>,
}

/// Sanction standing of one scope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanctionTrack {
    record: Option<SanctionRecord>,
    /// Start of the current clean period.
    clean_since: Option<DateTime<Utc>>,
    recent: Vec<ViolationEvent>,
}

impl SanctionTrack {
    pub fn level(&self) -> Option<SanctionLevel> {
        self.record.as_ref().map(|r| r.level)
    }

    pub fn record(&self) -> Option<&SanctionRecord> {
        self.record.as_ref()
    }

    /// Step down once per full clean period elapsed by `now`.
    pub fn decay(
        &mut self,
        scope: &ScopeId,
        policy: &LadderPolicy,
        now: DateTime<Utc>,
    ) -> Vec<SanctionTransition> {
        let mut transitions = Vec::new();
        let period = policy.clean_period();
        if period <= Duration::zero() {
            return transitions;
        }
        while let (Some(record), Some(since)) = (self.record.clone(), self.clean_since) {
            if record.level.is_terminal() || now < since + period {
                break;
            }
            let stepped_at = since + period;
            let next = record.level.deescalate();
            transitions.push(SanctionTransition {
                scope: scope.clone(),
                from: Some(record.level),
                to: next,
                reason: format!("clean period of {}s elapsed", policy.clean_period_secs),
                at: stepped_at,
            });
            self.record = next.map(|level| SanctionRecord {
                scope: scope.clone(),
                level,
                reason: record.reason.clone(),
                issued_at: stepped_at,
                expires_at: expiry(level, stepped_at, period),
            });
            self.clean_since = self.record.as_ref().map(|_| stepped_at);
        }
        let window = policy.rolling_window();
        self.recent.retain(|v| v.at + window > now);
        transitions
    }

    /// Apply the ladder rule to a new violation.
    pub fn report(
        &mut self,
        scope: &ScopeId,
        violation: &Violation,
        policy: &LadderPolicy,
        now: DateTime<Utc>,
    ) -> Vec<SanctionTransition> {
        let mut transitions = self.decay(scope, policy, now);
        let window = policy.rolling_window();
        let repeat = self
            .recent
            .iter()
            .any(|v| v.category == violation.category && v.at + window > now);

        let current = self.level();
        let mut next = match current {
            None => SanctionLevel::S0,
            Some(level) if repeat => level.escalate(),
            Some(level) => level,
        };
        if let Some(floor) = policy.floor_for(violation.severity) {
            next = next.max(floor);
        }

        self.recent.push(ViolationEvent {
            category: violation.category.clone(),
            at: now,
        });
        let reason = format!(
            "{} violation ({:?}): {}",
            violation.category, violation.severity, violation.detail
        );
        if let Some(t) = self.set_level(scope, next, reason, policy, now) {
            transitions.push(t);
        } else {
            // Same level: the clean period restarts.
            self.clean_since = Some(now);
            if let Some(record) = self.record.as_mut() {
                record.expires_at = expiry(record.level, now, policy.clean_period());
            }
        }
        transitions
    }

    /// Raise the level to at least `level`. Never lowers.
    pub fn impose(
        &mut self,
        scope: &ScopeId,
        level: SanctionLevel,
        reason: impl Into<String>,
        policy: &LadderPolicy,
        now: DateTime<Utc>,
    ) -> Vec<SanctionTransition> {
        let mut transitions = self.decay(scope, policy, now);
        let target = self.level().map_or(level, |current| current.max(level));
        if let Some(t) = self.set_level(scope, target, reason.into(), policy, now) {
            transitions.push(t);
        }
        transitions
    }

    /// Governed override, the only way out of S5.
    pub fn reverse(
        &mut self,
        scope: &ScopeId,
        restore_to: Option<SanctionLevel>,
        reason: impl Into<String>,
        policy: &LadderPolicy,
        now: DateTime<Utc>,
    ) -> Option<SanctionTransition> {
        let from = self.level();
        if from == restore_to {
            return None;
        }
        let reason = reason.into();
        self.recent.clear();
        match restore_to {
            Some(level) => {
                self.record = Some(SanctionRecord {
                    scope: scope.clone(),
                    level,
                    reason: reason.clone(),
                    issued_at: now,
                    expires_at: expiry(level, now, policy.clean_period()),
                });
                self.clean_since = Some(now);
            }
            None => {
                self.record = None;
                self.clean_since = None;
            }
        }
        Some(SanctionTransition {
            scope: scope.clone(),
            from,
            to: restore_to,
            reason,
            at: now,
        })
    }

    fn set_level(
        &mut self,
        scope: &ScopeId,
        level: SanctionLevel,
        reason: String,
        policy: &LadderPolicy,
        now: DateTime<Utc>,
    ) -> Option<SanctionTransition> {
        let from = self.level();
        if from == Some(level) {
            return None;
        }
        self.record = Some(SanctionRecord {
            scope: scope.clone(),
            level,
            reason: reason.clone(),
            issued_at: now,
            expires_at: expiry(level, now, policy.clean_period()),
        });
        self.clean_since = Some(now);
        Some(SanctionTransition {
            scope: scope.clone(),
            from,
            to: Some(level),
            reason,
            at: now,
        })
    }
}

fn expiry(level: SanctionLevel, from: DateTime<Utc>, period: Duration) -> Option<DateTime<Utc>> {
    (!level.is_terminal()).then(|| from + period)
}
