//! Objections and appeals: admissibility, escalating bonds, and per-party
//! rate limiting.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use concord_types::{ChainHash, DecisionId, FilingId, PartyId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DecisionError;
use crate::policy::FilingPolicy;

const FILING_DOMAIN: &[u8] = b"concord-filing-v1:";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingKind {
    Objection,
    Appeal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundsCategory {
    Procedural,
    Evidentiary,
    ConflictOfInterest,
    Substantive,
    Other,
}

/// Structured grounds for a filing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grounds {
    pub category: GroundsCategory,
    pub statement: String,
    /// Audit seqs, EP ids or documents the filing relies on.
    #[serde(default)]
    pub references: Vec<String>,
}

impl Grounds {
    pub fn new(category: GroundsCategory, statement: impl Into<String>) -> Self {
        Self {
            category,
            statement: statement.into(),
            references: Vec::new(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.references.push(reference.into());
        self
    }

    pub fn validate(&self) -> Result<(), DecisionError> {
        if self.statement.trim().is_empty() {
            return Err(DecisionError::InadmissibleGrounds(
                "grounds statement is empty".into(),
            ));
        }
        if self.references.iter().any(|r| r.trim().is_empty()) {
            return Err(DecisionError::InadmissibleGrounds(
                "grounds reference is empty".into(),
            ));
        }
        Ok(())
    }
}

/// An accepted filing and the bond it required.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingReceipt {
    pub filing_id: FilingId,
    pub kind: FilingKind,
    pub decision_id: DecisionId,
    pub party_id: PartyId,
    pub grounds: Grounds,
    /// How many times this party has filed these exact grounds on this decision.
    pub occurrence: u32,
    pub bond_required: u64,
    pub filed_at: DateTime<Utc>,
}

#[derive(Default)]
struct DeskState {
    recent: HashMap<PartyId, VecDeque<DateTime<Utc>>>,
    occurrences: HashMap<ChainHash, Occurrences>,
}

#[derive(Clone, Copy)]
struct Occurrences {
    count: u32,
    last_at: DateTime<Utc>,
}

impl DeskState {
    /// Forget filings a full window old. Grounds left quiet for a whole
    /// window start again at the first occurrence.
    fn prune(&mut self, now: DateTime<Utc>, window: Duration) {
        self.recent.retain(|_, times| {
            while times.front().is_some_and(|t| *t + window <= now) {
                times.pop_front();
            }
            !times.is_empty()
        });
        self.occurrences.retain(|_, seen| seen.last_at + window > now);
    }
}

/// Admits filings against the flood controls of a [`FilingPolicy`].
pub struct FilingDesk {
    policy: FilingPolicy,
    state: Mutex<DeskState>,
}

impl FilingDesk {
    pub fn new(policy: FilingPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(DeskState::default()),
        }
    }

    pub fn policy(&self) -> &FilingPolicy {
        &self.policy
    }

    /// Accept a filing or refuse it. Refused filings consume neither the
    /// rate budget nor a bond step.
    pub fn admit(
        &self,
        kind: FilingKind,
        decision_id: &DecisionId,
        party_id: &PartyId,
        grounds: Grounds,
        now: DateTime<Utc>,
    ) -> Result<FilingReceipt, DecisionError> {
        self.admit_with(kind, decision_id, party_id, grounds, now, |_| Ok(()))
    }

    /// Like [`admit`](Self::admit), but the receipt only counts against the
    /// party once `commit` succeeds. The desk stays locked while `commit`
    /// runs, so concurrent filings cannot overrun the window.
    pub fn admit_with<F>(
        &self,
        kind: FilingKind,
        decision_id: &DecisionId,
        party_id: &PartyId,
        grounds: Grounds,
        now: DateTime<Utc>,
        commit: F,
    ) -> Result<FilingReceipt, DecisionError>
    where
        F: FnOnce(&FilingReceipt) -> Result<(), DecisionError>,
    {
        grounds.validate()?;
        let fingerprint = fingerprint(kind, decision_id, party_id, &grounds)?;

        let mut state = self.state.lock();
        let window = self.policy.window();
        state.prune(now, window);

        if let Some(recent) = state.recent.get(party_id) {
            if recent.len() >= self.policy.max_filings_per_window {
                let retry_after = recent.front().map(|t| *t + window).unwrap_or(now);
                warn!(party = %party_id, decision_id = %decision_id, %retry_after, "Filing rate limit hit");
                return Err(DecisionError::TooManyRequests {
                    party: party_id.clone(),
                    retry_after,
                });
            }
        }

        let occurrence = state
            .occurrences
            .get(&fingerprint)
            .map_or(1, |seen| seen.count + 1);
        let receipt = FilingReceipt {
            filing_id: FilingId::generate(),
            kind,
            decision_id: decision_id.clone(),
            party_id: party_id.clone(),
            grounds,
            occurrence,
            bond_required: self.policy.bond_for(occurrence),
            filed_at: now,
        };
        commit(&receipt)?;

        state
            .recent
            .entry(party_id.clone())
            .or_default()
            .push_back(now);
        state.occurrences.insert(
            fingerprint,
            Occurrences {
                count: occurrence,
                last_at: now,
            },
        );

        debug!(
            party = %party_id,
            decision_id = %decision_id,
            ?kind,
            occurrence,
            bond_required = receipt.bond_required,
            "Filing admitted"
        );
        Ok(receipt)
    }

    /// Parties and grounds the desk is still tracking.
    pub fn tracked(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.recent.len(), state.occurrences.len())
    }
}

fn fingerprint(
    kind: FilingKind,
    decision_id: &DecisionId,
    party_id: &PartyId,
    grounds: &Grounds,
) -> Result<ChainHash, DecisionError> {
    let statement = grounds.statement.trim().to_lowercase();
    Ok(ChainHash::of_json(
        FILING_DOMAIN,
        &(kind, decision_id, party_id, grounds.category, statement, &grounds.references),
    )?)
}
