use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use concord_types::{DecisionId, EpId, Party, PartyClass, PartyId, PerClass};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::RegistryError;
use crate::request::ValidatedRegistration;

/// Record of a governed admission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionRecord {
    pub party_id: PartyId,
    pub class: PartyClass,
    pub decision_id: DecisionId,
    pub ep_id: EpId,
    pub admitted_at: DateTime<Utc>,
}

/// Registered parties, keyed by id.
#[derive(Default)]
pub struct PartyRegistry {
    parties: RwLock<HashMap<PartyId, Party>>,
    admissions: RwLock<Vec<AdmissionRecord>>,
    /// Candidates whose admission is being executed.
    pending: Mutex<HashSet<PartyId>>,
}

/// Exclusive claim on a candidate id, released on drop.
pub struct CandidateHold<'a> {
    registry: &'a PartyRegistry,
    party_id: PartyId,
}

impl CandidateHold<'_> {
    pub fn party_id(&self) -> &PartyId {
        &self.party_id
    }
}

impl Drop for CandidateHold<'_> {
    fn drop(&mut self) {
        self.registry.pending.lock().remove(&self.party_id);
    }
}

impl PartyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the founding roster. Later parties need a D1 admission.
    pub fn with_genesis(parties: impl IntoIterator<Item = Party>) -> Self {
        let map: HashMap<PartyId, Party> = parties
            .into_iter()
            .map(|p| (p.party_id.clone(), p))
            .collect();
        info!(parties = map.len(), "Party registry seeded with genesis roster");
        Self {
            parties: RwLock::new(map),
            admissions: RwLock::new(Vec::new()),
            pending: Mutex::new(HashSet::new()),
        }
    }

    pub fn get(&self, party_id: &PartyId) -> Option<Party> {
        self.parties.read().get(party_id).cloned()
    }

    pub fn require(&self, party_id: &PartyId) -> Result<Party, RegistryError> {
        self.get(party_id)
            .ok_or_else(|| RegistryError::UnknownParty(party_id.clone()))
    }

    pub fn is_registered(&self, party_id: &PartyId) -> bool {
        self.parties.read().contains_key(party_id)
    }

    pub fn len(&self) -> usize {
        self.parties.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.parties.read().is_empty()
    }

    pub fn parties(&self) -> Vec<Party> {
        let mut parties: Vec<Party> = self.parties.read().values().cloned().collect();
        parties.sort_by(|a, b| a.party_id.cmp(&b.party_id));
        parties
    }

    pub fn class_counts(&self) -> PerClass<usize> {
        let mut counts = PerClass::default();
        for party in self.parties.read().values() {
            *counts.get_mut(party.class) += 1;
        }
        counts
    }

    /// Members of `class`, sorted by id.
    pub fn members_of(&self, class: PartyClass) -> Vec<PartyId> {
        let mut ids: Vec<PartyId> = self
            .parties
            .read()
            .values()
            .filter(|p| p.class == class)
            .map(|p| p.party_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Reject a candidate that is already a party.
    pub fn check_candidate(&self, registration: &ValidatedRegistration) -> Result<(), RegistryError> {
        if self.is_registered(&registration.candidate_id) {
            return Err(RegistryError::AlreadyRegistered(
                registration.candidate_id.clone(),
            ));
        }
        Ok(())
    }

    /// Claim a candidate for one admission. A second claim fails until the
    /// first hold is dropped.
    pub fn reserve(
        &self,
        registration: &ValidatedRegistration,
    ) -> Result<CandidateHold<'_>, RegistryError> {
        let parties = self.parties.read();
        let mut pending = self.pending.lock();
        let party_id = &registration.candidate_id;
        if parties.contains_key(party_id) {
            return Err(RegistryError::AlreadyRegistered(party_id.clone()));
        }
        if !pending.insert(party_id.clone()) {
            return Err(RegistryError::AdmissionPending(party_id.clone()));
        }
        Ok(CandidateHold {
            registry: self,
            party_id: party_id.clone(),
        })
    }

    /// Admit a candidate on the strength of an executed admission decision.
    pub fn admit(
        &self,
        registration: &ValidatedRegistration,
        decision_id: &DecisionId,
        ep_id: EpId,
        admitted_at: DateTime<Utc>,
    ) -> Result<Party, RegistryError> {
        let mut parties = self.parties.write();
        if parties.contains_key(&registration.candidate_id) {
            return Err(RegistryError::AlreadyRegistered(
                registration.candidate_id.clone(),
            ));
        }

        let party = Party::new(
            registration.candidate_id.clone(),
            registration.class,
            registration.declared_conflicts.clone(),
            admitted_at,
        );
        parties.insert(party.party_id.clone(), party.clone());
        self.admissions.write().push(AdmissionRecord {
            party_id: party.party_id.clone(),
            class: party.class,
            decision_id: decision_id.clone(),
            ep_id,
            admitted_at,
        });

        info!(
            party = %party.party_id,
            class = %party.class,
            decision = %decision_id,
            "Party admitted"
        );
        Ok(party)
    }

    pub fn admissions(&self) -> Vec<AdmissionRecord> {
        self.admissions.read().clone()
    }
}
