use concord_types::{PartyId, UnknownClass};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown party: {0}")]
    UnknownParty(PartyId),

    #[error("party already registered: {0}")]
    AlreadyRegistered(PartyId),

    #[error("admission already in flight for {0}")]
    AdmissionPending(PartyId),

    #[error("registration rejected: {0}")]
    InvalidClass(#[from] UnknownClass),

    #[error("registration rejected: candidate {0} did not declare conflicts")]
    ConflictsUndeclared(String),

    #[error("registration rejected: candidate id is empty")]
    EmptyCandidate,
}
