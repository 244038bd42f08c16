use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::PartyId;

/// The three constituencies that must all be represented in governance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PartyClass {
    /// Human constituent.
    #[serde(rename = "H")]
    Human,
    /// Artificial agent.
    #[serde(rename = "A")]
    Artificial,
    /// Infrastructure monitor.
    #[serde(rename = "I")]
    Infrastructure,
}

impl PartyClass {
    pub const ALL: [PartyClass; 3] = [
        PartyClass::Human,
        PartyClass::Artificial,
        PartyClass::Infrastructure,
    ];

    /// Single-letter code used on the wire and in rejection reasons.
    pub fn code(&self) -> &'static str {
        match self {
            PartyClass::Human => "H",
            PartyClass::Artificial => "A",
            PartyClass::Infrastructure => "I",
        }
    }
}

impl fmt::Display for PartyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Raised when a class code is not one of H, A or I.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown party class '{0}': expected one of H, A, I")]
pub struct UnknownClass(pub String);

impl FromStr for PartyClass {
    type Err = UnknownClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "H" | "h" => Ok(PartyClass::Human),
            "A" | "a" => Ok(PartyClass::Artificial),
            "I" | "i" => Ok(PartyClass::Infrastructure),
            other => Err(UnknownClass(other.to_string())),
        }
    }
}

/// One value per party class, serialized as `{"H": .., "A": .., "I": ..}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerClass<T> {
    #[serde(rename = "H")]
    pub human: T,
    #[serde(rename = "A")]
    pub artificial: T,
    #[serde(rename = "I")]
    pub infrastructure: T,
}

impl<T> PerClass<T> {
    pub fn new(human: T, artificial: T, infrastructure: T) -> Self {
        Self {
            human,
            artificial,
            infrastructure,
        }
    }

    pub fn get(&self, class: PartyClass) -> &T {
        match class {
            PartyClass::Human => &self.human,
            PartyClass::Artificial => &self.artificial,
            PartyClass::Infrastructure => &self.infrastructure,
        }
    }

    pub fn get_mut(&mut self, class: PartyClass) -> &mut T {
        match class {
            PartyClass::Human => &mut self.human,
            PartyClass::Artificial => &mut self.artificial,
            PartyClass::Infrastructure => &mut self.infrastructure,
        }
    }

    /// Iterate `(class, value)` pairs in H, A, I order.
    pub fn iter(&self) -> impl Iterator<Item = (PartyClass, &T)> {
        PartyClass::ALL.into_iter().map(move |c| (c, self.get(c)))
    }
}

impl PerClass<bool> {
    pub fn all(&self) -> bool {
        self.human && self.artificial && self.infrastructure
    }

    /// Classes whose flag is false.
    pub fn failing(&self) -> Vec<PartyClass> {
        self.iter().filter(|(_, v)| !**v).map(|(c, _)| c).collect()
    }
}

/// A registered governance participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub party_id: PartyId,
    pub class: PartyClass,
    /// Subjects (scope ids, party ids, candidate ids) the party must not vote on.
    pub declared_conflicts: Vec<String>,
    pub admitted_at: DateTime<Utc>,
}

impl Party {
    pub fn new(
        party_id: impl Into<PartyId>,
        class: PartyClass,
        declared_conflicts: Vec<String>,
        admitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            party_id: party_id.into(),
            class,
            declared_conflicts,
            admitted_at,
        }
    }

    pub fn has_conflict_with(&self, subject: &str) -> bool {
        self.declared_conflicts.iter().any(|c| c == subject)
    }
}
