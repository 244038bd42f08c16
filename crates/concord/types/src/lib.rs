//! # concord-types
//!
//! Shared vocabulary for the Meta-Concord governance engine.
//!
//! Every other concord crate speaks in these types:
//!
//! - **Identifiers**: `PartyId`, `DecisionId`, `ScopeId`, `EpId`, `FilingId`
//! - **Parties**: the three party classes (H/A/I) and per-class tallies
//! - **Decisions**: decision types D0..D4, lifecycle states, votes
//! - **Capability Manifest / Constraint Set**: per-scope permissions and
//!   prohibitions, plus the field-wise diffs executed decisions carry
//! - **Sanctions**: the S0..S5 ladder, violation severity, revocation levels
//! - **Hashing**: `ChainHash`, the domain-separated BLAKE3 digest used by the
//!   audit chain and evidence packages
//! - **Clock**: injectable time source so windows and deadlines are testable

#![deny(unsafe_code)]

pub mod capability;
pub mod clock;
pub mod decision;
pub mod hash;
pub mod ids;
pub mod party;
pub mod sanction;

pub use capability::{
    matches_pattern, CapabilityManifest, CmDiff, ComputeQuota, ConstraintSet, CsDiff,
    EmergencyProfile, RevocationPolicy,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::{DecisionState, DecisionType, Vote, VoteChoice};
pub use hash::{ChainHash, HashError};
pub use ids::{DecisionId, EpId, FilingId, PartyId, ScopeId};
pub use party::{Party, PartyClass, PerClass, UnknownClass};
pub use sanction::{RevocationLevel, SanctionLevel, SanctionRecord, ViolationSeverity};
