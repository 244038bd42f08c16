//! # concord-decision
//!
//! The Meta-Concord Decision Engine.
//!
//! A proposal is a closed tagged union over decision types D0..D4; its type is
//! derived from its content. Governed decisions move through
//! `Proposed → Voting → {Approved | Rejected} → Executed | Appealed → Resolved`
//! (or `Expired` when an approval is not executed in time).
//!
//! ## Components
//!
//! - **DecisionEngine**: propose, vote, tally, finalize, execute, file
//!   objections and appeals, sweep timeouts
//! - **tally**: quorum (one party per class, minimum participants, full roll
//!   for admissions), approval threshold, class-wise assent
//! - **EvidencePackage**: write-once proof artifact anchored in the audit log;
//!   `SanctionedChange` and `EpReference` are the only handles the enforcement
//!   layer accepts
//! - **SignatureAuthority**: pluggable per-party signing (keyed BLAKE3 or
//!   Ed25519)
//! - **FilingDesk**: objection/appeal admissibility, escalating bonds and
//!   per-party rate limits
//!
//! Quorum and threshold failures are outcomes: they resolve a decision to
//! `Rejected` with a [`RejectionReason`] naming the unmet invariant, and are
//! never returned as errors.

#![deny(unsafe_code)]

pub mod engine;
pub mod error;
pub mod evidence;
pub mod filing;
pub mod policy;
pub mod proposal;
pub mod signer;
pub mod tally;

pub use engine::{
    AppealRecord, AppealResolution, CastBallot, Decision, DecisionEngine, Finalization,
    ProposalOptions, SweepReport,
};
pub use error::DecisionError;
pub use evidence::{
    EpReference, EvidenceBuilder, EvidencePackage, EvidenceTimestamps, Participant,
    SanctionedChange,
};
pub use filing::{FilingDesk, FilingKind, FilingReceipt, Grounds, GroundsCategory};
pub use policy::{DecisionConfig, FilingPolicy, Threshold, TypePolicy};
pub use proposal::{
    DecisionPayload, EmergencyMotion, MaximalChange, Proposal, ScopeChange, StructuralChange,
};
pub use signer::{
    DigestAuthority, Ed25519Authority, PartySignature, SignatureAuthority, SignatureScheme, Signer,
};
pub use tally::{tally, Ballot, QuorumProof, RejectionReason, TallyResult, ThresholdProof};
