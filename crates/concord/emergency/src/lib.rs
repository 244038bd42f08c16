//! # concord-emergency
//!
//! The Emergency Circuit Breaker.
//!
//! `Normal → EmergencyProposed → EmergencyActive → {Renewed → EmergencyActive | Expired → Normal}`
//!
//! Entry, renewal and exit each require an executed D3 Evidence Package.
//! Entry needs assent from every party class. An active emergency expires at
//! its deadline unless renewed; each renewal must beat both the scheduled
//! threshold for its index and the ratio of the renewal before it, and
//! renewals beyond the review-free ones open a post-hoc review task that
//! blocks further renewals until closed. Every epoch is open to
//! retrospective judgment.

#![deny(unsafe_code)]

pub mod breaker;
pub mod error;
pub mod policy;

pub use breaker::{
    EmergencyCircuitBreaker, EmergencyEnd, EmergencyEpoch, EmergencyPhase, EmergencySnapshot,
    EmergencyTransition, Judgment, RenewalOutcome, RenewalRecord, ReviewTask,
};
pub use error::EmergencyError;
pub use policy::EmergencyPolicy;
