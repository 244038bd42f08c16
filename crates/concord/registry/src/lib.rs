//! # concord-registry
//!
//! Party Registry: who may vote, and in which class.
//!
//! Parties are immutable once admitted. New parties enter only through an
//! executed D1 admission decision; the founding roster is supplied at
//! construction. The registry is read-mostly and shared by every decision.

#![deny(unsafe_code)]

pub mod error;
pub mod registry;
pub mod request;

pub use error::RegistryError;
pub use registry::{AdmissionRecord, CandidateHold, PartyRegistry};
pub use request::{RegistrationRequest, ValidatedRegistration};
