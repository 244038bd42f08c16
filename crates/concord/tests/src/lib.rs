//! Meta-Concord end-to-end tests
//!
//! Cross-crate suites driving the full governance engine:
//!
//! - `tests/e2e/`: reference decision, emergency, filing and chain-race
//!   walkthroughs plus the wider decision lifecycle
//! - `tests/property/`: `proptest` invariants over vote distributions,
//!   sanctions, emergency deadlines and the hash chain
//! - `tests/adversarial/`: forged evidence, tampered storage, concurrent
//!   writers and a degraded audit store
//!
//! Run with: `cargo test -p concord-tests`

/// Shared test helpers: engine setup, voting, fixtures.
pub mod helpers;
