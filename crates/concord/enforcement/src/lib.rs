//! # concord-enforcement
//!
//! The Meta-Concord enforcement layer (MV-EL).
//!
//! Runtimes call into governance through exactly this surface:
//!
//! - `apply_capability_manifest`: apply an executed decision's CM/CS diff,
//!   accepted only as a [`SanctionedChange`](concord_decision::SanctionedChange)
//! - `check_action_allowed`: gate an action on denylist, revocation,
//!   emergency irreversibility, allowlist, forbidden patterns, egress, data
//!   scope, compute quota
//! - `revoke_capabilities`: raise a scope's revocation level
//! - `enforce_sanction` / `report_violation`: the Sanctions Ladder
//! - `get_current_scope_state`: read-only snapshot
//!
//! Denials are normal control flow: they come back as an [`AccessDecision`]
//! carrying the rule that failed, and are always audited.

#![deny(unsafe_code)]

pub mod action;
pub mod error;
pub mod layer;
pub mod revocation;
pub mod sanctions;

pub use action::{AccessDecision, ActionContext, ActionRequest, DenialReason};
pub use error::EnforcementError;
pub use layer::{EnforcementConfig, EnforcementLayer, Overlay, ScopeSnapshot};
pub use revocation::{restrictions_for, Restriction};
pub use sanctions::{LadderPolicy, SanctionTrack, SanctionTransition, Violation};
