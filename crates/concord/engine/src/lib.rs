//! Meta-Concord governance engine.
//!
//! Wires the party registry, decision engine, enforcement layer and emergency
//! circuit breaker around one hash-chained audit log, and adds the pieces a
//! host process needs:
//!
//! - [`GovernanceConfig`]: layered configuration (defaults, file, `CONCORD_*`
//!   environment variables)
//! - [`init_tracing`]: `tracing` subscriber setup
//! - [`GovernanceEngine`]: proposal-to-enforcement routing of executed
//!   Evidence Packages
//! - [`spawn_sweeper`]: periodic timeouts, emergency expiry and sanction decay
//!
//! ```no_run
//! use std::sync::Arc;
//! use concord_engine::{init_tracing, spawn_sweeper, GovernanceConfig, GovernanceEngine};
//!
//! # async fn run() -> Result<(), concord_engine::GovernanceError> {
//! let config = GovernanceConfig::load(Some("concord.toml"))?;
//! init_tracing(&config.logging)?;
//! let every = config.scheduler.sweep_interval();
//! let engine = Arc::new(GovernanceEngine::builder(config).build()?);
//! let _sweeper = spawn_sweeper(engine.clone(), every);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod telemetry;

pub use config::{GovernanceConfig, LoggingConfig, SchedulerConfig, StorageConfig};
pub use engine::{
    spawn_sweeper, Effect, Execution, GovernanceEngine, GovernanceEngineBuilder, SweepSummary,
    ILLEGITIMATE_EMERGENCY_SANCTION,
};
pub use error::{GovernanceError, GovernanceResult};
pub use telemetry::init_tracing;
