//! Configuration for the governance engine

use std::path::PathBuf;
use std::time::Duration;

use concord_audit::AuditConfig;
use concord_decision::DecisionConfig;
use concord_emergency::EmergencyPolicy;
use concord_enforcement::EnforcementConfig;
use serde::{Deserialize, Serialize};

/// Main engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Per-type thresholds, windows and filing policy
    #[serde(default)]
    pub decision: DecisionConfig,

    /// Audit log tuning
    #[serde(default)]
    pub audit: AuditConfig,

    /// Where audit entries are persisted
    #[serde(default)]
    pub storage: StorageConfig,

    /// Sanctions ladder and throttling
    #[serde(default)]
    pub enforcement: EnforcementConfig,

    /// Emergency durations and renewal schedule
    #[serde(default)]
    pub emergency: EmergencyPolicy,

    /// Background sweeps
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Audit storage backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (development and tests)
    #[default]
    Memory,

    /// Append-only JSON-lines file
    File {
        /// Log file path
        path: PathBuf,
    },
}

/// Background sweep configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between sweeps (timeouts, emergency expiry, sanction decay)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl SchedulerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json: bool,

    /// Include timestamps
    #[serde(default = "default_true")]
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            timestamps: true,
        }
    }
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl GovernanceConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// Environment variables use the `CONCORD_` prefix and `__` between
    /// nesting levels, e.g. `CONCORD_SCHEDULER__SWEEP_INTERVAL_SECS=5`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&GovernanceConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CONCORD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Configuration for local development: in-memory audit, debug logs.
    pub fn development() -> Self {
        Self {
            logging: LoggingConfig {
                level: "debug".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
