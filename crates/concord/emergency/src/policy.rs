use chrono::Duration;
use concord_decision::Threshold;
use serde::{Deserialize, Serialize};

/// Emergency duration limits and renewal escalation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyPolicy {
    /// Duration used when an entry motion asks for more than `max_duration_secs`.
    #[serde(default = "default_duration")]
    pub default_duration_secs: u64,
    /// Upper bound on one entry or one renewal extension.
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u64,
    /// Minimum approval ratio for renewal 1, 2, ... The last entry applies to
    /// every later renewal.
    #[serde(default = "default_renewal_thresholds")]
    pub renewal_thresholds: Vec<Threshold>,
    /// Renewals that do not open a post-hoc review task.
    #[serde(default = "default_review_free_renewals")]
    pub review_free_renewals: u32,
}

fn default_duration() -> u64 {
    24 * 3_600
}

fn default_max_duration() -> u64 {
    72 * 3_600
}

fn default_renewal_thresholds() -> Vec<Threshold> {
    vec![
        Threshold {
            numerator: 3,
            denominator: 5,
            strict: false,
        },
        Threshold::two_thirds(),
        Threshold::three_quarters(),
        Threshold {
            numerator: 4,
            denominator: 5,
            strict: false,
        },
    ]
}

fn default_review_free_renewals() -> u32 {
    1
}

impl Default for EmergencyPolicy {
    fn default() -> Self {
        Self {
            default_duration_secs: default_duration(),
            max_duration_secs: default_max_duration(),
            renewal_thresholds: default_renewal_thresholds(),
            review_free_renewals: default_review_free_renewals(),
        }
    }
}

impl EmergencyPolicy {
    /// Scheduled threshold for renewal `index` (1-based).
    pub fn scheduled_threshold(&self, index: u32) -> Threshold {
        let slot = (index.max(1) - 1) as usize;
        self.renewal_thresholds
            .get(slot)
            .or_else(|| self.renewal_thresholds.last())
            .copied()
            .unwrap_or(Threshold::two_thirds())
    }

    /// Requested duration, bounded by the policy.
    pub fn bounded(&self, requested_secs: u64) -> Duration {
        let secs = if requested_secs > self.max_duration_secs {
            self.default_duration_secs.min(self.max_duration_secs)
        } else {
            requested_secs
        };
        Duration::seconds(secs as i64)
    }
}
