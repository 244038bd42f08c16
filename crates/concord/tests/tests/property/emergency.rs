//! Property tests: an unrenewed emergency ends exactly at its deadline.

use chrono::Duration;
use concord_emergency::{EmergencyEnd, EmergencyPhase};
use concord_engine::{Effect, GovernanceConfig};
use concord_tests::helpers::{enter, t0, triad_roster, TestEngine};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn emergency_expires_exactly_at_deadline(requested in 1u64..=4 * 86_400) {
        let t = TestEngine::new(triad_roster());
        let policy = GovernanceConfig::default().emergency;
        let execution = t.pass("h-1", enter(requested, vec![]));
        let Effect::EmergencyEntered { epoch, .. } = execution.effect else {
            panic!("expected emergency entry");
        };

        let duration = policy.bounded(requested);
        prop_assert!(duration <= Duration::seconds(policy.max_duration_secs as i64));
        prop_assert_eq!(epoch.deadline, t0() + duration);

        t.clock.set(epoch.deadline - Duration::seconds(1));
        prop_assert_eq!(t.engine.emergency().active_epoch().unwrap(), Some(epoch.epoch));

        t.clock.set(epoch.deadline);
        let summary = t.engine.sweep().unwrap();
        prop_assert_eq!(summary.emergency_expired, Some(epoch.epoch));
        prop_assert_eq!(t.engine.emergency().snapshot().unwrap().phase, EmergencyPhase::Normal);

        let record = t.engine.emergency().epoch(epoch.epoch).unwrap();
        prop_assert_eq!(record.ended_at, Some(epoch.deadline));
        prop_assert_eq!(record.end, Some(EmergencyEnd::Expired));
        prop_assert_eq!(t.engine.enforcement().emergency_epoch(), None);
    }
}
