//! Property tests: the sanctions ladder only climbs while violations keep
//! arriving, and steps down exactly one level per clean period.

use concord_enforcement::{LadderPolicy, Violation};
use concord_tests::helpers::{agent, standard_roster, TestEngine};
use concord_types::{SanctionLevel, ViolationSeverity};
use proptest::prelude::*;

fn arb_severity() -> impl Strategy<Value = ViolationSeverity> {
    prop_oneof![
        Just(ViolationSeverity::Low),
        Just(ViolationSeverity::Moderate),
        Just(ViolationSeverity::High),
        Just(ViolationSeverity::Critical),
    ]
}

/// Gaps stay inside the rolling window so every report is a repeat.
fn arb_violations() -> impl Strategy<Value = Vec<(i64, ViolationSeverity)>> {
    let window = LadderPolicy::default().rolling_window_secs as i64;
    prop::collection::vec((0..window, arb_severity()), 1..10)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn repeat_violations_never_lower_the_level(violations in arb_violations()) {
        let t = TestEngine::new(standard_roster());
        t.bootstrap_agent();

        let mut previous: Option<SanctionLevel> = None;
        for (gap, severity) in violations {
            t.clock.advance_secs(gap);
            let snapshot = t
                .engine
                .report_violation(&agent(), &Violation::new("egress", severity, "blocked host"))
                .unwrap();
            let level = snapshot.sanction.map(|s| s.level);
            prop_assert!(level.is_some());
            prop_assert!(level >= previous, "{:?} fell below {:?}", level, previous);
            previous = level;
        }
    }

    #[test]
    fn one_clean_period_steps_down_once(violations in arb_violations()) {
        let t = TestEngine::new(standard_roster());
        t.bootstrap_agent();

        let mut last = None;
        for (gap, severity) in violations {
            t.clock.advance_secs(gap);
            last = t
                .engine
                .report_violation(&agent(), &Violation::new("egress", severity, "blocked host"))
                .unwrap()
                .sanction
                .map(|s| s.level);
        }
        let last = last.unwrap();

        let period = t.engine.config().enforcement.ladder.clean_period_secs as i64;
        t.clock.advance_secs(period - 1);
        let before = t.engine.get_current_scope_state(&agent()).unwrap();
        prop_assert_eq!(before.sanction.map(|s| s.level), Some(last));

        t.clock.advance_secs(1);
        let after = t.engine.get_current_scope_state(&agent()).unwrap();
        let expected = if last.is_terminal() { Some(last) } else { last.deescalate() };
        prop_assert_eq!(after.sanction.map(|s| s.level), expected);
    }
}
