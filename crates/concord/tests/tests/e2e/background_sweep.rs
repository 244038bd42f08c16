//! The background sweeper drives deadlines without any caller involvement.

use std::time::Duration;

use concord_decision::DecisionPayload;
use concord_emergency::EmergencyPhase;
use concord_engine::{spawn_sweeper, Effect};
use concord_tests::helpers::{egress_change, enter, triad_roster, TestEngine};
use concord_types::{DecisionState, DecisionType};

async fn eventually(what: &str, mut done: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

#[tokio::test]
async fn test_sweeper_closes_expired_emergency() {
    let t = TestEngine::new(triad_roster());
    t.bootstrap_agent();
    let execution = t.pass(
        "h-1",
        enter(600, vec![egress_change(&["api.approved-service.com"])]),
    );
    let Effect::EmergencyEntered { epoch, .. } = execution.effect else {
        panic!("expected emergency entry");
    };

    let handle = spawn_sweeper(t.engine.clone(), Duration::from_millis(10));
    t.clock.set(epoch.deadline);
    eventually("the emergency gate to close", || {
        t.engine.enforcement().emergency_epoch().is_none()
    })
    .await;
    handle.abort();

    assert_eq!(
        t.engine.emergency().snapshot().unwrap().phase,
        EmergencyPhase::Normal
    );
}

#[tokio::test]
async fn test_sweeper_expires_stale_approvals() {
    let t = TestEngine::new(triad_roster());
    t.bootstrap_agent();
    let id = t.propose(
        "h-1",
        DecisionPayload::CapabilityRestriction(egress_change(&["api.approved-service.com"])),
    );
    t.approve_all(&id);
    assert!(t.engine.finalize(&id).unwrap().approved());

    let handle = spawn_sweeper(t.engine.clone(), Duration::from_millis(10));
    let window = t
        .engine
        .config()
        .decision
        .policy(DecisionType::D2)
        .map(|p| p.execution_window_secs as i64)
        .unwrap();
    t.clock.advance_secs(window + 1);
    eventually("the approval to expire", || {
        t.engine.decision_state(&id).ok() == Some(DecisionState::Expired)
    })
    .await;
    handle.abort();
}
