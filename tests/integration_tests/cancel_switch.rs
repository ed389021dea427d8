// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tunnel_coordinator::{
    cfg::config::DelayedSwitchConfig,
    model::{SwitchPriority, SwitchReason},
};

use super::common::{build_harness, tunnel};

/// Boundary properties (spec.md §8): `CancelSwitch` on a pending cancellable
/// request removes it and returns `true`; on an unknown or already-handled
/// id it returns `false`.
#[tokio::test]
async fn cancel_switch_removes_a_pending_request_exactly_once() {
    let harness = build_harness(vec![tunnel("t1", 0), tunnel("t2", 1)], DelayedSwitchConfig::default(), 3);
    let target = harness.supervisor.registry().get("t2").await.expect("t2 exists");

    let id = harness
        .scheduler
        .request_switch(target, SwitchReason::Optimization, SwitchPriority::Low, 30)
        .expect("scheduler enabled");

    assert!(harness.scheduler.cancel_switch(id));
    assert!(!harness.scheduler.cancel_switch(id), "cancelling the same id twice must return false");
}

#[tokio::test]
async fn cancel_switch_on_an_unknown_id_returns_false() {
    let harness = build_harness(vec![tunnel("t1", 0)], DelayedSwitchConfig::default(), 3);
    let bogus = tunnel_coordinator::model::switch::SwitchId::new();
    assert!(!harness.scheduler.cancel_switch(bogus));
}

/// `requestSwitch(...)` returning `immediate` followed by a successful
/// driver attach is observationally equivalent to a direct `switchTo`
/// (spec.md §8's round-trip property).
#[tokio::test]
async fn immediate_decision_followed_by_dispatch_matches_a_direct_switch() {
    let harness = build_harness(vec![tunnel("t1", 0), tunnel("t2", 1)], DelayedSwitchConfig::default(), 3);
    harness.supervisor.start().await.expect("start");

    let target = harness.supervisor.registry().get("t2").await.expect("t2 exists");
    harness
        .scheduler
        .request_switch(target, SwitchReason::Emergency, SwitchPriority::Emergency, 95)
        .expect("scheduler enabled");

    for _ in 0..20 {
        tokio::task::yield_now().await;
        if harness.supervisor.current().await.map(|t| t.name) == Some("t2".to_string()) {
            break;
        }
    }
    assert_eq!(harness.supervisor.current().await.expect("current").name, "t2");

    harness.supervisor.stop().await;
}
