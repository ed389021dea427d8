// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tunnel_coordinator::{
    cfg::config::{DelayedSwitchConfig, SwitchThresholds},
    model::{
        operation::{ActiveOperation, OperationKind},
        switch::{SwitchPriority, SwitchReason},
    },
};

use super::common::{build_harness, tunnel};

fn thresholds() -> DelayedSwitchConfig {
    DelayedSwitchConfig {
        thresholds: SwitchThresholds { immediate: 90, fast: 70, normal: 50, slow: 30 },
        max_delay: std::time::Duration::from_secs(60),
        grace_period: std::time::Duration::from_secs(10),
        enabled: true,
    }
}

/// Boundary scenario 1 (spec.md §8): an emergency switch request fires
/// immediately and interrupts non-interruptible critical work, dispatching
/// straight to the supervisor without ever sitting in the pending queue.
#[tokio::test]
async fn emergency_request_dispatches_immediately_and_switches() {
    let harness = build_harness(vec![tunnel("t1", 0), tunnel("t2", 1)], thresholds(), 3);
    harness.supervisor.start().await.expect("start");
    assert_eq!(harness.supervisor.current().await.expect("current").name, "t1");

    let op = ActiveOperation::new(OperationKind::FileTransfer, 95, 0, 10_000, false);
    harness.scheduler.register_operation(op);

    let target = harness.supervisor.registry().get("t2").await.expect("t2 exists");
    let id = harness
        .scheduler
        .request_switch(target, SwitchReason::Emergency, SwitchPriority::Emergency, 95)
        .expect("scheduler enabled");

    // An immediate decision is dispatched straight away, so it can no
    // longer be cancelled (spec.md §8).
    assert!(!harness.scheduler.cancel_switch(id));

    // Give the supervisor's dispatch loop a chance to drive the switch.
    for _ in 0..20 {
        tokio::task::yield_now().await;
        if harness.supervisor.current().await.map(|t| t.name) == Some("t2".to_string()) {
            break;
        }
    }
    assert_eq!(harness.supervisor.current().await.expect("current").name, "t2");

    harness.supervisor.stop().await;
}
