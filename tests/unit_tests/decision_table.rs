// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Black-box exercise of the scheduler's decision table (spec.md §4.3, §8)
//! through its public entry point, independent of the scheduler's own
//! queues and timers.

use tunnel_coordinator::{
    cfg::config::SwitchThresholds,
    model::switch::{SwitchAction, SwitchPriority, SwitchReason},
    scheduler::decision::{decide, OperationSnapshot},
};

fn thresholds() -> SwitchThresholds {
    SwitchThresholds { immediate: 90, fast: 70, normal: 50, slow: 30 }
}

fn op(criticality: u8, interruptible: bool, duration_ms: u64) -> OperationSnapshot {
    OperationSnapshot {
        id: Default::default(),
        criticality,
        interruptible,
        started_at_ms: 0,
        estimated_duration_ms: duration_ms,
    }
}

#[test]
fn rule_3_postpones_when_optimal_time_exceeds_max_delay() {
    let ops: Vec<OperationSnapshot> = (0..5).map(|_| op(95, false, 120_000)).collect();
    let d = decide(
        SwitchReason::UserRequest,
        SwitchPriority::Normal,
        60,
        &ops,
        &thresholds(),
        60_000,
        10_000,
        0,
    );
    assert_eq!(d.action, SwitchAction::Postponed);
    assert_eq!(d.delay_ms, 60_000);
}

#[test]
fn rule_5_delays_500ms_when_all_critical_work_is_interruptible() {
    let ops = vec![op(60, true, 10_000), op(65, true, 10_000)];
    let d = decide(SwitchReason::LoadBalance, SwitchPriority::Normal, 40, &ops, &thresholds(), 60_000, 10_000, 0);
    assert_eq!(d.action, SwitchAction::Delayed);
    assert_eq!(d.delay_ms, 500);
}

#[test]
fn no_active_operations_falls_through_to_priority_baseline() {
    let d = decide(SwitchReason::Maintenance, SwitchPriority::High, 10, &[], &thresholds(), 60_000, 10_000, 0);
    assert_eq!(d.action, SwitchAction::Delayed);
    assert_eq!(d.delay_ms, 1000);
}

#[test]
fn criticality_alone_can_clear_the_immediate_threshold() {
    // priority=normal (level 30) but criticality 95 clears thresholds.immediate (90).
    let d = decide(SwitchReason::UserRequest, SwitchPriority::Normal, 95, &[], &thresholds(), 60_000, 10_000, 0);
    assert_eq!(d.action, SwitchAction::Immediate);
    assert_eq!(d.delay_ms, 0);
}

#[test]
fn delay_is_always_clamped_to_configured_max_delay() {
    let ops: Vec<OperationSnapshot> = (0..4).map(|_| op(55, false, 10_000_000)).collect();
    let d = decide(SwitchReason::LoadBalance, SwitchPriority::Low, 10, &ops, &thresholds(), 3_000, 0, 0);
    assert!(d.delay_ms <= 3_000);
}
