// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tunnel_coordinator::cfg::config::DelayedSwitchConfig;

use super::common::{build_harness, tunnel};

/// `start -> stop -> start` returns to a valid connected state with the
/// reconnect counter reset (spec.md §8's round-trip property).
#[tokio::test]
async fn start_stop_start_resets_reconnect_counter_and_reconnects() {
    let harness = build_harness(vec![tunnel("a", 0), tunnel("b", 1)], DelayedSwitchConfig::default(), 3);

    harness.supervisor.start().await.expect("start connects to best");
    assert!(harness.supervisor.is_running());
    assert_eq!(harness.supervisor.current().await.expect("connected").name, "a");

    harness.supervisor.stop().await;
    assert!(!harness.supervisor.is_running());
    assert!(harness.supervisor.current().await.is_none());

    harness.supervisor.start().await.expect("second start reconnects");
    assert!(harness.supervisor.is_running());
    assert_eq!(harness.supervisor.get_status().await.reconnect_attempts, 0);

    harness.supervisor.stop().await;
}

/// A second `start` on an already-running supervisor is a no-op (spec.md
/// §4.2).
#[tokio::test]
async fn double_start_is_idempotent() {
    let harness = build_harness(vec![tunnel("a", 0)], DelayedSwitchConfig::default(), 3);
    harness.supervisor.start().await.expect("first start");
    let attach_calls_after_first = harness.driver.attach_call_count();

    harness.supervisor.start().await.expect("second start is a no-op");
    assert_eq!(harness.driver.attach_call_count(), attach_calls_after_first);

    harness.supervisor.stop().await;
}
