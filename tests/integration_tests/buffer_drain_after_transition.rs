// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tunnel_coordinator::{cfg::config::DelayedSwitchConfig, model::buffered_request::BufferPriority};

use super::common::{build_harness, tunnel};

/// Boundary scenario 5 (spec.md §8): requests enqueued while disconnected
/// drain in priority order — critical, normal, low — once the supervisor
/// reconnects. The drain loop is wired up the way an embedding application
/// would: spawned once, listening for the supervisor's `connected` event.
#[tokio::test]
async fn buffer_drains_in_priority_order_after_reconnect() {
    let harness = build_harness(vec![tunnel("a", 0)], DelayedSwitchConfig::default(), 3);
    let cancel = CancellationToken::new();
    let drain_handle = harness.buffer.spawn_drain_loop(cancel.clone());

    // No tunnel attached yet: the facade must route every prioritized
    // request into the buffer rather than executing directly.
    let f1 = harness.facade.clone();
    let low_task = tokio::spawn(async move { f1.get("/low", Some(BufferPriority::Low)).await });
    let f2 = harness.facade.clone();
    let critical_task = tokio::spawn(async move { f2.get("/critical", Some(BufferPriority::Critical)).await });
    let f3 = harness.facade.clone();
    let normal_task = tokio::spawn(async move { f3.get("/normal", Some(BufferPriority::Normal)).await });

    // Let all three land in the buffer before anything can drain.
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert_eq!(harness.buffer.len().await, 3);

    harness.supervisor.connect("a").await.expect("connect");

    let (low_res, critical_res, normal_res) =
        tokio::join!(low_task, critical_task, normal_task);
    assert_eq!(critical_res.expect("task").expect("resolved").body, b"/critical");
    assert_eq!(normal_res.expect("task").expect("resolved").body, b"/normal");
    assert_eq!(low_res.expect("task").expect("resolved").body, b"/low");

    cancel.cancel();
    let _ = drain_handle.await;
}

/// The per-request timeout evicts a buffered request that never gets
/// drained (spec.md §4.4).
#[tokio::test]
async fn buffered_request_times_out_without_a_connection() {
    let harness = build_harness(vec![tunnel("a", 0)], DelayedSwitchConfig::default(), 3);
    let facade = harness.facade.clone();
    let task = tokio::spawn(async move { facade.get("/stuck", Some(BufferPriority::Normal)).await });
    tokio::task::yield_now().await;

    // Buffer default timeout is 30s; advance the mock clock past it.
    harness.clock.advance(Duration::from_secs(31).as_millis() as u64);

    // Give the spawned timeout task a chance to observe the advance.
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert!(task.await.expect("task").is_err());
}
