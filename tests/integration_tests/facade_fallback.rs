// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tunnel_coordinator::{cfg::config::DelayedSwitchConfig, error::DriverError, facade::PendingRequest};

use super::common::{build_harness, tunnel};

/// The façade's fallback method tries up to three tunnels, serialized under
/// its own mutex, and succeeds once one of them both attaches and executes
/// the request (spec.md §4.5).
#[tokio::test]
async fn fallback_switches_tunnels_until_one_succeeds() {
    let harness = build_harness(
        vec![tunnel("t1", 0), tunnel("t2", 1), tunnel("t3", 2)],
        DelayedSwitchConfig::default(),
        3,
    );
    harness.supervisor.connect("t1").await.expect("connect t1");

    // t1 (priority 0, tried first) fails to re-attach during the fallback's
    // internal switch_to; t2 succeeds.
    harness.driver.push_attach_result(Err(DriverError::Transport("down".to_string())));

    let resp = harness
        .facade
        .fallback(PendingRequest::new(tunnel_coordinator::facade::HttpMethod::Get, "/status"))
        .await
        .expect("one of the three tunnels should succeed");
    assert_eq!(resp.status, 200);
    assert_eq!(harness.supervisor.current().await.expect("current").name, "t2");
}
