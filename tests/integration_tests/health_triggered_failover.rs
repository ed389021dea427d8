// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tunnel_coordinator::{cfg::config::DelayedSwitchConfig, collaborators::Verdict, error::DriverError};

use super::common::{build_harness, tunnel};

/// Boundary scenario 6 (spec.md §8), driven end-to-end through the public
/// `start()` + Prober path rather than the supervisor's private recovery
/// method directly: three consecutive unhealthy verdicts against t1 exhaust
/// the reconnect budget, the supervisor delegates a health-failed switch to
/// the scheduler, and the dispatch loop eventually carries it out.
#[tokio::test]
async fn unhealthy_tunnel_eventually_fails_over_to_the_next_best_tunnel() {
    let harness = build_harness(vec![tunnel("t1", 0), tunnel("t2", 1)], DelayedSwitchConfig::default(), 3);
    harness.supervisor.start().await.expect("start connects to t1");
    assert_eq!(harness.supervisor.current().await.expect("current").name, "t1");

    harness.prober.push_verdict(Verdict::Unhealthy("probe failed".to_string()));
    for _ in 0..3 {
        harness.driver.push_attach_result(Err(DriverError::Timeout));
    }

    for _ in 0..80 {
        tokio::task::yield_now().await;
        harness.clock.advance(2_000);
        if harness.supervisor.current().await.map(|t| t.name) == Some("t2".to_string()) {
            break;
        }
    }

    assert_eq!(harness.supervisor.current().await.expect("failed over").name, "t2");
    assert_eq!(harness.supervisor.get_status().await.reconnect_attempts, 3);

    harness.supervisor.stop().await;
}
