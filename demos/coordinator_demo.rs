// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Runnable walkthrough of the coordination core, wired against in-memory
//! mock collaborators rather than a real tunneling stack. Mirrors the
//! teacher's `main.rs`: init logging, load configuration, drive the client
//! through a representative scenario.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tunnel_coordinator::{
    buffer::RequestBuffer,
    cfg::{
        config::{Config, LoggingConfig},
        logger::init_logger,
    },
    collaborators::Verdict,
    facade::{HttpFacade, ReqwestExecutor},
    model::{
        buffered_request::BufferPriority,
        switch::{SwitchPriority, SwitchReason},
        tunnel::{TunnelDescriptor, TunnelKind},
    },
    registry::TunnelRegistry,
    scheduler::DeferredSwitchScheduler,
    supervisor::TunnelSupervisor,
    testkit::{MockClock, MockProber, MockTunnelDriver},
};

fn demo_config() -> Config {
    let mut cfg = Config {
        max_reconnect_attempts: 3,
        health_check_interval: Duration::from_millis(200),
        health_check_timeout: Duration::from_millis(50),
        request_concurrency: 5,
        buffer: Default::default(),
        delayed_switch: Default::default(),
        tunnels: vec![
            TunnelDescriptor::new("office-vpn", 0, TunnelKind::OpenStyle, json!({"endpoint": "vpn1.local"})),
            TunnelDescriptor::new("backup-vpn", 1, TunnelKind::KeyPairStyle, json!({"endpoint": "vpn2.local"})),
        ],
        logging: LoggingConfig::default(),
    };
    cfg.validate_and_normalize().expect("demo config is well-formed");
    cfg
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = demo_config();
    let _logger_guard = init_logger(&cfg.logging).context("failed to init logger")?;

    let registry = Arc::new(TunnelRegistry::new(cfg.tunnels.clone()).context("duplicate tunnel names in config")?);
    let driver = Arc::new(MockTunnelDriver::new());
    let prober = Arc::new(MockProber::new());
    let clock = Arc::new(MockClock::new(0));
    let events = tunnel_coordinator::events::EventBus::new();
    let mut event_rx = events.subscribe();

    let (scheduler, dispatch_rx) = DeferredSwitchScheduler::new(&cfg.delayed_switch, clock.clone(), events.clone());
    let supervisor = TunnelSupervisor::new(
        registry,
        driver,
        prober.clone(),
        clock.clone(),
        events.clone(),
        Some((scheduler.clone(), dispatch_rx)),
        cfg.max_reconnect_attempts,
        cfg.health_check_interval,
    );

    let executor = Arc::new(ReqwestExecutor::new());
    let buffer = RequestBuffer::new(cfg.buffer.clone(), executor.clone(), events.clone(), clock.clone(), "https://office-vpn.local");
    let facade = Arc::new(HttpFacade::new(
        supervisor.clone(),
        buffer.clone(),
        executor,
        clock.clone(),
        cfg.request_concurrency,
        "https://office-vpn.local",
    ));

    let logger = tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            info!(?event, "coordination event");
        }
    });

    supervisor.start().await.context("supervisor failed to start")?;
    info!(tunnel = %supervisor.current().await.expect("connected").name, "attached to primary tunnel");

    let drain_cancel = CancellationToken::new();
    let drain_handle = buffer.spawn_drain_loop(drain_cancel.clone());

    // A normal request the facade can satisfy directly while attached.
    match facade.get("/status", Some(BufferPriority::Normal)).await {
        Ok(resp) => info!(status = resp.status, "direct request served"),
        Err(e) => info!(error = %e, "direct request failed (no real backend behind the mock tunnel)"),
    }

    // A deferred switch over to the backup tunnel: queued behind the current
    // reconnect-window grace period rather than interrupting anything.
    let target = supervisor.registry().get("backup-vpn").await.expect("backup-vpn is configured");
    let switch_id = scheduler
        .request_switch(target, SwitchReason::Optimization, SwitchPriority::Low, 10)
        .context("scheduler is disabled")?;
    info!(%switch_id, "requested a low-priority switch to the backup tunnel");

    // Simulate the prober flagging the primary tunnel unhealthy, which pushes
    // the supervisor through its reconnect-then-delegate path.
    prober.push_verdict(Verdict::Unhealthy("simulated probe failure".to_string()));
    for _ in 0..10 {
        tokio::task::yield_now().await;
        clock.advance(500);
    }

    info!(status = ?supervisor.get_status().await, "final supervisor status");

    drain_cancel.cancel();
    let _ = drain_handle.await;
    supervisor.stop().await;
    logger.abort();

    Ok(())
}
