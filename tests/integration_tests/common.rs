// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::json;
use tunnel_coordinator::{
    buffer::RequestBuffer,
    cfg::config::{BufferConfig, DelayedSwitchConfig},
    collaborators::Clock,
    error::FacadeError,
    events::EventBus,
    facade::{HttpFacade, HttpResponse, PendingRequest, RequestExecutor},
    model::tunnel::{TunnelDescriptor, TunnelKind},
    registry::TunnelRegistry,
    scheduler::DeferredSwitchScheduler,
    supervisor::TunnelSupervisor,
    testkit::{MockClock, MockProber, MockTunnelDriver},
};

pub fn tunnel(name: &str, priority: u32) -> TunnelDescriptor {
    TunnelDescriptor::new(name, priority, TunnelKind::OpenStyle, json!({}))
}

/// An executor that always succeeds, echoing the request path back as the
/// response body — enough for the buffer/facade tests to assert ordering
/// and drain behavior without a real transport.
pub struct EchoExecutor;

#[async_trait]
impl RequestExecutor for EchoExecutor {
    async fn execute(&self, _base_url: &str, req: &PendingRequest) -> Result<HttpResponse, FacadeError> {
        Ok(HttpResponse { status: 200, headers: Vec::new(), body: req.path.clone().into_bytes() })
    }
}

/// Bundles every component the coordination core wires together, built
/// against in-memory mock collaborators, for full-stack boundary-scenario
/// tests (spec.md §8).
pub struct Harness {
    pub supervisor: Arc<TunnelSupervisor>,
    pub scheduler: Arc<DeferredSwitchScheduler>,
    pub buffer: Arc<RequestBuffer>,
    pub facade: Arc<HttpFacade>,
    pub driver: Arc<MockTunnelDriver>,
    pub prober: Arc<MockProber>,
    pub clock: Arc<MockClock>,
}

pub fn build_harness(
    tunnels: Vec<TunnelDescriptor>,
    delayed_switch: DelayedSwitchConfig,
    max_reconnect_attempts: u32,
) -> Harness {
    let registry = Arc::new(TunnelRegistry::new(tunnels).expect("unique tunnel names"));
    let driver = Arc::new(MockTunnelDriver::new());
    let prober = Arc::new(MockProber::new());
    let clock = Arc::new(MockClock::new(0));
    let events = EventBus::new();

    let (scheduler, dispatch_rx) = DeferredSwitchScheduler::new(&delayed_switch, clock.clone(), events.clone());

    let supervisor = TunnelSupervisor::new(
        registry,
        driver.clone(),
        prober.clone(),
        clock.clone(),
        events.clone(),
        Some((scheduler.clone(), dispatch_rx)),
        max_reconnect_attempts,
        Duration::from_millis(10),
    );

    let executor = Arc::new(EchoExecutor);
    let buffer = RequestBuffer::new(
        BufferConfig::default(),
        executor.clone(),
        events,
        clock.clone(),
        "http://tunnel.local",
    );
    let facade = Arc::new(HttpFacade::new(
        supervisor.clone(),
        buffer.clone(),
        executor,
        clock.clone(),
        10,
        "http://tunnel.local",
    ));

    Harness { supervisor, scheduler, buffer, facade, driver, prober, clock }
}
