// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Tunnel Registry + Tunnel Supervisor (spec.md §4.2): owns the active-tunnel
//! pointer and serializes every transition behind a single lock order —
//! `transitionLock → connectionPermit → registryWriteLock` — so the
//! observable `active` flag never drifts from the driver's real state.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex as StdMutex,
    },
    time::Duration,
};

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    collaborators::{Clock, Prober, TunnelDriver, Verdict},
    error::{ConfigError, CoreError, SchedulerError},
    events::{Event, EventBus},
    model::{
        operation::{ActiveOperation, OperationId},
        switch::{SwitchId, SwitchPriority, SwitchReason, SwitchRequest},
        tunnel::{TunnelDescriptor, TunnelName},
    },
    registry::TunnelRegistry,
    scheduler::DeferredSwitchScheduler,
    sync::{Mutex, Semaphore},
};

/// Criticality assigned to the delegated switch a health-recovery loop issues
/// once its reconnect budget is exhausted (spec.md §4.2).
const HEALTH_FAILOVER_CRITICALITY: i32 = 80;
const MAX_BACKOFF_MS: u64 = 30_000;

fn backoff_delay_ms(attempt: u32) -> u64 {
    let shift = attempt.min(5);
    (1_000u64.saturating_mul(1u64 << shift)).min(MAX_BACKOFF_MS)
}

/// A point-in-time view of the Supervisor's lifecycle state, for `getStatus`.
#[derive(Debug, Clone)]
pub struct SupervisorStatus {
    pub current: Option<TunnelName>,
    pub transitioning: bool,
    pub running: bool,
    pub reconnect_attempts: u32,
}

pub struct TunnelSupervisor {
    registry: Arc<TunnelRegistry>,
    driver: Arc<dyn TunnelDriver>,
    prober: Arc<dyn Prober>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    scheduler: Option<Arc<DeferredSwitchScheduler>>,
    dispatch_rx: StdMutex<Option<mpsc::UnboundedReceiver<SwitchRequest>>>,
    transition_lock: Mutex<()>,
    connection_permit: Semaphore,
    reconnect_counter: AtomicU32,
    max_reconnect_attempts: u32,
    health_check_interval: Duration,
    transitioning: AtomicBool,
    running: AtomicBool,
    lifecycle: StdMutex<Option<(CancellationToken, Vec<JoinHandle<()>>)>>,
}

impl TunnelSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<TunnelRegistry>,
        driver: Arc<dyn TunnelDriver>,
        prober: Arc<dyn Prober>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        scheduler: Option<(Arc<DeferredSwitchScheduler>, mpsc::UnboundedReceiver<SwitchRequest>)>,
        max_reconnect_attempts: u32,
        health_check_interval: Duration,
    ) -> Arc<Self> {
        let (scheduler, dispatch_rx) = match scheduler {
            Some((s, rx)) => (Some(s), Some(rx)),
            None => (None, None),
        };
        Arc::new(Self {
            registry,
            driver,
            prober,
            clock,
            events,
            scheduler,
            dispatch_rx: StdMutex::new(dispatch_rx),
            transition_lock: Mutex::new(()),
            connection_permit: Semaphore::new(1),
            reconnect_counter: AtomicU32::new(0),
            max_reconnect_attempts,
            health_check_interval,
            transitioning: AtomicBool::new(false),
            running: AtomicBool::new(false),
            lifecycle: StdMutex::new(None),
        })
    }

    pub fn registry(&self) -> &Arc<TunnelRegistry> {
        &self.registry
    }

    pub fn is_transitioning(&self) -> bool {
        self.transitioning.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn current(&self) -> Option<TunnelDescriptor> {
        self.registry.current().await
    }

    pub async fn get_status(&self) -> SupervisorStatus {
        SupervisorStatus {
            current: self.registry.current().await.map(|t| t.name),
            transitioning: self.is_transitioning(),
            running: self.is_running(),
            reconnect_attempts: self.reconnect_counter.load(Ordering::SeqCst),
        }
    }

    // -- transition protocol, lock-free internals ---------------------------

    async fn do_connect(&self, name: &str) -> Result<(), CoreError> {
        let descriptor = self
            .registry
            .get(name)
            .await
            .ok_or_else(|| ConfigError::UnknownTunnel(name.to_string()))?;
        self.connection_permit
            .run_with_permit(|| async { self.driver.attach(&descriptor).await })
            .await
            .map_err(CoreError::Driver)?;
        self.registry.set_active(name).await;
        self.reconnect_counter.store(0, Ordering::SeqCst);
        self.events.publish(Event::Connected(descriptor));
        Ok(())
    }

    async fn do_disconnect(&self) -> Result<(), CoreError> {
        let current = match self.registry.current().await {
            Some(c) => c,
            None => return Ok(()),
        };
        let result = self
            .connection_permit
            .run_with_permit(|| async { self.driver.detach(&current).await })
            .await;
        // The observable `active` flag must never survive a detach failure.
        self.registry.clear_active().await;
        self.events.publish(Event::Disconnected(current));
        result.map_err(CoreError::Driver)
    }

    async fn do_switch_to(&self, name: &str) -> Result<(), CoreError> {
        if self.registry.current().await.is_some() {
            self.do_disconnect().await?;
        }
        self.do_connect(name).await
    }

    async fn do_connect_to_best(&self) -> Result<(), CoreError> {
        let snapshot = self.registry.snapshot_by_priority().await;
        if snapshot.is_empty() {
            return Err(CoreError::Config(ConfigError::EmptyRegistry));
        }
        let mut last_err = String::new();
        for t in &snapshot {
            match self.do_connect(&t.name).await {
                Ok(()) => return Ok(()),
                Err(e) => last_err = e.to_string(),
            }
        }
        Err(CoreError::AllTunnelsFailed { attempted: snapshot.len(), last: last_err })
    }

    async fn best_other_tunnel(&self, exclude: &str) -> Option<TunnelDescriptor> {
        self.registry
            .snapshot_by_priority()
            .await
            .into_iter()
            .find(|t| t.name != exclude)
    }

    // -- public transition operations: each owns the transition lock --------

    pub async fn connect(&self, name: &str) -> Result<(), CoreError> {
        self.transition_lock
            .run_with_lock(|_| async {
                self.transitioning.store(true, Ordering::SeqCst);
                let result = self.do_connect(name).await;
                self.transitioning.store(false, Ordering::SeqCst);
                result
            })
            .await
    }

    pub async fn disconnect(&self) -> Result<(), CoreError> {
        self.transition_lock
            .run_with_lock(|_| async {
                self.transitioning.store(true, Ordering::SeqCst);
                let result = self.do_disconnect().await;
                self.transitioning.store(false, Ordering::SeqCst);
                result
            })
            .await
    }

    pub async fn switch_to(&self, name: &str) -> Result<(), CoreError> {
        let descriptor = self
            .registry
            .get(name)
            .await
            .ok_or_else(|| ConfigError::UnknownTunnel(name.to_string()))?;
        self.transition_lock
            .run_with_lock(|_| async {
                self.transitioning.store(true, Ordering::SeqCst);
                let result = self.do_switch_to(name).await;
                self.transitioning.store(false, Ordering::SeqCst);
                result
            })
            .await?;
        self.events.publish(Event::Switched(descriptor));
        Ok(())
    }

    pub async fn connect_to_best(&self) -> Result<(), CoreError> {
        self.transition_lock
            .run_with_lock(|_| async {
                self.transitioning.store(true, Ordering::SeqCst);
                let result = self.do_connect_to_best().await;
                self.transitioning.store(false, Ordering::SeqCst);
                result
            })
            .await
    }

    // -- health reaction ------------------------------------------------

    async fn handle_unhealthy(&self, t: TunnelDescriptor) {
        self.transition_lock
            .run_with_lock(|_| async {
                self.transitioning.store(true, Ordering::SeqCst);
                self.handle_unhealthy_locked(t).await;
                self.transitioning.store(false, Ordering::SeqCst);
            })
            .await;
    }

    async fn handle_unhealthy_locked(&self, t: TunnelDescriptor) {
        let still_current = self.registry.current().await.map(|c| c.name) == Some(t.name.clone());
        if !still_current || !self.is_running() {
            return;
        }

        let mut recovered = false;
        let mut attempt = 0;
        while attempt < self.max_reconnect_attempts {
            attempt += 1;
            self.reconnect_counter.store(attempt, Ordering::SeqCst);
            let _ = self.do_disconnect().await;
            self.clock.sleep(Duration::from_millis(backoff_delay_ms(attempt))).await;
            if self.do_connect(&t.name).await.is_ok() {
                recovered = true;
                break;
            }
        }
        if recovered {
            return;
        }

        tracing::warn!(tunnel = %t.name, attempts = attempt, "reconnect budget exhausted, delegating failover");
        match &self.scheduler {
            Some(scheduler) => {
                if let Some(target) = self.best_other_tunnel(&t.name).await {
                    let _ = scheduler.request_switch(
                        target,
                        SwitchReason::HealthFailed,
                        SwitchPriority::High,
                        HEALTH_FAILOVER_CRITICALITY,
                    );
                }
            },
            None => {
                let _ = self.do_connect_to_best().await;
            },
        }
    }

    // -- deferred-switch façade, delegated to the Scheduler ------------------

    pub fn request_delayed(
        &self,
        target: TunnelDescriptor,
        reason: SwitchReason,
        priority: SwitchPriority,
        criticality: i32,
    ) -> Result<SwitchId, CoreError> {
        self.scheduler
            .as_ref()
            .ok_or(CoreError::Scheduler(SchedulerError::Disabled))?
            .request_switch(target, reason, priority, criticality)
            .map_err(CoreError::Scheduler)
    }

    pub fn cancel_delayed(&self, id: SwitchId) -> bool {
        self.scheduler.as_ref().is_some_and(|s| s.cancel_switch(id))
    }

    pub fn register_operation(&self, op: ActiveOperation) -> Option<OperationId> {
        self.scheduler.as_ref().map(|s| s.register_operation(op))
    }

    pub fn complete_operation(&self, id: OperationId) {
        if let Some(s) = &self.scheduler {
            s.complete_operation(id);
        }
    }

    pub fn interrupt_operation(&self, id: OperationId) -> bool {
        self.scheduler.as_ref().is_some_and(|s| s.interrupt_operation(id))
    }

    // -- lifecycle ------------------------------------------------------

    /// Idempotent: a second `start` on an already-running supervisor is a
    /// no-op (spec.md §4.2).
    pub async fn start(self: &Arc<Self>) -> Result<(), CoreError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.connect_to_best().await {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let cancel = CancellationToken::new();
        let mut handles = vec![self.clone().spawn_health_loop(cancel.clone())];
        if let Some(scheduler) = &self.scheduler {
            handles.push(scheduler.spawn_tick_loop(cancel.clone()));
            if let Some(rx) = self.dispatch_rx.lock().expect("dispatch_rx mutex poisoned").take() {
                handles.push(self.clone().spawn_dispatch_loop(rx, cancel.clone()));
            }
        }
        *self.lifecycle.lock().expect("lifecycle mutex poisoned") = Some((cancel, handles));
        self.events.publish(Event::Started);
        Ok(())
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some((cancel, handles)) = self.lifecycle.lock().expect("lifecycle mutex poisoned").take() {
            cancel.cancel();
            for h in handles {
                h.abort();
            }
        }
        let _ = self.disconnect().await;
        self.events.publish(Event::Stopped);
    }

    fn spawn_health_loop(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.clock.sleep(self.health_check_interval) => {
                        if let Some(current) = self.registry.current().await {
                            if let Verdict::Unhealthy(reason) = self.prober.verdict(&current).await {
                                tracing::debug!(tunnel = %current.name, %reason, "prober reported unhealthy tunnel");
                                self.handle_unhealthy(current).await;
                            }
                        }
                    }
                }
            }
        })
    }

    fn spawn_dispatch_loop(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<SwitchRequest>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    maybe_req = rx.recv() => {
                        match maybe_req {
                            Some(req) => {
                                if let Err(e) = self.switch_to(&req.target.name).await {
                                    if let Some(scheduler) = &self.scheduler {
                                        scheduler.report_switch_failed(req.id, e);
                                    }
                                }
                            },
                            None => break,
                        }
                    }
                }
            }
        })
    }
}
