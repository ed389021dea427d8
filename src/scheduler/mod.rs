// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Deferred Switch Scheduler (spec.md §4.3): a pending-switch list and an
//! active-operations map, each behind its own lock, plus a periodic tick
//! that promotes ready switches and a re-evaluation pass run whenever an
//! operation completes or is interrupted.

pub mod decision;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    cfg::config::DelayedSwitchConfig,
    collaborators::Clock,
    error::SchedulerError,
    events::{Event, EventBus},
    model::{
        operation::{ActiveOperation, OperationId},
        switch::{SwitchAction, SwitchId, SwitchPriority, SwitchReason, SwitchRequest},
        tunnel::TunnelDescriptor,
    },
    scheduler::decision::{decide, OperationSnapshot},
};

/// Runs a caller-supplied `onComplete`/`onInterrupt` callback, catching any
/// panic it raises so it cannot abort the scheduler tick that triggered it
/// (spec.md §9: "exceptions raised in them must be caught by the Scheduler
/// and logged").
fn run_callback_catching_panics(id: OperationId, which: &str, f: Box<dyn FnOnce() + Send>) {
    if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        let message = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("<non-string panic payload>");
        tracing::error!(operation = %id, callback = which, panic = message, "operation lifecycle callback panicked");
    }
}

/// Fixed tick period (spec.md §4.3: "1 s is the reference").
const TICK_INTERVAL_MS: u64 = 1000;
/// "Ready" margin so a switch due within the next tick is promoted early
/// rather than waiting a full extra period (spec.md §4.3, §9).
const TICK_READY_MARGIN_MS: u64 = 100;

/// Decides when each [`SwitchRequest`] fires, and tracks the
/// [`ActiveOperation`]s a decision must weigh against.
///
/// The two collections below are guarded by plain blocking mutexes rather
/// than the crate's async [`crate::sync::Mutex`]: every mutation here is
/// O(1) and never suspends, so there is nothing for an async lock to buy —
/// this is the "operationsMutex" redesign spec.md §9 calls for. Lock order
/// when both are needed: `pending` before `active_ops`.
pub struct DeferredSwitchScheduler {
    pending: StdMutex<Vec<SwitchRequest>>,
    active_ops: StdMutex<HashMap<OperationId, ActiveOperation>>,
    thresholds: crate::cfg::config::SwitchThresholds,
    max_delay_ms: u64,
    grace_period_ms: u64,
    enabled: bool,
    clock: Arc<dyn Clock>,
    events: EventBus,
    dispatch_tx: mpsc::UnboundedSender<SwitchRequest>,
}

impl DeferredSwitchScheduler {
    /// Builds a scheduler and the receiver of promoted switches — the
    /// supervisor drains this channel and turns each promotion into a
    /// `switchTo` call.
    pub fn new(
        config: &DelayedSwitchConfig,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SwitchRequest>) {
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let scheduler = Arc::new(Self {
            pending: StdMutex::new(Vec::new()),
            active_ops: StdMutex::new(HashMap::new()),
            thresholds: config.thresholds,
            max_delay_ms: config.max_delay.as_millis() as u64,
            grace_period_ms: config.grace_period.as_millis() as u64,
            enabled: config.enabled,
            clock,
            events,
            dispatch_tx,
        });
        (scheduler, dispatch_rx)
    }

    /// Spawns the tick loop. The returned handle is aborted (or exits on
    /// its own once `cancel` fires) when the supervisor stops.
    pub fn spawn_tick_loop(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = scheduler.clock.sleep(Duration::from_millis(TICK_INTERVAL_MS)) => {
                        scheduler.tick();
                    }
                }
            }
        })
    }

    fn snapshot_active(&self) -> Vec<OperationSnapshot> {
        self.active_ops
            .lock()
            .expect("scheduler active-operations mutex poisoned")
            .values()
            .map(|op| OperationSnapshot {
                id: op.id,
                criticality: op.criticality,
                interruptible: op.interruptible,
                started_at_ms: op.started_at_ms,
                estimated_duration_ms: op.estimated_duration_ms,
            })
            .collect()
    }

    /// `RequestSwitch` (spec.md §4.3).
    pub fn request_switch(
        &self,
        target: TunnelDescriptor,
        reason: SwitchReason,
        priority: SwitchPriority,
        criticality: i32,
    ) -> Result<SwitchId, SchedulerError> {
        if !self.enabled {
            return Err(SchedulerError::Disabled);
        }

        let now = self.clock.now_ms();
        let mut req = SwitchRequest::new(target, reason, priority, criticality, now);
        let active = self.snapshot_active();
        let decision = decide(
            reason,
            priority,
            req.criticality,
            &active,
            &self.thresholds,
            self.max_delay_ms,
            self.grace_period_ms,
            now,
        );

        match decision.action {
            SwitchAction::Immediate => {
                req.cancellable = false;
                let id = req.id;
                self.dispatch(req);
                self.events.publish(Event::DelayedSwitchDispatched(id));
                Ok(id)
            },
            SwitchAction::Delayed | SwitchAction::Postponed => {
                req.scheduled_at_ms = decision.scheduled_at_ms.unwrap_or(now);
                req.cancellable = true;
                let id = req.id;
                self.pending
                    .lock()
                    .expect("scheduler pending-switch mutex poisoned")
                    .push(req);
                self.events.publish(Event::DelayedSwitchScheduled(id));
                Ok(id)
            },
            SwitchAction::Cancelled => {
                let id = req.id;
                self.events
                    .publish(Event::DelayedSwitchCancelled(id, decision.reason.clone()));
                Err(SchedulerError::Cancelled(id))
            },
        }
    }

    fn dispatch(&self, req: SwitchRequest) {
        // A closed receiver means the supervisor has already shut down;
        // there is nothing left to deliver the promotion to.
        let _ = self.dispatch_tx.send(req);
    }

    /// `CancelSwitch` (spec.md §4.3). Returns `false` for a dispatched or
    /// unknown id, `true` and removes the entry for a pending cancellable
    /// one.
    pub fn cancel_switch(&self, id: SwitchId) -> bool {
        let mut pending = self.pending.lock().expect("scheduler pending-switch mutex poisoned");
        if let Some(pos) = pending.iter().position(|r| r.id == id && r.cancellable) {
            pending.remove(pos);
            drop(pending);
            self.events
                .publish(Event::DelayedSwitchCancelled(id, "user_requested".to_string()));
            true
        } else {
            false
        }
    }

    /// `RegisterOperation` (spec.md §4.3): arms an auto-completion timer at
    /// the absolute deadline `startedAt + estimatedDuration` when a duration
    /// is known, otherwise completes on the next scheduling tick of the
    /// async runtime.
    pub fn register_operation(self: &Arc<Self>, op: ActiveOperation) -> OperationId {
        let id = op.id;
        let estimated_duration_ms = op.estimated_duration_ms;
        let now = self.clock.now_ms();
        let remaining_ms = op.remaining_ms(now);
        self.active_ops
            .lock()
            .expect("scheduler active-operations mutex poisoned")
            .insert(id, op);
        self.events.publish(Event::OperationStarted(id));

        let scheduler = self.clone();
        tokio::spawn(async move {
            if estimated_duration_ms > 0 {
                scheduler.clock.sleep(Duration::from_millis(remaining_ms)).await;
            } else {
                tokio::task::yield_now().await;
            }
            scheduler.complete_operation(id);
        });

        id
    }

    /// `CompleteOperation` (spec.md §4.3). Idempotent on unknown ids.
    pub fn complete_operation(&self, id: OperationId) {
        let removed = self
            .active_ops
            .lock()
            .expect("scheduler active-operations mutex poisoned")
            .remove(&id);
        if let Some(op) = removed {
            if let Some(on_complete) = op.on_complete {
                run_callback_catching_panics(id, "onComplete", on_complete);
            }
            self.events.publish(Event::OperationCompleted(id));
            self.reevaluate();
        }
    }

    /// `InterruptOperation` (spec.md §4.3): only acts on an interruptible
    /// operation; returns whether it did.
    pub fn interrupt_operation(&self, id: OperationId) -> bool {
        let mut guard = self
            .active_ops
            .lock()
            .expect("scheduler active-operations mutex poisoned");
        let interruptible = guard.get(&id).map(|op| op.interruptible).unwrap_or(false);
        if !interruptible {
            return false;
        }
        let op = guard.remove(&id).expect("checked above");
        drop(guard);

        if let Some(on_interrupt) = op.on_interrupt {
            run_callback_catching_panics(id, "onInterrupt", on_interrupt);
        }
        self.events.publish(Event::OperationInterrupted(id));
        self.reevaluate();
        true
    }

    /// Re-evaluation pass (spec.md §4.3): recomputes every pending
    /// decision; a newly-immediate decision is promoted to `now` so the
    /// next tick dispatches it. Never moves a switch later.
    fn reevaluate(&self) {
        let now = self.clock.now_ms();
        let active = self.snapshot_active();
        let mut pending = self.pending.lock().expect("scheduler pending-switch mutex poisoned");
        for req in pending.iter_mut() {
            let decision = decide(
                req.reason,
                req.priority,
                req.criticality,
                &active,
                &self.thresholds,
                self.max_delay_ms,
                self.grace_period_ms,
                now,
            );
            if decision.action == SwitchAction::Immediate {
                req.scheduled_at_ms = now;
            }
        }
    }

    /// One tick: promotes every request whose `scheduledAt` has arrived
    /// (within the ready margin), preserving insertion order as the
    /// tie-break among equal timestamps.
    pub(crate) fn tick(&self) {
        let now = self.clock.now_ms();
        let ready: Vec<SwitchRequest> = {
            let mut pending = self.pending.lock().expect("scheduler pending-switch mutex poisoned");
            let mut ready = Vec::new();
            pending.retain(|req| {
                if req.scheduled_at_ms <= now + TICK_READY_MARGIN_MS {
                    ready.push(req.clone());
                    false
                } else {
                    true
                }
            });
            ready
        };
        for req in ready {
            let id = req.id;
            self.dispatch(req);
            self.events.publish(Event::DelayedSwitchDispatched(id));
        }
    }

    /// Reports that a dispatched switch ultimately failed in the
    /// supervisor (spec.md §4.3's failure semantics). Not re-queued
    /// automatically.
    pub fn report_switch_failed(&self, id: SwitchId, error: impl std::fmt::Display) {
        self.events
            .publish(Event::SwitchFailed(id, error.to_string()));
    }
}
