// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Test doubles for the external collaborators (spec.md §6). Exposed as a
//! public module, not gated behind `#[cfg(test)]`, so integration tests and
//! the demo binary can build scenarios against the same doubles unit tests
//! use.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex as StdMutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{
    collaborators::{Clock, Prober, TunnelDriver, Verdict},
    error::DriverError,
    model::tunnel::TunnelDescriptor,
};

/// A [`Clock`] whose notion of "now" only moves when [`MockClock::advance`]
/// or [`MockClock::set`] is called, so tests can deterministically exercise
/// timer-driven behavior (operation auto-completion, scheduler ticks,
/// backoff) without real delays.
pub struct MockClock {
    now_ms: std::sync::atomic::AtomicU64,
    notify: Notify,
}

impl MockClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: std::sync::atomic::AtomicU64::new(start_ms),
            notify: Notify::new(),
        }
    }

    /// Advances the clock and wakes every task parked in [`Clock::sleep`].
    pub fn advance(&self, by_ms: u64) {
        self.now_ms.fetch_add(by_ms, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        let target = self.now_ms() + duration.as_millis() as u64;
        while self.now_ms() < target {
            let notified = self.notify.notified();
            if self.now_ms() >= target {
                break;
            }
            notified.await;
        }
    }
}

/// A [`TunnelDriver`] whose `attach`/`detach` outcomes are scripted in
/// advance via a FIFO queue per method; defaults to `Ok(())` once the queue
/// is drained.
#[derive(Default)]
pub struct MockTunnelDriver {
    attach_results: StdMutex<VecDeque<Result<(), DriverError>>>,
    detach_results: StdMutex<VecDeque<Result<(), DriverError>>>,
    attach_calls: AtomicUsize,
    detach_calls: AtomicUsize,
}

impl MockTunnelDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_attach_result(&self, result: Result<(), DriverError>) {
        self.attach_results.lock().expect("poisoned").push_back(result);
    }

    pub fn push_detach_result(&self, result: Result<(), DriverError>) {
        self.detach_results.lock().expect("poisoned").push_back(result);
    }

    pub fn attach_call_count(&self) -> usize {
        self.attach_calls.load(Ordering::SeqCst)
    }

    pub fn detach_call_count(&self) -> usize {
        self.detach_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TunnelDriver for MockTunnelDriver {
    async fn attach(&self, _descriptor: &TunnelDescriptor) -> Result<(), DriverError> {
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        self.attach_results
            .lock()
            .expect("poisoned")
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn detach(&self, _descriptor: &TunnelDescriptor) -> Result<(), DriverError> {
        self.detach_calls.fetch_add(1, Ordering::SeqCst);
        self.detach_results
            .lock()
            .expect("poisoned")
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

/// A [`Prober`] whose verdicts are scripted in advance; defaults to
/// `Healthy` once the queue is drained.
#[derive(Default)]
pub struct MockProber {
    verdicts: StdMutex<VecDeque<Verdict>>,
}

impl MockProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_verdict(&self, verdict: Verdict) {
        self.verdicts.lock().expect("poisoned").push_back(verdict);
    }
}

#[async_trait]
impl Prober for MockProber {
    async fn verdict(&self, _descriptor: &TunnelDescriptor) -> Verdict {
        self.verdicts
            .lock()
            .expect("poisoned")
            .pop_front()
            .unwrap_or(Verdict::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_clock_sleep_resolves_once_advanced_past_target() {
        let clock = std::sync::Arc::new(MockClock::new(0));
        let clock2 = clock.clone();
        let handle = tokio::spawn(async move {
            clock2.sleep(Duration::from_millis(500)).await;
        });
        tokio::task::yield_now().await;
        clock.advance(500);
        handle.await.expect("task panicked");
    }

    #[tokio::test]
    async fn mock_tunnel_driver_replays_scripted_results() {
        let driver = MockTunnelDriver::new();
        driver.push_attach_result(Err(DriverError::Timeout));
        driver.push_attach_result(Ok(()));
        let t = TunnelDescriptor::new(
            "t",
            0,
            crate::model::tunnel::TunnelKind::OpenStyle,
            serde_json::json!({}),
        );
        assert_eq!(driver.attach(&t).await, Err(DriverError::Timeout));
        assert_eq!(driver.attach(&t).await, Ok(()));
        assert_eq!(driver.attach(&t).await, Ok(()));
        assert_eq!(driver.attach_call_count(), 3);
    }
}
