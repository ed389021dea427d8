// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! External collaborators (spec.md §6): `TunnelDriver`, `Prober`, `Clock`.
//! These are caller-implemented capabilities the core consumes only through
//! the trait boundary — the core never assumes a concrete transport or
//! process model.

use std::time::Duration;

use async_trait::async_trait;

use crate::{error::DriverError, model::tunnel::TunnelDescriptor};

/// Attaches/detaches a single tunnel. Implementations must be safe to call
/// from any task; the core serializes all calls itself (spec.md §6).
#[async_trait]
pub trait TunnelDriver: Send + Sync {
    async fn attach(&self, descriptor: &TunnelDescriptor) -> Result<(), DriverError>;
    async fn detach(&self, descriptor: &TunnelDescriptor) -> Result<(), DriverError>;
}

/// A health verdict for one tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    Unhealthy(String),
}

/// Reports a boolean health verdict per tunnel, invoked periodically at
/// `healthCheckInterval` (spec.md §6). The core consumes only the verdict —
/// probe mechanics are entirely the implementation's concern.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn verdict(&self, descriptor: &TunnelDescriptor) -> Verdict;
}

/// Injectable time source used by the Scheduler's tick, operation timers,
/// and exponential backoff (spec.md §6).
#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic milliseconds since an arbitrary epoch.
    fn now_ms(&self) -> u64;
    /// Resolves after `duration` elapses.
    async fn sleep(&self, duration: Duration);
}

/// Real-time [`Clock`] backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
