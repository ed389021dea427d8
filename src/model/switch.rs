// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{clamp_criticality, operation::OperationId, tunnel::TunnelDescriptor};

/// Opaque, unique, non-reusable identifier for a [`SwitchRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwitchId(pub Uuid);

impl SwitchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SwitchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SwitchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a switch was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwitchReason {
    HealthFailed,
    UserRequest,
    LoadBalance,
    Maintenance,
    Emergency,
    Optimization,
}

/// Caller-supplied priority, mapped to a numeric level by
/// [`SwitchPriority::level`] (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwitchPriority {
    Low,
    Normal,
    High,
    Critical,
    Emergency,
}

impl SwitchPriority {
    /// Fixed mapping from spec.md §4.3: `{low→10, normal→30, high→60,
    /// critical→80, emergency→100}`.
    pub fn level(self) -> u32 {
        match self {
            SwitchPriority::Low => 10,
            SwitchPriority::Normal => 30,
            SwitchPriority::High => 60,
            SwitchPriority::Critical => 80,
            SwitchPriority::Emergency => 100,
        }
    }
}

/// A pending or in-flight request to move the active tunnel.
///
/// Created by `RequestSwitch`; destroyed on dispatch, cancellation, or
/// failure. A scheduled request with `scheduled_at` in the future must be
/// cancellable unless its decision was `immediate`.
#[derive(Debug, Clone)]
pub struct SwitchRequest {
    pub id: SwitchId,
    pub target: TunnelDescriptor,
    pub reason: SwitchReason,
    pub priority: SwitchPriority,
    /// Normalized into `[0, 100]` on entry.
    pub criticality: u8,
    pub requested_at_ms: u64,
    pub scheduled_at_ms: u64,
    pub cancellable: bool,
}

impl SwitchRequest {
    pub fn new(
        target: TunnelDescriptor,
        reason: SwitchReason,
        priority: SwitchPriority,
        criticality: i32,
        now_ms: u64,
    ) -> Self {
        Self {
            id: SwitchId::new(),
            target,
            reason,
            priority,
            criticality: clamp_criticality(criticality),
            requested_at_ms: now_ms,
            scheduled_at_ms: now_ms,
            cancellable: false,
        }
    }
}

/// The action the Scheduler decided to take for a given request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwitchAction {
    Immediate,
    Delayed,
    Postponed,
    Cancelled,
}

/// Pure output value of [`crate::scheduler::decision::decide`].
#[derive(Debug, Clone)]
pub struct SwitchDecision {
    pub action: SwitchAction,
    /// Milliseconds, `>= 0`, clamped to `<= maxDelay`.
    pub delay_ms: u64,
    pub reason: String,
    pub affected_operations: Vec<OperationId>,
    pub scheduled_at_ms: Option<u64>,
}

impl SwitchDecision {
    pub fn immediate(reason: impl Into<String>, affected: Vec<OperationId>) -> Self {
        Self {
            action: SwitchAction::Immediate,
            delay_ms: 0,
            reason: reason.into(),
            affected_operations: affected,
            scheduled_at_ms: None,
        }
    }

    pub fn delayed(delay_ms: u64, reason: impl Into<String>, now_ms: u64) -> Self {
        Self {
            action: SwitchAction::Delayed,
            delay_ms,
            reason: reason.into(),
            affected_operations: Vec::new(),
            scheduled_at_ms: Some(now_ms + delay_ms),
        }
    }

    pub fn postponed(delay_ms: u64, now_ms: u64) -> Self {
        Self {
            action: SwitchAction::Postponed,
            delay_ms,
            reason: "postponed: optimal switch time exceeds max delay".to_string(),
            affected_operations: Vec::new(),
            scheduled_at_ms: Some(now_ms + delay_ms),
        }
    }
}
