// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::clamp_criticality;

/// Opaque identifier for an [`ActiveOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Purely descriptive metadata used by the Scheduler's delay policy; carries
/// no behavior of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    HttpRequest,
    FileTransfer,
    Streaming,
    Auth,
    HealthCheck,
    ConfigUpdate,
}

/// A caller-registered unit of work the Scheduler must weigh against pending
/// tunnel switches.
///
/// Created by `RegisterOperation`, removed by `CompleteOperation` or
/// `InterruptOperation`. The collection holding these is caller-bounded and
/// kept small; no operation remains registered after its id is retired.
pub struct ActiveOperation {
    pub id: OperationId,
    pub kind: OperationKind,
    /// Clamped into `[0, 100]`.
    pub criticality: u8,
    pub started_at_ms: u64,
    /// `0` means unknown/instant duration.
    pub estimated_duration_ms: u64,
    pub interruptible: bool,
    pub on_complete: Option<Box<dyn FnOnce() + Send>>,
    pub on_interrupt: Option<Box<dyn FnOnce() + Send>>,
}

impl fmt::Debug for ActiveOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveOperation")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("criticality", &self.criticality)
            .field("started_at_ms", &self.started_at_ms)
            .field("estimated_duration_ms", &self.estimated_duration_ms)
            .field("interruptible", &self.interruptible)
            .finish_non_exhaustive()
    }
}

impl ActiveOperation {
    pub fn new(
        kind: OperationKind,
        criticality: i32,
        started_at_ms: u64,
        estimated_duration_ms: u64,
        interruptible: bool,
    ) -> Self {
        Self {
            id: OperationId::new(),
            kind,
            criticality: clamp_criticality(criticality),
            started_at_ms,
            estimated_duration_ms,
            interruptible,
            on_complete: None,
            on_interrupt: None,
        }
    }

    pub fn with_on_complete(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub fn with_on_interrupt(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_interrupt = Some(Box::new(f));
        self
    }

    /// `max(0, started_at + estimated_duration - now)`; `0` if the duration
    /// is unknown.
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        if self.estimated_duration_ms == 0 {
            return 0;
        }
        let deadline = self.started_at_ms + self.estimated_duration_ms;
        deadline.saturating_sub(now_ms)
    }

    /// `true` unless the duration is unknown/instant or the deadline has
    /// already passed — used to build `O_high'` in spec.md §4.3.
    pub fn has_live_deadline(&self, now_ms: u64) -> bool {
        self.estimated_duration_ms > 0
            && self.started_at_ms + self.estimated_duration_ms > now_ms
    }
}
