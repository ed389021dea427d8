// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::{error::FacadeError, facade::HttpResponse};

/// Opaque identifier for a [`BufferedRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferedRequestId(pub Uuid);

impl BufferedRequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BufferedRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BufferedRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Buffer priority class. Reference weights from spec.md §4.4:
/// `{critical:1000, high:100, normal:10, low:1}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BufferPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl BufferPriority {
    pub fn weight(self, weights: &PriorityWeights) -> u32 {
        match self {
            BufferPriority::Critical => weights.critical,
            BufferPriority::High => weights.high,
            BufferPriority::Normal => weights.normal,
            BufferPriority::Low => weights.low,
        }
    }
}

/// Configurable priority weights, defaulting to spec.md §4.4's reference
/// values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriorityWeights {
    pub critical: u32,
    pub high: u32,
    pub normal: u32,
    pub low: u32,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            critical: 1000,
            high: 100,
            normal: 10,
            low: 1,
        }
    }
}

/// A request held by the [`crate::buffer::RequestBuffer`] until the
/// supervisor reports a connected state again.
///
/// Lifetime: from `enqueue` to drain-success, drain-failure-exhausted,
/// timeout, or eviction by overflow policy.
pub struct BufferedRequest {
    pub id: BufferedRequestId,
    pub priority: BufferPriority,
    pub enqueued_at_ms: u64,
    /// Monotonic insertion counter, the final tie-break when two requests of
    /// equal priority share a millisecond (spec.md §4.4).
    pub sequence: u64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub(crate) fulfillment: Option<oneshot::Sender<Result<HttpResponse, FacadeError>>>,
    pub(crate) executor: crate::facade::PendingRequest,
}

impl fmt::Debug for BufferedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedRequest")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("enqueued_at_ms", &self.enqueued_at_ms)
            .field("sequence", &self.sequence)
            .field("retry_count", &self.retry_count)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Sort key: `(−priorityWeight, enqueuedAt, sequence)` so higher-weight
/// requests sort first and ties break FIFO (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BufferSortKey {
    pub neg_weight: i64,
    pub enqueued_at_ms: u64,
    pub sequence: u64,
}
