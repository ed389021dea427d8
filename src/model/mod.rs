// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Core data model (spec.md §3): tunnels, switch requests/decisions, active
//! operations, and buffered requests. Types here carry no behavior beyond
//! constructors and small invariant-preserving helpers; the components own
//! the state machines that mutate them.

pub mod buffered_request;
pub mod operation;
pub mod switch;
pub mod tunnel;

pub use buffered_request::{BufferPriority, BufferedRequest};
pub use operation::{ActiveOperation, OperationId, OperationKind};
pub use switch::{SwitchDecision, SwitchId, SwitchPriority, SwitchReason, SwitchRequest};
pub use tunnel::{TunnelDescriptor, TunnelKind, TunnelName};

/// Clamp a criticality-like value into `[0, 100]` (spec.md §3).
pub fn clamp_criticality(value: i32) -> u8 {
    value.clamp(0, 100) as u8
}
