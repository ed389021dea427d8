// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Crate-level error kinds.
//!
//! Each component maps foreign error shapes into its own kind before
//! exposing them; [`CoreError`] is the aggregate a caller of the public
//! façade ultimately observes.

use thiserror::Error;

use crate::model::{switch::SwitchId, tunnel::TunnelName};

/// Configuration-time errors: invalid thresholds, non-unique tunnel names,
/// an empty registry on `connectToBest`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("delayed-switch thresholds must satisfy immediate >= fast >= normal >= slow > 0")]
    InvalidThresholds,
    #[error("duplicate tunnel name in registry: {0}")]
    DuplicateTunnelName(TunnelName),
    #[error("tunnel registry is empty")]
    EmptyRegistry,
    #[error("unknown tunnel: {0}")]
    UnknownTunnel(TunnelName),
    #[error("requestConcurrency must be >= 1")]
    InvalidRequestConcurrency,
    #[error("maxReconnectAttempts must be >= 1")]
    InvalidMaxReconnectAttempts,
}

/// Errors surfaced by the `TunnelDriver` capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("tunnel configuration is invalid: {0}")]
    ConfigInvalid(String),
    #[error("tunnel binary is missing")]
    BinaryMissing,
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("timed out attaching/detaching tunnel")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors surfaced by the Deferred Switch Scheduler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler is disabled")]
    Disabled,
    #[error("switch request {0} was cancelled")]
    Cancelled(SwitchId),
    #[error("unknown switch id: {0}")]
    UnknownId(SwitchId),
}

/// Errors surfaced by the Request Buffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("request evicted by overflow policy")]
    Overflow,
    #[error("request timed out while buffered")]
    Timeout,
    #[error("request exhausted its retry budget")]
    RetryExhausted,
}

/// Errors surfaced by the HTTP façade.
#[derive(Debug, Error, Clone)]
pub enum FacadeError {
    #[error("request aborted or timed out")]
    AbortOrTimeout,
    #[error("connection reset")]
    ConnectionReset,
    #[error("name resolution failed")]
    NameResolution,
    #[error("connection refused")]
    ConnectionRefused,
    #[error("no tunnel attached")]
    NoTunnel,
    #[error("tunnel is transitioning")]
    Transitioning,
    #[error("request failed: {0}")]
    Other(String),
}

impl FacadeError {
    /// Network-class errors are retried per policy; everything else
    /// propagates after at most one retry round (§7).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FacadeError::AbortOrTimeout
                | FacadeError::ConnectionReset
                | FacadeError::NameResolution
                | FacadeError::ConnectionRefused
        )
    }
}

/// Aggregate error returned by [`crate::supervisor::TunnelSupervisor`] and
/// the public façade.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Facade(#[from] FacadeError),
    #[error("connectToBest exhausted all {attempted} tunnel(s); last error: {last}")]
    AllTunnelsFailed { attempted: usize, last: String },
}

pub type CoreResult<T> = Result<T, CoreError>;
