// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Coordination core for a client-side multi-VPN supervisor.
//!
//! This crate owns the lifecycle of a single active tunnel, schedules
//! deferred switches against a live model of in-flight work, and absorbs
//! HTTP-like requests in a priority buffer while a transition is underway.
//! It does not speak any tunneling protocol and does not spawn tunnel
//! processes itself — those are supplied by the caller through the
//! [`collaborators`] traits.

pub mod buffer;
pub mod cfg;
pub mod collaborators;
pub mod error;
pub mod events;
pub mod facade;
pub mod model;
pub mod registry;
pub mod scheduler;
pub mod supervisor;
pub mod sync;
pub mod testkit;

pub use error::{CoreError, CoreResult};
pub use facade::HttpFacade;
pub use supervisor::TunnelSupervisor;
