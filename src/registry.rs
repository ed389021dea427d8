// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Tunnel Registry (spec.md §4.2): a readers-writer-protected ordered list
//! of tunnel descriptors with an `active` flag on each and a pointer to the
//! currently active one. Built once at initialization, thereafter
//! read-mostly; only the [`crate::supervisor::TunnelSupervisor`] mutates it,
//! and only through the write lock.

use crate::{
    error::ConfigError,
    model::tunnel::{TunnelDescriptor, TunnelName},
    sync::RwLock,
};

struct RegistryState {
    tunnels: Vec<TunnelDescriptor>,
    current: Option<TunnelName>,
}

pub struct TunnelRegistry {
    state: RwLock<RegistryState>,
}

impl TunnelRegistry {
    /// Builds a registry from a list of tunnel descriptors. Fails if any
    /// two share a name (spec.md §3's uniqueness invariant).
    pub fn new(tunnels: Vec<TunnelDescriptor>) -> Result<Self, ConfigError> {
        let mut seen = std::collections::HashSet::with_capacity(tunnels.len());
        for t in &tunnels {
            if !seen.insert(t.name.clone()) {
                return Err(ConfigError::DuplicateTunnelName(t.name.clone()));
            }
        }
        Ok(Self {
            state: RwLock::new(RegistryState {
                tunnels,
                current: None,
            }),
        })
    }

    /// Snapshot of every descriptor, sorted by priority ascending, taken
    /// under the read lock and released immediately — used by
    /// `connectToBest` (spec.md §4.2).
    pub async fn snapshot_by_priority(&self) -> Vec<TunnelDescriptor> {
        self.state
            .run_with_read_lock(|state| async {
                let mut v = state.tunnels.clone();
                v.sort_by_key(|t| t.priority);
                v
            })
            .await
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.state
            .run_with_read_lock(|state| async { state.tunnels.iter().any(|t| t.name == name) })
            .await
    }

    pub async fn get(&self, name: &str) -> Option<TunnelDescriptor> {
        self.state
            .run_with_read_lock(
                |state| async { state.tunnels.iter().find(|t| t.name == name).cloned() },
            )
            .await
    }

    pub async fn current(&self) -> Option<TunnelDescriptor> {
        self.state
            .run_with_read_lock(|state| async {
                state
                    .current
                    .as_ref()
                    .and_then(|name| state.tunnels.iter().find(|t| &t.name == name))
                    .cloned()
            })
            .await
    }

    pub async fn is_empty(&self) -> bool {
        self.state
            .run_with_read_lock(|state| async { state.tunnels.is_empty() })
            .await
    }

    /// Sets `current ← name`, flips `active` so at most one descriptor is
    /// active, under the write lock. Called only after the driver confirms
    /// success (spec.md §4.2's `connect` contract).
    pub async fn set_active(&self, name: &str) {
        self.state
            .run_with_write_lock(|state| async {
                for t in state.tunnels.iter_mut() {
                    t.active = t.name == name;
                }
                state.current = Some(name.to_string());
            })
            .await;
    }

    /// Clears the active flag and `current`, regardless of whether the
    /// driver's `detach` reported success — the observable state must never
    /// retain a stale active flag (spec.md §4.2's `disconnect` contract).
    pub async fn clear_active(&self) {
        self.state
            .run_with_write_lock(|state| async {
                for t in state.tunnels.iter_mut() {
                    t.active = false;
                }
                state.current = None;
            })
            .await;
    }
}
