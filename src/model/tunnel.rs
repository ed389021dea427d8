// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique tunnel name within a registry.
pub type TunnelName = String;

/// Tunnel kind, opaque to the core and passed through to the `TunnelDriver`
/// unchanged (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TunnelKind {
    OpenStyle,
    KeyPairStyle,
    IkeStyle,
    /// Forward-compatible escape hatch for driver-specific kinds the core
    /// does not need to understand.
    Other(String),
}

impl fmt::Display for TunnelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelKind::OpenStyle => f.write_str("open-style"),
            TunnelKind::KeyPairStyle => f.write_str("key-pair-style"),
            TunnelKind::IkeStyle => f.write_str("ike-style"),
            TunnelKind::Other(s) => f.write_str(s),
        }
    }
}

/// Opaque credential set carried alongside a [`TunnelDescriptor`]. The core
/// never inspects its contents; it is handed to the driver as-is.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Credentials(pub serde_json::Value);

/// A single tunnel configuration tracked by the [`crate::registry::TunnelRegistry`].
///
/// Mutated only under the registry's write lock; identity (`name`) is unique
/// within the registry for its whole lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelDescriptor {
    pub name: TunnelName,
    /// Lower is preferred.
    pub priority: u32,
    /// Opaque blob handed to the driver verbatim.
    pub config_blob: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    pub kind: TunnelKind,
    #[serde(default)]
    pub active: bool,
}

impl TunnelDescriptor {
    pub fn new(
        name: impl Into<TunnelName>,
        priority: u32,
        kind: TunnelKind,
        config_blob: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            priority,
            config_blob,
            credentials: None,
            kind,
            active: false,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}
