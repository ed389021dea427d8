// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Structured configuration (spec.md §3, §6): validated once at load time,
//! thereafter treated as immutable by every component that borrows it.

use std::{collections::HashSet, fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    cfg::enums::{LogOutput, RotationFreq},
    error::ConfigError,
    model::{buffered_request::PriorityWeights, tunnel::TunnelDescriptor},
};

/// Top-level coordination-core configuration.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Per-tunnel recovery attempts before the supervisor delegates to the
    /// Scheduler (spec.md §4.2).
    #[serde(rename = "maxReconnectAttempts")]
    pub max_reconnect_attempts: u32,

    #[serde(rename = "healthCheckIntervalMs", with = "serde_millis")]
    pub health_check_interval: Duration,

    #[serde(rename = "healthCheckTimeoutMs", with = "serde_millis")]
    pub health_check_timeout: Duration,

    /// Semaphore width for the HTTP façade's direct-request path.
    #[serde(
        rename = "requestConcurrency",
        default = "default_request_concurrency"
    )]
    pub request_concurrency: u32,

    pub buffer: BufferConfig,

    #[serde(rename = "delayedSwitch")]
    pub delayed_switch: DelayedSwitchConfig,

    /// Static tunnel set. Discovering tunnels from an external inventory is
    /// out of scope for the core itself.
    #[serde(default)]
    pub tunnels: Vec<TunnelDescriptor>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_request_concurrency() -> u32 {
    10
}

/// Request Buffer configuration (spec.md §3, §4.4).
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BufferConfig {
    #[serde(rename = "maxSize")]
    pub max_size: usize,
    #[serde(rename = "processingIntervalMs", with = "serde_millis")]
    pub processing_interval: Duration,
    #[serde(rename = "maxRetries")]
    pub max_retries: u32,
    #[serde(rename = "timeoutMs", with = "serde_millis")]
    pub timeout: Duration,
    #[serde(rename = "priorityWeights", default)]
    pub priority_weights: PriorityWeights,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            processing_interval: Duration::from_secs(1),
            max_retries: 3,
            timeout: Duration::from_secs(30),
            priority_weights: PriorityWeights::default(),
        }
    }
}

/// Deferred Switch Scheduler configuration (spec.md §3, §4.3): delay
/// thresholds keyed by criticality band, a hard cap on deferral, and a grace
/// period granted to non-interruptible work before a postponed switch is
/// forcibly reconsidered.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DelayedSwitchConfig {
    pub thresholds: SwitchThresholds,
    #[serde(rename = "maxDelayMs", with = "serde_millis")]
    pub max_delay: Duration,
    #[serde(rename = "gracePeriodMs", with = "serde_millis")]
    pub grace_period: Duration,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Criticality-band thresholds. Must satisfy `immediate >= fast >= normal >=
/// slow > 0`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
pub struct SwitchThresholds {
    pub immediate: u32,
    pub fast: u32,
    pub normal: u32,
    pub slow: u32,
}

impl Default for DelayedSwitchConfig {
    fn default() -> Self {
        Self {
            thresholds: SwitchThresholds {
                immediate: 90,
                fast: 70,
                normal: 50,
                slow: 30,
            },
            max_delay: Duration::from_secs(60),
            grace_period: Duration::from_secs(10),
            enabled: true,
        }
    }
}

/// Ambient logging configuration: level plus an output target, with optional
/// file rotation when writing to disk.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub output: LogOutput,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub rotation: Option<RotationFreq>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: LogOutput::Stdout,
            file_path: None,
            rotation: None,
        }
    }
}

impl Config {
    /// Loads and validates configuration from a YAML file. A convenience for
    /// the demo binary and embedding applications — the core itself never
    /// touches the filesystem.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config file {:?}", path.as_ref()))?;
        let mut cfg: Config =
            serde_yaml::from_str(&raw).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()
            .context("invalid coordination-core configuration")?;
        Ok(cfg)
    }

    /// Validates the invariants spec.md §3/§6 place on configuration.
    pub fn validate_and_normalize(&mut self) -> Result<(), ConfigError> {
        if self.max_reconnect_attempts < 1 {
            return Err(ConfigError::InvalidMaxReconnectAttempts);
        }
        if self.request_concurrency < 1 {
            return Err(ConfigError::InvalidRequestConcurrency);
        }

        let t = &self.delayed_switch.thresholds;
        if !(t.immediate >= t.fast && t.fast >= t.normal && t.normal >= t.slow && t.slow > 0) {
            return Err(ConfigError::InvalidThresholds);
        }

        let mut seen = HashSet::with_capacity(self.tunnels.len());
        for tunnel in &self.tunnels {
            if !seen.insert(tunnel.name.clone()) {
                return Err(ConfigError::DuplicateTunnelName(tunnel.name.clone()));
            }
        }

        Ok(())
    }
}

/// Serde helper representing a `Duration` as a plain count of milliseconds,
/// mirroring how the teacher represents seconds-granularity durations.
mod serde_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
