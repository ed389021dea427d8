// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use serde_json::json;
use tunnel_coordinator::{
    cfg::config::{BufferConfig, Config, DelayedSwitchConfig, LoggingConfig, SwitchThresholds},
    error::ConfigError,
    model::tunnel::{TunnelDescriptor, TunnelKind},
};

fn base_config() -> Config {
    Config {
        max_reconnect_attempts: 3,
        health_check_interval: std::time::Duration::from_secs(5),
        health_check_timeout: std::time::Duration::from_secs(2),
        request_concurrency: 10,
        buffer: BufferConfig::default(),
        delayed_switch: DelayedSwitchConfig::default(),
        tunnels: vec![TunnelDescriptor::new("primary", 0, TunnelKind::OpenStyle, json!({}))],
        logging: LoggingConfig::default(),
    }
}

#[test]
fn round_trips_through_yaml() {
    let cfg = base_config();
    let yaml = serde_yaml::to_string(&cfg).expect("serialize");
    let reloaded: Config = serde_yaml::from_str(&yaml).expect("deserialize");
    assert_eq!(reloaded.max_reconnect_attempts, cfg.max_reconnect_attempts);
    assert_eq!(reloaded.tunnels.len(), 1);
    assert_eq!(reloaded.tunnels[0].name, "primary");
}

#[test]
fn threshold_ordering_is_enforced_on_load() {
    let mut cfg = base_config();
    cfg.delayed_switch.thresholds = SwitchThresholds { immediate: 10, fast: 70, normal: 50, slow: 30 };
    assert_eq!(cfg.validate_and_normalize(), Err(ConfigError::InvalidThresholds));
}

#[test]
fn request_concurrency_must_be_at_least_one() {
    let mut cfg = base_config();
    cfg.request_concurrency = 0;
    assert_eq!(cfg.validate_and_normalize(), Err(ConfigError::InvalidRequestConcurrency));
}

#[test]
fn empty_tunnel_list_is_legal_at_config_time() {
    // An empty `tunnels` list is only a failure once `connectToBest` actually
    // runs against an empty registry (spec.md §3) — config loading itself
    // must accept it, since external discovery can populate it later.
    let mut cfg = base_config();
    cfg.tunnels.clear();
    assert!(cfg.validate_and_normalize().is_ok());
}
