// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tunnel_coordinator::model::{
    operation::{ActiveOperation, OperationKind},
    switch::SwitchPriority,
    tunnel::TunnelKind,
};

#[test]
fn operation_criticality_is_clamped_into_0_100() {
    let over = ActiveOperation::new(OperationKind::HttpRequest, 150, 0, 0, true);
    let under = ActiveOperation::new(OperationKind::HttpRequest, -20, 0, 0, true);
    assert_eq!(over.criticality, 100);
    assert_eq!(under.criticality, 0);
}

#[test]
fn zero_duration_operation_has_no_live_deadline() {
    let op = ActiveOperation::new(OperationKind::HealthCheck, 50, 0, 0, true);
    assert_eq!(op.remaining_ms(1_000), 0);
    assert!(!op.has_live_deadline(0));
}

#[test]
fn switch_priority_levels_match_the_fixed_mapping() {
    assert_eq!(SwitchPriority::Low.level(), 10);
    assert_eq!(SwitchPriority::Normal.level(), 30);
    assert_eq!(SwitchPriority::High.level(), 60);
    assert_eq!(SwitchPriority::Critical.level(), 80);
    assert_eq!(SwitchPriority::Emergency.level(), 100);
}

#[test]
fn tunnel_kind_display_matches_the_opaque_driver_vocabulary() {
    assert_eq!(TunnelKind::OpenStyle.to_string(), "open-style");
    assert_eq!(TunnelKind::KeyPairStyle.to_string(), "key-pair-style");
    assert_eq!(TunnelKind::IkeStyle.to_string(), "ike-style");
    assert_eq!(TunnelKind::Other("wireguard".to_string()).to_string(), "wireguard");
}
