// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use serial_test::serial;
use tunnel_coordinator::cfg::{config::LoggingConfig, logger::init_logger};

/// `tracing::subscriber::set_global_default` succeeds at most once per
/// process, so logger-initialization tests are serialized against each
/// other the way the teacher serializes tests that share a live target.
#[tokio::test]
#[serial(global_tracing_subscriber)]
async fn init_logger_to_stdout_succeeds() {
    let cfg = LoggingConfig { level: "info".to_string(), output: tunnel_coordinator::cfg::enums::LogOutput::Stdout, file_path: None, rotation: None };
    let guard = init_logger(&cfg);
    assert!(guard.is_ok());
}
