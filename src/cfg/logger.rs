// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Tracing-subscriber initialization, driven by [`crate::cfg::config::LoggingConfig`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, Registry, fmt, fmt::writer::BoxMakeWriter, layer::SubscriberExt};

use crate::cfg::{
    config::LoggingConfig,
    enums::{LogOutput, RotationFreq},
};

/// Initializes the global tracing subscriber. Returns the [`WorkerGuard`]
/// that must be kept alive for the process lifetime — dropping it stops the
/// non-blocking writer from flushing.
pub fn init_logger(cfg: &LoggingConfig) -> Result<WorkerGuard> {
    let (writer, guard) = make_writer(cfg)?;

    let env_filter = EnvFilter::try_new(&cfg.level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .context("failed to parse log level from config or env")?;

    let fmt_layer = fmt::layer().with_writer(writer).with_ansi(false).json();

    let subscriber = Registry::default().with(env_filter).with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set global default subscriber")?;

    Ok(guard)
}

fn make_writer(cfg: &LoggingConfig) -> Result<(BoxMakeWriter, WorkerGuard)> {
    Ok(match cfg.output {
        LogOutput::Stdout => {
            let (w, g) = tracing_appender::non_blocking(std::io::stdout());
            (BoxMakeWriter::new(w), g)
        },
        LogOutput::Stderr => {
            let (w, g) = tracing_appender::non_blocking(std::io::stderr());
            (BoxMakeWriter::new(w), g)
        },
        LogOutput::File => {
            let path_str = cfg
                .file_path
                .as_deref()
                .context("logging.file_path is required when output = file")?;
            let path = PathBuf::from(path_str);
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().context("logging.file_path has no file name")?;

            let rotation = match cfg.rotation.unwrap_or(RotationFreq::Never) {
                RotationFreq::Minutely => Rotation::MINUTELY,
                RotationFreq::Hourly => Rotation::HOURLY,
                RotationFreq::Daily => Rotation::DAILY,
                RotationFreq::Never => Rotation::NEVER,
            };

            let appender = RollingFileAppender::new(rotation, dir, file_name);
            let (w, g) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(w), g)
        },
    })
}
