// src/utils/logging.rs
//! Logging configuration and utilities
//!
//! This module handles logging setup for the miner application.
//! Uses `env_logger` under the hood with custom formatting and filtering.

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::env;

/// Initializes the logging subsystem with sensible defaults
///
/// # Configuration
/// - Logs to stdout
/// - Default log level: Info
/// - Level-first format with a millisecond timestamp and call site
/// - Respects `RUST_LOG` environment variable if set
pub fn init_logging() {
    let mut builder = miner_log_builder();

    if env::var("RUST_LOG").is_err() {
        builder.filter_level(LevelFilter::Info);
    } else {
        builder.parse_env("RUST_LOG");
    }

    builder.init();
}

/// Builds the logger used throughout the miner
///
/// The format leads with the level so pause/resume transitions and share
/// results line up in a scrolling terminal, followed by a millisecond
/// timestamp and the call site:
///
/// ```text
/// INFO  2026-08-02T10:15:42.123Z rxminer::miner::dispatch:188 | New activity state: ACTIVE
/// ```
fn miner_log_builder() -> Builder {
    let mut builder = Builder::new();

    builder
        .format(|out, record| {
            use std::io::Write;
            writeln!(
                out,
                "{:<5} {} {}:{} | {}",
                record.level(),
                out.timestamp_millis(),
                record.module_path().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(Target::Stdout);

    builder
}
