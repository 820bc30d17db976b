// src/cli/mod.rs
//! Command-line interface definitions
//!
//! Flags mirror the knobs of the mining core: login identity, thread
//! count, the screen-saver and time-of-day gates, and the pool endpoints.

/// Argument definitions and the exclude-window parser
pub mod commands;

// Re-export main components for cleaner imports
pub use commands::{parse_exclude, Args, DEFAULT_POOL, DEFAULT_POOL_TLS, DONATE_USERNAME};
