// src/config/mod.rs
//! Configuration management for the miner
//!
//! This module defines the two configuration blocks the miner consumes:
//! the session-immutable pool login parameters and the miner's own thread
//! and exclude-window settings. Both can be loaded from a TOML file and
//! overridden by command-line flags.

/// Core configuration implementation
///
/// Contains [`LoginConfig`], [`MinerConfig`], and the optional on-disk
/// [`ConfigFile`] that supplies defaults for both.
pub mod config;

// Re-export key items for easy access
pub use config::{ConfigFile, LoginConfig, MinerConfig};
