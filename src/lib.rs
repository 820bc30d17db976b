//! rxminer - activity-aware CPU RandomX pool miner
//!
//! This crate implements the client core of a long-running CPU miner:
//! a stratum pool connection, a pluggable hashing engine, a worker-thread
//! pool, hashrate accounting, and a dispatch loop that decides whether to
//! mine based on environmental signals (screen activity, power source,
//! time of day, user override).

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Miner core: engine interface, activity evaluation, dispatch loop,
/// worker pool, and the public coordinator
pub mod miner;

/// Network communication: stratum pool client and HTTP stats endpoints
pub mod network;

/// Statistics ledger and snapshots
pub mod stats;

/// Chat message queues
pub mod chat;

/// Utility functions: errors, logging, difficulty arithmetic
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

// Core exports
pub use chat::{ChatQueue, ReceivedChat};
pub use config::{ConfigFile, LoginConfig, MinerConfig};
pub use miner::{EngineInit, HashEngine, InitResponse, Miner, MiningState, PoolLoginResponse, RandomxEngine};
pub use network::{PoolConnector, StratumConnector};
pub use stats::{StatsLedger, StatsSnapshot};
pub use types::Activity;
pub use utils::{init_logging, MinerError};
