// src/stats/mod.rs
//! Statistics collection and reporting module
//!
//! This module provides the ledger tracking mining statistics:
//! - Hash counts and quiescent-snapshot hashrate calculations
//! - Share acceptance/rejection tracking
//! - Cached pool-side totals and their freshness
//!
//! The main component is [`StatsLedger`]; consumers read it through
//! [`StatsSnapshot`].

/// Submodule containing the ledger implementation
pub mod ledger;

// Re-export main components
pub use ledger::{PoolSideStats, StatsLedger, StatsSnapshot, ACCURACY_WINDOW, HASHRATE_CALCULATING};
