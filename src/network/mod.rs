// src/network/mod.rs
//! Network communication components
//!
//! This module handles all network interactions with the mining pool:
//! - `pool`: the stratum client (login, job stream, share submission,
//!   chat fetches) over line-delimited JSON on TCP or TLS
//! - `poolstats`: the HTTP JSON statistics endpoints and the
//!   time-to-reward derivation

/// Stratum pool client implementation
pub mod pool;

/// Pool-side statistics fetching over HTTP
pub mod poolstats;

// Re-export main components for cleaner imports
pub use pool::{
    Job, LoginWarning, PoolClient, PoolConnector, PoolSession, StratumClient, StratumConnector,
    SubmitReply, SubmitResult,
};
pub use poolstats::{stats_from_submit, PoolStatsFetcher, DEFAULT_STATS_URL};
