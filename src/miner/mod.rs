// src/miner/mod.rs
//! Core mining functionality
//!
//! This module contains all components of the mining decision path:
//! - The hash engine interface and its RandomX implementation
//! - The pure activity evaluator
//! - The worker pool and the per-share submit tasks
//! - The dispatch loop multiplexing jobs, pokes and timers
//! - The [`Miner`] coordinator exposing the public API

/// Hash engine interface and implementations
pub mod algorithm;

/// Pure activity-state evaluation
pub mod activity;

/// The miner coordinator and public API types
pub mod coordinator;

/// The dispatch loop
pub(crate) mod dispatch;

/// Share submission tasks
pub(crate) mod submit;

/// Hashing worker pool
pub(crate) mod workers;

// Re-export main components for cleaner imports
pub use self::algorithm::{EngineInit, HashEngine, RandomxEngine};
pub use self::coordinator::{InitResponse, Miner, MiningState, PoolLoginResponse};
