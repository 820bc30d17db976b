// src/miner/algorithm/mod.rs
//! Hash engine interface
//!
//! The dispatch loop drives hashing through the [`HashEngine`] trait,
//! which mirrors the surface of a native RandomX library: one-time init,
//! expensive reseeding that must happen with no workers inside the engine,
//! a blocking per-thread `hash_until` call, and dynamic thread add/remove.
//!
//! The stop flag is a plain atomic 32-bit word because the engine may be
//! native code polling it across an FFI boundary; higher-level
//! cancellation handles cannot cross that boundary.

use crate::utils::error::MinerError;
use std::sync::atomic::AtomicU32;

/// RandomX engine implementation
///
/// Backed by the `rust_randomx` crate; rebuilding the dataset on reseed
/// takes several seconds and a couple of GB in fast mode.
pub mod randomx;

/// Outcome of engine initialization
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EngineInit {
    /// Engine ready at full speed
    Ready,
    /// Engine ready, but large pages could not be enabled so hashing may
    /// be slow; a machine restart sometimes resolves this
    ReadyNoHugePages,
}

/// Common interface for seedable hashing engines
///
/// Contract: `seed`, `add_thread` and `remove_thread` must only be called
/// while no thread is inside [`HashEngine::hash_until`]; the caller
/// quiesces workers first.
pub trait HashEngine: Send + Sync {
    /// One-time engine initialization for the given thread count.
    ///
    /// # Errors
    /// Returns `MinerError::EngineError` on a non-recoverable failure;
    /// the process should exit.
    fn init(&self, threads: usize) -> Result<EngineInit, MinerError>;

    /// Installs a new dataset seed. Expensive; `init_threads` bounds the
    /// parallelism used to rebuild the dataset.
    ///
    /// # Errors
    /// Returns `MinerError::EngineError` if the dataset could not be
    /// built, in which case no new workers may start until a usable seed
    /// arrives.
    fn seed(&self, seed: &[u8], init_threads: usize) -> Result<(), MinerError>;

    /// Hashes the blob with thread-partitioned nonces until a hash meets
    /// `difficulty` or the stop flag becomes non-zero.
    ///
    /// Returns `n > 0` when a share was found after `n` hashes, with
    /// `hash_out` and `nonce_out` populated; returns `-n <= 0` when
    /// stopped after `n` hashes.
    fn hash_until(
        &self,
        blob: &[u8],
        difficulty: u64,
        thread: usize,
        hash_out: &mut [u8; 32],
        nonce_out: &mut [u8; 4],
        stop: &AtomicU32,
    ) -> i64;

    /// Grows the engine's thread count by one, returning the new count.
    ///
    /// # Errors
    /// Returns `MinerError::EngineError` when no more threads can be
    /// added.
    fn add_thread(&self) -> Result<usize, MinerError>;

    /// Shrinks the engine's thread count by one, returning the new count.
    ///
    /// # Errors
    /// Returns `MinerError::EngineError` when already at one thread.
    fn remove_thread(&self) -> Result<usize, MinerError>;
}

// Re-export main components for cleaner imports
pub use randomx::RandomxEngine;
