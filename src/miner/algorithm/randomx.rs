// src/miner/algorithm/randomx.rs
//! RandomX engine backed by the `rust_randomx` crate
//!
//! The memory-heavy dataset lives in a [`Context`] shared by every worker
//! thread; reseeding swaps in a freshly built context. Each `hash_until`
//! call builds its own lightweight [`Hasher`] over the current context so
//! worker threads never contend on hasher state.

use crate::miner::algorithm::{EngineInit, HashEngine};
use crate::utils::difficulty::hash_meets_difficulty;
use crate::utils::error::MinerError;
use arc_swap::ArcSwapOption;
use rust_randomx::{Context, Hasher};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Byte offset of the 4-byte nonce inside a Monero hashing blob.
const NONCE_OFFSET: usize = 39;

/// Upper bound on engine threads; the nonce space is partitioned by a
/// one-byte thread prefix.
const MAX_THREADS: usize = 255;

/// RandomX hash engine
///
/// Thread count changes and reseeds require the caller to have quiesced
/// all workers, per the [`HashEngine`] contract; the context swap itself
/// is atomic so readers never observe a torn dataset.
pub struct RandomxEngine {
    context: ArcSwapOption<Context>,
    threads: AtomicUsize,
    fast: bool,
}

impl RandomxEngine {
    /// Creates an uninitialized engine.
    ///
    /// `fast` selects the large-memory dataset mode (~2 GB) over the
    /// light verification mode (~256 MB).
    pub fn new(fast: bool) -> Self {
        RandomxEngine {
            context: ArcSwapOption::const_empty(),
            threads: AtomicUsize::new(0),
            fast,
        }
    }
}

impl HashEngine for RandomxEngine {
    fn init(&self, threads: usize) -> Result<EngineInit, MinerError> {
        if threads == 0 || threads > MAX_THREADS {
            return Err(MinerError::EngineError(format!(
                "thread count {} out of range 1..={}",
                threads, MAX_THREADS
            )));
        }
        self.threads.store(threads, Ordering::SeqCst);
        // The dataset itself is built lazily on the first seed; nothing
        // else can fail here. Large-page probing is not exposed by the
        // backing crate, so init never reports the slow-mode case.
        Ok(EngineInit::Ready)
    }

    fn seed(&self, seed: &[u8], _init_threads: usize) -> Result<(), MinerError> {
        if seed.is_empty() {
            return Err(MinerError::EngineError("empty seed hash".into()));
        }
        log::info!("Building RandomX dataset for new seed");
        let context = Context::new(seed, self.fast);
        self.context.store(Some(Arc::new(context)));
        Ok(())
    }

    fn hash_until(
        &self,
        blob: &[u8],
        difficulty: u64,
        thread: usize,
        hash_out: &mut [u8; 32],
        nonce_out: &mut [u8; 4],
        stop: &AtomicU32,
    ) -> i64 {
        let context = match self.context.load_full() {
            Some(c) => c,
            None => {
                log::error!("hash_until called before any seed was installed");
                return 0;
            }
        };
        if blob.len() < NONCE_OFFSET + 4 {
            log::error!("blob too short to carry a nonce: {} bytes", blob.len());
            return 0;
        }

        let hasher = Hasher::new(context);
        let mut input = blob.to_vec();
        let mut counter: u32 = 0;
        let mut hashes: i64 = 0;

        loop {
            if stop.load(Ordering::Relaxed) != 0 {
                return -hashes;
            }
            // Partition the nonce space: high byte is the thread index,
            // the low three bytes count up.
            let nonce = ((thread as u32) << 24) | (counter & 0x00FF_FFFF);
            input[NONCE_OFFSET..NONCE_OFFSET + 4].copy_from_slice(&nonce.to_le_bytes());

            let output = hasher.hash(&input);
            hashes += 1;
            counter = counter.wrapping_add(1);

            let mut hash = [0u8; 32];
            hash.copy_from_slice(output.as_ref());
            if hash_meets_difficulty(&hash, difficulty) {
                hash_out.copy_from_slice(&hash);
                nonce_out.copy_from_slice(&nonce.to_le_bytes());
                return hashes;
            }
        }
    }

    fn add_thread(&self) -> Result<usize, MinerError> {
        let current = self.threads.load(Ordering::SeqCst);
        if current >= MAX_THREADS {
            return Err(MinerError::EngineError(
                "engine thread limit reached".into(),
            ));
        }
        self.threads.store(current + 1, Ordering::SeqCst);
        Ok(current + 1)
    }

    fn remove_thread(&self) -> Result<usize, MinerError> {
        let current = self.threads.load(Ordering::SeqCst);
        if current <= 1 {
            return Err(MinerError::EngineError(
                "cannot mine with fewer than one thread".into(),
            ));
        }
        self.threads.store(current - 1, Ordering::SeqCst);
        Ok(current - 1)
    }
}
