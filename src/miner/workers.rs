// src/miner/workers.rs
//! Worker pool
//!
//! Hashing happens on parallel OS threads, one per engine thread index,
//! because the engine is native and CPU-bound. All workers of a start
//! cycle share a single atomic stop flag (readable by the engine) and an
//! exit barrier: each worker holds a channel handle it drops on exit, and
//! draining the pool means awaiting the channel's closure.
//!
//! The ordering contract is load-bearing: `stop` sets the flag, waits for
//! every worker to leave the engine, and only then snapshots the stats
//! ledger. Reseeds, thread-count changes and connection swaps all happen
//! strictly after a completed `stop`.

use crate::miner::algorithm::HashEngine;
use crate::miner::submit::{submit_share, ShareContext};
use crate::network::pool::Job;
use crate::stats::StatsLedger;
use crate::utils::difficulty::{hash_difficulty, target_to_difficulty};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Pool of hashing worker threads sharing one stop flag
pub(crate) struct WorkerPool {
    engine: Arc<dyn HashEngine>,
    stats: Arc<StatsLedger>,
    stop_flag: Arc<AtomicU32>,
    barrier: Option<mpsc::Receiver<()>>,
}

impl WorkerPool {
    pub(crate) fn new(engine: Arc<dyn HashEngine>, stats: Arc<StatsLedger>) -> Self {
        WorkerPool {
            engine,
            stats,
            stop_flag: Arc::new(AtomicU32::new(1)),
            barrier: None,
        }
    }

    /// Starts `threads` workers hashing the given job.
    ///
    /// Must only be called after a completed [`WorkerPool::stop`]. A job
    /// whose blob or target doesn't decode is logged and ignored; no
    /// workers start.
    pub(crate) fn start(&mut self, job: &Job, threads: usize, share_ctx: Arc<ShareContext>) {
        debug_assert!(self.barrier.is_none(), "start called with workers live");

        let blob = match hex::decode(&job.blob) {
            Ok(b) => Arc::new(b),
            Err(e) => {
                log::error!("invalid blob {}: {}", job.blob, e);
                return;
            }
        };
        let diff_target = target_to_difficulty(&job.target);
        if diff_target == 0 {
            log::error!("job {} carries an unusable target", job.job_id);
            return;
        }

        let runtime = tokio::runtime::Handle::current();
        self.stop_flag.store(0, Ordering::SeqCst);
        let (guard_tx, guard_rx) = mpsc::channel::<()>(1);

        for thread in 0..threads {
            let engine = Arc::clone(&self.engine);
            let stats = Arc::clone(&self.stats);
            let stop = Arc::clone(&self.stop_flag);
            let blob = Arc::clone(&blob);
            let job_id = job.job_id.clone();
            let share_ctx = Arc::clone(&share_ctx);
            let runtime = runtime.clone();
            let guard = guard_tx.clone();

            std::thread::spawn(move || {
                worker_main(
                    engine, stats, blob, job_id, diff_target, thread, stop, share_ctx, runtime,
                );
                drop(guard);
            });
        }
        drop(guard_tx);
        self.barrier = Some(guard_rx);
    }

    /// Signals every worker to stop, waits for them to leave the engine,
    /// then snapshots the ledger. Idempotent.
    pub(crate) async fn stop(&mut self) {
        self.stop_flag.store(1, Ordering::SeqCst);
        if let Some(mut barrier) = self.barrier.take() {
            // Senders are only dropped, never used; recv resolves to None
            // once the last worker has exited.
            while barrier.recv().await.is_some() {}
        }
        self.stats.mark_accurate();
    }

    /// True while workers from the last `start` may still be hashing.
    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.barrier.is_some()
    }
}

/// One worker's hashing loop: hash until stopped, tallying every batch
/// and handing found shares to a background submit task so hashing
/// resumes immediately.
#[allow(clippy::too_many_arguments)]
fn worker_main(
    engine: Arc<dyn HashEngine>,
    stats: Arc<StatsLedger>,
    blob: Arc<Vec<u8>>,
    job_id: String,
    diff_target: u64,
    thread: usize,
    stop: Arc<AtomicU32>,
    share_ctx: Arc<ShareContext>,
    runtime: tokio::runtime::Handle,
) {
    let mut hash = [0u8; 32];
    let mut nonce = [0u8; 4];

    loop {
        let res = engine.hash_until(&blob, diff_target, thread, &mut hash, &mut nonce, &stop);
        if res <= 0 {
            stats.tally(-res);
            break;
        }
        stats.tally(res);
        log::info!(
            "Share found by thread {} achieving difficulty {}",
            thread,
            hash_difficulty(&hash)
        );
        let fnonce = hex::encode(nonce);
        runtime.spawn(submit_share(
            Arc::clone(&share_ctx),
            fnonce,
            job_id.clone(),
            diff_target as i64,
        ));
    }
}
