// src/miner/dispatch.rs
//! The dispatch loop
//!
//! One task owns the mining decision: it multiplexes the pool's job
//! stream, a command ("poke") channel, and a 30-second idle tick. Every
//! iteration quiesces the workers, reconciles the engine seed with the
//! current job, re-evaluates the activity state, and either respawns the
//! workers or stays paused. The engine forbids reseeds and thread-count
//! changes with workers live, so the quiesce-first ordering is not
//! optional.
//!
//! Connection loss arrives as the job channel closing; the loop then
//! reconnects with a linear backoff, staying responsive to Exit pokes the
//! whole time.

use crate::miner::coordinator::SharedState;
use crate::miner::submit::{refresh_if_stale, ShareContext};
use crate::miner::workers::WorkerPool;
use crate::network::pool::{Job, PoolClient, PoolConnector};
use crate::utils::difficulty::target_to_difficulty;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Commands delivered to the dispatch loop
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Poke {
    /// An activity-relevant flag changed; re-evaluate
    StateChange,
    /// Add a hashing thread
    IncreaseThreads,
    /// Remove a hashing thread
    DecreaseThreads,
    /// Advance the loop so the stats ledger gets a fresh quiescent snapshot
    UpdateStats,
    /// Terminate the loop
    Exit,
}

/// Capacity of the poke channel; small buffering for when the network is
/// bad and callers poke faster than the loop drains.
pub(crate) const POKE_BUFFER: usize = 5;

const IDLE_TICK: Duration = Duration::from_secs(30);
const RECONNECT_BACKOFF_START: Duration = Duration::from_secs(3);
const RECONNECT_BACKOFF_STEP: Duration = Duration::from_secs(1);

/// How stale cached pool-side stats may get before the idle tick
/// refreshes them.
const STALE_ON_TICK: f64 = 120.0;

/// Shared collaborators handed to a freshly spawned loop
pub(crate) struct DispatchCtx {
    pub(crate) shared: Arc<SharedState>,
    pub(crate) connector: Arc<dyn PoolConnector>,
    pub(crate) share_ctx: Arc<ShareContext>,
}

enum Wake {
    Poke(Poke),
    Job(Box<Job>),
    JobChannelClosed,
    Tick,
}

/// Runs until an Exit poke (or the poke channel closing) terminates it,
/// then signals `done`. Spawned by a successful pool login; at most one
/// instance is ever live.
pub(crate) async fn mining_loop(
    ctx: DispatchCtx,
    mut jobs: mpsc::Receiver<Job>,
    mut pokes: mpsc::Receiver<Poke>,
    done: oneshot::Sender<()>,
) {
    let stats = Arc::clone(&ctx.share_ctx.stats);
    let mut pool = WorkerPool::new(ctx.shared.engine(), Arc::clone(&stats));

    // Fresh stats baseline for the new connection.
    pool.stop().await;
    stats.reset_recent();

    let mut job: Option<Job> = None;
    let mut last_activity = None;
    let mut backoff = RECONNECT_BACKOFF_START;

    loop {
        let wake = tokio::select! {
            poke = pokes.recv() => Wake::Poke(poke.unwrap_or(Poke::Exit)),
            received = jobs.recv() => match received {
                Some(j) => Wake::Job(Box::new(j)),
                None => Wake::JobChannelClosed,
            },
            _ = tokio::time::sleep(IDLE_TICK) => Wake::Tick,
        };

        match wake {
            Wake::Poke(Poke::Exit) => {
                log::info!("Stopping mining loop");
                pool.stop().await;
                let _ = done.send(());
                return;
            }
            Wake::Poke(poke) => {
                apply_poke(&ctx, &mut pool, poke).await;
                if job.is_none() {
                    log::warn!("no job to work on");
                    continue;
                }
            }
            Wake::JobChannelClosed => {
                log::info!("pool connection closed, reconnecting...");
                if let Some(client) = ctx.shared.take_client() {
                    client.close();
                }
                match reconnect(&ctx).await {
                    Some(new_jobs) => {
                        // Fresh stats for the new connection.
                        pool.stop().await;
                        stats.reset_recent();
                        backoff = RECONNECT_BACKOFF_START;
                        jobs = new_jobs;
                    }
                    None => {
                        log::info!(
                            "reconnect failed, sleeping {:?} before trying again",
                            backoff
                        );
                        if backoff_sleep(&ctx, &mut pool, &mut pokes, backoff).await {
                            let _ = done.send(());
                            return;
                        }
                        backoff += RECONNECT_BACKOFF_STEP;
                    }
                }
                continue;
            }
            Wake::Job(new_job) => {
                log::info!(
                    "Current job: {}  Difficulty: {}",
                    new_job.job_id,
                    target_to_difficulty(&new_job.target)
                );
                maybe_fetch_chats(&ctx, &new_job);
                job = Some(*new_job);
            }
            Wake::Tick => {
                refresh_if_stale(&ctx.share_ctx, STALE_ON_TICK);
            }
        }

        let Some(current) = job.as_ref() else {
            // Nothing to mine yet; stay on the select.
            continue;
        };

        pool.stop().await;

        // Reconcile the engine dataset with the job's seed.
        let new_seed = match hex::decode(&current.seed_hash) {
            Ok(s) => s,
            Err(e) => {
                log::error!("invalid seed hash {}: {}", current.seed_hash, e);
                continue;
            }
        };
        if ctx.shared.last_seed() != new_seed {
            log::info!("New seed: {}", current.seed_hash);
            match ctx
                .shared
                .engine()
                .seed(&new_seed, num_cpus::get())
            {
                Ok(()) => {
                    ctx.shared.set_last_seed(new_seed);
                    stats.reset_recent();
                }
                Err(e) => {
                    // Keep the job and the loop alive; no workers may
                    // start until a usable seed arrives.
                    log::error!("engine reseed failed: {}", e);
                    continue;
                }
            }
        }

        let activity = ctx.shared.activity(&ctx.share_ctx.chat);
        if last_activity != Some(activity) {
            log::info!("New activity state: {}", activity);
            if let Some(last) = last_activity {
                if last.is_paused() != activity.is_paused() {
                    stats.reset_recent();
                }
            }
            last_activity = Some(activity);
        }
        if activity.is_paused() {
            continue;
        }

        pool.start(current, ctx.shared.threads(), Arc::clone(&ctx.share_ctx));
    }
}

async fn apply_poke(ctx: &DispatchCtx, pool: &mut WorkerPool, poke: Poke) {
    match poke {
        Poke::IncreaseThreads => {
            pool.stop().await;
            match ctx.shared.engine().add_thread() {
                Ok(t) => {
                    ctx.shared.set_threads(t);
                    log::info!("Increased # of threads to {}", t);
                    ctx.share_ctx.stats.reset_recent();
                }
                Err(e) => log::error!("Failed to add another thread: {}", e),
            }
        }
        Poke::DecreaseThreads => {
            pool.stop().await;
            match ctx.shared.engine().remove_thread() {
                Ok(t) => {
                    ctx.shared.set_threads(t);
                    log::info!("Decreased # of threads to {}", t);
                    ctx.share_ctx.stats.reset_recent();
                }
                Err(e) => log::error!("Failed to decrease threads: {}", e),
            }
        }
        Poke::StateChange => {
            pool.stop().await;
            ctx.share_ctx.stats.reset_recent();
        }
        // Nothing to apply; the loop advancing is the point, since it
        // quiesces the workers and refreshes the accurate snapshot.
        Poke::UpdateStats => {}
        Poke::Exit => unreachable!("Exit is handled by the caller"),
    }
}

/// A single reconnect attempt with the preserved login credentials.
/// Returns the new job channel on success.
async fn reconnect(ctx: &DispatchCtx) -> Option<mpsc::Receiver<Job>> {
    let login = ctx.shared.login()?;
    log::info!("Attempting to reconnect...");
    match ctx.connector.connect(&login).await {
        Ok(session) => {
            if let Some(w) = session.warning {
                log::warn!("Pool server returned login warning: {}", w.message);
            }
            ctx.shared.set_client(Arc::clone(&session.client));
            Some(session.jobs)
        }
        Err(e) => {
            log::error!("Connect to pool server failed: {}", e);
            None
        }
    }
}

/// Sleeps out a failed reconnect while still servicing pokes. Returns
/// true when an Exit poke (or poke channel closure) requested loop
/// termination.
async fn backoff_sleep(
    ctx: &DispatchCtx,
    pool: &mut WorkerPool,
    pokes: &mut mpsc::Receiver<Poke>,
    backoff: Duration,
) -> bool {
    let deadline = tokio::time::sleep(backoff);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => return false,
            poke = pokes.recv() => match poke.unwrap_or(Poke::Exit) {
                Poke::Exit => {
                    log::info!("Stopping mining loop");
                    pool.stop().await;
                    return true;
                }
                poke => apply_poke(ctx, pool, poke).await,
            },
        }
    }
}

/// When a job carries a chat token we haven't consumed, fetch the new
/// chats in the background.
fn maybe_fetch_chats(ctx: &DispatchCtx, job: &Job) {
    let chat = Arc::clone(&ctx.share_ctx.chat);
    let current = chat.next_token();
    if job.chat_token == current {
        return;
    }
    let Some(client) = ctx.shared.client() else {
        return;
    };
    tokio::spawn(async move {
        match client.get_chats(current).await {
            Ok(reply) => chat.chats_received(reply.chats, reply.next_token, current),
            Err(e) => log::warn!("chat fetch failed: {}", e),
        }
    });
}
