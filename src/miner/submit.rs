// src/miner/submit.rs
//! Share submission
//!
//! Each found share is submitted from its own short-lived task so the
//! worker that found it resumes hashing immediately. If the pool client
//! is down the task waits for a reconnect rather than dropping the share;
//! the dispatch loop swaps a fresh client in under the shared state.

use crate::chat::ChatQueue;
use crate::miner::coordinator::SharedState;
use crate::network::pool::PoolClient;
use crate::network::poolstats::{stats_from_submit, PoolStatsFetcher};
use crate::stats::StatsLedger;
use std::sync::Arc;
use std::time::Duration;

/// How stale cached pool-side stats may get before an accepted share
/// triggers a refresh.
const STALE_AFTER_SHARE: f64 = 5.0;

/// Everything a submit task needs, shared by all workers of a loop
pub(crate) struct ShareContext {
    pub(crate) stats: Arc<StatsLedger>,
    pub(crate) chat: Arc<ChatQueue>,
    pub(crate) shared: Arc<SharedState>,
    pub(crate) fetcher: Arc<PoolStatsFetcher>,
}

/// Submits one share, recording the outcome in the ledger.
pub(crate) async fn submit_share(
    ctx: Arc<ShareContext>,
    nonce: String,
    job_id: String,
    diff_target: i64,
) {
    // If the client isn't alive, wait for the dispatch loop to reconnect
    // and hope the share isn't stale by then. Abandon it if the user has
    // logged out entirely.
    let client: Arc<dyn PoolClient> = loop {
        let (client, logged_in) = ctx.shared.client_and_login();
        if !logged_in {
            log::warn!("logged out, abandoning share for job {}", job_id);
            return;
        }
        match client {
            Some(c) if c.is_alive() => break c,
            _ => tokio::time::sleep(Duration::from_secs(1)).await,
        }
    };

    let chats = ctx.chat.chats_to_send(diff_target);
    let reply = match client.submit_work(&nonce, &job_id, chats).await {
        Ok(r) => r,
        Err(e) => {
            client.close();
            log::warn!("Submit work client failure for job {}: {}", job_id, e);
            return;
        }
    };

    if let Some(err) = reply.error {
        ctx.stats.share_rejected();
        log::warn!("Submit work server error for job {}: {}", job_id, err);
        return;
    }

    ctx.stats.share_accepted(diff_target);

    match reply.result {
        Some(result) if result.pool_margin > 0.0 => {
            // The response carried refreshed pool-side totals.
            let username = ctx.shared.login_username().unwrap_or_default();
            if !username.is_empty() {
                ctx.stats.set_pool_stats(stats_from_submit(&username, &result));
            }
        }
        _ => {
            log::warn!("Didn't get pool stats in submit response");
            refresh_if_stale(&ctx, STALE_AFTER_SHARE);
        }
    }
}

/// Spawns a pool-stats refresh when the cache is missing, belongs to
/// another user, or is older than `max_age` seconds.
pub(crate) fn refresh_if_stale(ctx: &ShareContext, max_age: f64) {
    let Some(username) = ctx.shared.login_username() else {
        return;
    };
    let age = ctx.stats.pool_stats_age();
    if ctx.stats.pool_stats_user() == username && age >= 0.0 && age <= max_age {
        return;
    }
    spawn_refresh(Arc::clone(&ctx.fetcher), Arc::clone(&ctx.stats), username);
}

/// Fetches pool-side stats in the background and installs them.
pub(crate) fn spawn_refresh(fetcher: Arc<PoolStatsFetcher>, stats: Arc<StatsLedger>, username: String) {
    tokio::spawn(async move {
        match fetcher.refresh(&username).await {
            Ok(pool_stats) => stats.set_pool_stats(pool_stats),
            Err(e) => log::warn!("Failed to refresh pool stats for {}: {}", username, e),
        }
    });
}
