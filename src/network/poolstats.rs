// src/network/poolstats.rs
//! Pool-side statistics refresher
//!
//! Two HTTP JSON endpoints report a worker's standing and the pool-wide
//! reward cycle; from them we derive the normalized cycle progress, the
//! reward accumulated so far, and a human-readable time-to-reward
//! estimate. Accepted shares sometimes piggyback the same totals, which
//! [`stats_from_submit`] converts without a network round trip.

use crate::network::pool::SubmitResult;
use crate::stats::PoolSideStats;
use crate::utils::error::MinerError;
use serde::Deserialize;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Default base URL of the pool's web endpoints
pub const DEFAULT_STATS_URL: &str = "https://cryptonote.social";

#[derive(Debug, Deserialize)]
struct WorkerStatsReply {
    #[serde(rename = "Code", default)]
    code: i32,
    #[serde(rename = "CycleProgress", default)]
    cycle_progress: f64,
    #[serde(rename = "Hashrate1", default)]
    _hashrate1: i64,
    #[serde(rename = "Hashrate24", default)]
    _hashrate24: i64,
    #[serde(rename = "LifetimeHashes", default)]
    lifetime_hashes: i64,
    #[serde(rename = "LifetimeBestHash", default)]
    _lifetime_best_hash: i64,
    #[serde(rename = "Donate", default)]
    _donate: f64,
    #[serde(rename = "AmountPaid", default)]
    amount_paid: f64,
    #[serde(rename = "AmountOwed", default)]
    amount_owed: f64,
}

#[derive(Debug, Deserialize)]
struct PoolStatsReply {
    #[serde(rename = "Code", default)]
    code: i32,
    #[serde(rename = "NextBlockReward", default)]
    next_block_reward: f64,
    #[serde(rename = "Margin", default)]
    margin: f64,
    #[serde(rename = "PPROPProgress", default)]
    pprop_progress: f64,
    #[serde(rename = "PPROPHashrate", default)]
    pprop_hashrate: i64,
    #[serde(rename = "NetworkDifficulty", default)]
    network_difficulty: i64,
    // Network difficulty averaged over the past hour.
    #[serde(rename = "SmoothedDifficulty", default)]
    smoothed_difficulty: i64,
}

/// Fetches pool-side statistics over HTTP
pub struct PoolStatsFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl PoolStatsFetcher {
    /// Creates a fetcher against the given base URL.
    ///
    /// # Errors
    /// Returns `MinerError::HttpError` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, MinerError> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(PoolStatsFetcher {
            client,
            base_url: base_url.into(),
        })
    }

    /// Fetches worker and pool stats for `username` and derives the
    /// combined pool-side view.
    ///
    /// # Errors
    /// Returns the underlying HTTP/JSON error; callers retry on the next
    /// scheduled refresh.
    pub async fn refresh(&self, username: &str) -> Result<PoolSideStats, MinerError> {
        let worker: WorkerStatsReply = self
            .client
            .post(format!("{}/json/WorkerStats", self.base_url))
            .json(&serde_json::json!({ "Coin": "xmr", "Worker": username }))
            .send()
            .await?
            .json()
            .await?;

        let pool: PoolStatsReply = self
            .client
            .post(format!("{}/json/PoolStats", self.base_url))
            .json(&serde_json::json!({ "Coin": "xmr" }))
            .send()
            .await?
            .json()
            .await?;

        if worker.code != 0 || pool.code != 0 {
            log::warn!(
                "pool stats endpoints returned codes {}/{}",
                worker.code,
                pool.code
            );
        }

        let mut diff = pool.smoothed_difficulty as f64;
        if diff == 0.0 {
            diff = pool.network_difficulty as f64;
        }
        let progress = worker.cycle_progress / (1.0 + pool.margin);

        Ok(PoolSideStats {
            username: username.to_string(),
            lifetime_hashes: worker.lifetime_hashes,
            paid: worker.amount_paid,
            owed: worker.amount_owed,
            accumulated: accumulated_reward(pool.next_block_reward, progress),
            time_to_reward: time_to_reward(
                diff,
                pool.margin,
                pool.pprop_progress,
                pool.pprop_hashrate as f64,
            ),
        })
    }
}

/// Derives pool-side stats from totals piggybacked on a submit response.
pub fn stats_from_submit(username: &str, r: &SubmitResult) -> PoolSideStats {
    let progress = r.progress / (1.0 + r.pool_margin);
    PoolSideStats {
        username: username.to_string(),
        lifetime_hashes: r.lifetime_hashes,
        paid: r.paid,
        owed: r.owed,
        accumulated: accumulated_reward(r.next_block_reward, progress),
        time_to_reward: time_to_reward(
            r.network_difficulty as f64,
            r.pool_margin,
            r.pprop_progress,
            r.pprop_hashrate as f64,
        ),
    }
}

fn accumulated_reward(next_block_reward: f64, progress: f64) -> f64 {
    if next_block_reward > 0.0 && progress > 0.0 {
        next_block_reward * progress
    } else {
        0.0
    }
}

/// Renders the time-to-reward estimate: days, cascading down to hours and
/// minutes for short estimates, "overdue" for negative ones, empty when
/// the collective hashrate is unknown.
fn time_to_reward(diff: f64, margin: f64, pprop_progress: f64, pprop_hashrate: f64) -> String {
    if pprop_hashrate <= 0.0 {
        return String::new();
    }
    let mut ttr = (diff * (1.0 + margin) - pprop_progress * diff) / pprop_hashrate / 3600.0 / 24.0;
    if ttr > 0.0 {
        if ttr < 1.0 {
            ttr *= 24.0;
            if ttr < 1.0 {
                ttr *= 60.0;
                format!("{:.2} min", ttr)
            } else {
                format!("{:.2} hrs", ttr)
            }
        } else {
            format!("{:.2} days", ttr)
        }
    } else if ttr < 0.0 {
        "overdue".to_string()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_to_reward_cascades_units() {
        // 2 days of work left at this rate.
        let two_days = 2.0 * 86400.0;
        assert_eq!(time_to_reward(two_days, 0.0, 0.0, 1.0), "2.00 days");
        // Half a day renders as hours.
        assert_eq!(time_to_reward(43200.0, 0.0, 0.0, 1.0), "12.00 hrs");
        // Half an hour renders as minutes.
        assert_eq!(time_to_reward(1800.0, 0.0, 0.0, 1.0), "30.00 min");
    }

    #[test]
    fn time_to_reward_overdue_and_unknown() {
        // Progress past the margin-adjusted difficulty: overdue.
        assert_eq!(time_to_reward(86400.0, 0.0, 2.0, 1.0), "overdue");
        // No collective hashrate: no estimate.
        assert_eq!(time_to_reward(86400.0, 0.0, 0.5, 0.0), "");
    }

    #[test]
    fn margin_stretches_the_estimate() {
        let base = time_to_reward(86400.0, 0.0, 0.0, 1.0);
        let with_margin = time_to_reward(86400.0, 1.0, 0.0, 1.0);
        assert_eq!(base, "1.00 days");
        assert_eq!(with_margin, "2.00 days");
    }

    #[test]
    fn accumulated_reward_requires_positive_inputs() {
        assert_eq!(accumulated_reward(0.6, 0.5), 0.3);
        assert_eq!(accumulated_reward(0.0, 0.5), 0.0);
        assert_eq!(accumulated_reward(0.6, 0.0), 0.0);
    }

    #[test]
    fn submit_totals_normalize_progress_by_margin() {
        let r = SubmitResult {
            status: "OK".into(),
            progress: 0.5,
            lifetime_hashes: 123,
            paid: 1.0,
            owed: 0.5,
            pprop_hashrate: 1,
            pprop_progress: 0.0,
            next_block_reward: 1.0,
            network_difficulty: 86400,
            pool_margin: 1.0,
            pool_fee: 0.0,
        };
        let stats = stats_from_submit("worker1", &r);
        assert_eq!(stats.username, "worker1");
        assert_eq!(stats.lifetime_hashes, 123);
        // progress normalized to 0.25, reward 1.0 -> accumulated 0.25
        assert!((stats.accumulated - 0.25).abs() < 1e-9);
        assert_eq!(stats.time_to_reward, "2.00 days");
    }
}
