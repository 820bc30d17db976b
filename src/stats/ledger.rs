// src/stats/ledger.rs
//! Mining statistics ledger
//!
//! One process-wide ledger tracks client-side hash counts, share
//! accounting, and the cached pool-side totals. Worker threads bump the
//! hash counters with plain atomic adds while hashing; everything else is
//! serialized under a single mutex.
//!
//! Hashrate is never computed from the live counters: workers may still be
//! adding to them. Instead the dispatch loop snapshots the counters into
//! the "accurate" fields each time the worker pool is fully quiesced, and
//! hashrates derive only from those quiescent snapshots.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Minimum quiescent window before a recent hashrate is considered
/// trustworthy enough to report.
pub const ACCURACY_WINDOW: Duration = Duration::from_secs(5);

/// Sentinel recent-hashrate value meaning "still calculating".
pub const HASHRATE_CALCULATING: f64 = -1.0;

/// Pool-side totals as returned by the pool's stats endpoints or
/// piggybacked on a submit-work response.
#[derive(Debug, Clone, Default)]
pub struct PoolSideStats {
    /// Username these totals belong to
    pub username: String,
    /// Hashes credited to this user over its lifetime
    pub lifetime_hashes: i64,
    /// Total crypto paid out to this user
    pub paid: f64,
    /// Crypto owed but not yet paid out
    pub owed: f64,
    /// Estimated reward accumulated toward the next block
    pub accumulated: f64,
    /// Human-readable time-to-reward estimate, empty if unknown
    pub time_to_reward: String,
}

/// Point-in-time view of the ledger
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    /// Shares accepted by the pool
    pub shares_accepted: i64,
    /// Shares rejected by the pool
    pub shares_rejected: i64,
    /// Hashes computed by this client since startup
    pub client_side_hashes: i64,
    /// Sum of the difficulty targets of all accepted shares
    pub pool_side_hashes: i64,
    /// Lifetime hashrate (hashes/sec) derived from quiescent counters;
    /// 0.0 until enough time has elapsed
    pub hashrate: f64,
    /// Hashrate over the recent window, or [`HASHRATE_CALCULATING`] when
    /// the window is still too short to be meaningful
    pub recent_hashrate: f64,
    /// User the pool-side fields below belong to; empty means they are
    /// not valid
    pub pool_username: String,
    /// Pool-side lifetime hashes
    pub lifetime_hashes: i64,
    /// Total paid out
    pub paid: f64,
    /// Amount owed
    pub owed: f64,
    /// Reward accumulated toward the next block
    pub accumulated: f64,
    /// Time-to-reward estimate, empty if unknown
    pub time_to_reward: String,
    /// Age in seconds of the pool-side fields, or -1.0 if they were never
    /// fetched
    pub seconds_old: f64,
}

struct LedgerInner {
    start_time: Instant,
    recent_reset_time: Instant,
    accurate_time: Instant,

    shares_accepted: i64,
    shares_rejected: i64,
    pool_side_hashes: i64,

    // Counter values captured while the worker pool was quiesced. Hashrate
    // math reads only these.
    recent_hashes_at_accurate: i64,
    total_hashes_at_accurate: i64,

    pool: PoolSideStats,
    pool_updated_at: Option<Instant>,
}

/// The statistics ledger. See the module docs for the locking discipline.
pub struct StatsLedger {
    client_side_hashes: AtomicI64,
    recent_hashes: AtomicI64,
    inner: Mutex<LedgerInner>,
}

impl StatsLedger {
    /// Creates a fresh ledger with all counters zeroed and every clock set
    /// to now.
    pub fn new() -> Self {
        let now = Instant::now();
        StatsLedger {
            client_side_hashes: AtomicI64::new(0),
            recent_hashes: AtomicI64::new(0),
            inner: Mutex::new(LedgerInner {
                start_time: now,
                recent_reset_time: now,
                accurate_time: now,
                shares_accepted: 0,
                shares_rejected: 0,
                pool_side_hashes: 0,
                recent_hashes_at_accurate: 0,
                total_hashes_at_accurate: 0,
                pool: PoolSideStats::default(),
                pool_updated_at: None,
            }),
        }
    }

    /// Adds `n` hashes to the lifetime and recent counters.
    ///
    /// Safe to call from worker threads at any time; does not take the
    /// ledger lock.
    pub fn tally(&self, n: i64) {
        debug_assert!(n >= 0);
        self.client_side_hashes.fetch_add(n, Ordering::Relaxed);
        self.recent_hashes.fetch_add(n, Ordering::Relaxed);
    }

    /// Records a share accepted by the pool at the given difficulty.
    pub fn share_accepted(&self, diff_target: i64) {
        let mut inner = self.lock();
        inner.shares_accepted += 1;
        inner.pool_side_hashes += diff_target;
    }

    /// Records a share the pool rejected.
    pub fn share_rejected(&self) {
        self.lock().shares_rejected += 1;
    }

    /// Zeroes the recent counter and restarts the recent window.
    ///
    /// Called whenever an event may induce a big hashrate change:
    /// reseeding, thread count changes, reconnects, pause/resume flips.
    /// The worker pool must be quiesced.
    pub fn reset_recent(&self) {
        let mut inner = self.lock();
        self.recent_hashes.store(0, Ordering::Relaxed);
        let now = Instant::now();
        inner.recent_reset_time = now;
        inner.accurate_time = now;
        inner.recent_hashes_at_accurate = 0;
    }

    /// Snapshots the live counters into the accurate fields.
    ///
    /// Must only be called while the worker pool is quiesced; this is what
    /// makes the captured values trustworthy.
    pub fn mark_accurate(&self) {
        let mut inner = self.lock();
        inner.recent_hashes_at_accurate = self.recent_hashes.load(Ordering::Relaxed);
        inner.total_hashes_at_accurate = self.client_side_hashes.load(Ordering::Relaxed);
        inner.accurate_time = Instant::now();
    }

    /// Installs freshly fetched pool-side totals.
    pub fn set_pool_stats(&self, stats: PoolSideStats) {
        let mut inner = self.lock();
        inner.pool = stats;
        inner.pool_updated_at = Some(Instant::now());
    }

    /// Username attached to the cached pool-side totals, empty if none.
    pub fn pool_stats_user(&self) -> String {
        self.lock().pool.username.clone()
    }

    /// Age of the cached pool-side totals in seconds, or -1.0 if never
    /// fetched.
    pub fn pool_stats_age(&self) -> f64 {
        match self.lock().pool_updated_at {
            Some(t) => t.elapsed().as_secs_f64(),
            None => -1.0,
        }
    }

    /// Produces a point-in-time view of the ledger.
    ///
    /// When `is_mining` the lifetime rate uses the last quiescent time as
    /// its endpoint, since the live counters may be ahead of the accurate
    /// snapshot. Recent hashrate is reported only while mining and only
    /// once the quiescent window exceeds [`ACCURACY_WINDOW`].
    pub fn snapshot(&self, is_mining: bool) -> StatsSnapshot {
        let inner = self.lock();

        let end = if is_mining {
            inner.accurate_time
        } else {
            Instant::now()
        };
        let elapsed_overall = end.saturating_duration_since(inner.start_time).as_secs_f64();

        let hashrate = if elapsed_overall > 0.0 {
            inner.total_hashes_at_accurate as f64 / elapsed_overall
        } else {
            0.0
        };

        let window = inner
            .accurate_time
            .saturating_duration_since(inner.recent_reset_time);
        let recent_hashrate = if is_mining && window > ACCURACY_WINDOW {
            inner.recent_hashes_at_accurate as f64 / window.as_secs_f64()
        } else {
            HASHRATE_CALCULATING
        };

        StatsSnapshot {
            shares_accepted: inner.shares_accepted,
            shares_rejected: inner.shares_rejected,
            client_side_hashes: self.client_side_hashes.load(Ordering::Relaxed),
            pool_side_hashes: inner.pool_side_hashes,
            hashrate,
            recent_hashrate,
            pool_username: inner.pool.username.clone(),
            lifetime_hashes: inner.pool.lifetime_hashes,
            paid: inner.pool.paid,
            owed: inner.pool.owed,
            accumulated: inner.pool.accumulated,
            time_to_reward: inner.pool.time_to_reward.clone(),
            seconds_old: match inner.pool_updated_at {
                Some(t) => t.elapsed().as_secs_f64(),
                None => -1.0,
            },
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerInner> {
        // A poisoned ledger mutex means a panic mid-bookkeeping; the
        // counters are still usable for reporting.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Shifts every clock back by `by`, simulating elapsed time.
    #[cfg(test)]
    pub(crate) fn backdate(&self, by: Duration) {
        let mut inner = self.lock();
        inner.start_time -= by;
        inner.recent_reset_time -= by;
    }
}

impl Default for StatsLedger {
    fn default() -> Self {
        StatsLedger::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_feeds_both_counters() {
        let ledger = StatsLedger::new();
        ledger.tally(120);
        ledger.tally(30);
        let snap = ledger.snapshot(false);
        assert_eq!(snap.client_side_hashes, 150);
    }

    #[test]
    fn recent_counter_is_exactly_the_tallies_since_reset() {
        let ledger = StatsLedger::new();
        ledger.tally(1000);
        ledger.reset_recent();
        ledger.tally(25);
        ledger.tally(75);
        ledger.mark_accurate();
        let inner = ledger.lock();
        assert_eq!(inner.recent_hashes_at_accurate, 100);
        assert_eq!(inner.total_hashes_at_accurate, 1100);
    }

    #[test]
    fn share_accounting() {
        let ledger = StatsLedger::new();
        ledger.share_accepted(5000);
        ledger.share_accepted(7000);
        ledger.share_rejected();
        let snap = ledger.snapshot(false);
        assert_eq!(snap.shares_accepted, 2);
        assert_eq!(snap.shares_rejected, 1);
        assert_eq!(snap.pool_side_hashes, 12000);
    }

    #[test]
    fn recent_hashrate_is_sentinel_inside_accuracy_window() {
        let ledger = StatsLedger::new();
        ledger.tally(100_000);
        ledger.mark_accurate();
        // Window is nearly zero, so even while mining we must not report.
        let snap = ledger.snapshot(true);
        assert_eq!(snap.recent_hashrate, HASHRATE_CALCULATING);
    }

    #[test]
    fn recent_hashrate_reported_after_window_elapses() {
        let ledger = StatsLedger::new();
        ledger.backdate(Duration::from_secs(6));
        ledger.tally(120_000);
        ledger.mark_accurate();
        let snap = ledger.snapshot(true);
        // 120000 hashes over ~6 seconds.
        assert!(snap.recent_hashrate > 15_000.0 && snap.recent_hashrate < 25_000.0);
        assert!(snap.hashrate > 15_000.0 && snap.hashrate < 25_000.0);
    }

    #[test]
    fn recent_hashrate_never_reported_when_not_mining() {
        let ledger = StatsLedger::new();
        ledger.backdate(Duration::from_secs(10));
        ledger.tally(50_000);
        ledger.mark_accurate();
        assert_eq!(ledger.snapshot(false).recent_hashrate, HASHRATE_CALCULATING);
    }

    #[test]
    fn reset_recent_zeroes_the_window() {
        let ledger = StatsLedger::new();
        ledger.backdate(Duration::from_secs(10));
        ledger.tally(50_000);
        ledger.mark_accurate();
        ledger.reset_recent();
        let snap = ledger.snapshot(true);
        assert_eq!(snap.recent_hashrate, HASHRATE_CALCULATING);
        // Lifetime counters survive the reset.
        assert_eq!(snap.client_side_hashes, 50_000);
    }

    #[test]
    fn accurate_time_is_monotonic() {
        let ledger = StatsLedger::new();
        ledger.mark_accurate();
        let t1 = ledger.lock().accurate_time;
        ledger.mark_accurate();
        let t2 = ledger.lock().accurate_time;
        assert!(t2 >= t1);
    }

    #[test]
    fn pool_stats_validity_tracks_username_and_age() {
        let ledger = StatsLedger::new();
        let snap = ledger.snapshot(false);
        assert!(snap.pool_username.is_empty());
        assert_eq!(snap.seconds_old, -1.0);

        ledger.set_pool_stats(PoolSideStats {
            username: "worker1".into(),
            lifetime_hashes: 42,
            paid: 1.5,
            owed: 0.25,
            accumulated: 0.003,
            time_to_reward: "2.50 days".into(),
        });
        let snap = ledger.snapshot(false);
        assert_eq!(snap.pool_username, "worker1");
        assert_eq!(snap.lifetime_hashes, 42);
        assert!(snap.seconds_old >= 0.0);
        assert_eq!(ledger.pool_stats_user(), "worker1");
        assert!(ledger.pool_stats_age() >= 0.0);
    }
}
