// src/miner/coordinator.rs
//! The miner coordinator
//!
//! [`Miner`] is the public face of the crate: it owns the stats ledger,
//! the chat queues, the hash engine handle, and the shared dispatch
//! configuration, and it brokers every external request into the dispatch
//! loop via pokes. A successful pool login spawns exactly one dispatch
//! loop; logging in again tears the previous loop down first and only
//! then installs the new connection.

use crate::chat::{ChatQueue, ReceivedChat};
use crate::config::{LoginConfig, MinerConfig};
use crate::miner::activity::{evaluate, ActivityInputs};
use crate::miner::algorithm::{EngineInit, HashEngine};
use crate::miner::dispatch::{mining_loop, DispatchCtx, Poke, POKE_BUFFER};
use crate::miner::submit::{spawn_refresh, ShareContext};
use crate::network::pool::{PoolClient, PoolConnector};
use crate::network::poolstats::PoolStatsFetcher;
use crate::stats::{StatsLedger, StatsSnapshot};
use crate::types::{Activity, MiningOverride};
use crate::utils::error::MinerError;
use chrono::Timelike;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

/// Result of miner initialization
#[derive(Debug, Clone)]
pub struct InitResponse {
    /// 1 = ok; 2 = ok but hugepages unavailable, mining may be slow;
    /// > 2 = configuration error; < 0 = fatal, the program should exit
    pub code: i32,
    /// Human-readable detail for non-1 codes
    pub message: String,
}

/// Result of a pool login attempt
#[derive(Debug, Clone)]
pub struct PoolLoginResponse {
    /// 1 = success (message may carry a warning); > 1 = server refused the
    /// login, retry with new parameters; < 0 = transport failure, retry
    /// later
    pub code: i32,
    /// Warning or error text to surface to the user
    pub message: String,
    /// Server-assigned id of the warning message, 0 if none
    pub message_id: i32,
}

/// Read-only view of the miner returned by [`Miner::mining_state`]
#[derive(Debug, Clone)]
pub struct MiningState {
    /// Counters and hashrates from the stats ledger
    pub snapshot: StatsSnapshot,
    /// Current activity state; negative codes say why mining is paused
    pub activity: Activity,
    /// Current hashing thread count
    pub threads: usize,
}

struct DispatchConfig {
    login: Option<LoginConfig>,
    client: Option<Arc<dyn PoolClient>>,
    threads: usize,
    last_seed: Vec<u8>,
    exclude_hour_start: u32,
    exclude_hour_end: u32,
    battery_power: bool,
    screen_idle: bool,
    override_state: MiningOverride,
}

/// Dispatch configuration shared between the coordinator, the dispatch
/// loop, and submit tasks. One mutex guards the lot; critical sections
/// are short and never cross an await point.
pub(crate) struct SharedState {
    engine: Arc<dyn HashEngine>,
    cfg: Mutex<DispatchConfig>,
}

impl SharedState {
    fn new(engine: Arc<dyn HashEngine>, config: &MinerConfig) -> Self {
        SharedState {
            engine,
            cfg: Mutex::new(DispatchConfig {
                login: None,
                client: None,
                threads: config.threads,
                last_seed: Vec::new(),
                exclude_hour_start: config.exclude_hour_start,
                exclude_hour_end: config.exclude_hour_end,
                battery_power: false,
                // Until a platform monitor reports otherwise, assume the
                // screen is idle so headless rigs mine.
                screen_idle: true,
                override_state: MiningOverride::None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DispatchConfig> {
        self.cfg.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn engine(&self) -> Arc<dyn HashEngine> {
        Arc::clone(&self.engine)
    }

    pub(crate) fn login(&self) -> Option<LoginConfig> {
        self.lock().login.clone()
    }

    pub(crate) fn login_username(&self) -> Option<String> {
        self.lock().login.as_ref().map(|l| l.username.clone())
    }

    pub(crate) fn clear_login(&self) {
        self.lock().login = None;
    }

    pub(crate) fn client(&self) -> Option<Arc<dyn PoolClient>> {
        self.lock().client.clone()
    }

    pub(crate) fn client_and_login(&self) -> (Option<Arc<dyn PoolClient>>, bool) {
        let cfg = self.lock();
        (cfg.client.clone(), cfg.login.is_some())
    }

    pub(crate) fn set_client(&self, client: Arc<dyn PoolClient>) {
        self.lock().client = Some(client);
    }

    pub(crate) fn take_client(&self) -> Option<Arc<dyn PoolClient>> {
        self.lock().client.take()
    }

    pub(crate) fn threads(&self) -> usize {
        self.lock().threads
    }

    pub(crate) fn set_threads(&self, threads: usize) {
        self.lock().threads = threads;
    }

    pub(crate) fn last_seed(&self) -> Vec<u8> {
        self.lock().last_seed.clone()
    }

    pub(crate) fn set_last_seed(&self, seed: Vec<u8>) {
        self.lock().last_seed = seed;
    }

    #[cfg(test)]
    pub(crate) fn set_screen_idle(&self, idle: bool) {
        self.lock().screen_idle = idle;
    }

    #[cfg(test)]
    pub(crate) fn new_for_tests(engine: Arc<dyn HashEngine>, config: &MinerConfig) -> Self {
        SharedState::new(engine, config)
    }

    #[cfg(test)]
    pub(crate) fn set_login_for_tests(&self, login: LoginConfig) {
        self.lock().login = Some(login);
    }

    /// Evaluates the activity state from the current flags and clock.
    pub(crate) fn activity(&self, chat: &ChatQueue) -> Activity {
        let pending_chats = chat.has_chats_to_send();
        let cfg = self.lock();
        evaluate(&ActivityInputs {
            logged_in: cfg.login.is_some(),
            connection_alive: cfg.client.as_ref().map(|c| c.is_alive()).unwrap_or(false),
            override_state: cfg.override_state,
            battery_power: cfg.battery_power,
            screen_idle: cfg.screen_idle,
            hour: chrono::Local::now().hour(),
            exclude_hour_start: cfg.exclude_hour_start,
            exclude_hour_end: cfg.exclude_hour_end,
            pending_chats,
        })
    }
}

struct LiveLoop {
    pokes: mpsc::Sender<Poke>,
    done: oneshot::Receiver<()>,
}

/// The mining coordinator
///
/// Construct exactly one per process with [`Miner::init`]; the hash
/// engine behind it is a process-wide singleton.
pub struct Miner {
    stats: Arc<StatsLedger>,
    chat: Arc<ChatQueue>,
    shared: Arc<SharedState>,
    connector: Arc<dyn PoolConnector>,
    fetcher: Arc<PoolStatsFetcher>,
    // Guard for login teardown/spawn; also serializes concurrent logins.
    live: tokio::sync::Mutex<Option<LiveLoop>>,
    // Sync handle for posting pokes without awaiting the login mutex.
    pokes: Mutex<Option<mpsc::Sender<Poke>>>,
}

impl Miner {
    /// Initializes the miner: validates the config, initializes the hash
    /// engine, and sets up a fresh stats ledger.
    ///
    /// Must be called exactly once, before any other operation. The `Ok`
    /// response code is 1, or 2 when the engine came up without huge
    /// pages; the `Err` response carries code > 2 for configuration
    /// errors and < 0 for fatal engine failures.
    pub fn init(
        config: &MinerConfig,
        engine: Arc<dyn HashEngine>,
        connector: Arc<dyn PoolConnector>,
        stats_url: &str,
    ) -> Result<(Miner, InitResponse), InitResponse> {
        if let Err(e) = config.validate() {
            return Err(InitResponse {
                code: 3,
                message: e.to_string(),
            });
        }

        let init = match engine.init(config.threads) {
            Ok(i) => i,
            Err(e) => {
                log::error!("Failed to initialize hash engine: {}", e);
                return Err(InitResponse {
                    code: -3,
                    message: format!("Failed to initialize hash engine: {}", e),
                });
            }
        };

        let fetcher = match PoolStatsFetcher::new(stats_url) {
            Ok(f) => Arc::new(f),
            Err(e) => {
                return Err(InitResponse {
                    code: -4,
                    message: format!("Failed to build HTTP client: {}", e),
                });
            }
        };

        let miner = Miner {
            stats: Arc::new(StatsLedger::new()),
            chat: Arc::new(ChatQueue::new()),
            shared: Arc::new(SharedState::new(engine, config)),
            connector,
            fetcher,
            live: tokio::sync::Mutex::new(None),
            pokes: Mutex::new(None),
        };
        log::info!("miner initialized");

        let response = match init {
            EngineInit::Ready => InitResponse {
                code: 1,
                message: String::new(),
            },
            EngineInit::ReadyNoHugePages => InitResponse {
                code: 2,
                message: "hugepages unavailable; mining may be slow".into(),
            },
        };
        Ok((miner, response))
    }

    /// Logs into the pool, replacing any previous session.
    ///
    /// An existing dispatch loop is told to exit and fully drained before
    /// the new connection is installed, so at most one loop is ever live.
    /// Returns only after the previous loop has terminated.
    pub async fn pool_login(&self, args: &LoginConfig) -> PoolLoginResponse {
        log::info!("Pool login called");
        let mut live = self.live.lock().await;
        if let Some(previous) = live.take() {
            log::info!("Pool login: shutting down previous mining loop");
            self.pokes.lock().unwrap_or_else(|e| e.into_inner()).take();
            let _ = previous.pokes.send(Poke::Exit).await;
            let _ = previous.done.await;
            log::info!("Pool login: previous loop done");
        }
        self.shared.clear_login();

        if let Err(e) = args.validate() {
            return PoolLoginResponse {
                code: 2,
                message: e.to_string(),
                message_id: 0,
            };
        }

        let session = match self.connector.connect(args).await {
            Ok(s) => s,
            Err(MinerError::LoginRefused { code, message }) => {
                return PoolLoginResponse {
                    code: 2,
                    message,
                    message_id: code,
                };
            }
            Err(e) => {
                return PoolLoginResponse {
                    code: -1,
                    message: e.to_string(),
                    message_id: 0,
                };
            }
        };

        let mut response = PoolLoginResponse {
            code: 1,
            message: String::new(),
            message_id: 0,
        };
        if let Some(warning) = session.warning {
            response.message = warning.message;
            response.message_id = warning.code;
        }

        {
            let mut cfg = self.shared.lock();
            cfg.login = Some(args.clone());
            cfg.client = Some(Arc::clone(&session.client));
        }
        spawn_refresh(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.stats),
            args.username.clone(),
        );

        let (poke_tx, poke_rx) = mpsc::channel(POKE_BUFFER);
        let (done_tx, done_rx) = oneshot::channel();
        *self.pokes.lock().unwrap_or_else(|e| e.into_inner()) = Some(poke_tx.clone());
        *live = Some(LiveLoop {
            pokes: poke_tx,
            done: done_rx,
        });

        tokio::spawn(mining_loop(
            DispatchCtx {
                shared: Arc::clone(&self.shared),
                connector: Arc::clone(&self.connector),
                share_ctx: Arc::new(ShareContext {
                    stats: Arc::clone(&self.stats),
                    chat: Arc::clone(&self.chat),
                    shared: Arc::clone(&self.shared),
                    fetcher: Arc::clone(&self.fetcher),
                }),
            },
            session.jobs,
            poke_rx,
            done_tx,
        ));

        log::info!("Successful login: {}", args.username);
        response
    }

    /// Tears down the dispatch loop and pool connection, if any.
    ///
    /// The miner can be logged in again afterwards.
    pub async fn shutdown(&self) {
        let mut live = self.live.lock().await;
        if let Some(previous) = live.take() {
            self.pokes.lock().unwrap_or_else(|e| e.into_inner()).take();
            let _ = previous.pokes.send(Poke::Exit).await;
            let _ = previous.done.await;
        }
        self.shared.clear_login();
        if let Some(client) = self.shared.take_client() {
            client.close();
        }
    }

    /// Current mining state: stats snapshot, activity, thread count.
    ///
    /// Pool-side stats belonging to a different user than the current
    /// login are reported as invalid (username blanked into the current
    /// one, `seconds_old` forced to -1).
    pub fn mining_state(&self) -> MiningState {
        let activity = self.shared.activity(&self.chat);
        let mut snapshot = self.stats.snapshot(activity.is_mining());
        let (login_user, threads) = {
            let cfg = self.shared.lock();
            (
                cfg.login.as_ref().map(|l| l.username.clone()),
                cfg.threads,
            )
        };
        match login_user {
            None => {
                snapshot.pool_username.clear();
                snapshot.seconds_old = -1.0;
            }
            Some(user) if user != snapshot.pool_username => {
                // Pool stats don't (yet) reflect the logged-in user.
                snapshot.pool_username = user;
                snapshot.seconds_old = -1.0;
            }
            Some(_) => {}
        }
        MiningState {
            snapshot,
            activity,
            threads,
        }
    }

    /// Adds a hashing thread. Routed through the dispatch loop when one
    /// is live (the engine must be quiesced first); applied inline
    /// otherwise.
    pub fn increase_threads(&self) {
        if self.poke(Poke::IncreaseThreads) {
            return;
        }
        match self.shared.engine().add_thread() {
            Ok(t) => self.shared.set_threads(t),
            Err(e) => log::error!("Failed to add another thread: {}", e),
        }
    }

    /// Removes a hashing thread; counterpart of
    /// [`Miner::increase_threads`].
    pub fn decrease_threads(&self) {
        if self.poke(Poke::DecreaseThreads) {
            return;
        }
        match self.shared.engine().remove_thread() {
            Ok(t) => self.shared.set_threads(t),
            Err(e) => log::error!("Failed to decrease threads: {}", e),
        }
    }

    /// Forces mining on or off regardless of environmental signals.
    pub fn override_mining_activity(&self, mine: bool) {
        let new_state = if mine {
            MiningOverride::Mine
        } else {
            MiningOverride::Pause
        };
        {
            let mut cfg = self.shared.lock();
            if cfg.override_state == new_state {
                return;
            }
            cfg.override_state = new_state;
        }
        log::info!("Overriding mining state");
        self.poke(Poke::StateChange);
    }

    /// Returns the activity decision to the environmental signals.
    pub fn remove_mining_activity_override(&self) {
        {
            let mut cfg = self.shared.lock();
            if cfg.override_state == MiningOverride::None {
                return;
            }
            cfg.override_state = MiningOverride::None;
        }
        log::info!("Removing mining override");
        self.poke(Poke::StateChange);
    }

    /// Reports whether the screen is idle. Pokes the dispatch loop only
    /// on an actual change.
    pub fn report_idle_screen_state(&self, idle: bool) {
        {
            let mut cfg = self.shared.lock();
            if cfg.screen_idle == idle {
                return;
            }
            cfg.screen_idle = idle;
        }
        log::info!("Screen idle state changed to: {}", idle);
        self.poke(Poke::StateChange);
    }

    /// Reports whether the machine is on battery power. Pokes the
    /// dispatch loop only on an actual change.
    pub fn report_power_state(&self, battery: bool) {
        {
            let mut cfg = self.shared.lock();
            if cfg.battery_power == battery {
                return;
            }
            cfg.battery_power = battery;
        }
        log::info!("Battery state changed to: {}", battery);
        self.poke(Poke::StateChange);
    }

    /// Asks the dispatch loop to refresh the quiescent stats snapshot.
    /// Best-effort; a no-op when no loop is live.
    pub fn request_recent_stats_update(&self) {
        self.poke(Poke::UpdateStats);
    }

    /// Queues a chat message for delivery with an upcoming share and
    /// returns its opaque id. Wakes the dispatch loop so a paused miner
    /// can start mining for the delivery.
    pub fn send_chat(&self, message: impl Into<String>) -> i64 {
        let id = self.chat.send_chat(message);
        self.poke(Poke::StateChange);
        id
    }

    /// Pops the next received chat message, if any.
    pub fn next_chat_received(&self) -> Option<ReceivedChat> {
        self.chat.next_chat_received()
    }

    /// Direct ledger access for tests.
    #[cfg(test)]
    pub(crate) fn stats_handle(&self) -> &StatsLedger {
        &self.stats
    }

    /// Posts a poke to the live dispatch loop. Returns false when no loop
    /// is live.
    fn poke(&self, poke: Poke) -> bool {
        let pokes = self.pokes.lock().unwrap_or_else(|e| e.into_inner());
        match pokes.as_ref() {
            Some(sender) => {
                if sender.try_send(poke).is_err() {
                    // Buffer full: the loop is already awake and will
                    // re-evaluate everything on its next iteration.
                    log::warn!("poke channel full, dropping {:?}", poke);
                }
                true
            }
            None => false,
        }
    }
}
