// src/test_utils.rs
//! Shared test fixtures: a deterministic stub engine, a scriptable fake
//! pool, and pre-wired miner/dispatch harnesses.

use crate::chat::{ChatQueue, QueuedChat};
use crate::config::{LoginConfig, MinerConfig};
use crate::miner::algorithm::{EngineInit, HashEngine};
use crate::miner::coordinator::Miner;
use crate::miner::dispatch::{mining_loop, DispatchCtx, Poke, POKE_BUFFER};
use crate::miner::submit::ShareContext;
use crate::network::pool::{
    ChatsReply, Job, LoginWarning, PoolClient, PoolConnector, PoolSession, SubmitReply,
};
use crate::network::poolstats::PoolStatsFetcher;
use crate::stats::StatsLedger;
use crate::utils::error::MinerError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Stats endpoint base that fails fast; refresh tasks in tests just log.
pub(crate) const UNREACHABLE_STATS_URL: &str = "http://127.0.0.1:1";

/// Polls `cond` for up to two seconds, panicking if it never holds.
pub(crate) async fn wait_until<F: Fn() -> bool>(cond: F) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// A deterministic engine: `hash_until` either blocks until the stop flag
/// is set (returning a fixed tally) or replays scripted share results.
pub(crate) struct StubEngine {
    threads: AtomicUsize,
    active: AtomicUsize,
    seeds: Mutex<Vec<Vec<u8>>>,
    script: Mutex<VecDeque<i64>>,
    hashes_when_stopped: i64,
}

impl StubEngine {
    /// Every `hash_until` call blocks until stopped, then reports
    /// `hashes_when_stopped` hashes.
    pub(crate) fn blocking(hashes_when_stopped: i64) -> Self {
        StubEngine {
            threads: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            seeds: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            hashes_when_stopped,
        }
    }

    /// The first calls pop scripted results (positive = share found after
    /// that many hashes); once the script is exhausted, calls block until
    /// stopped.
    pub(crate) fn scripted(script: Vec<i64>, hashes_when_stopped: i64) -> Self {
        let engine = StubEngine::blocking(hashes_when_stopped);
        *engine.script.lock().unwrap() = script.into();
        engine
    }

    /// Number of threads currently inside `hash_until`.
    pub(crate) fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Seeds installed so far, in order.
    pub(crate) fn seeds(&self) -> Vec<Vec<u8>> {
        self.seeds.lock().unwrap().clone()
    }
}

impl HashEngine for StubEngine {
    fn init(&self, threads: usize) -> Result<EngineInit, MinerError> {
        self.threads.store(threads, Ordering::SeqCst);
        Ok(EngineInit::Ready)
    }

    fn seed(&self, seed: &[u8], _init_threads: usize) -> Result<(), MinerError> {
        self.seeds.lock().unwrap().push(seed.to_vec());
        Ok(())
    }

    fn hash_until(
        &self,
        _blob: &[u8],
        _difficulty: u64,
        thread: usize,
        hash_out: &mut [u8; 32],
        nonce_out: &mut [u8; 4],
        stop: &AtomicU32,
    ) -> i64 {
        if let Some(res) = self.script.lock().unwrap().pop_front() {
            if res > 0 {
                hash_out.fill(0xAB);
                nonce_out.copy_from_slice(&(thread as u32).to_le_bytes());
                return res;
            }
        }
        self.active.fetch_add(1, Ordering::SeqCst);
        while stop.load(Ordering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_millis(2));
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        -self.hashes_when_stopped
    }

    fn add_thread(&self) -> Result<usize, MinerError> {
        let t = self.threads.load(Ordering::SeqCst) + 1;
        self.threads.store(t, Ordering::SeqCst);
        Ok(t)
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

type ScriptedReply = Result<SubmitReply, MinerError>;

/// A pool client that records submissions and replays scripted replies.
pub(crate) struct FakePoolClient {
    alive: std::sync::atomic::AtomicBool,
    submits: Mutex<Vec<(String, String, Vec<QueuedChat>)>>,
    replies: Mutex<VecDeque<ScriptedReply>>,
    chats: Mutex<VecDeque<Result<ChatsReply, MinerError>>>,
}

impl FakePoolClient {
    pub(crate) fn new() -> Self {
        FakePoolClient {
            alive: std::sync::atomic::AtomicBool::new(true),
            submits: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            chats: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Recorded (nonce, job_id, chats) submissions.
    pub(crate) fn submitted(&self) -> Vec<(String, String, Vec<QueuedChat>)> {
        self.submits.lock().unwrap().clone()
    }

    /// Scripts the reply for the next submission; unscripted submissions
    /// are accepted with an empty result.
    pub(crate) fn script_reply(&self, reply: ScriptedReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub(crate) fn script_chats(&self, reply: Result<ChatsReply, MinerError>) {
        self.chats.lock().unwrap().push_back(reply);
    }
}

impl PoolClient for FakePoolClient {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.set_alive(false);
    }

    fn submit_work<'a>(
        &'a self,
        nonce: &'a str,
        job_id: &'a str,
        chats: Vec<QueuedChat>,
    ) -> BoxFuture<'a, Result<SubmitReply, MinerError>> {
        async move {
            self.submits
                .lock()
                .unwrap()
                .push((nonce.to_string(), job_id.to_string(), chats));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(SubmitReply {
                    error: None,
                    result: None,
                }))
        }
        .boxed()
    }

    fn get_chats(&self, _token: i64) -> BoxFuture<'_, Result<ChatsReply, MinerError>> {
        async move {
            self.chats
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(ChatsReply::default()))
        }
        .boxed()
    }
}

enum ConnectScript {
    Session {
        client: Arc<FakePoolClient>,
        jobs: mpsc::Receiver<Job>,
        warning: Option<LoginWarning>,
    },
    Refusal {
        code: i32,
        message: String,
    },
}

/// Handle a test keeps for a scripted session: feed jobs, poke the
/// client's liveness.
pub(crate) struct FakeSessionHandle {
    pub(crate) client: Arc<FakePoolClient>,
    job_tx: mpsc::Sender<Job>,
}

impl FakeSessionHandle {
    pub(crate) async fn send_job(&self, job: Job) {
        self.job_tx.send(job).await.expect("dispatch loop gone");
    }
}

/// A connector replaying scripted dial outcomes; an empty script fails
/// the dial with a transport error.
pub(crate) struct FakeConnector {
    script: Mutex<VecDeque<ConnectScript>>,
    dials: AtomicUsize,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        FakeConnector {
            script: Mutex::new(VecDeque::new()),
            dials: AtomicUsize::new(0),
        }
    }

    /// Schedules a successful session; returns the handle for feeding it.
    pub(crate) fn push_session(&self) -> FakeSessionHandle {
        self.push_session_inner(None)
    }

    pub(crate) fn push_session_with_warning(&self, code: i32, message: &str) -> FakeSessionHandle {
        self.push_session_inner(Some(LoginWarning {
            code,
            message: message.to_string(),
        }))
    }

    fn push_session_inner(&self, warning: Option<LoginWarning>) -> FakeSessionHandle {
        let client = Arc::new(FakePoolClient::new());
        let (job_tx, jobs) = mpsc::channel(16);
        self.script.lock().unwrap().push_back(ConnectScript::Session {
            client: Arc::clone(&client),
            jobs,
            warning,
        });
        FakeSessionHandle { client, job_tx }
    }

    /// Schedules a server-side login refusal.
    pub(crate) fn push_refusal(&self, code: i32, message: &str) {
        self.script.lock().unwrap().push_back(ConnectScript::Refusal {
            code,
            message: message.to_string(),
        });
    }

    /// Number of dial attempts seen.
    pub(crate) fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

impl PoolConnector for FakeConnector {
    fn connect<'a>(
        &'a self,
        _login: &'a LoginConfig,
    ) -> BoxFuture<'a, Result<PoolSession, MinerError>> {
        async move {
            self.dials.fetch_add(1, Ordering::SeqCst);
            match self.script.lock().unwrap().pop_front() {
                Some(ConnectScript::Session {
                    client,
                    jobs,
                    warning,
                }) => Ok(PoolSession {
                    client,
                    jobs,
                    warning,
                }),
                Some(ConnectScript::Refusal { code, message }) => {
                    Err(MinerError::LoginRefused { code, message })
                }
                None => Err(MinerError::ConnectionError("scripted dial failure".into())),
            }
        }
        .boxed()
    }
}

/// A job whose blob decodes and whose target is easy.
pub(crate) fn job_fixture(id: &str, seed_hex: &str) -> Job {
    Job {
        blob: "00".repeat(76),
        job_id: id.to_string(),
        target: "b88d0600".to_string(), // difficulty 10000
        seed_hash: seed_hex.to_string(),
        height: 1,
        net_diff: 0,
        reward: 0,
        nonce: 0,
        chat_token: 0,
    }
}

fn fetcher() -> Arc<PoolStatsFetcher> {
    Arc::new(PoolStatsFetcher::new(UNREACHABLE_STATS_URL).expect("http client"))
}

/// A share context wired to a fake client that is installed in the shared
/// state with a logged-in user.
pub(crate) fn share_context_with_login(
    username: &str,
) -> (Arc<ShareContext>, Arc<FakePoolClient>) {
    let engine: Arc<dyn HashEngine> = Arc::new(StubEngine::blocking(0));
    let config = MinerConfig {
        threads: 1,
        exclude_hour_start: 0,
        exclude_hour_end: 0,
    };
    let shared = Arc::new(crate::miner::coordinator::SharedState::new_for_tests(
        engine, &config,
    ));
    let client = Arc::new(FakePoolClient::new());
    shared.set_client(client.clone());
    shared.set_login_for_tests(LoginConfig {
        username: username.into(),
        rigid: String::new(),
        wallet: String::new(),
        agent: "test".into(),
        advanced: String::new(),
        use_tls: false,
    });
    let ctx = Arc::new(ShareContext {
        stats: Arc::new(StatsLedger::new()),
        chat: Arc::new(ChatQueue::new()),
        shared,
        fetcher: fetcher(),
    });
    (ctx, client)
}

/// A share context for worker-pool tests: logged in, fake client, caller
/// supplies the ledger.
pub(crate) fn fake_share_context(
    stats: Arc<StatsLedger>,
) -> (Arc<ShareContext>, Arc<FakePoolClient>) {
    let (ctx, client) = share_context_with_login("worker1");
    let ctx = Arc::new(ShareContext {
        stats,
        chat: Arc::clone(&ctx.chat),
        shared: Arc::clone(&ctx.shared),
        fetcher: Arc::clone(&ctx.fetcher),
    });
    (ctx, client)
}

/// A dispatch loop running against stub collaborators.
pub(crate) struct DispatchHarness {
    pub(crate) engine: Arc<StubEngine>,
    pub(crate) stats: Arc<StatsLedger>,
    pub(crate) chat: Arc<ChatQueue>,
    pub(crate) shared: Arc<crate::miner::coordinator::SharedState>,
    pub(crate) connector: Arc<FakeConnector>,
    pub(crate) client: Arc<FakePoolClient>,
    poke_tx: mpsc::Sender<Poke>,
    job_tx: Mutex<Option<mpsc::Sender<Job>>>,
    done: Mutex<Option<oneshot::Receiver<()>>>,
}

impl DispatchHarness {
    pub(crate) async fn send_job(&self, job: Job) {
        let tx = self
            .job_tx
            .lock()
            .unwrap()
            .clone()
            .expect("job channel already dropped");
        tx.send(job).await.expect("dispatch loop gone");
    }

    pub(crate) async fn poke(&self, poke: Poke) {
        self.poke_tx.send(poke).await.expect("dispatch loop gone");
    }

    /// Simulates connection loss: the job channel closes.
    pub(crate) fn drop_job_channel(&self) {
        self.job_tx.lock().unwrap().take();
    }

    /// Sends Exit and waits for the loop's done barrier.
    pub(crate) async fn exit(&self) {
        let _ = self.poke_tx.send(Poke::Exit).await;
        if let Some(done) = self.done.lock().unwrap().take() {
            let _ = done.await;
        }
    }
}

/// Spawns a mining loop with two threads, a logged-in shared state, and a
/// live fake client, returning the harness controlling it.
pub(crate) async fn dispatch_harness() -> DispatchHarness {
    let engine = Arc::new(StubEngine::blocking(100));
    let engine_dyn: Arc<dyn HashEngine> = engine.clone();
    let config = MinerConfig {
        threads: 2,
        exclude_hour_start: 0,
        exclude_hour_end: 0,
    };
    engine.init(config.threads).expect("stub engine init");
    let shared = Arc::new(crate::miner::coordinator::SharedState::new_for_tests(
        engine_dyn, &config,
    ));
    shared.set_login_for_tests(LoginConfig {
        username: "worker1".into(),
        rigid: String::new(),
        wallet: String::new(),
        agent: "test".into(),
        advanced: String::new(),
        use_tls: false,
    });
    let client = Arc::new(FakePoolClient::new());
    shared.set_client(client.clone());

    let stats = Arc::new(StatsLedger::new());
    let chat = Arc::new(ChatQueue::new());
    let connector = Arc::new(FakeConnector::new());

    let share_ctx = Arc::new(ShareContext {
        stats: Arc::clone(&stats),
        chat: Arc::clone(&chat),
        shared: Arc::clone(&shared),
        fetcher: fetcher(),
    });

    let (job_tx, job_rx) = mpsc::channel(16);
    let (poke_tx, poke_rx) = mpsc::channel(POKE_BUFFER);
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(mining_loop(
        DispatchCtx {
            shared: Arc::clone(&shared),
            connector: Arc::clone(&connector) as Arc<dyn PoolConnector>,
            share_ctx,
        },
        job_rx,
        poke_rx,
        done_tx,
    ));

    DispatchHarness {
        engine,
        stats,
        chat,
        shared,
        connector,
        client,
        poke_tx,
        job_tx: Mutex::new(Some(job_tx)),
        done: Mutex::new(Some(done_rx)),
    }
}

/// A miner over stub engine and fake connector.
pub(crate) fn miner_fixture(threads: usize) -> (Miner, Arc<StubEngine>, Arc<FakeConnector>) {
    let connector = Arc::new(FakeConnector::new());
    let (miner, engine) = miner_fixture_with_connector(threads, Arc::clone(&connector));
    (miner, engine, connector)
}

pub(crate) fn miner_fixture_with_connector(
    threads: usize,
    connector: Arc<FakeConnector>,
) -> (Miner, Arc<StubEngine>) {
    let engine = Arc::new(StubEngine::blocking(100));
    let config = MinerConfig {
        threads,
        exclude_hour_start: 0,
        exclude_hour_end: 0,
    };
    let (miner, response) = Miner::init(
        &config,
        engine.clone(),
        connector,
        UNREACHABLE_STATS_URL,
    )
    .expect("init must succeed");
    assert_eq!(response.code, 1);
    (miner, engine)
}
