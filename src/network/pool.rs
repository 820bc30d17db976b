// src/network/pool.rs
//! Stratum pool client
//!
//! Implements the pool side of the line-delimited JSON stratum dialect:
//! a login request answered with a first job, an inbound stream of job
//! notifications, and request/response pairs for share submission and
//! chat fetches. The reader task forwards jobs into a job channel owned
//! by the dispatch loop and routes submit/get-chats results back to the
//! request in flight; when the connection dies the job channel closes,
//! which is the dispatch loop's signal to reconnect.

use crate::chat::{QueuedChat, ReceivedChat};
use crate::config::LoginConfig;
use crate::utils::error::MinerError;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time::timeout;

/// Request id used for the login call
pub const LOGIN_JSON_ID: u64 = 666;
/// Request id used for share submission
pub const SUBMIT_WORK_JSON_ID: u64 = 999;
/// Request id used for chat fetches
pub const GET_CHATS_JSON_ID: u64 = 9999;

/// Maximum bytes accepted per protocol line
pub const MAX_REQUEST_SIZE: u64 = 50_000;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const LOGIN_READ_TIMEOUT: Duration = Duration::from_secs(30);
const WRITE_TIMEOUT: Duration = Duration::from_secs(60);
const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(3600);

/// A work unit from the pool
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    /// Hex-encoded hashing blob
    pub blob: String,
    /// Pool-assigned job identifier
    pub job_id: String,
    /// 4-byte little-endian difficulty target, hex-encoded
    pub target: String,
    /// 32-byte identifier of the RandomX dataset the blob is valid under
    #[serde(default)]
    pub seed_hash: String,
    /// Block height the job builds on
    #[serde(default)]
    pub height: u64,
    /// Network difficulty reported alongside the job
    #[serde(default)]
    pub net_diff: i64,
    /// Reward of the block being worked on
    #[serde(default)]
    pub reward: i64,
    /// Per-connection nonce
    #[serde(default)]
    pub nonce: u32,
    /// Server chat token accompanying the job; a change signals new chats
    #[serde(default)]
    pub chat_token: i64,
}

/// Pool-side totals piggybacked on an accepted share
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubmitResult {
    /// Share status string
    #[serde(rename = "status")]
    pub status: String,
    /// This user's progress toward the next reward
    #[serde(rename = "Progress")]
    pub progress: f64,
    /// Lifetime hashes credited to this user
    #[serde(rename = "LifetimeHashes")]
    pub lifetime_hashes: i64,
    /// Total crypto paid to this user
    #[serde(rename = "Paid")]
    pub paid: f64,
    /// Crypto owed but not yet paid
    #[serde(rename = "Owed")]
    pub owed: f64,
    /// Hashrate of the pprop collective
    #[serde(rename = "PPROPHashrate")]
    pub pprop_hashrate: i64,
    /// Raw progress of the pprop collective
    #[serde(rename = "PPROPProgress")]
    pub pprop_progress: f64,
    /// Reward of the next banked block
    #[serde(rename = "NextBlockReward")]
    pub next_block_reward: f64,
    /// Network difficulty, possibly smoothed
    #[serde(rename = "NetworkDifficulty")]
    pub network_difficulty: i64,
    /// Pool margin; zero means the response carried no pool totals
    #[serde(rename = "PoolMargin")]
    pub pool_margin: f64,
    /// Pool fee
    #[serde(rename = "PoolFee")]
    pub pool_fee: f64,
}

/// Reply to a share submission
#[derive(Debug, Clone, Default)]
pub struct SubmitReply {
    /// Server-side rejection, if any
    pub error: Option<String>,
    /// Parsed result payload for accepted shares
    pub result: Option<SubmitResult>,
}

/// Reply to a chat fetch
#[derive(Debug, Clone, Default)]
pub struct ChatsReply {
    /// Messages received since the presented token
    pub chats: Vec<ReceivedChat>,
    /// Token to present on the next fetch
    pub next_token: i64,
}

/// Warning issued alongside a successful login
#[derive(Debug, Clone)]
pub struct LoginWarning {
    /// Server warning code
    pub code: i32,
    /// Message to surface to the user
    pub message: String,
}

/// A live pool connection as handed to the dispatch loop
pub struct PoolSession {
    /// Handle for share submission and liveness checks
    pub client: Arc<dyn PoolClient>,
    /// Stream of jobs; closes when the connection dies
    pub jobs: mpsc::Receiver<Job>,
    /// Login warning, if the server issued one
    pub warning: Option<LoginWarning>,
}

/// Operations the mining core needs from a pool connection
pub trait PoolClient: Send + Sync {
    /// True while the connection is usable
    fn is_alive(&self) -> bool;

    /// Tears the connection down; idempotent. The job channel closes
    /// shortly after.
    fn close(&self);

    /// Submits a found share, optionally carrying queued chat messages.
    ///
    /// Transport failures return `Err` and leave the client closed;
    /// server-side rejections come back in [`SubmitReply::error`].
    fn submit_work<'a>(
        &'a self,
        nonce: &'a str,
        job_id: &'a str,
        chats: Vec<QueuedChat>,
    ) -> BoxFuture<'a, Result<SubmitReply, MinerError>>;

    /// Fetches chats newer than the given token.
    fn get_chats(&self, token: i64) -> BoxFuture<'_, Result<ChatsReply, MinerError>>;
}

/// Dials pool connections; the seam the dispatch loop reconnects through
pub trait PoolConnector: Send + Sync {
    /// Connects and logs in, returning a live session.
    ///
    /// Server refusals surface as [`MinerError::LoginRefused`]; every
    /// other error is transport-level and retryable.
    fn connect<'a>(&'a self, login: &'a LoginConfig)
        -> BoxFuture<'a, Result<PoolSession, MinerError>>;
}

#[derive(Serialize)]
struct Request<T: Serialize> {
    id: u64,
    method: &'static str,
    params: T,
}

#[derive(Serialize)]
struct LoginParams<'a> {
    login: &'a str,
    pass: &'a str,
    rigid: &'a str,
    agent: &'a str,
}

#[derive(Serialize)]
struct SubmitParams<'a> {
    id: &'static str,
    job_id: &'a str,
    nonce: &'a str,
    result: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    chats: Vec<ChatParam>,
}

#[derive(Serialize)]
struct ChatParam {
    chat: String,
    chat_id: i64,
}

#[derive(Serialize)]
struct GetChatsParams {
    chat_token: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct LoginReply {
    #[serde(default)]
    result: Option<LoginResult>,
    #[serde(default)]
    error: Option<ErrorBody>,
    // Custom field for login warnings that don't force a disconnect.
    #[serde(default)]
    warning: Option<ErrorBody>,
    #[serde(default)]
    chat_token: i64,
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    job: Job,
}

#[derive(Debug, Deserialize)]
struct ServerMessage {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    method: String,
    #[serde(default)]
    params: Option<Job>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    chat_token: i64,
}

#[derive(Debug, Deserialize)]
struct GetChatsResult {
    #[serde(rename = "Chats", default)]
    chats: Vec<WireChat>,
    #[serde(rename = "NextToken", default)]
    next_token: i64,
}

#[derive(Debug, Deserialize)]
struct WireChat {
    #[serde(rename = "Username", default)]
    username: String,
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "Timestamp", default)]
    timestamp: i64,
}

trait Conn: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Conn for T {}

type WriteHalf = tokio::io::WriteHalf<Box<dyn Conn>>;
type ReadHalf = tokio::io::ReadHalf<Box<dyn Conn>>;

/// Stratum client over TCP or TLS
pub struct StratumClient {
    alive: AtomicBool,
    closed: Notify,
    writer: Mutex<WriteHalf>,
    // Holding this receiver across write+recv serializes in-flight
    // requests, matching the single pending-response slot on the wire.
    pending: Mutex<mpsc::Receiver<ServerMessage>>,
}

impl StratumClient {
    async fn request<T: Serialize>(
        &self,
        req: &Request<T>,
        expect_id: u64,
    ) -> Result<ServerMessage, MinerError> {
        if !self.is_alive() {
            return Err(MinerError::ConnectionError("client not alive".into()));
        }
        let mut pending = self.pending.lock().await;

        let mut data = serde_json::to_vec(req)?;
        data.push(b'\n');
        {
            let mut writer = self.writer.lock().await;
            timeout(WRITE_TIMEOUT, writer.write_all(&data))
                .await
                .map_err(|_| MinerError::ConnectionError("write timed out".into()))??;
        }

        match pending.recv().await {
            Some(msg) if msg.id == expect_id => Ok(msg),
            Some(msg) => {
                log::error!("unexpected response id {} (wanted {})", msg.id, expect_id);
                self.close();
                Err(MinerError::ProtocolError("unexpected response id".into()))
            }
            None => {
                self.close();
                Err(MinerError::ConnectionError("connection lost".into()))
            }
        }
    }
}

impl PoolClient for StratumClient {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn close(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            // notify_one stores a permit, so a reader that registers its
            // waiter after this call still observes the close.
            self.closed.notify_one();
        }
    }

    fn submit_work<'a>(
        &'a self,
        nonce: &'a str,
        job_id: &'a str,
        chats: Vec<QueuedChat>,
    ) -> BoxFuture<'a, Result<SubmitReply, MinerError>> {
        async move {
            let req = Request {
                id: SUBMIT_WORK_JSON_ID,
                method: "submit",
                params: SubmitParams {
                    id: "696969",
                    job_id,
                    nonce,
                    result: "",
                    chats: chats
                        .into_iter()
                        .map(|c| ChatParam {
                            chat: c.message,
                            chat_id: c.id,
                        })
                        .collect(),
                },
            };
            let msg = self.request(&req, SUBMIT_WORK_JSON_ID).await?;
            let result = match msg.result {
                Some(v) => Some(serde_json::from_value::<SubmitResult>(v)?),
                None => None,
            };
            Ok(SubmitReply {
                error: msg.error.map(|e| e.to_string()),
                result,
            })
        }
        .boxed()
    }

    fn get_chats(&self, token: i64) -> BoxFuture<'_, Result<ChatsReply, MinerError>> {
        async move {
            let req = Request {
                id: GET_CHATS_JSON_ID,
                method: "get_chats",
                params: GetChatsParams { chat_token: token },
            };
            let msg = self.request(&req, GET_CHATS_JSON_ID).await?;
            if let Some(e) = msg.error {
                return Err(MinerError::ProtocolError(format!(
                    "get_chats failed: {}",
                    e
                )));
            }
            let result: GetChatsResult = match msg.result {
                Some(v) => serde_json::from_value(v)?,
                None => {
                    return Err(MinerError::ProtocolError(
                        "get_chats response carried no result".into(),
                    ))
                }
            };
            Ok(ChatsReply {
                chats: result
                    .chats
                    .into_iter()
                    .map(|c| ReceivedChat {
                        username: c.username,
                        message: c.message,
                        timestamp: c.timestamp,
                    })
                    .collect(),
                next_token: result.next_token,
            })
        }
        .boxed()
    }
}

/// Dials the production pool endpoint
pub struct StratumConnector {
    address: String,
}

impl StratumConnector {
    /// Creates a connector for `host:port`.
    pub fn new(address: impl Into<String>) -> Self {
        StratumConnector {
            address: address.into(),
        }
    }
}

impl PoolConnector for StratumConnector {
    fn connect<'a>(
        &'a self,
        login: &'a LoginConfig,
    ) -> BoxFuture<'a, Result<PoolSession, MinerError>> {
        async move { dial(&self.address, login).await }.boxed()
    }
}

async fn dial(address: &str, login: &LoginConfig) -> Result<PoolSession, MinerError> {
    let tcp = timeout(CONNECT_TIMEOUT, TcpStream::connect(address))
        .await
        .map_err(|_| MinerError::ConnectionError(format!("connect to {} timed out", address)))??;

    let stream: Box<dyn Conn> = if login.use_tls {
        let host = address.split(':').next().unwrap_or(address);
        let connector =
            tokio_native_tls::TlsConnector::from(native_tls::TlsConnector::new()?);
        let tls = connector
            .connect(host, tcp)
            .await
            .map_err(|e| MinerError::ConnectionError(format!("TLS handshake failed: {}", e)))?;
        Box::new(tls)
    } else {
        Box::new(tcp)
    };

    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half).take(MAX_REQUEST_SIZE);

    let login_name = login.login_name();
    let login_req = Request {
        id: LOGIN_JSON_ID,
        method: "login",
        params: LoginParams {
            login: &login_name,
            pass: &login.advanced,
            rigid: &login.rigid,
            agent: &login.agent,
        },
    };
    let mut data = serde_json::to_vec(&login_req)?;
    data.push(b'\n');
    timeout(WRITE_TIMEOUT, write_half.write_all(&data))
        .await
        .map_err(|_| MinerError::ConnectionError("login write timed out".into()))??;

    let line = read_line_capped(&mut reader, LOGIN_READ_TIMEOUT).await?;
    let reply: LoginReply = serde_json::from_slice(&line)?;

    let result = match (reply.result, reply.error) {
        (Some(r), _) => r,
        (None, Some(err)) => {
            return Err(MinerError::LoginRefused {
                code: err.code,
                message: err.message,
            });
        }
        (None, None) => {
            return Err(MinerError::ProtocolError(
                "login response carried neither result nor error".into(),
            ));
        }
    };

    let mut first_job = result.job;
    first_job.chat_token = reply.chat_token;

    let (job_tx, job_rx) = mpsc::channel(16);
    let (resp_tx, resp_rx) = mpsc::channel(8);

    let client = Arc::new(StratumClient {
        alive: AtomicBool::new(true),
        closed: Notify::new(),
        writer: Mutex::new(write_half),
        pending: Mutex::new(resp_rx),
    });

    tokio::spawn(read_loop(
        Arc::clone(&client),
        reader,
        first_job,
        job_tx,
        resp_tx,
    ));

    Ok(PoolSession {
        client,
        jobs: job_rx,
        warning: reply.warning.map(|w| LoginWarning {
            code: w.code,
            message: w.message,
        }),
    })
}

/// Forwards incoming jobs and request responses until the connection dies
/// or the client is closed; the job channel closes on return.
async fn read_loop(
    client: Arc<StratumClient>,
    mut reader: tokio::io::Take<BufReader<ReadHalf>>,
    first_job: Job,
    job_tx: mpsc::Sender<Job>,
    resp_tx: mpsc::Sender<ServerMessage>,
) {
    if job_tx.send(first_job).await.is_err() {
        client.close();
        return;
    }

    loop {
        if !client.is_alive() {
            break;
        }
        let line = tokio::select! {
            line = read_line_capped(&mut reader, READ_IDLE_TIMEOUT) => line,
            _ = client.closed.notified() => break,
        };
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                log::error!("read failed, closing client: {}", e);
                break;
            }
        };
        let msg: ServerMessage = match serde_json::from_slice(&line) {
            Ok(m) => m,
            Err(e) => {
                log::error!("malformed message from pool, closing client: {}", e);
                break;
            }
        };

        if msg.method == "job" {
            let mut job = match msg.params {
                Some(j) => j,
                None => {
                    log::error!("job notification carried no job, closing client");
                    break;
                }
            };
            job.chat_token = msg.chat_token;
            if job_tx.send(job).await.is_err() {
                break;
            }
            continue;
        }

        if msg.id == SUBMIT_WORK_JSON_ID || msg.id == GET_CHATS_JSON_ID {
            if resp_tx.send(msg).await.is_err() {
                break;
            }
            continue;
        }

        log::warn!("Unexpected message from pool server, ignoring (id {})", msg.id);
    }

    client.close();
    // Dropping job_tx / resp_tx closes both channels, which is what the
    // dispatch loop and any in-flight request observe.
}

/// Reads one newline-terminated line, enforcing the per-line size cap and
/// the given idle deadline.
async fn read_line_capped(
    reader: &mut tokio::io::Take<BufReader<ReadHalf>>,
    deadline: Duration,
) -> Result<Vec<u8>, MinerError> {
    reader.set_limit(MAX_REQUEST_SIZE);
    let mut buf = Vec::new();
    let n = timeout(deadline, reader.read_until(b'\n', &mut buf))
        .await
        .map_err(|_| MinerError::ConnectionError("read timed out".into()))??;
    if n == 0 {
        return Err(MinerError::ConnectionError("connection closed".into()));
    }
    if buf.last() != Some(&b'\n') {
        // Either the limit was exhausted mid-line or the peer closed
        // mid-line; both are protocol violations.
        return Err(MinerError::ProtocolError("oversize request".into()));
    }
    buf.pop();
    Ok(buf)
}
