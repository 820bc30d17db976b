// src/main.rs
use clap::Parser;
use crossbeam_channel::{unbounded, RecvTimeoutError};
use rxminer::cli::{self, Args};
use rxminer::config::{ConfigFile, LoginConfig, MinerConfig};
use rxminer::miner::{Miner, RandomxEngine};
use rxminer::network::StratumConnector;
use rxminer::stats::HASHRATE_CALCULATING;
use rxminer::{init_logging, MiningState};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

const STATS_PRINT_INTERVAL: Duration = Duration::from_secs(60);

/// Commands read from the keyboard
enum KeyCommand {
    PrintStats,
    PrintPoolStats,
    IncreaseThreads,
    DecreaseThreads,
    Chat(String),
    ToggleOverride,
    Quit,
}

fn main() {
    let args = Args::parse();
    init_logging();
    if let Err(code) = run(args) {
        std::process::exit(code);
    }
}

fn run(args: Args) -> Result<(), i32> {
    let file = match args.config_file.as_ref() {
        Some(path) => match ConfigFile::load(path) {
            Ok(f) => f,
            Err(e) => {
                log::error!("{}", e);
                return Err(1);
            }
        },
        None => ConfigFile::default(),
    };

    let (miner_config, login, saver, pool_address, stats_url) = match resolve_config(&args, file) {
        Ok(r) => r,
        Err(message) => {
            log::error!("{}", message);
            return Err(1);
        }
    };

    if login.username == cli::DONATE_USERNAME {
        log::info!("No username specified, mining on behalf of donate.getmonero.org.");
    }
    if saver {
        log::info!("Mining only when the screen is reported locked; press <enter> to override.");
    }
    if miner_config.exclude_hour_start != miner_config.exclude_hour_end {
        log::info!(
            "Mining will be paused between the hours of {}:00 and {}:00.",
            miner_config.exclude_hour_start,
            miner_config.exclude_hour_end
        );
    }
    log::info!("Miner username: {}", login.username);
    log::info!("Threads: {}", miner_config.threads);

    let engine = Arc::new(RandomxEngine::new(true));
    let connector = Arc::new(StratumConnector::new(pool_address));

    let (miner, init_response) =
        match Miner::init(&miner_config, engine, connector, &stats_url) {
            Ok(r) => r,
            Err(e) => {
                log::error!("Miner init failed (code {}): {}", e.code, e.message);
                return Err(1);
            }
        };
    if init_response.code == 2 {
        log::warn!("{}", init_response.message);
    }

    let runtime = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to start runtime: {}", e);
            return Err(1);
        }
    };

    // The miner assumes an idle screen until told otherwise; with -saver
    // the screen is presumed active at startup and some platform
    // integration (or the <enter> override) unlocks mining.
    if saver {
        miner.report_idle_screen_state(false);
    }

    login_with_retry(&runtime, &miner, &login)?;

    print_keyboard_commands();
    let keys = start_keyboard_reader();
    let mut override_toggled = false;

    loop {
        let command = match keys.recv_timeout(STATS_PRINT_INTERVAL) {
            Ok(c) => c,
            Err(RecvTimeoutError::Timeout) => {
                drain_received_chats(&miner);
                print_stats(&miner.mining_state());
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };
        match command {
            KeyCommand::PrintStats => {
                miner.request_recent_stats_update();
                print_stats(&miner.mining_state());
            }
            KeyCommand::PrintPoolStats => print_pool_stats(&miner.mining_state()),
            KeyCommand::IncreaseThreads => miner.increase_threads(),
            KeyCommand::DecreaseThreads => miner.decrease_threads(),
            KeyCommand::Chat(message) => {
                let id = miner.send_chat(message);
                log::info!("Chat queued for delivery with the next share (id {})", id);
            }
            KeyCommand::ToggleOverride => {
                if override_toggled {
                    miner.remove_mining_activity_override();
                } else {
                    miner.override_mining_activity(true);
                }
                override_toggled = !override_toggled;
                log::info!("Mining override {}", if override_toggled { "on" } else { "off" });
            }
            KeyCommand::Quit => break,
        }
        drain_received_chats(&miner);
    }

    runtime.block_on(miner.shutdown());
    Ok(())
}

type ResolvedConfig = (MinerConfig, LoginConfig, bool, String, String);

/// Merges command-line flags over the config file over built-in defaults.
fn resolve_config(args: &Args, file: ConfigFile) -> Result<ResolvedConfig, String> {
    let mut miner_config = file.miner;
    if let Some(threads) = args.threads {
        miner_config.threads = threads;
    }
    if let Some(spec) = args.exclude.as_deref() {
        let (start, end) = cli::parse_exclude(spec)?;
        miner_config.exclude_hour_start = start;
        miner_config.exclude_hour_end = end;
    }

    let mut login = file.login.unwrap_or_else(|| LoginConfig {
        username: cli::DONATE_USERNAME.to_string(),
        rigid: "rxminer".to_string(),
        wallet: String::new(),
        agent: format!("rxminer/{}", env!("CARGO_PKG_VERSION")),
        advanced: String::new(),
        use_tls: false,
    });
    if let Some(user) = args.user.clone() {
        login.username = user;
    }
    if let Some(rigid) = args.rigid.clone() {
        login.rigid = rigid;
    }
    if let Some(wallet) = args.wallet.clone() {
        login.wallet = wallet;
    }
    if let Some(agent) = args.agent.clone() {
        login.agent = agent;
    }
    if let Some(advanced) = args.config.clone() {
        login.advanced = advanced;
    }
    if let Some(tls) = args.tls {
        login.use_tls = tls;
    }

    let pool = args.pool.clone().unwrap_or_else(|| {
        if login.use_tls {
            cli::DEFAULT_POOL_TLS.to_string()
        } else {
            cli::DEFAULT_POOL.to_string()
        }
    });
    let stats_url = args
        .stats_url
        .clone()
        .unwrap_or_else(|| rxminer::network::DEFAULT_STATS_URL.to_string());

    Ok((miner_config, login, args.saver.unwrap_or(false), pool, stats_url))
}

/// Logs in, retrying transport failures with a linear backoff. Server
/// refusals are fatal for the CLI: the user must fix the parameters.
fn login_with_retry(runtime: &Runtime, miner: &Miner, login: &LoginConfig) -> Result<(), i32> {
    let mut sleep = Duration::from_secs(3);
    loop {
        let response = runtime.block_on(miner.pool_login(login));
        if response.code == 1 {
            if !response.message.is_empty() {
                log::warn!("Pool login warning: {}", response.message);
            }
            return Ok(());
        }
        if response.code > 1 {
            log::error!("Pool refused login: {}", response.message);
            return Err(1);
        }
        log::warn!(
            "Couldn't reach pool ({}), retrying in {:?}",
            response.message,
            sleep
        );
        std::thread::sleep(sleep);
        sleep += Duration::from_secs(1);
    }
}

fn print_keyboard_commands() {
    log::info!("Keyboard commands:");
    log::info!("   s: print miner stats");
    log::info!("   p: print pool-side user stats");
    log::info!("   i/d: add/remove a hashing thread");
    log::info!("   c <message>: queue a chat message");
    log::info!("   q: quit");
    log::info!("   <enter>: override a paused miner");
}

/// Reads stdin on a dedicated thread; the control loop consumes parsed
/// commands from the channel.
fn start_keyboard_reader() -> crossbeam_channel::Receiver<KeyCommand> {
    let (tx, rx) = unbounded();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let trimmed = line.trim();
            let command = match trimmed {
                "s" | "h" => KeyCommand::PrintStats,
                "p" => KeyCommand::PrintPoolStats,
                "i" => KeyCommand::IncreaseThreads,
                "d" => KeyCommand::DecreaseThreads,
                "q" => KeyCommand::Quit,
                "" => KeyCommand::ToggleOverride,
                other => match other.strip_prefix("c ") {
                    Some(message) => KeyCommand::Chat(message.to_string()),
                    None => {
                        print_keyboard_commands();
                        continue;
                    }
                },
            };
            if tx.send(command).is_err() {
                break;
            }
        }
    });
    rx
}

fn drain_received_chats(miner: &Miner) {
    while let Some(chat) = miner.next_chat_received() {
        log::info!("[chat] {}: {}", chat.username, chat.message);
    }
}

fn print_stats(state: &MiningState) {
    let s = &state.snapshot;
    log::info!("=====================================");
    log::info!("Mining: {}", state.activity);
    log::info!("Threads: {}", state.threads);
    log::info!(
        "Shares    [accepted:rejected]: {}:{}",
        s.shares_accepted,
        s.shares_rejected
    );
    log::info!(
        "Hashes          [client:pool]: {}:{}",
        s.client_side_hashes,
        s.pool_side_hashes
    );
    if s.recent_hashrate != HASHRATE_CALCULATING {
        log::info!(
            "Hashes/sec [inception:recent]: {:.2}:{:.2}",
            s.hashrate,
            s.recent_hashrate
        );
    } else {
        log::info!("Hashes/sec: --calculating--");
    }
    log::info!("=====================================");
}

fn print_pool_stats(state: &MiningState) {
    let s = &state.snapshot;
    if s.pool_username.is_empty() || s.seconds_old < 0.0 {
        log::info!("No pool-side stats fetched yet for this user.");
        return;
    }
    log::info!("==========================================");
    log::info!("Pool stats last updated {:.0} seconds ago:", s.seconds_old);
    log::info!("User            : {}", s.pool_username);
    log::info!("Lifetime hashes : {}", s.lifetime_hashes);
    log::info!("Paid            : {:.12} $XMR", s.paid);
    if s.owed > 0.0 {
        log::info!("Owed            : {:.12} $XMR", s.owed);
    }
    log::info!("Accumulated     : {:.12} $XMR", s.accumulated);
    if !s.time_to_reward.is_empty() {
        log::info!("Time to reward  : {}", s.time_to_reward);
    }
    log::info!("==========================================");
}
