// src/cli/commands.rs
use clap::Parser;
use std::path::PathBuf;

/// Username mined for when none is specified
pub const DONATE_USERNAME: &str = "donate-getmonero-org";

/// Default pool endpoints; the TLS port differs
pub const DEFAULT_POOL: &str = "cryptonote.social:5555";
/// Default pool endpoint when connecting over TLS
pub const DEFAULT_POOL_TLS: &str = "cryptonote.social:5556";

/// rxminer - activity-aware CPU RandomX pool miner
///
/// Flags left unset fall back to the config file (if given), then to
/// built-in defaults.
#[derive(Parser, Debug, Default)]
#[command(name = "rxminer")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Pool username
    #[arg(long)]
    pub user: Option<String>,

    /// Rig id for telling your machines apart in the pool stats
    #[arg(long)]
    pub rigid: Option<String>,

    /// Wallet address to associate with the username
    #[arg(long)]
    pub wallet: Option<String>,

    /// Number of hashing threads
    #[arg(long)]
    pub threads: Option<usize>,

    /// Mine only while the screen is locked
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub saver: Option<bool>,

    /// Pause mining during these hours, e.g. --exclude=11-16 pauses
    /// between 11:00 and 16:00
    #[arg(long)]
    pub exclude: Option<String>,

    /// Connect to the pool over TLS
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub tls: Option<bool>,

    /// Advanced pool configuration options,
    /// e.g. "start_diff=1000;donate=1.0"
    #[arg(long)]
    pub config: Option<String>,

    /// Client identification string sent to the pool
    #[arg(long)]
    pub agent: Option<String>,

    /// Optional TOML file supplying defaults for the flags above
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Pool stratum endpoint (host:port)
    #[arg(long)]
    pub pool: Option<String>,

    /// Base URL of the pool's stats endpoints
    #[arg(long)]
    pub stats_url: Option<String>,
}

/// Parses an `HH-HH` exclude specification into an hour window.
///
/// # Errors
/// Returns a descriptive message for anything other than two `-`-joined
/// hours in `[0, 24]`.
pub fn parse_exclude(spec: &str) -> Result<(u32, u32), String> {
    const INVALID: &str =
        "invalid format for exclude specified. Specify XX-YY, e.g. 11-16 for 11:00am to 4:00pm.";
    if spec.is_empty() {
        return Ok((0, 0));
    }
    let parts: Vec<&str> = spec.split('-').collect();
    if parts.len() != 2 {
        return Err(INVALID.to_string());
    }
    let start: u32 = parts[0].parse().map_err(|_| INVALID.to_string())?;
    let end: u32 = parts[1].parse().map_err(|_| INVALID.to_string())?;
    if start > 24 || end > 24 {
        return Err(
            "exclude_hour_start and exclude_hour_end must each be between 0 and 24".to_string(),
        );
    }
    Ok((start, end))
}
