// src/config/config.rs
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Pool login parameters, immutable for the lifetime of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    /// Pool username. Must be non-empty and must not contain '.'
    /// (reserved as the wallet/username separator on the wire).
    pub username: String,

    /// Rig identifier reported to the pool, or empty if unspecified
    #[serde(default)]
    pub rigid: String,

    /// Wallet address; may be empty for username-only logins, in which
    /// case the pool warns if the username has no associated wallet yet
    #[serde(default)]
    pub wallet: String,

    /// Client identification string sent with the login, e.g. name and
    /// version of the software embedding this crate
    #[serde(default = "default_agent")]
    pub agent: String,

    /// Advanced pool configuration options, e.g. "start_diff=1000;donate=1.0"
    #[serde(default)]
    pub advanced: String,

    /// Whether to connect to the pool over TLS
    #[serde(default)]
    pub use_tls: bool,
}

impl LoginConfig {
    /// The login name sent on the wire: `wallet.username` when a wallet is
    /// present, bare username otherwise.
    pub fn login_name(&self) -> String {
        if self.wallet.is_empty() {
            self.username.clone()
        } else {
            format!("{}.{}", self.wallet, self.username)
        }
    }

    /// Validates the login parameters
    ///
    /// # Errors
    /// Returns `MinerError::InputError` if the username is empty or contains
    /// the reserved '.' separator.
    pub fn validate(&self) -> Result<(), MinerError> {
        if self.username.is_empty() {
            return Err(MinerError::InputError("username must be non-empty".into()));
        }
        if self.username.contains('.') {
            return Err(MinerError::InputError(
                "The '.' character is not allowed in usernames.".into(),
            ));
        }
        Ok(())
    }
}

/// Miner-side configuration: thread count and the excluded time window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Initial number of hashing threads (>= 1)
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Start hour (24h clock) of the daily window in which mining is
    /// paused. Both bounds 0 means no exclusion.
    #[serde(default)]
    pub exclude_hour_start: u32,

    /// End hour (exclusive) of the excluded window; may be below the start
    /// hour for windows wrapping around midnight
    #[serde(default)]
    pub exclude_hour_end: u32,
}

impl Default for MinerConfig {
    fn default() -> Self {
        MinerConfig {
            threads: default_threads(),
            exclude_hour_start: 0,
            exclude_hour_end: 0,
        }
    }
}

impl MinerConfig {
    /// Validates the thread count and hour window
    ///
    /// # Errors
    /// Returns `MinerError::ConfigError` when threads is 0 or either hour
    /// falls outside `[0, 24]`.
    pub fn validate(&self) -> Result<(), MinerError> {
        if self.threads == 0 {
            return Err(MinerError::ConfigError(
                "thread count must be at least 1".into(),
            ));
        }
        if self.exclude_hour_start > 24 || self.exclude_hour_end > 24 {
            return Err(MinerError::ConfigError(
                "exclude_hour_start and exclude_hour_end must each be between 0 and 24".into(),
            ));
        }
        Ok(())
    }
}

/// On-disk configuration file: miner settings plus login defaults
///
/// Every field is optional; command-line flags override whatever the file
/// supplies.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Miner section: threads and exclude window
    #[serde(default)]
    pub miner: MinerConfig,

    /// Login section; absent means all login parameters come from flags
    #[serde(default)]
    pub login: Option<LoginConfig>,
}

impl ConfigFile {
    /// Loads configuration from a TOML file
    ///
    /// # Errors
    /// Returns `MinerError::ConfigError` if the file couldn't be read or
    /// parsed.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        toml::from_str(&config_str)
            .map_err(|e| MinerError::ConfigError(format!("Invalid config format: {}", e)))
    }
}

fn default_threads() -> usize {
    1
}

fn default_agent() -> String {
    format!("rxminer/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_name_joins_wallet_and_username() {
        let mut cfg = LoginConfig {
            username: "worker1".into(),
            rigid: String::new(),
            wallet: String::new(),
            agent: default_agent(),
            advanced: String::new(),
            use_tls: false,
        };
        assert_eq!(cfg.login_name(), "worker1");
        cfg.wallet = "4ABCD".into();
        assert_eq!(cfg.login_name(), "4ABCD.worker1");
    }

    #[test]
    fn username_validation_rejects_dot_and_empty() {
        let mut cfg = LoginConfig {
            username: "wallet.worker".into(),
            rigid: String::new(),
            wallet: String::new(),
            agent: String::new(),
            advanced: String::new(),
            use_tls: false,
        };
        assert!(cfg.validate().is_err());
        cfg.username = String::new();
        assert!(cfg.validate().is_err());
        cfg.username = "worker".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn hour_window_bounds_are_checked() {
        let mut cfg = MinerConfig {
            threads: 2,
            exclude_hour_start: 22,
            exclude_hour_end: 6,
        };
        assert!(cfg.validate().is_ok());
        cfg.exclude_hour_end = 25;
        assert!(cfg.validate().is_err());
        cfg.exclude_hour_end = 6;
        cfg.threads = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_file_parses_with_defaults() {
        let parsed: ConfigFile = toml::from_str(
            r#"
            [miner]
            threads = 4
            exclude_hour_start = 11
            exclude_hour_end = 16
            "#,
        )
        .unwrap();
        assert_eq!(parsed.miner.threads, 4);
        assert!(parsed.login.is_none());

        let empty: ConfigFile = toml::from_str("").unwrap();
        assert_eq!(empty.miner.threads, 1);
    }
}
