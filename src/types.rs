// src/types.rs
use std::fmt;

/// Mining activity state
///
/// The discriminant encodes the state for external consumers: negative
/// values mean the miner is paused (and say why), positive values mean it
/// is actively hashing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum Activity {
    /// Paused: nobody is logged in, or the last login failed. The user
    /// should log in with valid parameters.
    NoLogin = -7,

    /// Paused: inside the user-configured excluded time-of-day window
    TimeExcluded = -6,

    /// Paused: the user forced mining off
    UserOverridePause = -5,

    /// Paused: the machine is running on battery power
    Battery = -4,

    /// Paused: the screen is in active use
    ScreenActive = -3,

    /// Paused: no connection to the pool server. The miner keeps trying
    /// to reconnect.
    NoConnection = -2,

    /// Actively mining
    Active = 1,

    /// Actively mining because the user forced mining on
    UserOverrideMine = 2,

    /// Actively mining only to deliver queued chat messages
    ActiveForChats = 3,
}

impl Activity {
    /// The raw signed code; sign encodes paused (< 0) vs active (> 0)
    pub fn code(self) -> i32 {
        self as i32
    }

    /// True when the miner is paused in this state
    pub fn is_paused(self) -> bool {
        self.code() < 0
    }

    /// True when the miner is hashing in this state
    pub fn is_mining(self) -> bool {
        self.code() > 0
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Activity::NoLogin => "PAUSED: no pool login.",
            Activity::TimeExcluded => "PAUSED: within time of day exclusion.",
            Activity::UserOverridePause => "PAUSED: user override.",
            Activity::Battery => "PAUSED: on battery power.",
            Activity::ScreenActive => "PAUSED: screen is active.",
            Activity::NoConnection => "PAUSED: no connection.",
            Activity::Active => "ACTIVE",
            Activity::UserOverrideMine => "ACTIVE: user override.",
            Activity::ActiveForChats => "ACTIVE: delivering queued chats.",
        };
        f.write_str(msg)
    }
}

/// User-requested override of the automatic activity decision
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum MiningOverride {
    /// No override; environmental signals decide
    #[default]
    None,
    /// Mine regardless of environmental signals
    Mine,
    /// Pause regardless of environmental signals
    Pause,
}
