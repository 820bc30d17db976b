// src/miner/activity.rs
//! Activity state evaluation
//!
//! A pure function decides whether the miner should be hashing, and if
//! not, why. The precedence is fixed: login and user intent outrank
//! connectivity, which outranks the environmental signals (time window,
//! power source, screen). Pending outbound chats override only the
//! environmental pauses, since delivering them requires a share.

use crate::types::{Activity, MiningOverride};

/// Inputs to the activity decision, captured at one instant
#[derive(Debug, Clone, Copy)]
pub struct ActivityInputs {
    /// A pool login is installed
    pub logged_in: bool,
    /// The pool connection is currently alive
    pub connection_alive: bool,
    /// User override, if any
    pub override_state: MiningOverride,
    /// Machine is running on battery power
    pub battery_power: bool,
    /// Screen has been idle long enough to mine
    pub screen_idle: bool,
    /// Current hour of day, 0..24
    pub hour: u32,
    /// Start hour of the excluded window
    pub exclude_hour_start: u32,
    /// End hour (exclusive) of the excluded window
    pub exclude_hour_end: u32,
    /// Outbound chat messages are queued for delivery
    pub pending_chats: bool,
}

/// Decides the activity state for the given inputs.
pub fn evaluate(inputs: &ActivityInputs) -> Activity {
    if !inputs.logged_in {
        return Activity::NoLogin;
    }
    // User-override pause trumps all.
    if inputs.override_state == MiningOverride::Pause {
        return Activity::UserOverridePause;
    }
    // Without a pool connection we cannot mine no matter what.
    if !inputs.connection_alive {
        return Activity::NoConnection;
    }
    if inputs.override_state == MiningOverride::Mine {
        return Activity::UserOverrideMine;
    }

    if time_excluded(inputs.hour, inputs.exclude_hour_start, inputs.exclude_hour_end) {
        return for_chats_or(inputs, Activity::TimeExcluded);
    }
    if inputs.battery_power {
        return for_chats_or(inputs, Activity::Battery);
    }
    if !inputs.screen_idle {
        return for_chats_or(inputs, Activity::ScreenActive);
    }

    Activity::Active
}

/// Environmental pauses yield to queued chats: the only reason to mine is
/// to deliver them.
fn for_chats_or(inputs: &ActivityInputs, paused: Activity) -> Activity {
    if inputs.pending_chats {
        Activity::ActiveForChats
    } else {
        paused
    }
}

/// True when `hour` falls inside the `[start, end)` excluded window.
///
/// A start above the end wraps around midnight; equal bounds mean no
/// exclusion.
pub fn time_excluded(hour: u32, start: u32, end: u32) -> bool {
    if start < end {
        hour >= start && hour < end
    } else if start > end {
        hour >= start || hour < end
    } else {
        false
    }
}
