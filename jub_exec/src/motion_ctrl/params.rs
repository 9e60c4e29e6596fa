//! Parameters structure for MotionCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the motion controller.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MotionParams {

    // ---- CONNECTION ----

    /// Address of the machine, host or `host:port`.
    pub address: String,

    /// Log every line sent and every reply at info level.
    pub debug: bool,

    /// Drive the built-in firmware simulator instead of a machine.
    pub simulated: bool,

    /// Software reset the board when connecting.
    pub reset: bool,

    /// Timeout of the liveness probe made when connecting.
    ///
    /// Units: milliseconds
    pub probe_timeout_ms: u64,

    /// Number of connection attempts made after a reset.
    pub reconnect_attempts: usize,

    /// Delay before each connection attempt after a reset.
    ///
    /// Units: milliseconds
    pub reconnect_backoff_ms: u64,

    // ---- MOTION ----

    /// Feedrate used by moves which don't give one.
    ///
    /// Units: mm/min
    pub default_feedrate: u32,

    /// Macro run once the connection is established.
    pub config_macro: String,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".into(),
            debug: false,
            simulated: false,
            reset: false,
            probe_timeout_ms: 1000,
            reconnect_attempts: 10,
            reconnect_backoff_ms: 1000,
            default_feedrate: 13000,
            config_macro: "/sys/config.g".into(),
        }
    }
}

impl MotionParams {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}
