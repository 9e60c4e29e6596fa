//! # Network Module
//!
//! This module provides the transports used to reach the machine firmware. The firmware exposes a
//! plain HTTP interface: G-code lines are posted to `/machine/code` and files are read back from
//! `/machine/file<path>`. Replies are always text, which may hold JSON for object model queries.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// HTTP transport to a real machine
pub mod http;

/// In-process firmware simulator
pub mod sim;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;

pub use http::HttpLink;
pub use sim::SimLink;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A blocking request/response link to the machine firmware.
pub trait MachineLink {
    /// Post one line of G-code and return the raw reply text.
    ///
    /// ## Arguments
    /// - `code` - The G-code line to send, without a trailing newline
    /// - `timeout` - Optional timeout for this request. `None` waits indefinitely.
    fn send_gcode(&mut self, code: &str, timeout: Option<Duration>) -> Result<String, LinkError>;

    /// Read a file from the machine's virtual SD card, `path` being absolute (`/sys/config.g`).
    fn download_file(&mut self, path: &str, timeout: Option<Duration>) -> Result<String, LinkError>;

    /// Human readable description of the far end of the link.
    fn address(&self) -> &str;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum LinkError {
    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Could not reach {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("Machine answered {url} with HTTP status {status}")]
    Status { url: String, status: u16 },

    #[error("Could not read the reply from {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("Could not build the HTTP client: {0}")]
    Client(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<L: MachineLink + ?Sized> MachineLink for Box<L> {
    fn send_gcode(&mut self, code: &str, timeout: Option<Duration>) -> Result<String, LinkError> {
        (**self).send_gcode(code, timeout)
    }

    fn download_file(&mut self, path: &str, timeout: Option<Duration>) -> Result<String, LinkError> {
        (**self).download_file(path, timeout)
    }

    fn address(&self) -> &str {
        (**self).address()
    }
}

impl LinkError {
    /// True if the request was sent but no reply arrived in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::Timeout(_))
    }
}
