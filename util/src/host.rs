//! Host platform (linux for example) utility functions

use std::env;
use std::path::PathBuf;

/// Name of the environment variable pointing at the software root directory.
pub const SW_ROOT_ENV_VAR: &str = "JUBILEE_SW_ROOT";

/// Summary information about the machine this software is running on.
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub os: &'static str,
    pub arch: &'static str,
    pub family: &'static str,
    pub hostname: Option<String>,
}

/// Retrieve information about the host platform.
pub fn get_host_info() -> HostInfo {
    HostInfo {
        os: env::consts::OS,
        arch: env::consts::ARCH,
        family: env::consts::FAMILY,
        hostname: env::var("HOSTNAME")
            .ok()
            .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
            .map(|h| h.trim().to_string()),
    }
}

/// Get the software root directory from the `JUBILEE_SW_ROOT` environment variable.
pub fn get_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
