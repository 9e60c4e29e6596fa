//! # Environment Logger Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvExecParams {
    /// Number of samples to attempt
    pub num_samples: usize,

    /// Time between good samples.
    ///
    /// Units: seconds
    pub sample_interval_s: u64,

    /// Time before trying again after a failed read.
    ///
    /// Units: seconds
    pub retry_delay_s: u64,

    /// Name of the CSV file, inside the session archive directory
    pub output_file: String,

    /// BCM number of the GPIO pin the DHT11 data line is connected to
    pub sensor_pin: u8,

    /// Use a simulated sensor
    pub simulated: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for EnvExecParams {
    fn default() -> Self {
        Self {
            num_samples: 1000,
            sample_interval_s: 1830,
            retry_delay_s: 2,
            output_file: "environment.csv".into(),
            sensor_pin: 26,
            simulated: false,
        }
    }
}

impl EnvExecParams {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_s)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_s)
    }
}
