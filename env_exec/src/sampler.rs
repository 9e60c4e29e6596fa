//! Sampling loop
//!
//! Each attempt reads the sensor once. A good reading is appended to the CSV, which is flushed so
//! the file always holds every sample so far, and the loop waits for the sample interval. A failed
//! reading is skipped and the loop waits for the retry delay instead.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, warn};
use serde::Serialize;
use std::time::Duration;

use crate::params::EnvExecParams;
use crate::sensor::EnvSensor;
use util::archive::{ArchiveError, Archiver};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Format of the time column, month/day/year then the time of day.
pub const TIME_FORMAT: &str = "%m/%d/%y  %H:%M:%S";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One row of the CSV.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRecord {
    #[serde(rename = "Temperature (°C)")]
    pub temperature_c: f64,

    #[serde(rename = "Humidity (%)")]
    pub humidity_pct: f64,

    #[serde(rename = "Time")]
    pub time: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleStats {
    pub good: usize,
    pub failed: usize,
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Run the sampling loop.
///
/// `sleep` is called with the time to wait after every attempt.
pub fn run<S, F>(
    sensor: &mut S,
    archiver: &mut Archiver,
    params: &EnvExecParams,
    mut sleep: F,
) -> Result<SampleStats, ArchiveError>
where
    S: EnvSensor,
    F: FnMut(Duration),
{
    let mut stats = SampleStats::default();

    for i in 0..params.num_samples {
        let time = chrono::Local::now().format(TIME_FORMAT).to_string();

        match sensor.read() {
            Ok(reading) => {
                archiver.serialise(SampleRecord {
                    temperature_c: reading.temperature_c,
                    humidity_pct: reading.humidity_pct,
                    time,
                })?;
                stats.good += 1;

                info!(
                    "[{}/{}] {:.1} °C, {:.1} %",
                    i + 1,
                    params.num_samples,
                    reading.temperature_c,
                    reading.humidity_pct
                );

                sleep(params.sample_interval());
            }
            Err(e) => {
                stats.failed += 1;
                warn!("[{}/{}] Read failed: {}", i + 1, params.num_samples, e);

                sleep(params.retry_delay());
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sensor::SimSensor;

    #[test]
    fn test_failed_reads_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut archiver = Archiver::from_path(dir.path().join("env.csv")).unwrap();
        let mut sensor = SimSensor::default();
        sensor.fail_every = Some(3);

        let params = EnvExecParams {
            num_samples: 6,
            sample_interval_s: 60,
            retry_delay_s: 2,
            ..Default::default()
        };

        let mut sleeps = Vec::new();
        let stats = run(&mut sensor, &mut archiver, &params, |d| sleeps.push(d.as_secs())).unwrap();

        assert_eq!(stats, SampleStats { good: 4, failed: 2 });
        assert_eq!(sleeps, vec![60, 60, 2, 60, 60, 2]);

        let contents = std::fs::read_to_string(dir.path().join("env.csv")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "Temperature (°C),Humidity (%),Time");
    }
}
