//! Simulated environment sensor

use super::{EnvSensor, Reading, SensorError};

/// A sensor drifting slowly around a fixed reading, failing every `fail_every` reads if set.
#[derive(Debug, Clone)]
pub struct SimSensor {
    pub base: Reading,
    pub fail_every: Option<usize>,
    reads: usize,
}

impl SimSensor {
    pub fn new(base: Reading) -> Self {
        Self {
            base,
            fail_every: None,
            reads: 0,
        }
    }
}

impl Default for SimSensor {
    fn default() -> Self {
        Self::new(Reading { temperature_c: 22.0, humidity_pct: 45.0 })
    }
}

impl EnvSensor for SimSensor {
    fn read(&mut self) -> Result<Reading, SensorError> {
        self.reads += 1;

        if let Some(n) = self.fail_every {
            if n > 0 && self.reads % n == 0 {
                return Err(SensorError::Timeout("simulated"));
            }
        }

        let drift = (self.reads as f64 * 0.1).sin();

        Ok(Reading {
            temperature_c: self.base.temperature_c + drift,
            humidity_pct: self.base.humidity_pct + 2.0 * drift,
        })
    }
}
