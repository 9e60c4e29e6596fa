//! Simulated servo driver

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::debug;

use super::{check_duty_cycle, ServoDriver, ServoError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A servo which only records what it was asked to do.
#[derive(Debug, Clone, Default)]
pub struct SimServo {
    /// Every `(frequency_hz, duty_cycle)` demand, in order
    pub demands: Vec<(f64, f64)>,

    /// Number of times the output was released
    pub releases: usize,

    /// True while the output is being driven
    pub active: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ServoDriver for SimServo {
    fn set_pwm(&mut self, frequency_hz: f64, duty_cycle: f64) -> Result<(), ServoError> {
        check_duty_cycle(duty_cycle)?;

        debug!("Sim servo at {} Hz, duty cycle {:.4}", frequency_hz, duty_cycle);

        self.demands.push((frequency_hz, duty_cycle));
        self.active = true;

        Ok(())
    }

    fn release(&mut self) -> Result<(), ServoError> {
        self.releases += 1;
        self.active = false;

        Ok(())
    }
}
