//! # Servo Controller Module
//!
//! This module provides a unified servo control interface which can abstract over different types
//! of servo drivers: software PWM on a Raspberry Pi GPIO pin, an Adafruit PCA9685 board, or a
//! simulated servo.
//!
//! Hobby servos take a 50 Hz signal whose pulse width sets the angle. Over the 0 to 180 degree range
//! the duty cycle runs linearly from 2.5 % to 12.5 %.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// [`ServoDriver`] implementation for Raspberry Pi GPIO software PWM.
#[cfg(target_arch = "arm")]
pub mod gpio;

/// [`ServoDriver`] implementation for the Adafruit PCA9685 16 channel servo driver board.
pub mod pca9685;

/// Simulated [`ServoDriver`].
pub mod sim;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use util::maths::lin_map;

#[cfg(target_arch = "arm")]
pub use gpio::GpioServo;
pub use pca9685::Pca9685Servo;
pub use sim::SimServo;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Servo travel.
///
/// Units: degrees
pub const SERVO_ANGLE_RANGE_DEG: (f64, f64) = (0.0, 180.0);

/// Duty cycle at either end of the servo travel, as a fraction of the period.
pub const SERVO_DUTY_RANGE: (f64, f64) = (0.025, 0.125);

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for driving a single servo output.
pub trait ServoDriver {
    /// Start driving the output.
    ///
    /// ## Arguments
    /// - `frequency_hz` - The PWM frequency
    /// - `duty_cycle` - The duty cycle to set. Must be a value between 0.0 and 1.0. Values outside
    ///   this range will be rejected.
    fn set_pwm(&mut self, frequency_hz: f64, duty_cycle: f64) -> Result<(), ServoError>;

    /// Stop driving the output and release the underlying hardware.
    fn release(&mut self) -> Result<(), ServoError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum ServoError {
    #[error("An I2C error occured")]
    I2c,

    #[error("Duty cycle must be between 0.0 and 1.0, got {0}")]
    InvalidDutyCycle(f64),

    #[error("PWM frequency {0} Hz is not supported by the driver")]
    InvalidFrequency(f64),

    #[error("GPIO error: {0}")]
    Gpio(String),
}

/// Which driver the gripper servo is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServoDriverKind {
    /// Software PWM on a GPIO pin
    Gpio,

    /// A channel of a PCA9685 board on the I2C bus
    Pca9685,

    /// No hardware
    Sim,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<S: ServoDriver + ?Sized> ServoDriver for Box<S> {
    fn set_pwm(&mut self, frequency_hz: f64, duty_cycle: f64) -> Result<(), ServoError> {
        (**self).set_pwm(frequency_hz, duty_cycle)
    }

    fn release(&mut self) -> Result<(), ServoError> {
        (**self).release()
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert a servo angle into a duty cycle, `None` if the angle is outside the servo travel.
pub fn angle_to_duty_cycle(angle_deg: f64) -> Option<f64> {
    let (min, max) = SERVO_ANGLE_RANGE_DEG;

    if !(min..=max).contains(&angle_deg) {
        return None;
    }

    Some(lin_map(SERVO_ANGLE_RANGE_DEG, SERVO_DUTY_RANGE, angle_deg))
}

/// Check a duty cycle is a valid fraction.
pub(crate) fn check_duty_cycle(duty_cycle: f64) -> Result<(), ServoError> {
    if (0.0..=1.0).contains(&duty_cycle) {
        Ok(())
    } else {
        Err(ServoError::InvalidDutyCycle(duty_cycle))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_angle_to_duty_cycle() {
        assert_eq!(angle_to_duty_cycle(0.0), Some(0.025));
        assert_eq!(angle_to_duty_cycle(180.0), Some(0.125));

        // 2.5 % + 30/180 * 10 %
        let open = angle_to_duty_cycle(30.0).unwrap();
        assert!((open - (0.025 + 30.0 / 180.0 * 0.1)).abs() < 1e-12);

        assert_eq!(angle_to_duty_cycle(-1.0), None);
        assert_eq!(angle_to_duty_cycle(180.5), None);
        assert_eq!(angle_to_duty_cycle(std::f64::NAN), None);
    }

    #[test]
    fn test_check_duty_cycle() {
        assert!(check_duty_cycle(0.5).is_ok());
        assert!(matches!(check_duty_cycle(1.5), Err(ServoError::InvalidDutyCycle(_))));
    }
}
