//! [`ServoDriver`] implementation for Raspberry Pi GPIO software PWM

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use rppal::gpio::{Gpio, OutputPin};

use super::{check_duty_cycle, ServoDriver, ServoError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A servo on a BCM numbered GPIO pin.
///
/// The pin is claimed when the servo is driven and freed again on release.
pub struct GpioServo {
    bcm_pin: u8,

    pin: Option<OutputPin>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GpioServo {
    pub fn new(bcm_pin: u8) -> Self {
        Self {
            bcm_pin,
            pin: None
        }
    }
}

impl ServoDriver for GpioServo {
    fn set_pwm(&mut self, frequency_hz: f64, duty_cycle: f64) -> Result<(), ServoError> {
        check_duty_cycle(duty_cycle)?;

        if self.pin.is_none() {
            let pin = Gpio::new()
                .and_then(|g| g.get(self.bcm_pin))
                .map_err(|e| ServoError::Gpio(e.to_string()))?
                .into_output();
            self.pin = Some(pin);
        }

        match self.pin {
            Some(ref mut pin) => pin
                .set_pwm_frequency(frequency_hz, duty_cycle)
                .map_err(|e| ServoError::Gpio(e.to_string())),
            None => Err(ServoError::Gpio(format!("GPIO {} is not claimed", self.bcm_pin)))
        }
    }

    fn release(&mut self) -> Result<(), ServoError> {
        if let Some(mut pin) = self.pin.take() {
            pin.clear_pwm().map_err(|e| ServoError::Gpio(e.to_string()))?;
        }

        Ok(())
    }
}
