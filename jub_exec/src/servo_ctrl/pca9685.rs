//! [`ServoDriver`] implementation for the PCA9685 driver

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use embedded_hal::blocking::i2c::{Write, WriteRead};
use pwm_pca9685::{Channel, Pca9685};

use super::{check_duty_cycle, ServoDriver, ServoError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const MAX_PWM: u16 = 4096;

/// Frequency of the board's internal oscillator.
///
/// Units: Hz
const OSCILLATOR_HZ: f64 = 25_000_000.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One channel of a PCA9685 board.
pub struct Pca9685Servo<I2C> {
    board: Pca9685<I2C>,

    channel: Channel,

    enabled: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<I2C, E> Pca9685Servo<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>
{
    /// Drive `channel` of an initialised board.
    pub fn new(board: Pca9685<I2C>, channel: Channel) -> Self {
        Self {
            board,
            channel,
            enabled: false
        }
    }
}

impl<I2C, E> ServoDriver for Pca9685Servo<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>
{
    fn set_pwm(
        &mut self,
        frequency_hz: f64,
        duty_cycle: f64
    ) -> Result<(), ServoError> {

        // If the duty cycle is out of range return an error
        check_duty_cycle(duty_cycle)?;

        // The board's frequency is set by a prescaler which must be between 3 and 255
        let prescale = (OSCILLATOR_HZ / (MAX_PWM as f64 * frequency_hz)).round() - 1.0;
        if !(3.0..=255.0).contains(&prescale) {
            return Err(ServoError::InvalidFrequency(frequency_hz))
        }

        if !self.enabled {
            self.board.set_prescale(prescale as u8).map_err(map_err)?;
            self.board.enable().map_err(map_err)?;
            self.enabled = true;
        }

        let off = ((duty_cycle * (MAX_PWM as f64)) as u16).min(MAX_PWM - 1);

        self.board.set_channel_on_off(self.channel, 0, off).map_err(map_err)
    }

    fn release(&mut self) -> Result<(), ServoError> {
        self.board.set_channel_full_off(self.channel).map_err(map_err)?;
        self.board.disable().map_err(map_err)?;
        self.enabled = false;

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn map_err<E>(e: pwm_pca9685::Error<E>) -> ServoError {
    match e {
        pwm_pca9685::Error::I2C(_) => ServoError::I2c,
        pwm_pca9685::Error::InvalidInputData => ServoError::InvalidDutyCycle(std::f64::NAN)
    }
}
