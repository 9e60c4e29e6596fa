//! # Environment Sensors
//!
//! Temperature and humidity sensors behind a common [`EnvSensor`] trait. The DHT11 driver is only
//! available on the Raspberry Pi, elsewhere a simulated sensor is used.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

#[cfg(target_arch = "arm")]
mod dht11;
mod sim;

#[cfg(target_arch = "arm")]
pub use dht11::Dht11;
pub use sim::SimSensor;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

pub trait EnvSensor {
    /// Take a single reading.
    fn read(&mut self) -> Result<Reading, SensorError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Units: degrees Celsius
    pub temperature_c: f64,

    /// Relative humidity.
    ///
    /// Units: percent
    pub humidity_pct: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("GPIO error: {0}")]
    Gpio(String),

    #[error("The sensor did not respond in time ({0})")]
    Timeout(&'static str),

    #[error("Checksum mismatch: expected {expected:#04x}, got {got:#04x}")]
    Checksum { expected: u8, got: u8 },

    #[error("Reading out of the sensor's range: {0:?}")]
    OutOfRange(Reading),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<S: EnvSensor + ?Sized> EnvSensor for Box<S> {
    fn read(&mut self) -> Result<Reading, SensorError> {
        (**self).read()
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Decode the 5 byte DHT11 frame: humidity integer and decimal, temperature integer and decimal,
/// checksum.
pub fn decode_dht11(frame: [u8; 5]) -> Result<Reading, SensorError> {
    let sum = frame[..4].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if sum != frame[4] {
        return Err(SensorError::Checksum { expected: sum, got: frame[4] });
    }

    // The sign of the temperature is carried in the top bit of its decimal byte
    let magnitude = frame[2] as f64 + (frame[3] & 0x7f) as f64 / 10.0;
    let reading = Reading {
        humidity_pct: frame[0] as f64 + frame[1] as f64 / 10.0,
        temperature_c: if frame[3] & 0x80 != 0 { -magnitude } else { magnitude },
    };

    if reading.humidity_pct > 100.0 || reading.temperature_c < -20.0 || reading.temperature_c > 60.0 {
        return Err(SensorError::OutOfRange(reading));
    }

    Ok(reading)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_decode() {
        let r = decode_dht11([45, 0, 23, 5, 73]).unwrap();
        assert_eq!(r.humidity_pct, 45.0);
        assert_eq!(r.temperature_c, 23.5);

        assert!(matches!(
            decode_dht11([45, 0, 23, 5, 74]),
            Err(SensorError::Checksum { expected: 73, got: 74 })
        ));
        assert!(matches!(
            decode_dht11([120, 0, 23, 0, 143]),
            Err(SensorError::OutOfRange(_))
        ));
    }
}
