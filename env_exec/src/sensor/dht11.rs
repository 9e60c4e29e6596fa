//! DHT11 driver over Raspberry Pi GPIO
//!
//! The DHT11 uses a single wire protocol: the host pulls the line low for at least 18 ms, the
//! sensor answers with 80 us low and 80 us high, then sends 40 bits. Every bit starts with 50 us
//! low, followed by a high pulse of about 26 us for a 0 and 70 us for a 1.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use rppal::gpio::{Gpio, IoPin, Level, Mode, PullUpDown};
use std::thread;
use std::time::{Duration, Instant};

use super::{decode_dht11, EnvSensor, Reading, SensorError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const START_LOW: Duration = Duration::from_millis(18);

/// Longest any single level lasts during a transfer.
const LEVEL_TIMEOUT: Duration = Duration::from_micros(200);

/// High pulses longer than this are a 1.
const ONE_THRESHOLD: Duration = Duration::from_micros(40);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct Dht11 {
    pin: IoPin,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Dht11 {
    /// Use the sensor on a BCM numbered pin.
    pub fn new(bcm_pin: u8) -> Result<Self, SensorError> {
        let mut pin = Gpio::new()
            .and_then(|g| g.get(bcm_pin))
            .map_err(|e| SensorError::Gpio(e.to_string()))?
            .into_io(Mode::Input);
        pin.set_pullupdown(PullUpDown::PullUp);

        Ok(Self { pin })
    }

    /// Wait while the line is at `level`, returning how long it stayed there.
    fn wait_while(&self, level: Level, stage: &'static str) -> Result<Duration, SensorError> {
        let start = Instant::now();

        while self.pin.read() == level {
            if start.elapsed() > LEVEL_TIMEOUT {
                return Err(SensorError::Timeout(stage));
            }
        }

        Ok(start.elapsed())
    }
}

impl EnvSensor for Dht11 {
    fn read(&mut self) -> Result<Reading, SensorError> {
        // ---- START SIGNAL ----

        self.pin.set_mode(Mode::Output);
        self.pin.set_low();
        thread::sleep(START_LOW);
        self.pin.set_high();
        self.pin.set_mode(Mode::Input);

        // ---- RESPONSE ----

        self.wait_while(Level::High, "response start")?;
        self.wait_while(Level::Low, "response low")?;
        self.wait_while(Level::High, "response high")?;

        // ---- DATA ----

        let mut frame = [0u8; 5];
        for bit in 0..40 {
            self.wait_while(Level::Low, "bit start")?;
            let high = self.wait_while(Level::High, "bit")?;

            if high > ONE_THRESHOLD {
                frame[bit / 8] |= 0x80 >> (bit % 8);
            }
        }

        decode_dht11(frame)
    }
}
