//! # Motion Control Module
//!
//! The motion controller owns the link to the machine firmware. It tracks the state the firmware
//! does not report cheaply, namely the positioning mode, the homed flags and which tool is mounted,
//! and refuses to move an unhomed machine.
//!
//! All calls are blocking request/response exchanges with the firmware.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;
mod state;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;

use comms_if::{gcode::{Axis, NUM_HOMED_AXES}, model::ModelError, net::LinkError};

pub use params::*;
pub use state::*;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Macro homing the X axis.
pub const MACRO_HOME_X: &str = "/sys/homex.g";

/// Macro homing the Y axis.
pub const MACRO_HOME_Y: &str = "/sys/homey.g";

/// Macro homing the Z axis using the bed mesh.
pub const MACRO_HOME_Z: &str = "/sys/homez.g";

/// Macro homing the Z axis without the bed mesh.
pub const MACRO_HOME_Z_NO_MESH: &str = "/sys/homez_NM.g";

/// Macro homing the tool lock.
pub const MACRO_HOME_U: &str = "/sys/homeu.g";

/// Macro homing the micropipette plunger.
pub const MACRO_HOME_V: &str = "/sys/homev.g";

/// Y travel limits keeping the head out of the tool dock.
pub const PROTECTED_Y_LIMITS: (f64, f64) = (50.0, 400.0);

/// Y travel limits giving access to the tool dock.
pub const UNPROTECTED_Y_LIMITS: (f64, f64) = (0.0, 400.0);

/// Question asked before homing an axis which sweeps the build volume.
pub const CLEAR_VOLUME_PROMPT: &str = "Is the build volume clear of obstacles?";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An XYZ target where each coordinate is optional. Missing coordinates are not moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Xyz {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible errors that can occur during MotionCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    #[error("The machine must be homed first (homed flags: {0:?})")]
    NotHomed([bool; NUM_HOMED_AXES]),

    #[error("Unknown axis: {0}")]
    UnknownAxis(String),

    #[error("The firmware is not ready to connect: {0}")]
    NotReady(ModelError),

    #[error("Connection timed out, the address is invalid or the machine is not connected ({0})")]
    ConnectTimeout(LinkError),

    #[error("The machine could not be reached: {0}")]
    Unreachable(LinkError),

    #[error("Failed to reconnect after {0} attempts")]
    ReconnectFailed(usize),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Could not interpret the reply: {0}")]
    Model(#[from] ModelError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Xyz {
    pub fn new(x: Option<f64>, y: Option<f64>, z: Option<f64>) -> Self {
        Self { x, y, z }
    }

    pub fn x(x: f64) -> Self {
        Self { x: Some(x), ..Default::default() }
    }

    pub fn y(y: f64) -> Self {
        Self { y: Some(y), ..Default::default() }
    }

    pub fn z(z: f64) -> Self {
        Self { z: Some(z), ..Default::default() }
    }

    pub fn xy(x: f64, y: f64) -> Self {
        Self { x: Some(x), y: Some(y), z: None }
    }

    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Self { x: Some(x), y: Some(y), z: Some(z) }
    }

    /// The given coordinates as axis moves, in XYZ order.
    pub fn moves(&self) -> Vec<(Axis, f64)> {
        [(Axis::X, self.x), (Axis::Y, self.y), (Axis::Z, self.z)]
            .iter()
            .filter_map(|(a, v)| v.map(|v| (*a, v)))
            .collect()
    }
}

impl MotionError {
    /// True for errors caused by the state of the machine rather than by the transport.
    pub fn is_state_error(&self) -> bool {
        matches!(self, MotionError::NotHomed(_) | MotionError::UnknownAxis(_))
    }

    /// True for the connection failures which are retried after a reset.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            MotionError::NotReady(_) | MotionError::ConnectTimeout(_) | MotionError::Unreachable(_)
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_xyz_moves() {
        assert_eq!(Xyz::y(220.0).moves(), vec![(Axis::Y, 220.0)]);
        assert_eq!(
            Xyz::xy(50.0, 120.0).moves(),
            vec![(Axis::X, 50.0), (Axis::Y, 120.0)]
        );
        assert!(Xyz::default().moves().is_empty());
    }

    #[test]
    fn test_error_kinds() {
        assert!(MotionError::NotHomed([true, false, true, true]).is_state_error());
        assert!(MotionError::UnknownAxis("W".into()).is_state_error());
        assert!(!MotionError::Link(LinkError::Timeout("x".into())).is_state_error());
        assert!(!MotionError::ConnectTimeout(LinkError::Timeout("x".into())).is_state_error());
        assert!(!MotionError::ReconnectFailed(10).is_state_error());
        assert!(MotionError::ConnectTimeout(LinkError::Timeout("x".into())).is_connection_error());
        assert!(!MotionError::ReconnectFailed(10).is_connection_error());
    }
}
