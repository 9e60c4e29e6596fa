//! # Tool Adapters
//!
//! Each end-effector is parked in the tool dock at the back of the machine. A tool adapter knows
//! where its tool is parked and drives the dock choreography which couples it to, or releases it
//! from, the carriage. Only one tool may be mounted at a time: the mounted tool's name is held by the
//! [`MotionCtrl`], and every adapter checks it before acting.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Camera tool
pub mod camera;

/// Tool dock geometry and the coupling choreography
pub mod dock;

/// Servo gripper tool
pub mod gripper;

/// Micropipette tool
pub mod pipette;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::motion_ctrl::{MotionCtrl, MotionError, Xyz};
use crate::servo_ctrl::ServoError;
use comms_if::net::MachineLink;
use dock::DockParams;

pub use camera::{CameraDevice, CameraTool, CaptureError};
pub use gripper::Gripper;
pub use pipette::Micropipette;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Common behaviour of every tool.
///
/// The machine is passed into each call rather than held by the adapter.
pub trait ToolAdapter {
    /// Parking position and motion parameters of this tool.
    fn params(&self) -> &ToolParams;

    /// Geometry of the dock this tool is parked in.
    fn dock(&self) -> &DockParams;

    /// Name the machine records while this tool is mounted.
    fn name(&self) -> &str {
        &self.params().name
    }

    /// True if this tool is the one mounted on the carriage.
    fn is_installed<L: MachineLink>(&self, machine: &MotionCtrl<L>) -> bool {
        machine.tool() == Some(self.name())
    }

    /// Bring the machine into a safe state for this tool, run once before the first install.
    ///
    /// Tools with a safe Z window have it applied and the bed lowered into it.
    fn prepare<L: MachineLink>(&mut self, machine: &mut MotionCtrl<L>) -> Result<(), ToolError> {
        if let Some(window) = self.params().z_window {
            dock::enter_z_window(machine, window)?;
        }

        Ok(())
    }

    /// Pick this tool up from the dock.
    ///
    /// Refused without any motion if another tool is mounted.
    fn install<L: MachineLink>(
        &mut self,
        machine: &mut MotionCtrl<L>
    ) -> Result<ToolChange, ToolError> {
        dock::install(machine, self.params(), self.dock())
    }

    /// Return this tool to the dock, optionally at a different velocity.
    ///
    /// Refused without any motion unless this tool is mounted.
    fn uninstall<L: MachineLink>(
        &mut self,
        machine: &mut MotionCtrl<L>,
        velocity: Option<u32>
    ) -> Result<ToolChange, ToolError> {
        dock::uninstall(machine, self.params(), self.dock(), velocity)
    }

    /// Fail unless this tool is mounted.
    fn ensure_installed<L: MachineLink>(&self, machine: &MotionCtrl<L>) -> Result<(), ToolError> {
        if self.is_installed(machine) {
            Ok(())
        } else {
            Err(ToolError::NotInstalled {
                tool: self.name().to_string(),
                installed: machine.tool().map(String::from),
            })
        }
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters common to every tool.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ToolParams {
    /// Name recorded by the machine while the tool is mounted
    pub name: String,

    /// Position of the carriage when the tool is seated in the dock.
    ///
    /// Units: millimeters
    pub parking_xy: [f64; 2],

    /// Feedrate of the dock choreography.
    ///
    /// Units: mm/min
    pub move_velocity: u32,

    /// Position the carriage moves to after leaving the dock, if any.
    ///
    /// Units: millimeters
    #[serde(default)]
    pub retreat_xy: Option<[f64; 2]>,

    /// Z travel limits applied before the tool is first used, if any.
    ///
    /// Units: millimeters
    #[serde(default)]
    pub z_window: Option<[f64; 2]>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The tools available on the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolId {
    Camera,
    Gripper,
    Micropipette,
}

/// Outcome of a tool change.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolChange {
    Installed,
    Uninstalled,

    /// The change was refused, nothing was sent to the machine.
    Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{tool} is not installed (installed tool: {installed:?})")]
    NotInstalled {
        tool: String,
        installed: Option<String>,
    },

    #[error("Requested volume {requested} uL is outside 0 to {max} uL")]
    VolumeOutOfRange { requested: f64, max: f64 },

    #[error("Requested plunger step {requested} is outside 0 to {max}")]
    StepOutOfRange { requested: f64, max: f64 },

    #[error("The plunger is at zero, use press before aspirating")]
    NotPressed,

    #[error("Servo angle {0} deg is outside 0 to 180 deg")]
    AngleOutOfRange(f64),

    #[error("Servo error: {0}")]
    Servo(#[from] ServoError),

    #[error("Could not save the image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Motion error: {0}")]
    Motion(#[from] MotionError),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ToolParams {
    /// Velocity of the choreography, overridden by `velocity` if given.
    pub fn velocity(&self, velocity: Option<u32>) -> Option<u32> {
        Some(velocity.unwrap_or(self.move_velocity))
    }

    /// Retreat target, if any.
    pub fn retreat(&self) -> Option<Xyz> {
        self.retreat_xy.map(|[x, y]| Xyz::xy(x, y))
    }
}

impl ToolId {
    pub const ALL: [ToolId; 3] = [ToolId::Camera, ToolId::Gripper, ToolId::Micropipette];

    /// Name of the tool as recorded by the machine.
    pub fn name(&self) -> &'static str {
        match self {
            ToolId::Camera => "camera",
            ToolId::Gripper => "gripper",
            ToolId::Micropipette => "micropipette",
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ToolId {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "camera" | "cam" => Ok(ToolId::Camera),
            "gripper" | "grip" => Ok(ToolId::Gripper),
            "micropipette" | "pipette" => Ok(ToolId::Micropipette),
            _ => Err(ToolError::UnknownTool(s.to_string())),
        }
    }
}

impl ToolError {
    /// True for errors caused by the state of the machine or tool rather than by the transport
    /// or hardware.
    pub fn is_state_error(&self) -> bool {
        match self {
            ToolError::NotInstalled { .. }
            | ToolError::VolumeOutOfRange { .. }
            | ToolError::StepOutOfRange { .. }
            | ToolError::NotPressed
            | ToolError::AngleOutOfRange(_)
            | ToolError::UnknownTool(_) => true,
            ToolError::Motion(e) => e.is_state_error(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tool_id() {
        assert_eq!("Pipette".parse::<ToolId>().unwrap(), ToolId::Micropipette);
        assert_eq!("cam".parse::<ToolId>().unwrap(), ToolId::Camera);
        assert!("wrench".parse::<ToolId>().is_err());
        assert_eq!(ToolId::Gripper.to_string(), "gripper");
    }

    #[test]
    fn test_tool_params() {
        let p: ToolParams = util::params::from_str(
            "name = \"camera\"\nparking_xy = [302.0, 7.0]\nmove_velocity = 10000\nretreat_xy = [50.0, 120.0]"
        ).unwrap();

        assert_eq!(p.velocity(None), Some(10000));
        assert_eq!(p.velocity(Some(2000)), Some(2000));
        assert_eq!(p.retreat(), Some(Xyz::xy(50.0, 120.0)));
        assert_eq!(p.z_window, None);
    }
}
