//! # Jubilee Executive Library
//!
//! Control of a Jubilee tool changing machine: the motion controller wrapping the firmware's
//! G-code interface, the tool adapters, keyboard teleoperation and the interactive shell.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod motion_ctrl;
pub mod params;
pub mod prompt;
pub mod servo_ctrl;
pub mod teleop;
pub mod tool;
pub mod workcell;
