//! # Tool Dock
//!
//! Geometry of the tool dock and the move sequences coupling a tool to the carriage.
//!
//! Installing approaches the dock from the front, unlocks the carriage, slides onto the parked
//! tool, locks it and backs out. Uninstalling is the reverse, the tool being released once it is
//! seated in its parking slot. The dock protection window is lifted for the whole sequence and
//! restored afterwards if the protection mode is on.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{ToolChange, ToolError, ToolParams};
use crate::motion_ctrl::{MotionCtrl, MotionError, Xyz};
use comms_if::{gcode::Axis, net::MachineLink};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Geometry of the tool dock.
///
/// Units: millimeters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DockParams {
    /// Y position from which the carriage moves over to a tool before picking it up
    pub approach_y: f64,

    /// Y position from which the carriage moves over to a slot before parking a tool
    pub release_approach_y: f64,

    /// Y position the carriage backs out to after leaving the dock
    pub retreat_y: f64,

    /// U position releasing the tool lock
    pub unlock_u: f64,

    /// U position engaging the tool lock
    pub lock_u: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for DockParams {
    fn default() -> Self {
        Self {
            approach_y: 220.0,
            release_approach_y: 90.0,
            retreat_y: 70.0,
            unlock_u: 70.0,
            lock_u: 0.0,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Pick a tool up from the dock.
pub fn install<L: MachineLink>(
    machine: &mut MotionCtrl<L>,
    tool: &ToolParams,
    dock: &DockParams,
) -> Result<ToolChange, ToolError> {
    if let Some(current) = machine.tool() {
        let msg = format!("Cannot install {}: uninstall {} first", tool.name, current);
        warn!("[{}] {}", tool.name, msg);
        return Ok(ToolChange::Rejected(msg));
    }

    let v = tool.velocity(None);
    let [park_x, park_y] = tool.parking_xy;

    machine.ensure_homed()?;

    with_dock_open(machine, &tool.name, |m| {
        m.move_xyz_absolute(Xyz::y(dock.approach_y), false, v)?;
        m.move_xyz_absolute(Xyz::x(park_x), false, v)?;
        m.move_axis_absolute(Axis::U, dock.unlock_u)?;
        m.move_xyz_absolute(Xyz::y(park_y), false, v)?;
        m.move_axis_absolute(Axis::U, dock.lock_u)?;
        m.move_xyz_absolute(Xyz::y(dock.retreat_y), false, v)?;

        if let Some(retreat) = tool.retreat() {
            m.move_xyz_absolute(retreat, false, v)?;
        }

        Ok(())
    })?;

    machine.set_tool(Some(tool.name.clone()));

    info!("[{}] Tool installed", tool.name);

    Ok(ToolChange::Installed)
}

/// Return a tool to the dock.
pub fn uninstall<L: MachineLink>(
    machine: &mut MotionCtrl<L>,
    tool: &ToolParams,
    dock: &DockParams,
    velocity: Option<u32>,
) -> Result<ToolChange, ToolError> {
    if machine.tool() != Some(tool.name.as_str()) {
        let msg = match machine.tool() {
            Some(other) => format!("Cannot uninstall {}: {} is installed", tool.name, other),
            None => format!("Cannot uninstall {}: no tool is installed", tool.name),
        };
        warn!("[{}] {}", tool.name, msg);
        return Ok(ToolChange::Rejected(msg));
    }

    let v = tool.velocity(velocity);
    let [park_x, park_y] = tool.parking_xy;

    machine.ensure_homed()?;

    with_dock_open(machine, &tool.name, |m| {
        m.move_xyz_absolute(Xyz::y(dock.release_approach_y), false, v)?;
        m.move_xyz_absolute(Xyz::x(park_x), false, v)?;
        m.move_xyz_absolute(Xyz::y(park_y), false, v)?;
        m.move_axis_absolute(Axis::U, dock.unlock_u)?;
        m.move_xyz_absolute(Xyz::y(dock.retreat_y), false, v)?;

        if let Some(retreat) = tool.retreat() {
            m.move_xyz_absolute(retreat, false, v)?;
        }

        m.move_axis_absolute(Axis::U, dock.lock_u)
    })?;

    machine.set_tool(None);

    info!("[{}] Tool uninstalled", tool.name);

    Ok(ToolChange::Uninstalled)
}

/// Apply a Z travel window and lower the bed into it if it sits above the window.
pub fn enter_z_window<L: MachineLink>(
    machine: &mut MotionCtrl<L>,
    window: [f64; 2],
) -> Result<(), ToolError> {
    let [z_min, z_max] = window;

    machine.set_z_window(z_min, z_max)?;

    let [_, _, z] = machine.position()?;
    if z < z_min {
        machine.move_xyz_absolute(Xyz::z(z_min), false, None)?;
    }

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Run `moves` with the dock protection window lifted.
///
/// The protection is restored afterwards whether or not the moves succeed. A failed move is
/// reported in preference to a failed restore.
fn with_dock_open<L, F>(
    machine: &mut MotionCtrl<L>,
    tool_name: &str,
    moves: F,
) -> Result<(), MotionError>
where
    L: MachineLink,
    F: FnOnce(&mut MotionCtrl<L>) -> Result<(), MotionError>,
{
    machine.set_protection_window(false)?;

    let result = moves(machine);
    let restored = machine.restore_tool_protection();

    match result {
        Ok(()) => restored,
        Err(e) => {
            if let Err(r) = restored {
                warn!("[{}] Could not restore the dock protection: {}", tool_name, r);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::motion_ctrl::MotionParams;
    use crate::prompt::FixedOperator;
    use comms_if::net::SimLink;

    fn homed_machine() -> MotionCtrl<SimLink> {
        let mut m = MotionCtrl::new(
            SimLink::homed(),
            MotionParams::default(),
            Box::new(FixedOperator::new(true)),
        )
        .unwrap();
        m.ensure_homed().unwrap();
        m.link_mut().clear_sent();
        m
    }

    fn camera_params() -> ToolParams {
        ToolParams {
            name: "camera".into(),
            parking_xy: [302.0, 7.0],
            move_velocity: 10000,
            retreat_xy: Some([50.0, 120.0]),
            z_window: None,
        }
    }

    #[test]
    fn test_install_sequence() {
        let mut m = homed_machine();

        let change = install(&mut m, &camera_params(), &DockParams::default()).unwrap();
        assert_eq!(change, ToolChange::Installed);
        assert_eq!(m.tool(), Some("camera"));

        assert_eq!(
            m.link().sent(),
            &[
                "M208 Y0:400",
                "G0 Y220 F10000",
                "G0 X302 F10000",
                "G0 U70",
                "G0 Y7 F10000",
                "G0 U0",
                "G0 Y70 F10000",
                "G0 X50 Y120 F10000",
            ]
        );
    }

    #[test]
    fn test_uninstall_sequence_and_protection() {
        let mut m = homed_machine();
        m.protect_tools(true).unwrap();

        let params = ToolParams {
            retreat_xy: None,
            ..camera_params()
        };
        install(&mut m, &params, &DockParams::default()).unwrap();
        m.link_mut().clear_sent();

        let change = uninstall(&mut m, &params, &DockParams::default(), Some(5000)).unwrap();
        assert_eq!(change, ToolChange::Uninstalled);
        assert_eq!(m.tool(), None);

        assert_eq!(
            m.link().sent(),
            &[
                "M208 Y0:400",
                "G0 Y90 F5000",
                "G0 X302 F5000",
                "G0 Y7 F5000",
                "G0 U70",
                "G0 Y70 F5000",
                "G0 U0",
                "M208 Y50:400",
            ]
        );
        assert!(m.tool_protection());
        assert_eq!(m.link().axis_limits(Axis::Y), (50.0, 400.0));
    }

    #[test]
    fn test_failed_move_restores_protection() {
        let mut m = homed_machine();
        m.protect_tools(true).unwrap();
        m.link_mut().clear_sent();

        // The U unlock is refused
        m.link_mut().fail_after(3);
        assert!(install(&mut m, &camera_params(), &DockParams::default()).is_err());
        assert_eq!(m.tool(), None);

        assert_eq!(
            m.link().sent(),
            &["M208 Y0:400", "G0 Y220 F10000", "G0 X302 F10000", "M208 Y50:400"]
        );
        assert_eq!(m.link().axis_limits(Axis::Y), (50.0, 400.0));
        assert!(m.tool_protection());

        // Without the protection mode the window stays open
        m.protect_tools(false).unwrap();
        m.set_tool(Some("camera".into()));
        m.link_mut().clear_sent();
        m.link_mut().fail_after(1);
        assert!(uninstall(&mut m, &camera_params(), &DockParams::default(), None).is_err());
        assert_eq!(m.link().sent(), &["M208 Y0:400"]);
        assert_eq!(m.tool(), Some("camera"));
    }

    #[test]
    fn test_install_refused_when_tool_mounted() {
        let mut m = homed_machine();
        m.set_tool(Some("gripper".into()));

        let change = install(&mut m, &camera_params(), &DockParams::default()).unwrap();
        assert!(matches!(change, ToolChange::Rejected(_)));
        assert_eq!(m.tool(), Some("gripper"));
        assert!(m.link().sent().is_empty());
    }

    #[test]
    fn test_uninstall_refused_when_not_mounted() {
        let mut m = homed_machine();

        let change = uninstall(&mut m, &camera_params(), &DockParams::default(), None).unwrap();
        assert!(matches!(change, ToolChange::Rejected(_)));

        m.set_tool(Some("gripper".into()));
        let change = uninstall(&mut m, &camera_params(), &DockParams::default(), None).unwrap();
        assert!(matches!(change, ToolChange::Rejected(_)));
        assert_eq!(m.tool(), Some("gripper"));
        assert!(m.link().sent().is_empty());
    }

    #[test]
    fn test_install_requires_homing() {
        let mut m = MotionCtrl::new(
            SimLink::new(),
            MotionParams::default(),
            Box::new(FixedOperator::new(true)),
        )
        .unwrap();
        m.link_mut().clear_sent();

        assert!(install(&mut m, &camera_params(), &DockParams::default()).is_err());
        assert_eq!(m.tool(), None);
        assert!(!m.link().sent().iter().any(|s| s.starts_with("G0") || s.starts_with("M208")));
    }

    #[test]
    fn test_enter_z_window() {
        let mut m = homed_machine();

        enter_z_window(&mut m, [100.0, 300.0]).unwrap();
        assert_eq!(
            m.link().sent(),
            &["M208 Z100:300", "M114", "G0 Z100 F13000"]
        );

        // Already inside the window
        m.link_mut().clear_sent();
        enter_z_window(&mut m, [100.0, 300.0]).unwrap();
        assert_eq!(m.link().sent(), &["M208 Z100:300", "M114"]);
    }
}
