//! # Workcell
//!
//! The machine together with every tool it can carry. Tool changes go through here so that each
//! tool is prepared once before its first install.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Interactive shell commands
pub mod shell;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::info;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::motion_ctrl::MotionCtrl;
use crate::servo_ctrl::ServoDriver;
use crate::tool::{
    CameraDevice, CameraTool, Gripper, Micropipette, ToolAdapter, ToolChange, ToolError, ToolId,
};
use comms_if::net::MachineLink;

pub use shell::{parse_line, ShellCmd, ShellError, ShellOutcome};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct Workcell<L: MachineLink> {
    pub machine: MotionCtrl<L>,
    pub camera: CameraTool<Box<dyn CameraDevice>>,
    pub gripper: Gripper<Box<dyn ServoDriver>>,
    pub pipette: Micropipette,

    /// Directory photos with a relative path are saved into
    pub photo_dir: PathBuf,

    /// Tools which have been prepared
    prepared: HashSet<ToolId>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<L: MachineLink> Workcell<L> {
    pub fn new(
        machine: MotionCtrl<L>,
        camera: CameraTool<Box<dyn CameraDevice>>,
        gripper: Gripper<Box<dyn ServoDriver>>,
        pipette: Micropipette,
    ) -> Self {
        Self {
            machine,
            camera,
            gripper,
            pipette,
            photo_dir: PathBuf::from("."),
            prepared: HashSet::new(),
        }
    }

    /// Install a tool, preparing the machine for it first if this is its first install.
    ///
    /// Nothing is prepared while another tool is mounted, the install being rejected.
    pub fn install(&mut self, id: ToolId) -> Result<ToolChange, ToolError> {
        if self.machine.tool().is_none() && !self.prepared.contains(&id) {
            info!("Preparing the machine for the {}", id);
            match id {
                ToolId::Camera => self.camera.prepare(&mut self.machine)?,
                ToolId::Gripper => self.gripper.prepare(&mut self.machine)?,
                ToolId::Micropipette => self.pipette.prepare(&mut self.machine)?,
            }
            self.prepared.insert(id);
        }

        match id {
            ToolId::Camera => self.camera.install(&mut self.machine),
            ToolId::Gripper => self.gripper.install(&mut self.machine),
            ToolId::Micropipette => self.pipette.install(&mut self.machine),
        }
    }

    pub fn uninstall(&mut self, id: ToolId, velocity: Option<u32>) -> Result<ToolChange, ToolError> {
        match id {
            ToolId::Camera => self.camera.uninstall(&mut self.machine, velocity),
            ToolId::Gripper => self.gripper.uninstall(&mut self.machine, velocity),
            ToolId::Micropipette => self.pipette.uninstall(&mut self.machine, velocity),
        }
    }

    /// The mounted tool, if it is one of the workcell's tools.
    pub fn installed(&self) -> Option<ToolId> {
        ToolId::ALL
            .iter()
            .copied()
            .find(|id| self.machine.tool() == Some(id.name()))
    }

    pub fn is_prepared(&self, id: ToolId) -> bool {
        self.prepared.contains(&id)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::motion_ctrl::MotionParams;
    use crate::prompt::FixedOperator;
    use crate::servo_ctrl::SimServo;
    use crate::tool::{
        camera::{CameraParams, SimCamera},
        dock::DockParams,
        gripper::GripperParams,
        pipette::PipetteParams,
    };
    use comms_if::net::SimLink;

    pub(crate) fn sim_workcell() -> Workcell<SimLink> {
        let machine = MotionCtrl::new(
            SimLink::homed(),
            MotionParams {
                reconnect_backoff_ms: 0,
                ..Default::default()
            },
            Box::new(FixedOperator::new(true)),
        )
        .unwrap();

        let camera = CameraTool::new(
            CameraParams::default(),
            DockParams::default(),
            Box::new(SimCamera::new((16, 16))) as Box<dyn CameraDevice>,
        );
        let gripper = Gripper::new(
            GripperParams {
                hold_ms: 0,
                ..Default::default()
            },
            DockParams::default(),
            Box::new(SimServo::default()) as Box<dyn ServoDriver>,
        );
        let pipette = Micropipette::new(PipetteParams::default(), DockParams::default());

        Workcell::new(machine, camera, gripper, pipette)
    }

    #[test]
    fn test_prepare_once() {
        let mut w = sim_workcell();

        assert_eq!(w.install(ToolId::Micropipette).unwrap(), ToolChange::Installed);
        assert!(w.is_prepared(ToolId::Micropipette));
        assert_eq!(w.installed(), Some(ToolId::Micropipette));
        assert!(w
            .machine
            .link()
            .sent()
            .iter()
            .any(|s| s == "M98 P\"/sys/homev.g\""));

        w.uninstall(ToolId::Micropipette, None).unwrap();
        w.machine.link_mut().clear_sent();

        w.install(ToolId::Micropipette).unwrap();
        assert!(!w.machine.link().sent().iter().any(|s| s.contains("homev")));
    }

    #[test]
    fn test_single_tool() {
        let mut w = sim_workcell();

        assert_eq!(w.install(ToolId::Gripper).unwrap(), ToolChange::Installed);
        assert!(matches!(
            w.install(ToolId::Camera).unwrap(),
            ToolChange::Rejected(_)
        ));
        assert!(matches!(
            w.uninstall(ToolId::Camera, None).unwrap(),
            ToolChange::Rejected(_)
        ));
        assert_eq!(w.installed(), Some(ToolId::Gripper));

        assert_eq!(w.uninstall(ToolId::Gripper, None).unwrap(), ToolChange::Uninstalled);
        assert_eq!(w.installed(), None);
    }
}
