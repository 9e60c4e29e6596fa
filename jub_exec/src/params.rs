//! Parameters of the jubilee executable

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::motion_ctrl::MotionParams;
use crate::teleop::TeleopParams;
use crate::tool::{
    camera::CameraParams,
    dock::DockParams,
    gripper::GripperParams,
    pipette::PipetteParams,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters loaded from `jub_exec.toml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct JubExecParams {
    pub machine: MotionParams,
    pub dock: DockParams,
    pub camera: CameraParams,
    pub gripper: GripperParams,
    pub pipette: PipetteParams,
    pub teleop: TeleopParams,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::servo_ctrl::ServoDriverKind;

    #[test]
    fn test_partial_file() {
        let p: JubExecParams = util::params::from_str(
            r#"
            [machine]
            address = "192.168.1.2"

            [gripper]
            driver = "pca9685"
            open_angle_deg = 45.0

            [pipette.tool]
            name = "micropipette"
            parking_xy = [140.0, 18.0]
            move_velocity = 8000
            "#,
        )
        .unwrap();

        assert_eq!(p.machine.address, "192.168.1.2");
        assert_eq!(p.machine.default_feedrate, 13000);
        assert_eq!(p.gripper.driver, ServoDriverKind::Pca9685);
        assert_eq!(p.gripper.open_angle_deg, 45.0);
        assert_eq!(p.gripper.close_angle_deg, 0.0);
        assert_eq!(p.pipette.tool.parking_xy, [140.0, 18.0]);
        assert_eq!(p.pipette.tool.z_window, None);
        assert_eq!(p.pipette.max_volume_ul, 1200.0);
        assert_eq!(p.camera.tool.parking_xy, [302.0, 7.0]);
        assert_eq!(p.dock.approach_y, 220.0);
    }

    #[test]
    fn test_shipped_file() {
        let p: JubExecParams = util::params::load_from_path(
            concat!(env!("CARGO_MANIFEST_DIR"), "/../params/jub_exec.toml")
        )
        .unwrap();

        assert_eq!(p.camera.tool.retreat_xy, Some([50.0, 120.0]));
        assert_eq!(p.gripper.pca9685_address, 0x40);
        assert_eq!(p.pipette.tool.z_window, Some([100.0, 300.0]));
        assert_eq!(p.dock, DockParams::default());
    }
}
