//! # Gripper Tool
//!
//! A servo driven gripper. The servo is only powered while it moves: each command drives the
//! servo for a short hold time and then releases the output.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

use super::{dock::DockParams, ToolAdapter, ToolError, ToolId, ToolParams};
use crate::motion_ctrl::MotionCtrl;
use crate::servo_ctrl::{angle_to_duty_cycle, ServoDriver, ServoDriverKind};
use comms_if::net::MachineLink;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GripperParams {
    pub tool: ToolParams,

    /// Which driver the servo is connected to
    pub driver: ServoDriverKind,

    /// BCM number of the GPIO pin driving the servo
    pub servo_pin: u8,

    /// I2C address of the PCA9685 board
    pub pca9685_address: u8,

    /// PCA9685 channel driving the servo
    pub pca9685_channel: u8,

    /// Units: degrees
    pub open_angle_deg: f64,

    /// Units: degrees
    pub close_angle_deg: f64,

    /// Units: Hz
    pub pwm_frequency_hz: f64,

    /// Time the servo is driven for before being released.
    ///
    /// Units: milliseconds
    pub hold_ms: u64,
}

/// The gripper tool.
pub struct Gripper<S: ServoDriver> {
    params: GripperParams,
    dock: DockParams,
    servo: S,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for GripperParams {
    fn default() -> Self {
        Self {
            tool: ToolParams {
                name: ToolId::Gripper.name().into(),
                parking_xy: [40.0, 7.0],
                move_velocity: 10000,
                retreat_xy: None,
                z_window: Some([100.0, 300.0]),
            },
            driver: ServoDriverKind::Gpio,
            servo_pin: 13,
            pca9685_address: 0x40,
            pca9685_channel: 0,
            open_angle_deg: 30.0,
            close_angle_deg: 0.0,
            pwm_frequency_hz: 50.0,
            hold_ms: 500,
        }
    }
}

impl<S: ServoDriver> Gripper<S> {
    pub fn new(params: GripperParams, dock: DockParams, servo: S) -> Self {
        Self { params, dock, servo }
    }

    /// Open the gripper to the configured open angle.
    pub fn open<L: MachineLink>(&mut self, machine: &MotionCtrl<L>) -> Result<(), ToolError> {
        let angle = self.params.open_angle_deg;
        self.open_angle(machine, angle)
    }

    /// Close the gripper to the configured close angle.
    pub fn close<L: MachineLink>(&mut self, machine: &MotionCtrl<L>) -> Result<(), ToolError> {
        let angle = self.params.close_angle_deg;
        self.open_angle(machine, angle)
    }

    /// Drive the gripper servo to an angle.
    ///
    /// Units: degrees, 0 to 180
    pub fn open_angle<L: MachineLink>(
        &mut self,
        machine: &MotionCtrl<L>,
        angle_deg: f64,
    ) -> Result<(), ToolError> {
        self.ensure_installed(machine)?;

        let duty_cycle = match angle_to_duty_cycle(angle_deg) {
            Some(d) => d,
            None => return Err(ToolError::AngleOutOfRange(angle_deg)),
        };

        debug!("[gripper] {} deg, duty cycle {:.4}", angle_deg, duty_cycle);

        let driven = self.servo.set_pwm(self.params.pwm_frequency_hz, duty_cycle);

        if driven.is_ok() {
            thread::sleep(Duration::from_millis(self.params.hold_ms));
        }

        // The output is released even when driving it failed
        let released = self.servo.release();
        if let Err(ref e) = released {
            warn!("[gripper] Could not release the servo: {}", e);
        }

        driven?;
        released?;

        info!("[gripper] Moved to {} deg", angle_deg);

        Ok(())
    }

    pub fn servo(&self) -> &S {
        &self.servo
    }

    pub fn gripper_params(&self) -> &GripperParams {
        &self.params
    }
}

impl<S: ServoDriver> ToolAdapter for Gripper<S> {
    fn params(&self) -> &ToolParams {
        &self.params.tool
    }

    fn dock(&self) -> &DockParams {
        &self.dock
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::motion_ctrl::MotionParams;
    use crate::prompt::FixedOperator;
    use crate::servo_ctrl::{ServoError, SimServo};
    use comms_if::net::SimLink;

    fn machine() -> MotionCtrl<SimLink> {
        MotionCtrl::new(
            SimLink::homed(),
            MotionParams::default(),
            Box::new(FixedOperator::new(true)),
        )
        .unwrap()
    }

    fn gripper() -> Gripper<SimServo> {
        let params = GripperParams {
            hold_ms: 0,
            ..Default::default()
        };
        Gripper::new(params, DockParams::default(), SimServo::default())
    }

    /// A servo whose output can never be driven.
    #[derive(Default)]
    struct BrokenServo {
        releases: usize,
    }

    impl ServoDriver for BrokenServo {
        fn set_pwm(&mut self, _: f64, _: f64) -> Result<(), ServoError> {
            Err(ServoError::I2c)
        }

        fn release(&mut self) -> Result<(), ServoError> {
            self.releases += 1;
            Ok(())
        }
    }

    #[test]
    fn test_open_close() {
        let mut m = machine();
        m.set_tool(Some("gripper".into()));
        let mut g = gripper();

        g.open(&m).unwrap();
        g.close(&m).unwrap();

        let servo = g.servo();
        assert_eq!(servo.demands.len(), 2);
        assert_eq!(servo.demands[0].0, 50.0);
        assert!((servo.demands[0].1 - (0.025 + 30.0 / 180.0 * 0.1)).abs() < 1e-12);
        assert!((servo.demands[1].1 - 0.025).abs() < 1e-12);
        assert_eq!(servo.releases, 2);
        assert!(!servo.active);
    }

    #[test]
    fn test_requires_install() {
        let m = machine();
        let mut g = gripper();

        assert!(matches!(g.open(&m), Err(ToolError::NotInstalled { .. })));
        assert!(g.servo().demands.is_empty());
    }

    #[test]
    fn test_angle_rejected() {
        let mut m = machine();
        m.set_tool(Some("gripper".into()));
        let mut g = gripper();

        assert!(matches!(
            g.open_angle(&m, 181.0),
            Err(ToolError::AngleOutOfRange(_))
        ));
        assert!(matches!(
            g.open_angle(&m, -5.0),
            Err(ToolError::AngleOutOfRange(_))
        ));
        assert!(g.servo().demands.is_empty());
        assert_eq!(g.servo().releases, 0);
    }

    #[test]
    fn test_released_after_failure() {
        let mut m = machine();
        m.set_tool(Some("gripper".into()));
        let params = GripperParams {
            hold_ms: 0,
            ..Default::default()
        };
        let mut g = Gripper::new(params, DockParams::default(), BrokenServo::default());

        assert!(matches!(g.open(&m), Err(ToolError::Servo(_))));
        assert_eq!(g.servo().releases, 1);
    }
}
