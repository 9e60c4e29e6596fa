//! # Micropipette Tool
//!
//! A manual micropipette whose plunger is driven by the V axis. Plunger positions are in the V
//! axis' millimeters and map linearly onto volume:
//!
//! `V = (volume + offset) / slope`
//!
//! with the slope and offset from the pipette calibration. The aspirated volume is tracked here, not
//! by the firmware.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{dock, dock::DockParams, ToolAdapter, ToolError, ToolId, ToolParams};
use crate::motion_ctrl::{MotionCtrl, MACRO_HOME_V};
use comms_if::{
    gcode::{Axis, GCode},
    net::MachineLink,
};
use util::maths::round_dp;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipetteParams {
    pub tool: ToolParams,

    /// Largest volume the pipette can hold.
    ///
    /// Units: microliters
    pub max_volume_ul: f64,

    /// Largest raw plunger position accepted by `press_step`.
    pub max_step: f64,

    /// Plunger position expelling any remaining liquid
    pub blowout_position: f64,

    /// Plunger position dispensing the whole content
    pub dispense_position: f64,

    /// Plunger position pushing the tip off
    pub eject_position: f64,

    /// Calibration slope, microliters per plunger millimeter
    pub slope: f64,

    /// Calibration offset, microliters
    pub offset: f64,
}

/// The micropipette tool.
pub struct Micropipette {
    params: PipetteParams,
    dock: DockParams,

    /// Volume held in the tip.
    ///
    /// Units: microliters
    liquid_ul: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for PipetteParams {
    fn default() -> Self {
        Self {
            tool: ToolParams {
                name: ToolId::Micropipette.name().into(),
                parking_xy: [138.0, 18.0],
                move_velocity: 10000,
                retreat_xy: None,
                z_window: Some([100.0, 300.0]),
            },
            max_volume_ul: 1200.0,
            max_step: 300.0,
            blowout_position: 350.0,
            dispense_position: 400.0,
            eject_position: 450.0,
            slope: 3.42413,
            offset: 13.68852,
        }
    }
}

impl PipetteParams {
    /// Plunger position for a volume.
    pub fn volume_to_position(&self, volume_ul: f64) -> f64 {
        round_dp((volume_ul + self.offset) / self.slope, 2)
    }

    /// Volume for a plunger position.
    pub fn position_to_volume(&self, position: f64) -> f64 {
        position * self.slope - self.offset
    }
}

impl Micropipette {
    pub fn new(params: PipetteParams, dock: DockParams) -> Self {
        Self {
            params,
            dock,
            liquid_ul: 0.0,
        }
    }

    /// Press the plunger down to the position which will aspirate `volume_ul` when released.
    ///
    /// Any liquid still held is blown out first.
    pub fn press<L: MachineLink>(
        &mut self,
        machine: &mut MotionCtrl<L>,
        volume_ul: f64,
    ) -> Result<(), ToolError> {
        self.ensure_installed(machine)?;

        let max = self.params.max_volume_ul;
        if !(0.0..=max).contains(&volume_ul) {
            warn!("[micropipette] {} uL is more than the pipette holds", volume_ul);
            return Err(ToolError::VolumeOutOfRange {
                requested: volume_ul,
                max,
            });
        }

        if self.liquid_ul > 0.0 {
            info!("[micropipette] Blowing out {:.2} uL", self.liquid_ul);
            machine.move_axis_absolute(Axis::V, self.params.blowout_position)?;
            self.liquid_ul = 0.0;
        }

        let position = self.params.volume_to_position(volume_ul);
        machine.move_axis_absolute(Axis::V, position)?;

        Ok(())
    }

    /// Move the plunger to a raw position.
    pub fn press_step<L: MachineLink>(
        &mut self,
        machine: &mut MotionCtrl<L>,
        step: f64,
    ) -> Result<(), ToolError> {
        self.ensure_installed(machine)?;

        let max = self.params.max_step;
        if !(0.0..=max).contains(&step) {
            return Err(ToolError::StepOutOfRange {
                requested: step,
                max,
            });
        }

        machine.move_axis_absolute(Axis::V, step)?;

        Ok(())
    }

    /// Release the plunger, drawing in the volume it was pressed for.
    ///
    /// Returns the aspirated volume in microliters.
    pub fn aspirate<L: MachineLink>(
        &mut self,
        machine: &mut MotionCtrl<L>,
    ) -> Result<f64, ToolError> {
        self.ensure_installed(machine)?;

        let position = machine.axis_position(Axis::V)?;
        if position == 0.0 {
            return Err(ToolError::NotPressed);
        }

        self.liquid_ul = self.params.position_to_volume(position);
        machine.move_axis_absolute(Axis::V, 0.0)?;

        info!("[micropipette] Aspirated {:.2} uL", self.liquid_ul);

        Ok(self.liquid_ul)
    }

    /// Dispense the whole content.
    pub fn dispense<L: MachineLink>(&mut self, machine: &mut MotionCtrl<L>) -> Result<(), ToolError> {
        self.ensure_installed(machine)?;

        machine.move_axis_absolute(Axis::V, self.params.dispense_position)?;
        self.liquid_ul = 0.0;

        Ok(())
    }

    /// Push the tip off and return the plunger to rest.
    pub fn eject_tip<L: MachineLink>(&mut self, machine: &mut MotionCtrl<L>) -> Result<(), ToolError> {
        self.ensure_installed(machine)?;

        machine.move_axis_absolute(Axis::V, self.params.eject_position)?;
        self.liquid_ul = 0.0;
        machine.move_axis_absolute(Axis::V, 0.0)?;

        info!("[micropipette] Tip ejected");

        Ok(())
    }

    /// Volume held in the tip.
    ///
    /// Units: microliters
    pub fn volume(&self) -> f64 {
        self.liquid_ul
    }

    pub fn pipette_params(&self) -> &PipetteParams {
        &self.params
    }
}

impl ToolAdapter for Micropipette {
    fn params(&self) -> &ToolParams {
        &self.params.tool
    }

    fn dock(&self) -> &DockParams {
        &self.dock
    }

    /// Apply the Z window and home the plunger.
    fn prepare<L: MachineLink>(&mut self, machine: &mut MotionCtrl<L>) -> Result<(), ToolError> {
        if let Some(window) = self.params.tool.z_window {
            dock::enter_z_window(machine, window)?;
        }

        machine.send(&GCode::RunMacro(MACRO_HOME_V.into()))?;
        self.liquid_ul = 0.0;

        Ok(())
    }
}
