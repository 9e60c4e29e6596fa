//! Implementations for the MotionCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use serde::Serialize;
use std::thread;
use std::time::Duration;

// Internal
use super::*;
use crate::prompt::Operator;
use comms_if::{
    gcode::{self, GCode, HOMED_AXES},
    model::{self, Position, KEY_AXES, KEY_AXES_HOMED, KEY_TOOLS},
    net::MachineLink,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Motion controller state.
pub struct MotionCtrl<L: MachineLink> {
    params: MotionParams,

    link: L,

    operator: Box<dyn Operator>,

    /// True when the firmware is in absolute positioning mode.
    absolute_moves: bool,

    /// Set when a mode change failed, so the firmware mode is not known.
    mode_unknown: bool,

    axes_homed: [bool; NUM_HOMED_AXES],

    /// Name of the mounted tool.
    tool: Option<String>,

    /// True if the tool dock protection window should be active outside of tool changes.
    mode_protect_tools: bool,

    cache: ModelCache,
}

/// Values read from the firmware on demand and kept until invalidated.
#[derive(Debug, Default)]
struct ModelCache {
    active_tool_index: Option<Option<usize>>,
    tool_z_offsets: Option<Vec<f64>>,
    axis_limits: Option<Vec<(f64, f64)>>,
    position: Option<Position>,
}

/// Snapshot of the controller state, saved into the session.
#[derive(Debug, Clone, Serialize)]
pub struct MachineState {
    pub address: String,
    pub simulated: bool,
    pub absolute_moves: bool,
    pub axes_homed: [bool; NUM_HOMED_AXES],
    pub tool: Option<String>,
    pub mode_protect_tools: bool,
    pub active_tool_index: Option<Option<usize>>,
    pub tool_z_offsets: Option<Vec<f64>>,
    pub axis_limits: Option<Vec<(f64, f64)>>,
    pub position: Option<Position>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<L: MachineLink> MotionCtrl<L> {

    // ---- LIFECYCLE ----

    /// Connect to the machine and bring it into a known state.
    ///
    /// The homed flags start cleared whatever the firmware reports, so the first move re-checks
    /// them. If `params.reset` is set the board is reset before use.
    pub fn new(
        link: L,
        params: MotionParams,
        operator: Box<dyn Operator>
    ) -> Result<Self, MotionError> {
        if params.address != "127.0.0.1" && !params.simulated {
            warn!("Disconnecting this computer from the network will end the session with the machine");
        }

        let mut ctrl = Self {
            params,
            link,
            operator,
            absolute_moves: true,
            mode_unknown: false,
            axes_homed: [false; NUM_HOMED_AXES],
            tool: None,
            mode_protect_tools: false,
            cache: ModelCache::default(),
        };

        ctrl.connect()?;
        ctrl.axes_homed = [false; NUM_HOMED_AXES];

        if ctrl.params.reset {
            ctrl.reset()?;
        }

        ctrl.set_absolute_moves(true)?;

        let config = GCode::RunMacro(ctrl.params.config_macro.clone());
        ctrl.send(&config)?;

        Ok(ctrl)
    }

    /// Probe the firmware and refresh the cached model values.
    ///
    /// Does nothing in simulated mode.
    pub fn connect(&mut self) -> Result<(), MotionError> {
        if self.params.simulated {
            debug!("Simulated machine, skipping connection");
            return Ok(());
        }

        info!("Connecting to {} ...", self.link.address());

        self.probe().map_err(|e| match e {
            MotionError::Link(l) if l.is_timeout() => MotionError::ConnectTimeout(l),
            MotionError::Link(l) => MotionError::Unreachable(l),
            MotionError::Model(m @ ModelError::Json(_)) => MotionError::NotReady(m),
            e => e,
        })?;

        info!("Connected");

        Ok(())
    }

    /// Close the connection to the machine.
    ///
    /// Each request stands alone so there is nothing to release.
    pub fn disconnect(&mut self) {
        info!("Disconnected from {}", self.link.address());
    }

    /// Software reset the board and reconnect.
    ///
    /// Connection failures are retried up to `reconnect_attempts` times, waiting
    /// `reconnect_backoff_ms` before each attempt. Any other failure is returned immediately.
    pub fn reset(&mut self) -> Result<(), MotionError> {
        self.send(&GCode::Reset)?;
        self.axes_homed = [false; NUM_HOMED_AXES];
        self.disconnect();

        info!("Reconnecting...");

        let attempts = self.params.reconnect_attempts;

        for attempt in 1..=attempts {
            thread::sleep(self.params.reconnect_backoff());

            match self.connect() {
                Ok(()) => {
                    self.axes_homed = [false; NUM_HOMED_AXES];
                    return Ok(());
                }
                Err(e) if e.is_connection_error() => {
                    warn!("Reconnection attempt {}/{} failed: {}", attempt, attempts, e)
                }
                Err(e) => return Err(e),
            }
        }

        Err(MotionError::ReconnectFailed(attempts))
    }

    // ---- RAW ACCESS ----

    /// Send one line of G-code and return the raw reply.
    pub fn gcode(&mut self, code: &str, timeout: Option<Duration>) -> Result<String, MotionError> {
        if self.params.debug || self.params.simulated {
            info!("Sending: {}", code);
        } else {
            debug!("Sending: {}", code);
        }

        self.invalidate_for_line(code);

        let reply = match self.link.send_gcode(code, timeout) {
            Ok(r) => r,
            Err(e) => {
                self.track_mode(code, false);
                return Err(e.into());
            }
        };

        self.track_mode(code, true);

        if self.params.debug {
            info!("Received: {}", reply.trim_end());
        } else {
            debug!("Received: {}", reply.trim_end());
        }

        Ok(reply)
    }

    /// Send a G-code command without a timeout.
    pub fn send(&mut self, code: &GCode) -> Result<String, MotionError> {
        self.gcode(&code.to_string(), None)
    }

    /// Download a file from the machine, for example `/sys/tfree0.g`.
    pub fn download_file(
        &mut self,
        path: &str,
        timeout: Option<Duration>
    ) -> Result<String, MotionError> {
        Ok(self.link.download_file(path, timeout)?)
    }

    // ---- HOMING ----

    /// Home every axis. Z and U are only homed if the operator confirms the volume is clear.
    pub fn home_all(&mut self, mesh_mode: bool) -> Result<(), MotionError> {
        self.home_xy()?;
        self.home_z(mesh_mode)?;
        self.home_u()?;

        Ok(())
    }

    /// Home X and Y. Y goes first so the head clears the tool dock.
    pub fn home_xy(&mut self) -> Result<(), MotionError> {
        self.send(&GCode::RunMacro(MACRO_HOME_Y.into()))?;
        self.send(&GCode::RunMacro(MACRO_HOME_X.into()))?;

        self.axes_homed[0] = true;
        self.axes_homed[1] = true;

        Ok(())
    }

    /// Home Z after the operator confirms the bed is clear. Returns false if the operator
    /// declined, in which case nothing is sent.
    pub fn home_z(&mut self, mesh_mode: bool) -> Result<bool, MotionError> {
        if !self.operator.confirm(CLEAR_VOLUME_PROMPT) {
            warn!("Z homing cancelled by the operator");
            return Ok(false);
        }

        let homing_macro = if mesh_mode {
            MACRO_HOME_Z
        } else {
            MACRO_HOME_Z_NO_MESH
        };
        self.send(&GCode::RunMacro(homing_macro.into()))?;

        self.axes_homed[2] = true;

        Ok(true)
    }

    /// Home the tool lock after the operator confirms the bed is clear. Returns false if the
    /// operator declined, in which case nothing is sent.
    pub fn home_u(&mut self) -> Result<bool, MotionError> {
        if !self.operator.confirm(CLEAR_VOLUME_PROMPT) {
            warn!("U homing cancelled by the operator");
            return Ok(false);
        }

        self.send(&GCode::RunMacro(MACRO_HOME_U.into()))?;

        self.axes_homed[3] = true;

        Ok(true)
    }

    /// Mark every axis as homed and declare the current XYZ position as correct.
    pub fn home_all_forced(&mut self) -> Result<(), MotionError> {
        self.axes_homed = [true; NUM_HOMED_AXES];

        let [x, y, z] = self.position()?;

        for (axis, value) in [(Axis::X, x), (Axis::Y, y), (Axis::Z, z)].iter() {
            self.send(&GCode::SetPosition(*axis, *value))?;
        }

        Ok(())
    }

    /// Declare the current position of the given axes as zero.
    ///
    /// Every name is checked before anything is sent.
    pub fn home_in_place(&mut self, axes: &[&str]) -> Result<(), MotionError> {
        let axes = axes
            .iter()
            .map(|name| match name.parse::<Axis>() {
                Ok(a) if HOMED_AXES.contains(&a) => Ok(a),
                _ => Err(MotionError::UnknownAxis(name.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        for axis in axes {
            self.send(&GCode::SetPosition(axis, 0.0))?;
        }

        Ok(())
    }

    /// Check the machine is homed, asking the firmware if the cached flags are not all set.
    pub fn ensure_homed(&mut self) -> Result<(), MotionError> {
        if self.is_homed() {
            return Ok(());
        }

        let reply = self.send(&GCode::QueryModel(KEY_AXES_HOMED.into()))?;
        self.axes_homed = model::parse_axes_homed(&reply)?;

        if self.is_homed() {
            Ok(())
        } else {
            Err(MotionError::NotHomed(self.axes_homed))
        }
    }

    // ---- MOVES ----

    /// Move to an absolute XYZ target.
    ///
    /// `velocity` is the feedrate in mm/min, `None` using the default. If `wait` is set this
    /// blocks until the move completes.
    pub fn move_xyz_absolute(
        &mut self,
        target: Xyz,
        wait: bool,
        velocity: Option<u32>
    ) -> Result<(), MotionError> {
        self.ensure_homed()?;
        self.set_absolute_moves(false)?;
        self.move_xyz(target, wait, velocity)
    }

    /// Move by an XYZ offset from the current position.
    pub fn move_xyz_relative(
        &mut self,
        offset: Xyz,
        wait: bool,
        velocity: Option<u32>
    ) -> Result<(), MotionError> {
        self.ensure_homed()?;
        self.set_relative_moves(false)?;
        self.move_xyz(offset, wait, velocity)
    }

    /// Move a single axis to an absolute position at the current feedrate.
    pub fn move_axis_absolute(&mut self, axis: Axis, position: f64) -> Result<(), MotionError> {
        self.ensure_homed()?;
        self.set_absolute_moves(false)?;
        self.send(&GCode::rapid_axis(axis, position))?;

        Ok(())
    }

    fn move_xyz(
        &mut self,
        target: Xyz,
        wait: bool,
        velocity: Option<u32>
    ) -> Result<(), MotionError> {
        let moves = target.moves();

        if !moves.is_empty() {
            self.send(&GCode::Rapid {
                moves,
                feedrate: Some(velocity.unwrap_or(self.params.default_feedrate)),
            })?;
        }

        if wait {
            self.send(&GCode::WaitForMoves)?;
        }

        Ok(())
    }

    fn set_absolute_moves(&mut self, force: bool) -> Result<(), MotionError> {
        if self.absolute_moves && !self.mode_unknown && !force {
            return Ok(());
        }

        self.send(&GCode::AbsolutePositioning)?;
        self.absolute_moves = true;

        Ok(())
    }

    fn set_relative_moves(&mut self, force: bool) -> Result<(), MotionError> {
        if !self.absolute_moves && !self.mode_unknown && !force {
            return Ok(());
        }

        self.send(&GCode::RelativePositioning)?;
        self.absolute_moves = false;

        Ok(())
    }

    // ---- PROTECTION AND LIMITS ----

    /// Enable or disable the travel limits which keep the head out of the tool dock.
    ///
    /// The requested mode is remembered and restored after every tool change.
    pub fn protect_tools(&mut self, on: bool) -> Result<(), MotionError> {
        self.set_protection_window(on)?;
        self.mode_protect_tools = on;

        Ok(())
    }

    /// Apply the dock protection window without changing the protection mode.
    pub(crate) fn set_protection_window(&mut self, on: bool) -> Result<(), MotionError> {
        let (min, max) = if on {
            PROTECTED_Y_LIMITS
        } else {
            UNPROTECTED_Y_LIMITS
        };

        self.send(&GCode::SetAxisLimits { axis: Axis::Y, min, max })?;

        Ok(())
    }

    /// Re-apply the dock protection window if the protection mode is on.
    pub(crate) fn restore_tool_protection(&mut self) -> Result<(), MotionError> {
        if self.mode_protect_tools {
            self.set_protection_window(true)?;
        }

        Ok(())
    }

    /// Set the Z travel limits.
    pub fn set_z_window(&mut self, min: f64, max: f64) -> Result<(), MotionError> {
        self.send(&GCode::SetAxisLimits { axis: Axis::Z, min, max })?;

        Ok(())
    }

    // ---- DRIVERS ----

    /// Set the feedrate of following moves.
    pub fn set_feedrate(&mut self, mm_per_min: u32) -> Result<(), MotionError> {
        self.send(&GCode::SetFeedrate(mm_per_min))?;

        Ok(())
    }

    /// Disable every motor driver.
    pub fn turn_off_drivers(&mut self) -> Result<(), MotionError> {
        self.send(&GCode::DisableDrivers(None))?;

        Ok(())
    }

    /// Disable the given drivers, or every driver if none are given.
    pub fn stop_drivers(&mut self, drivers: &[String]) -> Result<(), MotionError> {
        for driver in drivers {
            self.send(&GCode::DisableDrivers(Some(driver.clone())))?;
        }

        if drivers.is_empty() {
            self.send(&GCode::DisableDrivers(None))?;
        }

        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), MotionError> {
        self.send(&GCode::Stop)?;

        Ok(())
    }

    pub fn emergency_stop(&mut self) -> Result<(), MotionError> {
        self.send(&GCode::EmergencyStop)?;

        Ok(())
    }

    // ---- CACHED MODEL VALUES ----

    /// Index of the tool selected in the firmware, `None` when no tool is selected.
    pub fn active_tool_index(&mut self) -> Result<Option<usize>, MotionError> {
        if let Some(index) = self.cache.active_tool_index {
            return Ok(index);
        }

        let reply = self.send(&GCode::QueryTool)?;
        let index = model::parse_tool_index(&reply)?;
        self.cache.active_tool_index = Some(index);

        Ok(index)
    }

    /// Z offset of every tool defined in the firmware.
    pub fn tool_z_offsets(&mut self) -> Result<Vec<f64>, MotionError> {
        if let Some(ref offsets) = self.cache.tool_z_offsets {
            return Ok(offsets.clone());
        }

        let reply = self.send(&GCode::QueryModel(KEY_TOOLS.into()))?;
        let offsets = model::parse_tool_z_offsets(&reply)?;
        self.cache.tool_z_offsets = Some(offsets.clone());

        Ok(offsets)
    }

    /// `(min, max)` travel limits of every axis.
    pub fn axis_limits(&mut self) -> Result<Vec<(f64, f64)>, MotionError> {
        if let Some(ref limits) = self.cache.axis_limits {
            return Ok(limits.clone());
        }

        let reply = self.send(&GCode::QueryModel(KEY_AXES.into()))?;
        let limits = model::parse_axis_limits(&reply)?;
        self.cache.axis_limits = Some(limits.clone());

        Ok(limits)
    }

    /// Full position report. Any command other than a query invalidates it.
    pub fn position_report(&mut self) -> Result<Position, MotionError> {
        if let Some(ref position) = self.cache.position {
            return Ok(position.clone());
        }

        let reply = self.send(&GCode::ReportPosition)?;
        let position = Position::parse(&reply);
        self.cache.position = Some(position.clone());

        Ok(position)
    }

    /// Position of the control point in XYZ.
    ///
    /// Units: millimeters
    pub fn position(&mut self) -> Result<[f64; 3], MotionError> {
        Ok(self.position_report()?.xyz()?)
    }

    /// Position of a single axis.
    pub fn axis_position(&mut self, axis: Axis) -> Result<f64, MotionError> {
        Ok(self.position_report()?.require(axis)?)
    }

    // ---- STATE ACCESSORS ----

    /// Name of the mounted tool.
    pub fn tool(&self) -> Option<&str> {
        self.tool.as_deref()
    }

    pub(crate) fn set_tool(&mut self, tool: Option<String>) {
        self.tool = tool;
    }

    pub fn axes_homed(&self) -> [bool; NUM_HOMED_AXES] {
        self.axes_homed
    }

    pub fn is_homed(&self) -> bool {
        self.axes_homed.iter().all(|h| *h)
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute_moves
    }

    /// True if the tool dock protection mode is on.
    pub fn tool_protection(&self) -> bool {
        self.mode_protect_tools
    }

    pub fn params(&self) -> &MotionParams {
        &self.params
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Snapshot of the controller state.
    pub fn state(&self) -> MachineState {
        MachineState {
            address: self.params.address.clone(),
            simulated: self.params.simulated,
            absolute_moves: self.absolute_moves,
            axes_homed: self.axes_homed,
            tool: self.tool.clone(),
            mode_protect_tools: self.mode_protect_tools,
            active_tool_index: self.cache.active_tool_index,
            tool_z_offsets: self.cache.tool_z_offsets.clone(),
            axis_limits: self.cache.axis_limits.clone(),
            position: self.cache.position.clone(),
        }
    }

    // ---- PRIVATE ----

    fn probe(&mut self) -> Result<(), MotionError> {
        let probe = GCode::QueryModel(KEY_AXES_HOMED.into()).to_string();
        let timeout = Some(self.params.probe_timeout());
        let reply = self.gcode(&probe, timeout)?;
        self.axes_homed = model::parse_axes_homed(&reply)?;

        self.cache = ModelCache::default();

        self.active_tool_index()?;
        self.tool_z_offsets()?;
        self.axis_limits()?;

        self.set_absolute_moves(true)
    }

    /// Drop the cached values a line may change, including raw lines typed by the operator.
    ///
    /// Run before the line is sent, as a failed request may still have reached the firmware.
    fn invalidate_for_line(&mut self, code: &str) {
        if !gcode::is_query_line(code) {
            self.cache.position = None;
        }

        match first_word(code).as_deref() {
            Some("M208") => self.cache.axis_limits = None,
            Some("M999") => self.axes_homed = [false; NUM_HOMED_AXES],
            Some(w) if w.len() > 1 && w.starts_with('T') => self.cache.active_tool_index = None,
            _ => (),
        }
    }

    /// Follow G90/G91 once the firmware has answered. An unanswered mode change leaves the mode
    /// unknown until the next one succeeds.
    fn track_mode(&mut self, code: &str, accepted: bool) {
        let absolute = match first_word(code).as_deref() {
            Some("G90") => true,
            Some("G91") => false,
            _ => return,
        };

        if accepted {
            self.absolute_moves = absolute;
            self.mode_unknown = false;
        } else {
            self.mode_unknown = true;
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn first_word(code: &str) -> Option<String> {
    code.split_whitespace().next().map(str::to_uppercase)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prompt::FixedOperator;
    use comms_if::net::SimLink;

    fn test_params() -> MotionParams {
        MotionParams {
            reconnect_backoff_ms: 0,
            ..Default::default()
        }
    }

    fn connect(sim: SimLink, operator_answer: bool) -> MotionCtrl<SimLink> {
        MotionCtrl::new(
            sim,
            test_params(),
            Box::new(FixedOperator::new(operator_answer))
        ).unwrap()
    }

    fn count(ctrl: &MotionCtrl<SimLink>, code: &str) -> usize {
        ctrl.link().sent().iter().filter(|s| s.as_str() == code).count()
    }

    #[test]
    fn test_connect_sequence() {
        let ctrl = connect(SimLink::homed(), true);

        assert_eq!(
            ctrl.link().sent(),
            &[
                "M409 K\"move.axes[].homed\"",
                "T",
                "M409 K\"tools\"",
                "M409 K\"move.axes\"",
                "G90",
                "G90",
                "M98 P\"/sys/config.g\"",
            ]
        );

        // Homed flags are cleared whatever the firmware says
        assert_eq!(ctrl.axes_homed(), [false; NUM_HOMED_AXES]);
        assert!(ctrl.is_absolute());
        assert_eq!(ctrl.tool(), None);
    }

    #[test]
    fn test_connect_failures() {
        let mut sim = SimLink::new();
        sim.set_offline(true);
        let err = MotionCtrl::new(sim, test_params(), Box::new(FixedOperator::new(true)))
            .err()
            .unwrap();
        assert!(matches!(err, MotionError::ConnectTimeout(_)));
        assert!(!err.is_state_error());
        assert!(err.is_connection_error());

        let mut sim = SimLink::new();
        sim.set_not_ready(true);
        let err = MotionCtrl::new(sim, test_params(), Box::new(FixedOperator::new(true)))
            .err()
            .unwrap();
        assert!(matches!(err, MotionError::NotReady(_)));
    }

    #[test]
    fn test_simulated_skips_probe() {
        let params = MotionParams {
            simulated: true,
            ..test_params()
        };
        let ctrl = MotionCtrl::new(SimLink::new(), params, Box::new(FixedOperator::new(true)))
            .unwrap();

        assert_eq!(ctrl.link().sent(), &["G90", "M98 P\"/sys/config.g\""]);
    }

    #[test]
    fn test_move_requires_homing() {
        let mut ctrl = connect(SimLink::new(), true);
        ctrl.link_mut().clear_sent();

        let err = ctrl.move_xyz_absolute(Xyz::x(10.0), false, None).unwrap_err();
        assert!(matches!(err, MotionError::NotHomed(_)));
        assert!(err.is_state_error());

        let err = ctrl.move_xyz_relative(Xyz::x(10.0), false, None).unwrap_err();
        assert!(matches!(err, MotionError::NotHomed(_)));

        // Only the re-queries of the homed flags reach the machine
        assert!(ctrl.link().sent().iter().all(|s| s == "M409 K\"move.axes[].homed\""));
        assert!(ctrl.is_absolute());
        assert_eq!(ctrl.link().axis_position(Axis::X), 0.0);

        // Partially homed is still not homed
        ctrl.home_xy().unwrap();
        assert!(ctrl.move_axis_absolute(Axis::U, 70.0).is_err());
    }

    #[test]
    fn test_guard_requeries_firmware() {
        let mut ctrl = connect(SimLink::homed(), true);
        ctrl.link_mut().clear_sent();

        ctrl.move_xyz_absolute(Xyz::xyz(10.0, 20.0, 30.0), false, None).unwrap();
        assert_eq!(
            ctrl.link().sent(),
            &["M409 K\"move.axes[].homed\"", "G0 X10 Y20 Z30 F13000"]
        );
        assert!(ctrl.is_homed());

        // Flags are now cached
        ctrl.link_mut().clear_sent();
        ctrl.move_xyz_absolute(Xyz::y(220.0), false, Some(10000)).unwrap();
        assert_eq!(ctrl.link().sent(), &["G0 Y220 F10000"]);
    }

    #[test]
    fn test_mode_codes_on_transition() {
        let mut ctrl = connect(SimLink::homed(), true);
        ctrl.ensure_homed().unwrap();
        ctrl.link_mut().clear_sent();

        ctrl.move_xyz_relative(Xyz::x(1.0), false, None).unwrap();
        ctrl.move_xyz_relative(Xyz::x(1.0), false, None).unwrap();
        assert_eq!(count(&ctrl, "G91"), 1);
        assert!(!ctrl.is_absolute());

        ctrl.move_xyz_absolute(Xyz::x(5.0), false, None).unwrap();
        ctrl.move_xyz_absolute(Xyz::x(5.0), false, None).unwrap();
        ctrl.move_axis_absolute(Axis::U, 70.0).unwrap();
        assert_eq!(count(&ctrl, "G90"), 1);
        assert_eq!(count(&ctrl, "G91"), 1);

        assert_eq!(ctrl.link().axis_position(Axis::X), 5.0);
        assert_eq!(ctrl.link().axis_position(Axis::U), 70.0);

        // A raw mode change keeps the tracked mode right
        ctrl.gcode("G91", None).unwrap();
        assert!(!ctrl.is_absolute());
        ctrl.move_xyz_absolute(Xyz::x(0.0), false, None).unwrap();
        assert_eq!(count(&ctrl, "G90"), 2);
    }

    #[test]
    fn test_failed_mode_change_is_resent() {
        let mut ctrl = connect(SimLink::homed(), true);
        ctrl.ensure_homed().unwrap();

        ctrl.move_xyz_absolute(Xyz::x(100.0), false, None).unwrap();
        ctrl.move_xyz_relative(Xyz::x(1.0), false, None).unwrap();
        assert!(!ctrl.link().is_absolute());

        // G90 is refused, the firmware stays relative
        ctrl.link_mut().fail_next(1);
        assert!(ctrl.move_xyz_absolute(Xyz::x(5.0), false, None).is_err());
        assert!(!ctrl.link().is_absolute());
        assert_eq!(ctrl.link().axis_position(Axis::X), 101.0);

        ctrl.link_mut().clear_sent();
        ctrl.move_xyz_absolute(Xyz::x(5.0), false, None).unwrap();
        assert_eq!(ctrl.link().sent(), &["G90", "G0 X5 F13000"]);
        assert!(ctrl.is_absolute());
        assert_eq!(ctrl.link().axis_position(Axis::X), 5.0);

        // A refused G91 leaves the mode unknown, so the next absolute move re-sends G90
        ctrl.link_mut().fail_next(1);
        assert!(ctrl.move_xyz_relative(Xyz::x(1.0), false, None).is_err());
        ctrl.link_mut().clear_sent();
        ctrl.move_xyz_absolute(Xyz::x(7.0), false, None).unwrap();
        assert_eq!(ctrl.link().sent(), &["G90", "G0 X7 F13000"]);
        assert_eq!(ctrl.link().axis_position(Axis::X), 7.0);
    }

    #[test]
    fn test_empty_move_and_wait() {
        let mut ctrl = connect(SimLink::homed(), true);
        ctrl.ensure_homed().unwrap();
        ctrl.link_mut().clear_sent();

        ctrl.move_xyz_absolute(Xyz::default(), true, None).unwrap();
        assert_eq!(ctrl.link().sent(), &["M400"]);

        ctrl.move_xyz_relative(Xyz::z(-2.5), true, None).unwrap();
        assert_eq!(ctrl.link().sent(), &["M400", "G91", "G0 Z-2.5 F13000", "M400"]);
    }

    #[test]
    fn test_homing() {
        let mut ctrl = connect(SimLink::new(), false);
        ctrl.link_mut().clear_sent();

        ctrl.home_xy().unwrap();
        assert_eq!(
            ctrl.link().sent(),
            &["M98 P\"/sys/homey.g\"", "M98 P\"/sys/homex.g\""]
        );
        assert_eq!(ctrl.axes_homed(), [true, true, false, false]);

        // The operator declines, nothing is homed
        ctrl.link_mut().clear_sent();
        assert!(!ctrl.home_z(true).unwrap());
        assert!(!ctrl.home_u().unwrap());
        assert!(ctrl.link().sent().is_empty());
        assert_eq!(ctrl.axes_homed(), [true, true, false, false]);

        let mut ctrl = connect(SimLink::new(), true);
        ctrl.link_mut().clear_sent();
        ctrl.home_all(false).unwrap();
        assert_eq!(
            ctrl.link().sent(),
            &[
                "M98 P\"/sys/homey.g\"",
                "M98 P\"/sys/homex.g\"",
                "M98 P\"/sys/homez_NM.g\"",
                "M98 P\"/sys/homeu.g\"",
            ]
        );
        assert!(ctrl.is_homed());

        // No re-query is needed once homed
        ctrl.link_mut().clear_sent();
        ctrl.move_xyz_absolute(Xyz::x(1.0), false, None).unwrap();
        assert_eq!(ctrl.link().sent(), &["G0 X1 F13000"]);
    }

    #[test]
    fn test_home_forced_and_in_place() {
        let mut ctrl = connect(SimLink::new(), true);
        ctrl.link_mut().clear_sent();

        ctrl.home_all_forced().unwrap();
        assert!(ctrl.is_homed());
        assert_eq!(
            ctrl.link().sent(),
            &["M114", "G92 X0", "G92 Y0", "G92 Z0"]
        );

        ctrl.link_mut().clear_sent();
        let err = ctrl.home_in_place(&["x", "w"]).unwrap_err();
        assert!(matches!(err, MotionError::UnknownAxis(ref a) if a == "w"));
        assert!(ctrl.link().sent().is_empty());

        ctrl.home_in_place(&["x", "U"]).unwrap();
        assert_eq!(ctrl.link().sent(), &["G92 X0", "G92 U0"]);
    }

    #[test]
    fn test_protect_tools() {
        let mut ctrl = connect(SimLink::homed(), true);
        ctrl.link_mut().clear_sent();

        ctrl.protect_tools(true).unwrap();
        assert!(ctrl.tool_protection());
        ctrl.protect_tools(false).unwrap();
        assert!(!ctrl.tool_protection());

        assert_eq!(ctrl.link().sent(), &["M208 Y50:400", "M208 Y0:400"]);
    }

    #[test]
    fn test_cached_properties() {
        let mut sim = SimLink::homed();
        sim.select_tool(Some(2));
        let mut ctrl = connect(sim, true);
        ctrl.link_mut().clear_sent();

        // Populated at connect time
        assert_eq!(ctrl.active_tool_index().unwrap(), Some(2));
        assert_eq!(ctrl.tool_z_offsets().unwrap(), vec![-1.5, 2.0, 0.0]);
        assert_eq!(ctrl.axis_limits().unwrap().len(), 5);
        assert!(ctrl.link().sent().is_empty());

        // Position is read once until something else is sent
        assert_eq!(ctrl.position().unwrap(), [0.0, 0.0, 0.0]);
        assert_eq!(ctrl.position().unwrap(), [0.0, 0.0, 0.0]);
        assert_eq!(count(&ctrl, "M114"), 1);

        ctrl.move_xyz_absolute(Xyz::xy(12.0, 34.0), false, None).unwrap();
        assert_eq!(ctrl.position().unwrap(), [12.0, 34.0, 0.0]);
        assert_eq!(count(&ctrl, "M114"), 2);

        // Changing the limits invalidates the cached limits
        ctrl.set_z_window(100.0, 300.0).unwrap();
        assert_eq!(ctrl.axis_limits().unwrap()[2], (100.0, 300.0));
    }

    #[test]
    fn test_reset_retries() {
        let mut sim = SimLink::homed();
        sim.fail_after_reset(3);
        let mut ctrl = connect(sim, true);
        ctrl.ensure_homed().unwrap();

        ctrl.reset().unwrap();
        assert_eq!(ctrl.axes_homed(), [false; NUM_HOMED_AXES]);
        assert!(count(&ctrl, "M999") == 1);

        let mut sim = SimLink::homed();
        sim.fail_after_reset(100);
        let params = MotionParams {
            reconnect_attempts: 3,
            ..test_params()
        };
        let mut ctrl = MotionCtrl::new(sim, params, Box::new(FixedOperator::new(true))).unwrap();
        let err = ctrl.reset().unwrap_err();
        assert!(matches!(err, MotionError::ReconnectFailed(3)));
    }

    #[test]
    fn test_reset_on_connect() {
        let params = MotionParams {
            reset: true,
            ..test_params()
        };
        let ctrl = MotionCtrl::new(SimLink::homed(), params, Box::new(FixedOperator::new(true)))
            .unwrap();

        assert_eq!(count(&ctrl, "M999"), 1);
        assert_eq!(ctrl.axes_homed(), [false; NUM_HOMED_AXES]);
    }

    #[test]
    fn test_drivers_and_stops() {
        let mut ctrl = connect(SimLink::new(), true);
        ctrl.link_mut().clear_sent();

        ctrl.stop_drivers(&["E0".to_string(), "U".to_string()]).unwrap();
        ctrl.stop_drivers(&[]).unwrap();
        ctrl.turn_off_drivers().unwrap();
        ctrl.set_feedrate(6000).unwrap();
        ctrl.stop().unwrap();
        ctrl.emergency_stop().unwrap();

        assert_eq!(
            ctrl.link().sent(),
            &["M18 E0", "M18 U", "M18", "M18", "F6000", "M0", "M112"]
        );
    }

    #[test]
    fn test_download_file() {
        let mut ctrl = connect(SimLink::new(), true);
        assert!(ctrl.download_file("/sys/config.g", None).unwrap().contains("G90"));
        assert!(ctrl.download_file("/sys/nope.g", None).is_err());
    }
}
