//! # Keyboard Teleoperation
//!
//! Jog the machine from the keyboard. The arrow keys move in X and Y, Page Up and Page Down move the
//! bed in Z, `+` and `-` change the step size and Esc leaves teleoperation. After every move the
//! position and step are printed on a single status line.
//!
//! Keys are polled with a short timeout from the same thread that sends the moves.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::time::Duration;

use crate::motion_ctrl::{MotionCtrl, MotionError, Xyz};
use comms_if::{gcode::Axis, net::MachineLink};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A source of key presses.
pub trait KeySource {
    /// Wait up to `timeout` for a key press.
    fn next_key(&mut self, timeout: Duration) -> Result<Option<(KeyCode, KeyModifiers)>, TeleopError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TeleopParams {
    /// Units: millimeters
    pub default_step: f64,

    /// Units: millimeters
    pub min_step: f64,

    /// Change of the step for each `+` or `-` press.
    ///
    /// Units: millimeters
    pub step_increment: f64,

    /// Feedrate of the jog moves, the machine default if not given.
    ///
    /// Units: mm/min
    pub velocity: Option<u32>,

    /// Units: milliseconds
    pub poll_ms: u64,
}

/// Teleoperation state.
pub struct Teleop {
    params: TeleopParams,

    /// Units: millimeters
    step: f64,
}

/// Keys read from the terminal, which is held in raw mode for the lifetime of this struct.
pub struct TerminalKeys {
    _private: (),
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TeleopAction {
    /// Move one step along an axis, `direction` being `1.0` or `-1.0`
    Jog { axis: Axis, direction: f64 },
    IncreaseStep,
    DecreaseStep,
    Exit,
}

#[derive(Debug, thiserror::Error)]
pub enum TeleopError {
    #[error("Motion error: {0}")]
    Motion(#[from] MotionError),

    #[error("Terminal error: {0}")]
    Terminal(#[from] io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for TeleopParams {
    fn default() -> Self {
        Self {
            default_step: 10.0,
            min_step: 1.0,
            step_increment: 1.0,
            velocity: None,
            poll_ms: 100,
        }
    }
}

impl Teleop {
    pub fn new(params: TeleopParams) -> Self {
        let step = params.default_step.max(params.min_step);
        Self { params, step }
    }

    /// Units: millimeters
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Apply one action. Returns `false` once teleoperation should end.
    pub fn apply<L: MachineLink>(
        &mut self,
        machine: &mut MotionCtrl<L>,
        action: TeleopAction,
    ) -> Result<bool, TeleopError> {
        match action {
            TeleopAction::Jog { axis, direction } => {
                let d = direction * self.step;
                let offset = match axis {
                    Axis::X => Xyz::x(d),
                    Axis::Y => Xyz::y(d),
                    _ => Xyz::z(d),
                };
                machine.move_xyz_relative(offset, false, self.params.velocity)?;
            }
            TeleopAction::IncreaseStep => self.step += self.params.step_increment,
            TeleopAction::DecreaseStep => {
                self.step = (self.step - self.params.step_increment).max(self.params.min_step)
            }
            TeleopAction::Exit => return Ok(false),
        }

        Ok(true)
    }

    /// Status line for a position.
    pub fn status_line(&self, position: [f64; 3]) -> String {
        format!(
            "X: {:>7.2} | Y: {:>7.2} | Z: {:>7.2} || Step: {:<3} mm",
            position[0], position[1], position[2], self.step
        )
    }

    /// Run teleoperation until Esc or Ctrl-C is pressed.
    ///
    /// The machine must be homed.
    pub fn run<L: MachineLink, K: KeySource, W: Write>(
        &mut self,
        machine: &mut MotionCtrl<L>,
        keys: &mut K,
        out: &mut W,
    ) -> Result<(), TeleopError> {
        machine.ensure_homed()?;

        info!("Teleoperation started, Esc to exit");
        self.print_status(machine, out)?;

        let timeout = Duration::from_millis(self.params.poll_ms);

        loop {
            let action = match keys.next_key(timeout)? {
                Some((code, modifiers)) => match map_key(code, modifiers) {
                    Some(a) => a,
                    None => continue,
                },
                None => continue,
            };

            debug!("Teleop action: {:?}", action);

            if !self.apply(machine, action)? {
                break;
            }

            self.print_status(machine, out)?;
        }

        write!(out, "\r\n")?;
        out.flush()?;
        info!("Teleoperation ended");

        Ok(())
    }

    fn print_status<L: MachineLink, W: Write>(
        &self,
        machine: &mut MotionCtrl<L>,
        out: &mut W,
    ) -> Result<(), TeleopError> {
        let position = machine.position()?;
        write!(out, "\r{}", self.status_line(position))?;
        out.flush()?;

        Ok(())
    }
}

impl TerminalKeys {
    /// Put the terminal in raw mode.
    pub fn new() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self { _private: () })
    }
}

impl KeySource for TerminalKeys {
    fn next_key(&mut self, timeout: Duration) -> Result<Option<(KeyCode, KeyModifiers)>, TeleopError> {
        if !event::poll(timeout)? {
            return Ok(None);
        }

        match event::read()? {
            Event::Key(KeyEvent { code, modifiers, kind, .. }) if kind != KeyEventKind::Release => {
                Ok(Some((code, modifiers)))
            }
            _ => Ok(None),
        }
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        terminal::disable_raw_mode().ok();
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Map a key press to a teleoperation action.
pub fn map_key(code: KeyCode, modifiers: KeyModifiers) -> Option<TeleopAction> {
    let jog = |axis, direction| Some(TeleopAction::Jog { axis, direction });

    match code {
        KeyCode::Up => jog(Axis::Y, 1.0),
        KeyCode::Down => jog(Axis::Y, -1.0),
        KeyCode::Left => jog(Axis::X, -1.0),
        KeyCode::Right => jog(Axis::X, 1.0),
        KeyCode::PageUp => jog(Axis::Z, -1.0),
        KeyCode::PageDown => jog(Axis::Z, 1.0),
        KeyCode::Char('+') | KeyCode::Char('=') => Some(TeleopAction::IncreaseStep),
        KeyCode::Char('-') => Some(TeleopAction::DecreaseStep),
        KeyCode::Esc => Some(TeleopAction::Exit),
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Some(TeleopAction::Exit),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::motion_ctrl::MotionParams;
    use crate::prompt::FixedOperator;
    use comms_if::net::SimLink;
    use std::collections::VecDeque;

    /// Replays a fixed list of keys, then reports Esc.
    struct ScriptedKeys(VecDeque<KeyCode>);

    impl KeySource for ScriptedKeys {
        fn next_key(&mut self, _: Duration) -> Result<Option<(KeyCode, KeyModifiers)>, TeleopError> {
            Ok(Some((self.0.pop_front().unwrap_or(KeyCode::Esc), KeyModifiers::NONE)))
        }
    }

    fn machine(link: SimLink) -> MotionCtrl<SimLink> {
        MotionCtrl::new(link, MotionParams::default(), Box::new(FixedOperator::new(true))).unwrap()
    }

    #[test]
    fn test_map_key() {
        let none = KeyModifiers::NONE;

        assert_eq!(
            map_key(KeyCode::Up, none),
            Some(TeleopAction::Jog { axis: Axis::Y, direction: 1.0 })
        );
        assert_eq!(
            map_key(KeyCode::PageUp, none),
            Some(TeleopAction::Jog { axis: Axis::Z, direction: -1.0 })
        );
        assert_eq!(map_key(KeyCode::Char('+'), none), Some(TeleopAction::IncreaseStep));
        assert_eq!(map_key(KeyCode::Esc, none), Some(TeleopAction::Exit));
        assert_eq!(
            map_key(KeyCode::Char('c'), KeyModifiers::CONTROL),
            Some(TeleopAction::Exit)
        );
        assert_eq!(map_key(KeyCode::Char('c'), none), None);
    }

    #[test]
    fn test_step_limits() {
        let mut m = machine(SimLink::homed());
        let mut t = Teleop::new(TeleopParams {
            default_step: 2.0,
            ..Default::default()
        });

        t.apply(&mut m, TeleopAction::DecreaseStep).unwrap();
        t.apply(&mut m, TeleopAction::DecreaseStep).unwrap();
        assert_eq!(t.step(), 1.0);

        t.apply(&mut m, TeleopAction::IncreaseStep).unwrap();
        assert_eq!(t.step(), 2.0);
        assert!(!t.apply(&mut m, TeleopAction::Exit).unwrap());
    }

    #[test]
    fn test_status_line() {
        let t = Teleop::new(TeleopParams::default());
        assert_eq!(
            t.status_line([1.0, 22.5, 300.0]),
            "X:    1.00 | Y:   22.50 | Z:  300.00 || Step: 10  mm"
        );
    }

    #[test]
    fn test_run() {
        let mut m = machine(SimLink::homed());
        let mut t = Teleop::new(TeleopParams::default());
        let mut keys = ScriptedKeys(
            vec![KeyCode::Up, KeyCode::Up, KeyCode::Right, KeyCode::PageDown, KeyCode::Char('x')]
                .into(),
        );
        let mut out = Vec::new();

        t.run(&mut m, &mut keys, &mut out).unwrap();

        assert_eq!(m.link().axis_position(Axis::X), 10.0);
        assert_eq!(m.link().axis_position(Axis::Y), 20.0);
        assert_eq!(m.link().axis_position(Axis::Z), 10.0);
        assert!(!m.is_absolute());

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Y:   20.00"));
    }

    #[test]
    fn test_run_requires_homing() {
        let mut m = machine(SimLink::new());
        let mut t = Teleop::new(TeleopParams::default());
        let mut keys = ScriptedKeys(vec![KeyCode::Up].into());
        let mut out = Vec::new();

        assert!(matches!(
            t.run(&mut m, &mut keys, &mut out),
            Err(TeleopError::Motion(MotionError::NotHomed(_)))
        ));
        assert_eq!(m.link().axis_position(Axis::Y), 0.0);
    }
}
