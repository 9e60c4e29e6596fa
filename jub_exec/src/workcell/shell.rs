//! Interactive shell commands
//!
//! Each line typed into the shell, or read from a script, is parsed into a [`ShellCmd`] and run
//! against the [`Workcell`]. Lines starting with `!` or `gcode` are sent to the firmware verbatim.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{gcode::Axis, net::MachineLink};
use std::path::PathBuf;
use std::time::Duration;
use structopt::StructOpt;

use super::Workcell;
use crate::motion_ctrl::{MotionError, Xyz};
use crate::tool::{ToolChange, ToolError, ToolId};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Timeout of a file download.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, StructOpt)]
#[structopt(name = "jub", about = "Jubilee shell")]
pub enum ShellCmd {
    /// Home the machine, asking before the Z and U axes are homed
    Home {
        #[structopt(default_value = "all", possible_values = &["all", "xy", "z", "u"])]
        axes: String,

        /// Home Z without the bed mesh
        #[structopt(long)]
        no_mesh: bool,
    },

    /// Mark every axis homed and keep the current position
    HomeForced,

    /// Declare the current position of the given axes as zero (XYZ if none given)
    Zero { axes: Vec<String> },

    /// Move in absolute or relative coordinates
    Move {
        #[structopt(possible_values = &["abs", "rel"])]
        mode: String,

        #[structopt(short, allow_hyphen_values = true)]
        x: Option<f64>,

        #[structopt(short, allow_hyphen_values = true)]
        y: Option<f64>,

        #[structopt(short, allow_hyphen_values = true)]
        z: Option<f64>,

        /// Wait for the move to complete
        #[structopt(short, long)]
        wait: bool,

        /// Feedrate in mm/min
        #[structopt(short = "f", long)]
        velocity: Option<u32>,
    },

    /// Send a line of G-code verbatim (also `!<code>`)
    Gcode { code: Vec<String> },

    /// Pick a tool up from the dock
    Install { tool: ToolId },

    /// Return a tool to the dock
    Uninstall {
        tool: ToolId,

        /// Feedrate in mm/min
        #[structopt(short = "f", long)]
        velocity: Option<u32>,
    },

    /// Take a photo with the camera
    Photo { path: Option<PathBuf> },

    /// Drive the gripper
    Grip(GripCmd),

    /// Drive the micropipette
    Pipette(PipetteCmd),

    /// Keep the head out of the tool dock
    Protect {
        #[structopt(possible_values = &["on", "off"])]
        mode: String,
    },

    /// Print the XYZ position
    Position,

    /// Print the controller state
    Status,

    /// Print the tool Z offsets
    Offsets,

    /// Print the axis travel limits
    Limits,

    /// Print the tool selected in the firmware
    ToolIndex,

    /// Print a file from the machine
    Download { path: String },

    /// Turn off the given drivers, or all of them
    DriversOff { drivers: Vec<String> },

    /// Stop (M0)
    Stop,

    /// Emergency stop (M112)
    Estop,

    /// Reset the board and reconnect
    Reset,

    /// Jog the machine from the keyboard
    Teleop,

    /// Wait for all moves to finish
    Wait,

    /// Leave the shell
    #[structopt(alias = "quit")]
    Exit,
}

#[derive(Debug, Clone, PartialEq, StructOpt)]
pub enum GripCmd {
    Open,
    Close,

    /// Open to an angle in degrees
    Angle { angle: f64 },
}

#[derive(Debug, Clone, PartialEq, StructOpt)]
pub enum PipetteCmd {
    /// Press the plunger ready to aspirate a volume in uL
    Press { volume_ul: f64 },

    /// Move the plunger to a raw position
    Step { position: f64 },

    Aspirate,
    Dispense,
    Eject,

    /// Print the held volume
    Volume,
}

/// Result of running a command.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellOutcome {
    /// Done, with something to show the operator
    Done(Option<String>),

    /// Teleoperation was requested, it needs the terminal
    Teleop,

    Exit,
}

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("{0}")]
    Parse(String),

    #[error(transparent)]
    Motion(#[from] MotionError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Could not serialise the state: {0}")]
    Json(#[from] serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<L: MachineLink> Workcell<L> {
    /// Parse and run one line.
    pub fn execute_line(&mut self, line: &str) -> Result<ShellOutcome, ShellError> {
        match parse_line(line)? {
            Some(cmd) => self.execute(cmd),
            None => Ok(ShellOutcome::Done(None)),
        }
    }

    /// Run one command.
    pub fn execute(&mut self, cmd: ShellCmd) -> Result<ShellOutcome, ShellError> {
        let m = &mut self.machine;

        let text = match cmd {
            ShellCmd::Home { axes, no_mesh } => {
                let mesh = !no_mesh;
                let skipped = match axes.as_str() {
                    "xy" => {
                        m.home_xy()?;
                        false
                    }
                    "z" => !m.home_z(mesh)?,
                    "u" => !m.home_u()?,
                    _ => {
                        m.home_all(mesh)?;
                        false
                    }
                };

                if skipped {
                    format!("Homing {} skipped", axes)
                } else {
                    format!("Homed flags (XYZU): {:?}", m.axes_homed())
                }
            }
            ShellCmd::HomeForced => {
                m.home_all_forced()?;
                "All axes marked homed".into()
            }
            ShellCmd::Zero { axes } => {
                let axes: Vec<&str> = if axes.is_empty() {
                    vec!["X", "Y", "Z"]
                } else {
                    axes.iter().map(String::as_str).collect()
                };
                m.home_in_place(&axes)?;
                format!("Zeroed {}", axes.join(" "))
            }
            ShellCmd::Move { mode, x, y, z, wait, velocity } => {
                let target = Xyz::new(x, y, z);
                if mode == "rel" {
                    m.move_xyz_relative(target, wait, velocity)?;
                } else {
                    m.move_xyz_absolute(target, wait, velocity)?;
                }
                return Ok(ShellOutcome::Done(None));
            }
            ShellCmd::Gcode { code } => m.gcode(&code.join(" "), None)?,
            ShellCmd::Install { tool } => change_text(tool, self.install(tool)?),
            ShellCmd::Uninstall { tool, velocity } => {
                change_text(tool, self.uninstall(tool, velocity)?)
            }
            ShellCmd::Photo { path } => {
                let path = path.unwrap_or_else(|| {
                    PathBuf::from(format!(
                        "photo_{}.png",
                        chrono::Local::now().format("%Y%m%d_%H%M%S")
                    ))
                });
                let path = self.photo_dir.join(path);

                match self.camera.photo(&self.machine, &path)? {
                    Some(p) => format!("Saved {}", p.display()),
                    None => "No photo taken".into(),
                }
            }
            ShellCmd::Grip(grip) => {
                match grip {
                    GripCmd::Open => self.gripper.open(&self.machine)?,
                    GripCmd::Close => self.gripper.close(&self.machine)?,
                    GripCmd::Angle { angle } => self.gripper.open_angle(&self.machine, angle)?,
                }
                return Ok(ShellOutcome::Done(None));
            }
            ShellCmd::Pipette(pip) => {
                let p = &mut self.pipette;
                let m = &mut self.machine;
                match pip {
                    PipetteCmd::Press { volume_ul } => {
                        p.press(m, volume_ul)?;
                        return Ok(ShellOutcome::Done(None));
                    }
                    PipetteCmd::Step { position } => {
                        p.press_step(m, position)?;
                        return Ok(ShellOutcome::Done(None));
                    }
                    PipetteCmd::Aspirate => format!("Aspirated {:.2} uL", p.aspirate(m)?),
                    PipetteCmd::Dispense => {
                        p.dispense(m)?;
                        "Dispensed".into()
                    }
                    PipetteCmd::Eject => {
                        p.eject_tip(m)?;
                        "Tip ejected".into()
                    }
                    PipetteCmd::Volume => format!("{:.2} uL", p.volume()),
                }
            }
            ShellCmd::Protect { mode } => {
                m.protect_tools(mode == "on")?;
                format!("Tool protection {}", mode)
            }
            ShellCmd::Position => {
                let [x, y, z] = m.position()?;
                format!("X: {:.3} Y: {:.3} Z: {:.3}", x, y, z)
            }
            ShellCmd::Status => serde_json::to_string_pretty(&m.state())?,
            ShellCmd::Offsets => {
                let offsets = m.tool_z_offsets()?;
                offsets
                    .iter()
                    .enumerate()
                    .map(|(i, z)| format!("T{}: Z{}", i, z))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            ShellCmd::Limits => {
                let limits = m.axis_limits()?;
                [Axis::X, Axis::Y, Axis::Z, Axis::U, Axis::V]
                    .iter()
                    .zip(limits.iter())
                    .map(|(a, (min, max))| format!("{}: {} to {}", a, min, max))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            ShellCmd::ToolIndex => match m.active_tool_index()? {
                Some(i) => format!("Tool {}", i),
                None => "No tool".into(),
            },
            ShellCmd::Download { path } => m.download_file(&path, Some(DOWNLOAD_TIMEOUT))?,
            ShellCmd::DriversOff { drivers } => {
                m.stop_drivers(&drivers)?;
                "Drivers off".into()
            }
            ShellCmd::Stop => {
                m.stop()?;
                return Ok(ShellOutcome::Done(None));
            }
            ShellCmd::Estop => {
                m.emergency_stop()?;
                "Emergency stop sent".into()
            }
            ShellCmd::Reset => {
                m.reset()?;
                "Reconnected, the machine must be homed again".into()
            }
            ShellCmd::Teleop => return Ok(ShellOutcome::Teleop),
            ShellCmd::Wait => {
                m.gcode("M400", None)?;
                return Ok(ShellOutcome::Done(None));
            }
            ShellCmd::Exit => return Ok(ShellOutcome::Exit),
        };

        Ok(ShellOutcome::Done(Some(text)))
    }
}

impl ShellError {
    /// True for errors caused by the state of the machine or tools.
    pub fn is_state_error(&self) -> bool {
        match self {
            ShellError::Motion(e) => e.is_state_error(),
            ShellError::Tool(e) => e.is_state_error(),
            _ => false,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse one shell line, `None` for a blank line.
pub fn parse_line(line: &str) -> Result<Option<ShellCmd>, ShellError> {
    let line = line.trim();

    if line.is_empty() {
        return Ok(None);
    }

    // Verbatim G-code, quotes and all
    if let Some(code) = line.strip_prefix('!') {
        return Ok(Some(ShellCmd::Gcode { code: vec![code.trim().to_string()] }));
    }
    if let Some(code) = line.strip_prefix("gcode ") {
        return Ok(Some(ShellCmd::Gcode { code: vec![code.trim().to_string()] }));
    }

    ShellCmd::from_iter_safe(std::iter::once("jub").chain(line.split_whitespace()))
        .map(Some)
        .map_err(|e| ShellError::Parse(e.message))
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn change_text(tool: ToolId, change: ToolChange) -> String {
    match change {
        ToolChange::Installed => format!("{} installed", tool),
        ToolChange::Uninstalled => format!("{} uninstalled", tool),
        ToolChange::Rejected(msg) => msg,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::workcell::test::sim_workcell;

    fn done(text: &str) -> ShellOutcome {
        ShellOutcome::Done(Some(text.into()))
    }

    #[test]
    fn test_parse() {
        assert_eq!(parse_line("  ").unwrap(), None);
        assert_eq!(
            parse_line("move rel -x -5 -y 3 --wait").unwrap(),
            Some(ShellCmd::Move {
                mode: "rel".into(),
                x: Some(-5.0),
                y: Some(3.0),
                z: None,
                wait: true,
                velocity: None,
            })
        );
        assert_eq!(
            parse_line("! M98 P\"/sys/homeall.g\"").unwrap(),
            Some(ShellCmd::Gcode { code: vec!["M98 P\"/sys/homeall.g\"".into()] })
        );
        assert_eq!(
            parse_line("uninstall pipette -f 4000").unwrap(),
            Some(ShellCmd::Uninstall { tool: ToolId::Micropipette, velocity: Some(4000) })
        );
        assert_eq!(
            parse_line("pipette press 500").unwrap(),
            Some(ShellCmd::Pipette(PipetteCmd::Press { volume_ul: 500.0 }))
        );
        assert_eq!(parse_line("home").unwrap(), Some(ShellCmd::Home { axes: "all".into(), no_mesh: false }));
        assert_eq!(parse_line("quit").unwrap(), Some(ShellCmd::Exit));

        assert!(matches!(parse_line("fly"), Err(ShellError::Parse(_))));
        assert!(matches!(parse_line("install wrench"), Err(ShellError::Parse(_))));
        assert!(matches!(parse_line("protect maybe"), Err(ShellError::Parse(_))));
    }

    #[test]
    fn test_home_and_move() {
        let mut w = sim_workcell();
        w.machine.link_mut().set_all_homed(false);

        // Moving before homing fails
        let err = w.execute_line("move abs -x 10").unwrap_err();
        assert!(err.is_state_error());

        w.execute_line("home").unwrap();
        assert!(w.machine.is_homed());

        w.machine.link_mut().clear_sent();
        w.execute_line("move abs -x 10 -y 60 -f 3000 -w").unwrap();
        w.execute_line("move rel -z 5").unwrap();
        assert_eq!(
            w.machine.link().sent(),
            &["G0 X10 Y60 F3000", "M400", "G91", "G0 Z5 F13000"]
        );

        assert_eq!(
            w.execute_line("position").unwrap(),
            done("X: 10.000 Y: 60.000 Z: 5.000")
        );
    }

    #[test]
    fn test_gcode_passthrough() {
        let mut w = sim_workcell();
        w.machine.link_mut().clear_sent();

        w.execute_line("!G91").unwrap();
        assert!(!w.machine.is_absolute());
        assert_eq!(w.machine.link().sent(), &["G91"]);

        let reply = w.execute_line("gcode M18 X").unwrap();
        assert_eq!(reply, ShellOutcome::Done(Some(String::new())));
    }

    #[test]
    fn test_tool_commands() {
        let mut w = sim_workcell();
        w.execute_line("home").unwrap();

        assert_eq!(w.execute_line("install pipette").unwrap(), done("micropipette installed"));
        assert!(matches!(
            w.execute_line("install gripper").unwrap(),
            ShellOutcome::Done(Some(_))
        ));
        assert_eq!(w.installed(), Some(ToolId::Micropipette));

        w.execute_line("pipette press 500").unwrap();
        assert_eq!(w.execute_line("pipette aspirate").unwrap(), done("Aspirated 500.00 uL"));
        assert_eq!(w.execute_line("pipette volume").unwrap(), done("500.00 uL"));

        let err = w.execute_line("pipette press 1500").unwrap_err();
        assert!(err.is_state_error());

        // The gripper is not mounted
        assert!(w.execute_line("grip open").unwrap_err().is_state_error());

        assert_eq!(
            w.execute_line("uninstall pipette").unwrap(),
            done("micropipette uninstalled")
        );
    }

    #[test]
    fn test_photo() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = sim_workcell();
        w.photo_dir = dir.path().to_path_buf();
        w.execute_line("home").unwrap();
        w.execute_line("install camera").unwrap();

        w.execute_line("photo well.png").unwrap();
        assert!(dir.path().join("well.png").exists());
    }

    #[test]
    fn test_queries() {
        let mut w = sim_workcell();

        assert_eq!(w.execute_line("tool-index").unwrap(), done("No tool"));
        assert_eq!(
            w.execute_line("offsets").unwrap(),
            done("T0: Z-1.5\nT1: Z2\nT2: Z0")
        );
        assert!(matches!(
            w.execute_line("limits").unwrap(),
            ShellOutcome::Done(Some(ref s)) if s.starts_with("X: 0 to 310\nY: 0 to 400")
        ));
        assert!(matches!(
            w.execute_line("status").unwrap(),
            ShellOutcome::Done(Some(ref s)) if s.contains("\"axes_homed\"")
        ));
        assert!(matches!(
            w.execute_line("download /sys/config.g").unwrap(),
            ShellOutcome::Done(Some(ref s)) if s.contains("G90")
        ));

        assert_eq!(w.execute_line("teleop").unwrap(), ShellOutcome::Teleop);
        assert_eq!(w.execute_line("exit").unwrap(), ShellOutcome::Exit);
    }

    #[test]
    fn test_protect_and_reset() {
        let mut w = sim_workcell();
        w.execute_line("home").unwrap();

        w.execute_line("protect on").unwrap();
        assert!(w.machine.tool_protection());

        w.execute_line("reset").unwrap();
        assert!(!w.machine.is_homed());
    }
}
