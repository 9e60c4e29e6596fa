//! # Firmware Simulator
//!
//! An in-process stand-in for the machine firmware, answering the subset of G-code used by the
//! control software. It keeps the positioning mode, axis positions, homed flags, travel limits and
//! the selected tool, and records every line it receives.
//!
//! Moves are clamped to the travel limits the same way the firmware clamps them, so collisions with
//! the tool dock protection window are visible in the simulated position.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::debug;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

use super::{LinkError, MachineLink};
use crate::gcode::Axis;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Axes modelled by the simulator, in object model order.
const SIM_AXES: [Axis; 5] = [Axis::X, Axis::Y, Axis::Z, Axis::U, Axis::V];

/// Default travel limits of the simulated axes.
const DEFAULT_LIMITS: [(f64, f64); 5] = [
    (0.0, 310.0),
    (0.0, 400.0),
    (0.0, 300.0),
    (0.0, 200.0),
    (0.0, 450.0),
];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Simulated machine.
#[derive(Debug, Clone)]
pub struct SimLink {
    absolute: bool,

    position: [f64; 5],

    homed: [bool; 5],

    limits: [(f64, f64); 5],

    tool: Option<usize>,

    tool_offsets: Vec<[f64; 3]>,

    files: HashMap<String, String>,

    sent: Vec<String>,

    offline: bool,

    fail_next: usize,

    fail_after_reset: usize,

    /// Number of requests to accept before refusing one.
    fail_after: Option<usize>,

    not_ready: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SimLink {
    fn default() -> Self {
        Self::new()
    }
}

impl SimLink {
    /// Create a new unhomed machine at the origin with three tools defined.
    pub fn new() -> Self {
        let mut files = HashMap::new();
        files.insert(
            "/sys/config.g".to_string(),
            "; Simulated configuration\nG21\nG90\n".to_string(),
        );

        Self {
            absolute: true,
            position: [0.0; 5],
            homed: [false; 5],
            limits: DEFAULT_LIMITS,
            tool: None,
            tool_offsets: vec![[0.0, 0.0, -1.5], [0.0, 0.0, 2.0], [0.0, 0.0, 0.0]],
            files,
            sent: Vec::new(),
            offline: false,
            fail_next: 0,
            fail_after_reset: 0,
            fail_after: None,
            not_ready: false,
        }
    }

    /// Create a machine with every axis already homed.
    pub fn homed() -> Self {
        let mut sim = Self::new();
        sim.set_all_homed(true);
        sim
    }

    /// Every line received so far, in order.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    /// Forget the received lines.
    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }

    /// Set the homed flag of every axis.
    pub fn set_all_homed(&mut self, homed: bool) {
        self.homed = [homed; 5];
    }

    /// An offline machine times out on every request.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    /// Refuse the next `n` requests as unreachable.
    pub fn fail_next(&mut self, n: usize) {
        self.fail_next = n;
    }

    /// Accept the next `n` requests then refuse one as unreachable.
    pub fn fail_after(&mut self, n: usize) {
        self.fail_after = Some(n);
    }

    /// Refuse `n` requests following the next `M999`, as a rebooting board does.
    pub fn fail_after_reset(&mut self, n: usize) {
        self.fail_after_reset = n;
    }

    /// A machine which is not ready answers object model queries with plain text.
    pub fn set_not_ready(&mut self, not_ready: bool) {
        self.not_ready = not_ready;
    }

    /// Make `T` report the given tool.
    pub fn select_tool(&mut self, tool: Option<usize>) {
        self.tool = tool;
    }

    /// Add a file which can be downloaded.
    pub fn add_file(&mut self, path: &str, contents: &str) {
        self.files.insert(path.to_string(), contents.to_string());
    }

    /// Current position of an axis.
    pub fn axis_position(&self, axis: Axis) -> f64 {
        self.position[axis_index(axis)]
    }

    /// Current travel limits of an axis.
    pub fn axis_limits(&self, axis: Axis) -> (f64, f64) {
        self.limits[axis_index(axis)]
    }

    /// True if the simulator is in absolute positioning mode.
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    fn check_available(&mut self, what: &str) -> Result<(), LinkError> {
        if self.offline {
            return Err(LinkError::Timeout(format!("sim://{}", what)));
        }

        match self.fail_after {
            Some(0) => {
                self.fail_after = None;
                self.fail_next += 1;
            }
            Some(n) => self.fail_after = Some(n - 1),
            None => (),
        }

        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(LinkError::Unreachable {
                url: format!("sim://{}", what),
                reason: "connection refused".into(),
            });
        }

        Ok(())
    }

    fn execute(&mut self, code: &str) -> String {
        let mut words = code.split_whitespace();
        let command = match words.next() {
            Some(c) => c.to_uppercase(),
            None => return String::new(),
        };
        let args: Vec<&str> = words.collect();

        match command.as_str() {
            "G90" => {
                self.absolute = true;
                String::new()
            }
            "G91" => {
                self.absolute = false;
                String::new()
            }
            "G0" | "G1" => {
                for (axis, value) in axis_words(&args) {
                    let i = axis_index(axis);
                    let target = if self.absolute {
                        value
                    } else {
                        self.position[i] + value
                    };
                    self.position[i] = target.max(self.limits[i].0).min(self.limits[i].1);
                }
                String::new()
            }
            "G92" => {
                for (axis, value) in axis_words(&args) {
                    self.position[axis_index(axis)] = value;
                }
                String::new()
            }
            "M114" => self.position_report(),
            "M409" => self.model_query(code),
            "M208" => {
                for word in &args {
                    self.set_limit(word);
                }
                String::new()
            }
            "M98" => self.run_macro(code),
            "M999" => {
                self.homed = [false; 5];
                self.fail_next += self.fail_after_reset;
                self.fail_after_reset = 0;
                String::new()
            }
            "T" => match self.tool {
                Some(t) => format!("Tool {} is selected", t),
                None => "No tool is selected".to_string(),
            },
            "M400" | "M18" | "M0" | "M112" => String::new(),
            c if c.starts_with('T') => {
                match c[1..].parse::<i64>() {
                    Ok(n) if n >= 0 => self.tool = Some(n as usize),
                    _ => self.tool = None,
                }
                String::new()
            }
            c if c.starts_with('F') => String::new(),
            _ => format!("Error: Unsupported command {}", command),
        }
    }

    fn position_report(&self) -> String {
        let p = &self.position;
        format!(
            "X:{:.3} Y:{:.3} Z:{:.3} U:{:.3} V:{:.3} E:0.000 E0:-0.0 Count 0 0 0 0 0 \
             Machine {:.3} {:.3} {:.3} {:.3} {:.3} Bed comp 0.000",
            p[0], p[1], p[2], p[3], p[4], p[0], p[1], p[2], p[3], p[4]
        )
    }

    fn model_query(&self, code: &str) -> String {
        if self.not_ready {
            return "Error: object model not available".to_string();
        }

        let key = quoted_argument(code).unwrap_or_default();

        let result = match key.as_str() {
            "move.axes[].homed" => json!(self.homed),
            "tools" => json!(self
                .tool_offsets
                .iter()
                .enumerate()
                .map(|(i, o)| json!({ "number": i, "offsets": o }))
                .collect::<Vec<_>>()),
            "move.axes" => json!(SIM_AXES
                .iter()
                .enumerate()
                .map(|(i, a)| json!({
                    "letter": a.to_string(),
                    "min": self.limits[i].0,
                    "max": self.limits[i].1,
                    "homed": self.homed[i],
                }))
                .collect::<Vec<_>>()),
            _ => serde_json::Value::Null,
        };

        json!({ "key": key, "flags": "", "result": result }).to_string()
    }

    fn run_macro(&mut self, code: &str) -> String {
        let path = quoted_argument(code).unwrap_or_default();
        let name = path.rsplit('/').next().unwrap_or("");

        let axes: &[Axis] = match name {
            "homex.g" => &[Axis::X],
            "homey.g" => &[Axis::Y],
            "homez.g" | "homez_NM.g" => &[Axis::Z],
            "homeu.g" => &[Axis::U],
            "homev.g" => &[Axis::V],
            "homeall.g" => &SIM_AXES,
            _ => &[],
        };

        for axis in axes {
            let i = axis_index(*axis);
            self.homed[i] = true;
            self.position[i] = 0.0;
        }

        String::new()
    }

    fn set_limit(&mut self, word: &str) {
        let mut chars = word.chars();
        let axis = match chars.next().and_then(|c| c.to_string().parse::<Axis>().ok()) {
            Some(a) => a,
            None => return,
        };

        let mut bounds = chars.as_str().splitn(2, ':');
        let min = bounds.next().and_then(|s| s.parse::<f64>().ok());
        let max = bounds.next().and_then(|s| s.parse::<f64>().ok());

        if let (Some(min), Some(max)) = (min, max) {
            self.limits[axis_index(axis)] = (min, max);
        }
    }
}

impl MachineLink for SimLink {
    fn send_gcode(&mut self, code: &str, _timeout: Option<Duration>) -> Result<String, LinkError> {
        self.check_available("machine/code")?;

        self.sent.push(code.to_string());
        let reply = self.execute(code);

        debug!("sim: {:?} -> {:?}", code, reply);

        Ok(reply)
    }

    fn download_file(&mut self, path: &str, _timeout: Option<Duration>) -> Result<String, LinkError> {
        self.check_available("machine/file")?;

        match self.files.get(path) {
            Some(f) => Ok(f.clone()),
            None => Err(LinkError::Status {
                url: format!("sim://machine/file{}", path),
                status: 404,
            }),
        }
    }

    fn address(&self) -> &str {
        "simulated"
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn axis_index(axis: Axis) -> usize {
    match axis {
        Axis::X => 0,
        Axis::Y => 1,
        Axis::Z => 2,
        Axis::U => 3,
        Axis::V => 4,
    }
}

/// Parse words such as `X10.5` into axis values, ignoring any other word.
fn axis_words(args: &[&str]) -> Vec<(Axis, f64)> {
    args.iter()
        .filter_map(|w| {
            let (letter, value) = w.split_at(w.char_indices().nth(1).map(|(i, _)| i)?);
            let axis = letter.parse::<Axis>().ok()?;
            Some((axis, value.parse::<f64>().ok()?))
        })
        .collect()
}

/// The first double-quoted argument of a command line.
fn quoted_argument(code: &str) -> Option<String> {
    let start = code.find('"')? + 1;
    let len = code[start..].find('"')?;
    Some(code[start..start + len].to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{self, Position};

    #[test]
    fn test_moves_and_modes() {
        let mut sim = SimLink::homed();

        sim.send_gcode("G0 X10 Y20 Z30 F13000", None).unwrap();
        sim.send_gcode("G91", None).unwrap();
        sim.send_gcode("G0 X5 Y-5", None).unwrap();

        let p = Position::parse(&sim.send_gcode("M114", None).unwrap());
        assert_eq!(p.xyz().unwrap(), [15.0, 15.0, 30.0]);
        assert!(!sim.is_absolute());

        sim.send_gcode("G92 Z0", None).unwrap();
        assert_eq!(sim.axis_position(Axis::Z), 0.0);
        assert_eq!(sim.sent().len(), 5);
    }

    #[test]
    fn test_limits_clamp_moves() {
        let mut sim = SimLink::homed();

        sim.send_gcode("M208 Y50:400", None).unwrap();
        sim.send_gcode("G0 Y7", None).unwrap();
        assert_eq!(sim.axis_position(Axis::Y), 50.0);

        sim.send_gcode("M208 Y0:400", None).unwrap();
        sim.send_gcode("G0 Y7", None).unwrap();
        assert_eq!(sim.axis_position(Axis::Y), 7.0);
        assert_eq!(sim.axis_limits(Axis::Y), (0.0, 400.0));
    }

    #[test]
    fn test_model_queries() {
        let mut sim = SimLink::new();

        let homed = model::parse_axes_homed(
            &sim.send_gcode("M409 K\"move.axes[].homed\"", None).unwrap(),
        )
        .unwrap();
        assert_eq!(homed, [false; 4]);

        sim.send_gcode("M98 P\"/sys/homey.g\"", None).unwrap();
        sim.send_gcode("M98 P\"/sys/homex.g\"", None).unwrap();
        let homed = model::parse_axes_homed(
            &sim.send_gcode("M409 K\"move.axes[].homed\"", None).unwrap(),
        )
        .unwrap();
        assert_eq!(homed, [true, true, false, false]);

        let offsets =
            model::parse_tool_z_offsets(&sim.send_gcode("M409 K\"tools\"", None).unwrap()).unwrap();
        assert_eq!(offsets, vec![-1.5, 2.0, 0.0]);

        let limits =
            model::parse_axis_limits(&sim.send_gcode("M409 K\"move.axes\"", None).unwrap()).unwrap();
        assert_eq!(limits.len(), 5);
        assert_eq!(limits[0], (0.0, 310.0));

        assert_eq!(
            model::parse_tool_index(&sim.send_gcode("T", None).unwrap()).unwrap(),
            None
        );
        sim.send_gcode("T1", None).unwrap();
        assert_eq!(
            model::parse_tool_index(&sim.send_gcode("T", None).unwrap()).unwrap(),
            Some(1)
        );
    }

    #[test]
    fn test_fault_injection() {
        let mut sim = SimLink::homed();

        sim.set_offline(true);
        assert!(sim.send_gcode("M114", None).unwrap_err().is_timeout());
        sim.set_offline(false);

        sim.fail_after_reset(2);
        sim.send_gcode("M999", None).unwrap();
        assert!(matches!(
            sim.send_gcode("M114", None),
            Err(LinkError::Unreachable { .. })
        ));
        assert!(sim.send_gcode("M114", None).is_err());
        assert!(sim.send_gcode("M114", None).is_ok());

        sim.fail_after(1);
        assert!(sim.send_gcode("M114", None).is_ok());
        assert!(sim.send_gcode("M114", None).is_err());
        assert!(sim.send_gcode("M114", None).is_ok());

        let homed = model::parse_axes_homed(
            &sim.send_gcode("M409 K\"move.axes[].homed\"", None).unwrap(),
        )
        .unwrap();
        assert_eq!(homed, [false; 4]);

        sim.set_not_ready(true);
        assert!(model::parse_axes_homed(
            &sim.send_gcode("M409 K\"move.axes[].homed\"", None).unwrap()
        )
        .is_err());
    }

    #[test]
    fn test_download_file() {
        let mut sim = SimLink::new();
        sim.add_file("/sys/tfree0.g", "G0 Y220\n");

        assert_eq!(sim.download_file("/sys/tfree0.g", None).unwrap(), "G0 Y220\n");
        assert!(matches!(
            sim.download_file("/sys/missing.g", None),
            Err(LinkError::Status { status: 404, .. })
        ));
    }
}
