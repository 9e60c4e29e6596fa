//! # G-code Command Definitions
//!
//! The subset of RepRapFirmware G/M-codes used to drive the machine. Each command formats to the
//! exact text line posted to the firmware.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of axes whose homed state is tracked.
pub const NUM_HOMED_AXES: usize = 4;

/// The axes whose homed flags are tracked, in object-model order.
pub const HOMED_AXES: [Axis; NUM_HOMED_AXES] = [Axis::X, Axis::Y, Axis::Z, Axis::U];

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Machine axes.
///
/// `U` drives the tool-lock mechanism, `V` the micropipette plunger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
    U,
    V,
}

/// A single line of G-code.
#[derive(Debug, Clone, PartialEq)]
pub enum GCode {
    /// `G0`: rapid move of the given axes, with an optional feedrate in mm/min.
    Rapid {
        moves: Vec<(Axis, f64)>,
        feedrate: Option<u32>,
    },

    /// `G90`: absolute positioning
    AbsolutePositioning,

    /// `G91`: relative positioning
    RelativePositioning,

    /// `G92`: declare the current position of an axis
    SetPosition(Axis, f64),

    /// `M400`: wait for all moves to finish
    WaitForMoves,

    /// `M98 P"<path>"`: run a macro file
    RunMacro(String),

    /// `M409 K"<key>"`: query the object model
    QueryModel(String),

    /// `M208 <axis><min>:<max>`: set axis travel limits
    SetAxisLimits {
        axis: Axis,
        min: f64,
        max: f64,
    },

    /// `M114`: report the current position
    ReportPosition,

    /// `T`: report the selected tool
    QueryTool,

    /// `F<rate>`: set the feedrate in mm/min
    SetFeedrate(u32),

    /// `M18 [drivers]`: disable drivers, all of them when no driver is given
    DisableDrivers(Option<String>),

    /// `M0`: stop
    Stop,

    /// `M112`: emergency stop
    EmergencyStop,

    /// `M999`: software reset of the board
    Reset,
}

// ------------------------------------------------------------------------------------------------
// ERRORS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("Unknown axis: {0}")]
pub struct UnknownAxis(pub String);

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// True if a raw line of G-code only reads machine state (`M409`, `M114` or a bare `T`).
pub fn is_query_line(line: &str) -> bool {
    match line.split_whitespace().next() {
        Some(word) => matches!(word.to_uppercase().as_str(), "M409" | "M114" | "T"),
        None => false,
    }
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Axis {
    /// Upper-case letter of this axis
    pub fn letter(&self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
            Axis::U => 'U',
            Axis::V => 'V',
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for Axis {
    type Err = UnknownAxis;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "X" => Ok(Axis::X),
            "Y" => Ok(Axis::Y),
            "Z" => Ok(Axis::Z),
            "U" => Ok(Axis::U),
            "V" => Ok(Axis::V),
            _ => Err(UnknownAxis(s.to_string())),
        }
    }
}

impl GCode {
    /// Rapid move of a single axis, at the current feedrate.
    pub fn rapid_axis(axis: Axis, position: f64) -> Self {
        GCode::Rapid {
            moves: vec![(axis, position)],
            feedrate: None,
        }
    }

    /// True for codes which only read machine state.
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            GCode::QueryModel(_) | GCode::ReportPosition | GCode::QueryTool
        )
    }
}

impl fmt::Display for GCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GCode::Rapid { moves, feedrate } => {
                write!(f, "G0")?;
                for (axis, pos) in moves {
                    write!(f, " {}{}", axis, pos)?;
                }
                if let Some(fr) = feedrate {
                    write!(f, " F{}", fr)?;
                }
                Ok(())
            }
            GCode::AbsolutePositioning => write!(f, "G90"),
            GCode::RelativePositioning => write!(f, "G91"),
            GCode::SetPosition(axis, pos) => write!(f, "G92 {}{}", axis, pos),
            GCode::WaitForMoves => write!(f, "M400"),
            GCode::RunMacro(path) => write!(f, "M98 P\"{}\"", path),
            GCode::QueryModel(key) => write!(f, "M409 K\"{}\"", key),
            GCode::SetAxisLimits { axis, min, max } => write!(f, "M208 {}{}:{}", axis, min, max),
            GCode::ReportPosition => write!(f, "M114"),
            GCode::QueryTool => write!(f, "T"),
            GCode::SetFeedrate(fr) => write!(f, "F{}", fr),
            GCode::DisableDrivers(Some(d)) => write!(f, "M18 {}", d),
            GCode::DisableDrivers(None) => write!(f, "M18"),
            GCode::Stop => write!(f, "M0"),
            GCode::EmergencyStop => write!(f, "M112"),
            GCode::Reset => write!(f, "M999"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_format() {
        let g = GCode::Rapid {
            moves: vec![(Axis::X, 302.0), (Axis::Y, 7.5)],
            feedrate: Some(10000),
        };
        assert_eq!(g.to_string(), "G0 X302 Y7.5 F10000");
        assert_eq!(GCode::rapid_axis(Axis::U, 70.0).to_string(), "G0 U70");
        assert_eq!(GCode::rapid_axis(Axis::V, 150.02).to_string(), "G0 V150.02");
        assert_eq!(
            GCode::SetAxisLimits { axis: Axis::Y, min: 50.0, max: 400.0 }.to_string(),
            "M208 Y50:400"
        );
        assert_eq!(GCode::RunMacro("/sys/homex.g".into()).to_string(), "M98 P\"/sys/homex.g\"");
        assert_eq!(
            GCode::QueryModel("move.axes[].homed".into()).to_string(),
            "M409 K\"move.axes[].homed\""
        );
        assert_eq!(GCode::DisableDrivers(Some("E0".into())).to_string(), "M18 E0");
        assert_eq!(GCode::SetPosition(Axis::Z, -1.25).to_string(), "G92 Z-1.25");
    }

    #[test]
    fn test_is_query_line() {
        assert!(is_query_line("M409 K\"tools\""));
        assert!(is_query_line("m114"));
        assert!(is_query_line("T"));
        assert!(!is_query_line("T1"));
        assert!(!is_query_line("G0 X10"));
        assert!(!is_query_line(""));
        assert!(GCode::ReportPosition.is_query());
        assert!(!GCode::WaitForMoves.is_query());
    }

    #[test]
    fn test_axis_from_str() {
        assert_eq!("u".parse::<Axis>(), Ok(Axis::U));
        assert_eq!(" X ".parse::<Axis>(), Ok(Axis::X));
        assert_eq!("W".parse::<Axis>(), Err(UnknownAxis("W".into())));
    }
}
