//! # Object Model Responses
//!
//! Parsing of the replies the firmware gives to query commands: JSON `M409` object model queries
//! (which wrap their payload in a `result` field), the `M114` position report and the `T` tool
//! report.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use conquer_once::Lazy;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::gcode::{Axis, NUM_HOMED_AXES};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Object model key for the per-axis homed flags.
pub const KEY_AXES_HOMED: &str = "move.axes[].homed";

/// Object model key for the tool table.
pub const KEY_TOOLS: &str = "tools";

/// Object model key for the axis table.
pub const KEY_AXES: &str = "move.axes";

/// Matches one `<axis>:<value>` pair of an `M114` report.
static POSITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([XYZUV]):\s*(-?\d+(?:\.\d+)?)").expect("Position regex is valid")
});

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Envelope of every `M409` reply.
#[derive(Debug, Deserialize)]
pub struct ModelResponse<T> {
    pub result: T,
}

/// One entry of `move.axes`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AxisModel {
    #[serde(default)]
    pub letter: Option<String>,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub homed: bool,
}

/// One entry of `tools`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolModel {
    #[serde(default)]
    pub number: Option<i32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub offsets: Vec<f64>,
}

/// Axis positions reported by `M114`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Position {
    values: Vec<(Axis, f64)>,
}

// ------------------------------------------------------------------------------------------------
// ERRORS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("Malformed object model response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tool {0} has no Z offset")]
    MissingZOffset(usize),

    #[error("Position report has no value for axis {0}: {1:?}")]
    MissingAxis(Axis, String),

    #[error("Could not read the selected tool from {0:?}")]
    ToolIndex(String),
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse the `result` payload of an `M409` reply.
pub fn parse_result<T: DeserializeOwned>(text: &str) -> Result<T, ModelError> {
    let resp: ModelResponse<T> = serde_json::from_str(text.trim())?;
    Ok(resp.result)
}

/// Parse the homed flags of the tracked axes. Axes the firmware does not report are unhomed.
pub fn parse_axes_homed(text: &str) -> Result<[bool; NUM_HOMED_AXES], ModelError> {
    let flags: Vec<bool> = parse_result(text)?;

    let mut homed = [false; NUM_HOMED_AXES];
    for (h, f) in homed.iter_mut().zip(flags.iter()) {
        *h = *f;
    }

    Ok(homed)
}

/// Parse the Z offset of every tool in the tool table.
pub fn parse_tool_z_offsets(text: &str) -> Result<Vec<f64>, ModelError> {
    let tools: Vec<ToolModel> = parse_result(text)?;

    tools
        .iter()
        .enumerate()
        .map(|(i, t)| t.offsets.get(2).copied().ok_or(ModelError::MissingZOffset(i)))
        .collect()
}

/// Parse `(min, max)` travel limits for every axis.
pub fn parse_axis_limits(text: &str) -> Result<Vec<(f64, f64)>, ModelError> {
    let axes: Vec<AxisModel> = parse_result(text)?;

    Ok(axes.iter().map(|a| (a.min, a.max)).collect())
}

/// Parse the reply to `T`.
///
/// `None` means no tool is selected.
pub fn parse_tool_index(text: &str) -> Result<Option<usize>, ModelError> {
    let text = text.trim();

    if text.starts_with("No tool") {
        return Ok(None);
    }

    let number = if text.starts_with("Tool") {
        text.split_whitespace().nth(1).unwrap_or("")
    } else {
        text
    };

    match number.parse::<i64>() {
        Ok(n) if n < 0 => Ok(None),
        Ok(n) => Ok(Some(n as usize)),
        Err(_) => Err(ModelError::ToolIndex(text.to_string())),
    }
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Position {
    /// Parse an `M114` report such as
    /// `X:10.000 Y:20.000 Z:30.000 U:0.000 V:0.000 E:0.000 Count 800 ...`.
    ///
    /// Only the user-coordinate section before `Count` is read.
    pub fn parse(text: &str) -> Self {
        let user = match text.find("Count") {
            Some(i) => &text[..i],
            None => text,
        };

        let values = POSITION_RE
            .captures_iter(user)
            .filter_map(|cap| {
                let axis = cap.get(1)?.as_str().parse::<Axis>().ok()?;
                let value = cap.get(2)?.as_str().parse::<f64>().ok()?;
                Some((axis, value))
            })
            .collect();

        Self { values }
    }

    /// Create a position from explicit values.
    pub fn from_values(values: Vec<(Axis, f64)>) -> Self {
        Self { values }
    }

    /// Position of one axis, if reported.
    pub fn get(&self, axis: Axis) -> Option<f64> {
        self.values.iter().find(|(a, _)| *a == axis).map(|(_, v)| *v)
    }

    /// Position of one axis, or an error naming the report.
    pub fn require(&self, axis: Axis) -> Result<f64, ModelError> {
        self.get(axis)
            .ok_or_else(|| ModelError::MissingAxis(axis, format!("{:?}", self.values)))
    }

    /// The XYZ position of the control point.
    pub fn xyz(&self) -> Result<[f64; 3], ModelError> {
        Ok([
            self.require(Axis::X)?,
            self.require(Axis::Y)?,
            self.require(Axis::Z)?,
        ])
    }
}
