//! # Camera Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::vision::{HoughParams, WellParams};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CamExecParams {

    /// Circle detection
    pub hough: HoughParams,

    /// Well intensity analysis
    pub well: WellParams,

    /// Save the annotated and intermediate images next to the reports
    pub save_images: bool,
}
