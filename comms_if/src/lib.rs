//! # Communications interface crate.
//!
//! Provides the interface to the machine firmware: G-code command definitions, parsing of the
//! firmware's replies, and the transports used to reach it.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// G-code command definitions
pub mod gcode;

/// Object model and status report parsing
pub mod model;

/// Network module
pub mod net;
