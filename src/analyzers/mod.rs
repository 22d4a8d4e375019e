//! Trial scoring.
//!
//! Holds the metric table produced by the parser, the per-test-type composite
//! weights, the z-score composite and best-trial selection, and the rescaling
//! of a batch onto the 50-100 reporting band.

pub mod band;
pub mod composite;
pub mod table;
pub mod types;
pub mod utility;
pub mod weights;
