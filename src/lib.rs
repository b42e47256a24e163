//! Phase binning and single-event Box Least Squares search for light curves.
//!
//! A light curve is cut into segments of one trial period each. Every
//! segment is folded into phase bins ([`transit::phase_bin`]) and the bins
//! are scanned for the box-shaped dip or blip that maximises the BLS signal
//! residue ([`transit::bls_pulse`]).

#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]

pub mod transit;
pub mod utilities;

pub use utilities::enums::{Direction, DurationBound, Kernel, NanPolicy};
pub use utilities::light_curve::{LightCurve, LightCurveError};


pub mod bindings {
    #[cfg(feature = "python")]
    pub mod python;
}
