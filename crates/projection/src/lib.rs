//! Coordinate reference system transformations.
//!
//! Implements map projections from scratch without external dependencies.

pub mod polar;

pub use polar::{PolarStereographic, NCEP_EARTH_RADIUS};
