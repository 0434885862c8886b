//! Polar Stereographic projection (spherical, north polar aspect).
//!
//! Used by the HRRR Alaska domain. The plane touches the sphere at the pole
//! and is scaled so that distances are true along the standard parallel
//! (`lat_ts`, LaD in GRIB2).
//!
//! The projection parameters include:
//! - Straight vertical longitude from pole (LoV in GRIB2)
//! - Latitude of true scale
//! - Grid spacing: dx, dy in meters
//! - First grid point: lat1, lon1

use std::f64::consts::PI;

/// Earth radius used by NCEP models (meters).
pub const NCEP_EARTH_RADIUS: f64 = 6_371_229.0;

/// Polar Stereographic projection parameters.
///
/// Converts between geographic (lat/lon), projected (x/y in meters) and
/// grid (i, j) coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PolarStereographic {
    /// Straight vertical longitude from pole, in radians
    pub lon0: f64,
    /// Latitude of true scale, in radians
    pub lat_ts: f64,
    /// Projected X of the first grid point (meters)
    pub x0: f64,
    /// Projected Y of the first grid point (meters)
    pub y0: f64,
    /// Grid spacing in X direction (meters)
    pub dx: f64,
    /// Grid spacing in Y direction (meters)
    pub dy: f64,
    /// Number of grid points in X (i) direction
    pub nx: usize,
    /// Number of grid points in Y (j) direction
    pub ny: usize,
    /// Earth radius (meters)
    pub earth_radius: f64,
}

impl PolarStereographic {
    /// Create a projection from GRIB2 grid definition parameters.
    ///
    /// # Arguments
    /// * `lat1_deg` - Latitude of first grid point (degrees)
    /// * `lon1_deg` - Longitude of first grid point (degrees)
    /// * `lov_deg` - Straight vertical longitude from pole (degrees)
    /// * `lad_deg` - Latitude where dx/dy are specified (degrees)
    /// * `dx` - Grid spacing X (meters)
    /// * `dy` - Grid spacing Y (meters)
    /// * `nx` - Number of X grid points
    /// * `ny` - Number of Y grid points
    #[allow(clippy::too_many_arguments)]
    pub fn from_grib2(
        lat1_deg: f64,
        lon1_deg: f64,
        lov_deg: f64,
        lad_deg: f64,
        dx: f64,
        dy: f64,
        nx: usize,
        ny: usize,
    ) -> Self {
        let mut proj = Self {
            lon0: lov_deg.to_radians(),
            lat_ts: lad_deg.to_radians(),
            x0: 0.0,
            y0: 0.0,
            dx,
            dy,
            nx,
            ny,
            earth_radius: NCEP_EARTH_RADIUS,
        };

        let (x0, y0) = proj.forward(lat1_deg, lon1_deg);
        proj.x0 = x0;
        proj.y0 = y0;
        proj
    }

    /// Use a different sphere, keeping the first grid point where it is.
    pub fn with_earth_radius(mut self, earth_radius: f64) -> Self {
        let ratio = earth_radius / self.earth_radius;
        self.x0 *= ratio;
        self.y0 *= ratio;
        self.earth_radius = earth_radius;
        self
    }

    /// Radius scale `R * (1 + sin(lat_ts))` shared by both directions.
    fn scale(&self) -> f64 {
        self.earth_radius * (1.0 + self.lat_ts.sin())
    }

    /// Convert geographic coordinates (degrees) to projected meters.
    pub fn forward(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let lat = lat_deg.to_radians();
        let dlon = normalize_radians(lon_deg.to_radians() - self.lon0);

        let rho = self.scale() * (PI / 4.0 - lat / 2.0).tan();

        (rho * dlon.sin(), -rho * dlon.cos())
    }

    /// Convert projected meters to geographic coordinates.
    ///
    /// Returns (lat, lon) in degrees with longitude in [-180, 180).
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let rho = (x * x + y * y).sqrt();
        let lat = PI / 2.0 - 2.0 * (rho / self.scale()).atan();
        let lon = normalize_radians(self.lon0 + x.atan2(-y));

        (lat.to_degrees(), lon.to_degrees())
    }

    /// Convert geographic coordinates (degrees) to fractional grid indices (i, j).
    pub fn geo_to_grid(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let (x, y) = self.forward(lat_deg, lon_deg);
        ((x - self.x0) / self.dx, (y - self.y0) / self.dy)
    }

    /// Convert grid indices (i, j) to geographic coordinates.
    ///
    /// Returns (lat, lon) in degrees.
    pub fn grid_to_geo(&self, i: f64, j: f64) -> (f64, f64) {
        self.inverse(self.x0 + i * self.dx, self.y0 + j * self.dy)
    }

    /// Projected X coordinate of every grid column.
    pub fn x_coordinates(&self) -> Vec<f64> {
        (0..self.nx).map(|i| self.x0 + i as f64 * self.dx).collect()
    }

    /// Projected Y coordinate of every grid row.
    pub fn y_coordinates(&self) -> Vec<f64> {
        (0..self.ny).map(|j| self.y0 + j as f64 * self.dy).collect()
    }
}

/// Wrap an angle to [-π, π).
fn normalize_radians(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}
