//! Deterministic coordinate generation.

use chrono::{DateTime, Timelike, Utc};

use super::{CoordinateSpec, Dimension, ForecastLengthRule, Schema};

/// Values of a coordinate array.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateValues {
    /// Epoch seconds or integer hours.
    Int64(Vec<i64>),
    Float64(Vec<f64>),
}

impl CoordinateValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Int64(v) => v.len(),
            Self::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Forecast length in hours of the cycle initialised at `init_time`.
pub fn expected_forecast_length(rule: &ForecastLengthRule, init_time: DateTime<Utc>) -> i64 {
    if rule.long_cycle_hours.contains(&init_time.hour()) {
        rule.long_hours
    } else {
        rule.short_hours
    }
}

impl Schema {
    /// Coordinate values for `dim` over `[start, end)`.
    ///
    /// Bounded dimensions ignore the range and return every value.
    pub fn dimension_values(&self, dim: &Dimension, start: u64, end: u64) -> CoordinateValues {
        match &dim.coordinate {
            CoordinateSpec::Time { .. } => CoordinateValues::Int64(
                (start..end).map(|i| self.time_at(i).timestamp()).collect(),
            ),
            CoordinateSpec::LeadHours { start, step } => {
                let n = dim.len.unwrap_or(0) as i64;
                CoordinateValues::Int64((0..n).map(|i| start + i * step).collect())
            }
            CoordinateSpec::Linear { start, step } => {
                let n = dim.len.unwrap_or(0);
                CoordinateValues::Float64((0..n).map(|i| start + i as f64 * step).collect())
            }
            CoordinateSpec::ProjectionX => CoordinateValues::Float64(
                self.projection().map(|p| p.x_coordinates()).unwrap_or_default(),
            ),
            CoordinateSpec::ProjectionY => CoordinateValues::Float64(
                self.projection().map(|p| p.y_coordinates()).unwrap_or_default(),
            ),
        }
    }

    /// Lead hours of the lead dimension, if the schema has one.
    pub fn lead_hours(&self) -> Option<Vec<i64>> {
        let dim = self.lead_dimension()?;
        match self.dimension_values(dim, 0, 0) {
            CoordinateValues::Int64(v) => Some(v),
            CoordinateValues::Float64(_) => None,
        }
    }

    /// Expected forecast length of every init time in `[start, end)`.
    pub fn forecast_lengths(&self, start: u64, end: u64) -> Option<Vec<i64>> {
        let rule = self.forecast_length.as_ref()?;
        Some(
            (start..end)
                .map(|i| expected_forecast_length(rule, self.time_at(i)))
                .collect(),
        )
    }

    /// Latitude and longitude of every grid point, row-major over (y, x).
    pub fn latitude_longitude(&self) -> Option<(Vec<f32>, Vec<f32>)> {
        let proj = self.projection()?;
        let xs = proj.x_coordinates();
        let ys = proj.y_coordinates();

        let mut lats = Vec::with_capacity(xs.len() * ys.len());
        let mut lons = Vec::with_capacity(xs.len() * ys.len());
        for &y in &ys {
            for &x in &xs {
                let (lat, lon) = proj.inverse(x, y);
                lats.push(lat as f32);
                lons.push(lon as f32);
            }
        }
        Some((lats, lons))
    }
}
