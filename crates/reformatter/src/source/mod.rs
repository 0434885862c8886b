//! Source adapters: where decoded tiles come from.

mod coord;
mod grib;
mod http;

pub use coord::SourceFileCoord;
pub use grib::{GribDecoder, SurfaceMatch};
pub use http::{HttpSourceAdapter, HttpSourceConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FetchError;
use crate::schema::{SourceSelector, VariableDescriptor};

/// A decoded source tile for one (time, variable) pair, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTile {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl RawTile {
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Self {
        Self { shape, values }
    }

    /// A tile of `shape` where every value is missing.
    pub fn missing(shape: Vec<usize>) -> Self {
        let n = shape.iter().product();
        Self {
            shape,
            values: vec![f32::NAN; n],
        }
    }
}

/// Yields decoded tiles for time coordinates.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Fetch and decode the tile of `variable` at `time`.
    async fn fetch(
        &self,
        time: DateTime<Utc>,
        variable: &VariableDescriptor,
    ) -> Result<RawTile, FetchError>;

    /// Newest time coordinate that could possibly exist at `now`.
    fn latest_available(&self, now: DateTime<Utc>) -> DateTime<Utc>;

    /// Called once every variable at `time` is committed. Adapters that keep
    /// local copies of source files drop them here.
    async fn release(&self, _time: DateTime<Utc>) {}
}

/// Turns the bytes of one source file into one 2-D field.
pub trait TileDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8], selector: &SourceSelector) -> Result<Vec<f32>, FetchError>;
}
