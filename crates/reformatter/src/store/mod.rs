//! Persistent store: arrays, coordinates and the coverage ledger.

mod ledger;
mod update_lock;
mod zarr;

pub use ledger::CoverageLedger;
pub use update_lock::{UpdateLock, UPDATE_LOCK_FILE};
pub use zarr::{StoreInfo, ZarrStore};

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::schema::Schema;

/// Values of one variable over a region of whole time slices.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableRegion {
    pub name: String,
    /// Row-major, `time_len * tile size` values.
    pub values: Vec<f32>,
}

/// Everything a region job writes in its single write.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionData {
    pub time_start: u64,
    pub time_len: u64,
    pub variables: Vec<VariableRegion>,
}

/// Blocking store operations used by region jobs and the orchestrator.
///
/// Implementations must be safe to call from several threads; region
/// exclusivity is the caller's responsibility.
pub trait TileStore: Send + Sync {
    fn schema(&self) -> &Schema;

    /// Read the persisted coverage ledger.
    fn read_ledger(&self) -> Result<CoverageLedger, StoreError>;

    /// Persist the coverage ledger, merged with the one already on disk.
    /// Commits are never removed and the watermark never moves back.
    fn write_ledger(&self, ledger: &CoverageLedger) -> Result<(), StoreError>;

    /// Claim the store for one update.
    fn lock_for_update(&self) -> Result<UpdateLock, StoreError> {
        Ok(UpdateLock::unguarded())
    }

    /// Current length of the append dimension.
    fn time_len(&self) -> Result<u64, StoreError>;

    /// Grow the append dimension to hold at least `len` coordinates,
    /// rounded up to whole chunks. Returns the resulting length.
    fn ensure_time_extent(&self, len: u64) -> Result<u64, StoreError>;

    /// Overwrite the region's time slices of every listed variable.
    fn write_region(&self, region: &RegionData) -> Result<(), StoreError>;

    /// Read `time_len` time slices of one variable.
    fn read_region(
        &self,
        variable: &str,
        time_start: u64,
        time_len: u64,
    ) -> Result<Vec<f32>, StoreError>;

    /// Time coordinate of the persisted watermark.
    fn read_watermark(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .read_ledger()?
            .watermark()
            .map(|index| self.schema().time_at(index)))
    }
}
