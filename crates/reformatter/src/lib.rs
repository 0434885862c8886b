//! Incremental Reformatter for Gridded Forecast Data
//!
//! This crate keeps an append-only Zarr V3 store in sync with an upstream
//! source of forecast files. Each update:
//!
//! - **Diffs** the persisted coverage ledger against what the source could
//!   have published
//! - **Fetches and transforms** the missing coordinates in chunk-aligned
//!   region jobs, several at a time
//! - **Commits** written coordinates and advances the watermark through the
//!   contiguous committed prefix
//!
//! # Architecture
//!
//! ```text
//! Orchestrator::update(now)
//!      │
//!      ├─► TileStore::lock_for_update (update.lock in the store root)
//!      │
//!      ├─► read CoverageLedger ─► candidates (watermark + 1 ..= latest)
//!      │
//!      ├─► ensure_time_extent (whole chunks)
//!      │
//!      ├─► per time chunk, under its RegionLocks guard (buffer_unordered)
//!      │         │
//!      │         ├─► RegionJob::run
//!      │         │     ├─► SourceAdapter::fetch (time, variable)
//!      │         │     ├─► transform
//!      │         │     └─► TileStore::write_region (one write per job)
//!      │         │
//!      │         └─► commit written coordinates to the ledger
//!      │
//!      └─► UpdateReport
//! ```
//!
//! # Example
//!
//! ```ignore
//! use reformatter::{presets, Orchestrator, ZarrStore, UpdateSettings};
//!
//! let schema = Arc::new(presets::dataset("noaa-hrrr-alaska-forecast")?);
//! let store = ZarrStore::open_or_create("./data/hrrr-ak.zarr", schema.clone())?;
//! let orchestrator = Orchestrator::new(Arc::new(store), source, UpdateSettings::default());
//! let report = orchestrator.update(Utc::now()).await?;
//! ```

pub mod config;
pub mod error;
pub mod locks;
pub mod orchestrator;
pub mod region_job;
pub mod report;
pub mod schema;
pub mod source;
pub mod store;
pub mod transform;

#[cfg(test)]
mod testing;

// Re-export commonly used types at crate root
pub use config::ReformatConfig;
pub use error::{FetchError, ReformatError, Result, SchemaError, StoreError, TransformError};
pub use locks::RegionLocks;
pub use orchestrator::{Orchestrator, UpdateSettings};
pub use region_job::{CoordinateStatus, RegionJob, RegionResult};
pub use report::{FailedCoordinate, UpdateReport};
pub use schema::{presets, Schema, VariableDescriptor};
pub use source::{GribDecoder, HttpSourceAdapter, HttpSourceConfig, RawTile, SourceAdapter, TileDecoder};
pub use store::{
    CoverageLedger, RegionData, StoreInfo, TileStore, UpdateLock, VariableRegion, ZarrStore,
};
pub use transform::transform;
