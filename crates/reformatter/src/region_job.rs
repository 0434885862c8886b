//! Region jobs: fetch, transform and write one append-dimension chunk.
//!
//! A job covers every variable over the time slices of a single chunk, so
//! each job maps onto a disjoint set of Zarr chunks and issues exactly one
//! region write.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{FetchError, StoreError};
use crate::schema::Schema;
use crate::source::SourceAdapter;
use crate::store::{CoverageLedger, RegionData, TileStore, VariableRegion};
use crate::transform::transform;

/// Outcome of one append coordinate within a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinateStatus {
    /// Every variable was transformed and durably written.
    Written,
    /// At least one variable is not published yet.
    Pending,
    /// Retrieval, transform or write failed.
    Failed(String),
}

impl CoordinateStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Written => "written",
            Self::Pending => "pending",
            Self::Failed(_) => "failed",
        }
    }
}

/// One time chunk's worth of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionJob {
    /// Chunk index along the append dimension.
    pub chunk: u64,
    pub time_start: u64,
    pub time_len: u64,
    /// Append indices to fetch. Always inside the region.
    pub targets: BTreeSet<u64>,
}

/// Per-coordinate outcomes of a job, keyed by append index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionResult {
    pub chunk: u64,
    pub outcomes: BTreeMap<u64, CoordinateStatus>,
}

impl RegionResult {
    /// Indices whose values are now durably in the store.
    pub fn written(&self) -> impl Iterator<Item = u64> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, status)| **status == CoordinateStatus::Written)
            .map(|(index, _)| *index)
    }
}

/// Tiles of one coordinate: transformed values per variable, in schema order.
type CoordinateTiles = Vec<Vec<f32>>;

impl RegionJob {
    /// Group append indices into chunk-aligned jobs, ascending by chunk.
    pub fn partition(schema: &Schema, indices: impl IntoIterator<Item = u64>) -> Vec<RegionJob> {
        let chunk_len = schema.time_chunk();
        let mut jobs: BTreeMap<u64, RegionJob> = BTreeMap::new();
        for index in indices {
            let chunk = index / chunk_len;
            jobs.entry(chunk)
                .or_insert_with(|| RegionJob {
                    chunk,
                    time_start: chunk * chunk_len,
                    time_len: chunk_len,
                    targets: BTreeSet::new(),
                })
                .targets
                .insert(index);
        }
        jobs.into_values().collect()
    }

    fn contains(&self, index: u64) -> bool {
        index >= self.time_start && index < self.time_start + self.time_len
    }

    /// Fetch, transform and write the job's region.
    ///
    /// The caller must hold the region lock for `self.chunk` from before
    /// this call until the written coordinates are committed to the ledger;
    /// otherwise another job on the same chunk can overwrite them with fill
    /// values. [`Orchestrator`](crate::Orchestrator) does this.
    ///
    /// Never fails as a whole: every problem is recorded against the
    /// coordinates it affects.
    #[instrument(skip_all, fields(chunk = self.chunk, targets = self.targets.len()))]
    pub async fn run(&self, source: &dyn SourceAdapter, store: Arc<dyn TileStore>) -> RegionResult {
        let mut outcomes = BTreeMap::new();

        // Another job may have committed part of this region meanwhile.
        let ledger = match blocking(&store, |s| s.read_ledger()).await {
            Ok(ledger) => ledger,
            Err(e) => {
                error!(error = %e, "Failed to read coverage ledger");
                for &index in &self.targets {
                    outcomes.insert(index, CoordinateStatus::Failed(e.to_string()));
                }
                return RegionResult {
                    chunk: self.chunk,
                    outcomes,
                };
            }
        };

        let schema = store.schema();
        let mut tiles: BTreeMap<u64, CoordinateTiles> = BTreeMap::new();
        for &index in &self.targets {
            if !self.contains(index) {
                warn!(index, "Target outside job region");
                outcomes.insert(
                    index,
                    CoordinateStatus::Failed(format!(
                        "outside region {}..{}",
                        self.time_start,
                        self.time_start + self.time_len
                    )),
                );
                continue;
            }
            if ledger.is_committed(index) {
                debug!(index, "Already committed; not fetching");
                continue;
            }
            match self.fetch_coordinate(source, schema, index).await {
                Ok(values) => {
                    tiles.insert(index, values);
                }
                Err(status) => {
                    outcomes.insert(index, status);
                }
            }
        }

        if tiles.is_empty() {
            debug!("Nothing to write");
            return RegionResult {
                chunk: self.chunk,
                outcomes,
            };
        }

        match self.write(&store, &ledger, &tiles).await {
            Ok(()) => {
                info!(written = tiles.len(), "Region written");
                for index in tiles.into_keys() {
                    outcomes.insert(index, CoordinateStatus::Written);
                }
            }
            Err(e) => {
                error!(error = %e, coordinates = tiles.len(), "Region write failed");
                counter!("reformat_store_write_failures_total").increment(1);
                for index in tiles.into_keys() {
                    outcomes.insert(index, CoordinateStatus::Failed(format!("store write: {}", e)));
                }
            }
        }

        RegionResult {
            chunk: self.chunk,
            outcomes,
        }
    }

    /// Fetch and transform every variable of one coordinate.
    async fn fetch_coordinate(
        &self,
        source: &dyn SourceAdapter,
        schema: &Schema,
        index: u64,
    ) -> Result<CoordinateTiles, CoordinateStatus> {
        let time = schema.time_at(index);
        let mut values = Vec::with_capacity(schema.variables.len());
        let mut pending = false;
        let mut failure: Option<String> = None;

        for var in &schema.variables {
            match source.fetch(time, var).await {
                Ok(raw) => match transform(&raw, var, &schema.tile_shape(var)) {
                    Ok(tile) => values.push(tile),
                    Err(e) => {
                        warn!(init_time = %time, variable = %var.name, error = %e, "Transform failed");
                        failure.get_or_insert_with(|| format!("{}: {}", var.name, e));
                    }
                },
                Err(FetchError::NotYetAvailable) => {
                    debug!(init_time = %time, variable = %var.name, "Not yet available");
                    pending = true;
                }
                Err(e) => {
                    warn!(init_time = %time, variable = %var.name, error = %e, "Fetch failed");
                    failure.get_or_insert_with(|| format!("{}: {}", var.name, e));
                }
            }
        }

        match (failure, pending) {
            (Some(cause), _) => Err(CoordinateStatus::Failed(cause)),
            (None, true) => Err(CoordinateStatus::Pending),
            (None, false) => Ok(values),
        }
    }

    /// Assemble the region buffers and write them in one call.
    ///
    /// Committed slices are read back and rewritten unchanged; every other
    /// slice not written by this job holds the fill value.
    async fn write(
        &self,
        store: &Arc<dyn TileStore>,
        ledger: &CoverageLedger,
        tiles: &BTreeMap<u64, CoordinateTiles>,
    ) -> Result<(), StoreError> {
        let schema = store.schema();
        let keep_existing = (self.time_start..self.time_start + self.time_len)
            .any(|index| ledger.is_committed(index));

        let mut variables = Vec::with_capacity(schema.variables.len());
        for (position, var) in schema.variables.iter().enumerate() {
            let slice_len: usize = schema.tile_shape(var).iter().product();

            let mut values = if keep_existing {
                let name = var.name.clone();
                let (start, len) = (self.time_start, self.time_len);
                let mut existing = blocking(store, move |s| s.read_region(&name, start, len)).await?;
                for index in self.time_start..self.time_start + self.time_len {
                    if !ledger.is_committed(index) {
                        let offset = (index - self.time_start) as usize * slice_len;
                        existing[offset..offset + slice_len].fill(var.fill_value);
                    }
                }
                existing
            } else {
                vec![var.fill_value; self.time_len as usize * slice_len]
            };

            for (&index, tile) in tiles {
                let offset = (index - self.time_start) as usize * slice_len;
                values[offset..offset + slice_len].copy_from_slice(&tile[position]);
            }

            variables.push(VariableRegion {
                name: var.name.clone(),
                values,
            });
        }

        let region = RegionData {
            time_start: self.time_start,
            time_len: self.time_len,
            variables,
        };
        blocking(store, move |s| s.write_region(&region)).await
    }
}

/// Run a store call on the blocking pool.
pub(crate) async fn blocking<T, F>(store: &Arc<dyn TileStore>, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn TileStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| StoreError::Io(format!("store task failed: {}", e)))?
}
