//! Incremental update driver.
//!
//! Each update recomputes its work from persisted state: the coverage ledger
//! says what is committed, the source says what could exist, and the gap
//! between the two (bounded by the look-ahead) becomes region jobs. Written
//! coordinates are committed as each job finishes, then released by the
//! source. The watermark only ever covers a contiguous committed prefix.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::config::ReformatConfig;
use crate::error::{ReformatError, Result};
use crate::locks::RegionLocks;
use crate::region_job::{blocking, CoordinateStatus, RegionJob, RegionResult};
use crate::report::{FailedCoordinate, UpdateReport};
use crate::source::SourceAdapter;
use crate::store::{CoverageLedger, TileStore, UpdateLock};

/// Knobs of a single update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSettings {
    /// Coordinates past the watermark considered in one run.
    pub max_lookahead: usize,
    /// Region jobs in flight.
    pub concurrency: usize,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self::from(&ReformatConfig::default())
    }
}

impl From<&ReformatConfig> for UpdateSettings {
    fn from(config: &ReformatConfig) -> Self {
        Self {
            max_lookahead: config.max_lookahead,
            concurrency: config.concurrency,
        }
    }
}

/// Drives updates of one store from one source.
pub struct Orchestrator {
    store: Arc<dyn TileStore>,
    source: Arc<dyn SourceAdapter>,
    settings: UpdateSettings,
    locks: RegionLocks,
    /// Serialises ledger read-modify-write cycles.
    commit_lock: Mutex<()>,
    /// Store claim shared by this orchestrator's concurrent updates.
    claim: Mutex<Weak<UpdateLock>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn TileStore>,
        source: Arc<dyn SourceAdapter>,
        settings: UpdateSettings,
    ) -> Self {
        Self {
            store,
            source,
            settings,
            locks: RegionLocks::new(),
            commit_lock: Mutex::new(()),
            claim: Mutex::new(Weak::new()),
        }
    }

    pub fn settings(&self) -> UpdateSettings {
        self.settings
    }

    /// Region locks shared by every job this orchestrator runs.
    pub fn locks(&self) -> &RegionLocks {
        &self.locks
    }

    /// Append indices to work on at `now`, given the persisted ledger.
    fn candidates(&self, ledger: &CoverageLedger, now: DateTime<Utc>) -> Vec<u64> {
        let schema = self.store.schema();
        if self.settings.max_lookahead == 0 {
            return Vec::new();
        }
        let Some(latest) = schema.floor_index(self.source.latest_available(now)) else {
            return Vec::new();
        };

        let first = ledger.next_after_watermark();
        let last = latest.min(first + self.settings.max_lookahead as u64 - 1);
        if last < first {
            return Vec::new();
        }
        (first..=last).filter(|&i| !ledger.is_committed(i)).collect()
    }

    /// Bring the store up to date with what the source has at `now`.
    ///
    /// Partial failures are reported, not returned. Only an unreachable or
    /// locked store aborts the run.
    #[instrument(skip(self), fields(dataset = %self.store.schema().attributes.id))]
    pub async fn update(&self, now: DateTime<Utc>) -> Result<UpdateReport> {
        let _claim = self.claim().await?;
        let schema = self.store.schema();
        let ledger = blocking(&self.store, |s| s.read_ledger()).await?;

        let mut report = UpdateReport {
            dataset_id: schema.attributes.id.clone(),
            watermark_before: ledger.watermark().map(|i| schema.time_at(i)),
            watermark_after: ledger.watermark().map(|i| schema.time_at(i)),
            ..Default::default()
        };

        let candidates = self.candidates(&ledger, now);
        let Some(&last) = candidates.last() else {
            info!("Store is up to date");
            return Ok(report);
        };

        let extent = blocking(&self.store, move |s| s.ensure_time_extent(last + 1)).await?;
        let jobs = RegionJob::partition(schema, candidates.iter().copied());
        info!(
            first = %schema.time_at(candidates[0]),
            last = %schema.time_at(last),
            coordinates = candidates.len(),
            jobs = jobs.len(),
            extent,
            "Dispatching region jobs"
        );

        let source = self.source.as_ref();
        let locks = &self.locks;
        let mut results = stream::iter(jobs)
            .map(|job| {
                let store = Arc::clone(&self.store);
                async move {
                    // Held until the job's coordinates are in the ledger.
                    let _region = locks.acquire(job.chunk).await;
                    let result = job.run(source, store).await;
                    let watermark = self.commit(&result).await?;
                    for index in result.written() {
                        source.release(schema.time_at(index)).await;
                    }
                    Ok::<_, ReformatError>((result, watermark))
                }
            })
            .buffer_unordered(self.settings.concurrency.max(1));

        let mut watermark_after = ledger.watermark();
        while let Some(outcome) = results.next().await {
            let (result, watermark) = outcome?;
            watermark_after = watermark_after.max(watermark);
            record(&result, schema, &mut report);
        }

        report.watermark_after = watermark_after.map(|i| schema.time_at(i));
        report.sort();

        if report.watermark_after != report.watermark_before {
            info!(
                before = ?report.watermark_before,
                after = ?report.watermark_after,
                "Watermark advanced"
            );
        }
        info!(
            committed = report.committed.len(),
            pending = report.pending.len(),
            failed = report.failed.len(),
            "Update complete"
        );
        Ok(report)
    }

    /// Claim the store, sharing one claim between overlapping updates.
    async fn claim(&self) -> Result<Arc<UpdateLock>> {
        let mut slot = self.claim.lock().await;
        if let Some(held) = slot.upgrade() {
            return Ok(held);
        }
        let lock = Arc::new(blocking(&self.store, |s| s.lock_for_update()).await?);
        *slot = Arc::downgrade(&lock);
        Ok(lock)
    }

    /// Commit a job's written coordinates, returning the new watermark.
    async fn commit(&self, result: &RegionResult) -> Result<Option<u64>> {
        let _guard = self.commit_lock.lock().await;
        let written: Vec<u64> = result.written().collect();

        let mut ledger = blocking(&self.store, |s| s.read_ledger()).await?;
        if written.is_empty() {
            return Ok(ledger.watermark());
        }
        let mut changed = false;
        for index in written {
            changed |= ledger.commit(index);
        }
        if changed {
            let persisted = ledger.clone();
            blocking(&self.store, move |s| s.write_ledger(&persisted))
                .await
                .map_err(|e| {
                    warn!(chunk = result.chunk, error = %e, "Failed to commit region");
                    ReformatError::StoreUnavailable(e)
                })?;
        }
        Ok(ledger.watermark())
    }
}

fn record(result: &RegionResult, schema: &crate::schema::Schema, report: &mut UpdateReport) {
    for (&index, status) in &result.outcomes {
        counter!("reformat_coordinates_total", "status" => status.label()).increment(1);
        let time = schema.time_at(index);
        match status {
            CoordinateStatus::Written => report.committed.push(time),
            CoordinateStatus::Pending => report.pending.push(time),
            CoordinateStatus::Failed(cause) => report.failed.push(FailedCoordinate {
                time,
                cause: cause.clone(),
            }),
        }
    }
}
