//! End-to-end update behaviour against a real on-disk store.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::*;
use reformatter::{
    CoverageLedger, FetchError, Orchestrator, RawTile, ReformatError, SourceAdapter, TileStore,
    UpdateSettings, VariableDescriptor,
};
use test_utils::{assert_approx_eq, temp_test_dir_with_prefix};

fn assert_slice_matches(store: &dyn TileStore, index: i64) {
    let temperature = store.read_region("temperature_2m", index as u64, 1).unwrap();
    for (stored, raw) in temperature.iter().zip(source_values(t(index), "temperature_2m")) {
        assert_approx_eq!(*stored, raw - 273.15, 1e-3);
    }
    let wind = store.read_region("wind_u_10m", index as u64, 1).unwrap();
    assert_eq!(wind, source_values(t(index), "wind_u_10m"));
}

#[tokio::test]
async fn test_scenarios_a_b_c() {
    let dir = temp_test_dir_with_prefix("reformat_scenarios_");
    let store: Arc<dyn TileStore> = Arc::new(open_store(&dir.path().join("store.zarr"), 1));
    let source = Arc::new(ScriptedSource::new(t(2)));
    let orch = orchestrator(store.clone(), source.clone(), 16);

    // A: T0..T2 published.
    source.publish_through(2);
    let a = orch.update(t(2)).await.unwrap();
    assert_eq!(a.committed, vec![t(0), t(1), t(2)]);
    assert!(a.pending.is_empty() && a.failed.is_empty());
    assert_eq!(a.watermark_before, None);
    assert_eq!(a.watermark_after, Some(t(2)));
    for i in 0..=2 {
        assert_slice_matches(store.as_ref(), i);
    }

    // B: T3 broken upstream, T4 fine.
    source.set_latest(t(4));
    source.set(t(3), Availability::Broken);
    source.set(t(4), Availability::Published);
    let b = orch.update(t(4)).await.unwrap();
    assert_eq!(b.committed, vec![t(4)]);
    assert_eq!(b.failed.len(), 1);
    assert_eq!(b.failed[0].time, t(3));
    assert!(b.failed[0].cause.contains("connection reset"));
    assert!(b.has_failures());
    assert_eq!(b.watermark_after, Some(t(2)));
    assert_eq!(store.read_watermark().unwrap(), Some(t(2)));

    let ledger = store.read_ledger().unwrap();
    assert_eq!(ledger.ahead().collect::<Vec<_>>(), vec![4]);

    // C: T3 repaired; T4 must not be fetched again.
    source.set(t(3), Availability::Published);
    source.clear_fetches();
    let c = orch.update(t(4)).await.unwrap();
    assert_eq!(c.committed, vec![t(3)]);
    assert!(!c.has_failures());
    assert_eq!(c.watermark_before, Some(t(2)));
    assert_eq!(c.watermark_after, Some(t(4)));
    assert!(source.fetched_times().iter().all(|time| *time == t(3)));
    assert_slice_matches(store.as_ref(), 3);
    assert_slice_matches(store.as_ref(), 4);
}

#[tokio::test]
async fn test_rerun_without_new_data_leaves_store_identical() {
    let dir = temp_test_dir_with_prefix("reformat_idempotent_");
    let path = dir.path().join("store.zarr");
    let store: Arc<dyn TileStore> = Arc::new(open_store(&path, 2));
    let source = Arc::new(ScriptedSource::new(t(3)));
    source.publish_through(2);
    let orch = orchestrator(store.clone(), source.clone(), 16);

    orch.update(t(3)).await.unwrap();
    let before = snapshot(&path);

    let again = orch.update(t(3)).await.unwrap();
    assert!(again.committed.is_empty());
    assert_eq!(again.pending, vec![t(3)]);
    assert_eq!(snapshot(&path), before);
}

#[tokio::test]
async fn test_reexecuting_uncommitted_regions_is_byte_identical() {
    let dir = temp_test_dir_with_prefix("reformat_reexec_");
    let source = Arc::new(ScriptedSource::new(t(3)));
    source.publish_through(3);

    let first_path = dir.path().join("first.zarr");
    let first: Arc<dyn TileStore> = Arc::new(open_store(&first_path, 2));
    orchestrator(first, source.clone(), 16).update(t(3)).await.unwrap();

    // Same inputs, but the first attempt dies after writing a region and
    // before committing it.
    let second_path = dir.path().join("second.zarr");
    let flaky = Arc::new(FlakyStore::new(open_store(&second_path, 2)));
    flaky.fail_ledger_writes();
    let second: Arc<dyn TileStore> = flaky.clone();
    let orch = Orchestrator::new(
        second.clone(),
        source.clone(),
        UpdateSettings {
            max_lookahead: 16,
            concurrency: 1,
        },
    );
    let err = orch.update(t(3)).await.unwrap_err();
    assert!(matches!(err, ReformatError::StoreUnavailable(_)));
    assert_eq!(second.read_ledger().unwrap(), CoverageLedger::new());

    flaky.heal();
    let report = orch.update(t(3)).await.unwrap();
    assert_eq!(report.committed, vec![t(0), t(1), t(2), t(3)]);

    assert_eq!(snapshot(&first_path), snapshot(&second_path));
}

#[tokio::test]
async fn test_watermark_is_monotonic_and_contiguous() {
    let dir = temp_test_dir_with_prefix("reformat_monotonic_");
    let store: Arc<dyn TileStore> = Arc::new(open_store(&dir.path().join("store.zarr"), 1));
    let source = Arc::new(ScriptedSource::new(t(7)));
    let orch = orchestrator(store.clone(), source.clone(), 16);

    // Publication arrives out of order, with transient breakage.
    let rounds: [&[(i64, Availability)]; 4] = [
        &[(1, Availability::Published), (2, Availability::Published)],
        &[(0, Availability::Broken), (5, Availability::Published)],
        &[(0, Availability::Published), (3, Availability::Published)],
        &[(4, Availability::Published), (6, Availability::Published), (7, Availability::Published)],
    ];
    let expected = [None, None, Some(t(3)), Some(t(7))];

    let mut previous: Option<DateTime<Utc>> = None;
    for (round, want) in rounds.iter().zip(expected) {
        for &(i, availability) in *round {
            source.set(t(i), availability);
        }
        let report = orch.update(t(7)).await.unwrap();
        assert!(report.watermark_after >= previous);
        assert_eq!(report.watermark_after, want);

        // Everything up to the watermark is really in the store.
        let ledger = store.read_ledger().unwrap();
        if let Some(w) = ledger.watermark() {
            for i in 0..=w {
                assert_slice_matches(store.as_ref(), i as i64);
            }
        }
        previous = report.watermark_after;
    }
}

#[tokio::test]
async fn test_lookahead_limits_each_run() {
    let dir = temp_test_dir_with_prefix("reformat_lookahead_");
    let store: Arc<dyn TileStore> = Arc::new(open_store(&dir.path().join("store.zarr"), 1));
    let source = Arc::new(ScriptedSource::new(t(9)));
    source.publish_through(9);
    let orch = orchestrator(store.clone(), source.clone(), 4);

    let first = orch.update(t(9)).await.unwrap();
    assert_eq!(first.committed, vec![t(0), t(1), t(2), t(3)]);
    assert_eq!(store.time_len().unwrap(), 4);

    let second = orch.update(t(9)).await.unwrap();
    assert_eq!(second.committed, vec![t(4), t(5), t(6), t(7)]);
    assert_eq!(second.watermark_after, Some(t(7)));
}

#[tokio::test]
async fn test_store_write_failure_fails_region_and_batch_continues() {
    let dir = temp_test_dir_with_prefix("reformat_flaky_");
    let flaky = Arc::new(FlakyStore::new(open_store(&dir.path().join("store.zarr"), 1)));
    flaky.fail_writes_at(1);
    let store: Arc<dyn TileStore> = flaky.clone();
    let source = Arc::new(ScriptedSource::new(t(2)));
    source.publish_through(2);
    let orch = orchestrator(store.clone(), source.clone(), 16);

    let report = orch.update(t(2)).await.unwrap();
    assert_eq!(report.committed, vec![t(0), t(2)]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].time, t(1));
    assert!(report.failed[0].cause.contains("disk quota exceeded"));
    assert_eq!(report.watermark_after, Some(t(0)));

    flaky.heal();
    let report = orch.update(t(2)).await.unwrap();
    assert_eq!(report.committed, vec![t(1)]);
    assert_eq!(report.watermark_after, Some(t(2)));
    assert_slice_matches(store.as_ref(), 1);
}

#[tokio::test]
async fn test_partial_chunk_keeps_committed_values() {
    let dir = temp_test_dir_with_prefix("reformat_partial_chunk_");
    let store: Arc<dyn TileStore> = Arc::new(open_store(&dir.path().join("store.zarr"), 2));
    let source = Arc::new(ScriptedSource::new(t(1)));
    source.set(t(0), Availability::Published);
    let orch = orchestrator(store.clone(), source.clone(), 16);

    let first = orch.update(t(1)).await.unwrap();
    assert_eq!(first.committed, vec![t(0)]);
    assert_eq!(first.pending, vec![t(1)]);
    let pending_slice = store.read_region("wind_u_10m", 1, 1).unwrap();
    assert!(pending_slice.iter().all(|v| v.is_nan()));

    source.set(t(1), Availability::Published);
    source.clear_fetches();
    let second = orch.update(t(1)).await.unwrap();
    assert_eq!(second.committed, vec![t(1)]);
    assert!(source.fetched_times().iter().all(|time| *time == t(1)));
    assert_slice_matches(store.as_ref(), 0);
    assert_slice_matches(store.as_ref(), 1);
}

#[tokio::test]
async fn test_overlapping_updates_never_commit_fill_values() {
    let dir = temp_test_dir_with_prefix("reformat_overlap_");
    let flaky = Arc::new(FlakyStore::new(open_store(&dir.path().join("store.zarr"), 2)));
    flaky.slow_ledger_writes(std::time::Duration::from_millis(300));
    let store: Arc<dyn TileStore> = flaky.clone();
    let source = Arc::new(ScriptedSource::new(t(1)));
    source.set(t(0), Availability::Published);
    let orch = Arc::new(orchestrator(store.clone(), source.clone(), 16));

    let first = tokio::spawn({
        let orch = Arc::clone(&orch);
        async move { orch.update(t(1)).await }
    });
    while flaky.ledger_writes() == 0 {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    // While the first run commits t(0), upstream breaks it and publishes t(1).
    source.set(t(0), Availability::Broken);
    source.set(t(1), Availability::Published);
    let second = orch.update(t(1)).await.unwrap();
    let first = first.await.unwrap().unwrap();

    assert_eq!(first.committed, vec![t(0)]);
    assert_eq!(first.pending, vec![t(1)]);
    assert_eq!(second.committed, vec![t(1)]);
    assert!(second.failed.is_empty(), "{:?}", second.failed);

    assert_eq!(store.read_ledger().unwrap().watermark(), Some(1));
    assert_slice_matches(store.as_ref(), 0);
    assert_slice_matches(store.as_ref(), 1);
}

/// Source that records how many fetches overlap in time.
struct SlowSource {
    latest: DateTime<Utc>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowSource {
    fn new(latest: DateTime<Utc>) -> Self {
        Self {
            latest,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SourceAdapter for SlowSource {
    async fn fetch(
        &self,
        time: DateTime<Utc>,
        variable: &VariableDescriptor,
    ) -> Result<RawTile, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(RawTile::new(vec![HEIGHT, WIDTH], source_values(time, &variable.name)))
    }

    fn latest_available(&self, _now: DateTime<Utc>) -> DateTime<Utc> {
        self.latest
    }
}

#[tokio::test]
async fn test_jobs_on_the_same_region_never_overlap() {
    let dir = temp_test_dir_with_prefix("reformat_exclusive_");

    // Two updates racing for the only chunk take turns.
    let store: Arc<dyn TileStore> = Arc::new(open_store(&dir.path().join("same.zarr"), 2));
    let same = Arc::new(SlowSource::new(t(1)));
    let orch = Orchestrator::new(store.clone(), same.clone(), UpdateSettings {
        max_lookahead: 16,
        concurrency: 4,
    });
    let (a, b) = tokio::join!(orch.update(t(1)), orch.update(t(1)));
    assert_eq!(same.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(a.unwrap().committed.len() + b.unwrap().committed.len(), 2);

    // Different chunks run side by side.
    let store: Arc<dyn TileStore> = Arc::new(open_store(&dir.path().join("different.zarr"), 2));
    let different = Arc::new(SlowSource::new(t(3)));
    let orch = Orchestrator::new(store, different.clone(), UpdateSettings {
        max_lookahead: 16,
        concurrency: 4,
    });
    let report = orch.update(t(3)).await.unwrap();
    assert_eq!(report.committed.len(), 4);
    assert_eq!(different.max_in_flight.load(Ordering::SeqCst), 2);
}
