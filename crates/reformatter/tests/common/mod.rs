//! Shared helpers for the reformatter integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reformatter::{
    CoverageLedger, FetchError, Orchestrator, RawTile, RegionData, Schema, SourceAdapter,
    StoreError, TileStore, UpdateLock, UpdateSettings, VariableDescriptor, ZarrStore,
};
use walkdir::WalkDir;
use test_utils::{create_temperature_grid, create_test_grid};

pub const WIDTH: usize = 5;
pub const HEIGHT: usize = 4;

/// Two variables on a 4x5 grid, 3-hourly `time` starting 2024-01-01T00Z.
pub fn schema_yaml(time_chunk: u64) -> String {
    format!(
        r#"
attributes:
  id: scenario-test
  title: Scenario test dataset
  version: "0.1.0"
dimensions:
  - name: time
    chunk: {time_chunk}
    coordinate: {{ kind: time, start: "2024-01-01T00:00:00Z", step_hours: 3 }}
    units: seconds since 1970-01-01
  - name: y
    len: {HEIGHT}
    chunk: {HEIGHT}
    coordinate: {{ kind: linear, start: 0.0, step: 3000.0 }}
  - name: x
    len: {WIDTH}
    chunk: {WIDTH}
    coordinate: {{ kind: linear, start: 0.0, step: 3000.0 }}
variables:
  - name: temperature_2m
    dimensions: [time, y, x]
    units: degC
    source: {{ file_type: sfc, discipline: 0, category: 0, number: 0, surface_type: 103, surface_value: 2.0 }}
    transform:
      unit_conversion: {{ kind: kelvin_to_celsius }}
      valid_range: [150.0, 350.0]
  - name: wind_u_10m
    dimensions: [time, y, x]
    units: m s-1
    source: {{ file_type: sfc, discipline: 0, category: 2, number: 2, surface_type: 103, surface_value: 10.0 }}
"#
    )
}

pub fn schema(time_chunk: u64) -> Arc<Schema> {
    Arc::new(Schema::from_yaml_str(&schema_yaml(time_chunk)).expect("valid test schema"))
}

/// Time coordinate `index` steps after the first one.
pub fn t(index: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(3 * index)
}

/// Source values for `variable` at `time`, before transformation.
pub fn source_values(time: DateTime<Utc>, variable: &str) -> Vec<f32> {
    let shift = (time - t(0)).num_hours() as f32 / 3.0;
    match variable {
        "temperature_2m" => create_temperature_grid(WIDTH, HEIGHT)
            .into_iter()
            .map(|v| v + shift)
            .collect(),
        _ => create_test_grid(WIDTH, HEIGHT)
            .into_iter()
            .map(|v| v / 1000.0 + shift)
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Availability {
    Published,
    NotYet,
    Broken,
}

/// In-memory source whose availability is scripted per time coordinate.
pub struct ScriptedSource {
    latest: Mutex<DateTime<Utc>>,
    availability: Mutex<HashMap<DateTime<Utc>, Availability>>,
    fetches: Mutex<Vec<(DateTime<Utc>, String)>>,
}

impl ScriptedSource {
    pub fn new(latest: DateTime<Utc>) -> Self {
        Self {
            latest: Mutex::new(latest),
            availability: Mutex::new(HashMap::new()),
            fetches: Mutex::new(Vec::new()),
        }
    }

    pub fn set_latest(&self, latest: DateTime<Utc>) {
        *self.latest.lock().unwrap() = latest;
    }

    pub fn set(&self, time: DateTime<Utc>, availability: Availability) {
        self.availability.lock().unwrap().insert(time, availability);
    }

    pub fn publish_through(&self, last: i64) {
        for i in 0..=last {
            self.set(t(i), Availability::Published);
        }
    }

    /// Times fetched so far, one entry per (time, variable).
    pub fn fetched_times(&self) -> Vec<DateTime<Utc>> {
        self.fetches.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn clear_fetches(&self) {
        self.fetches.lock().unwrap().clear();
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    async fn fetch(
        &self,
        time: DateTime<Utc>,
        variable: &VariableDescriptor,
    ) -> Result<RawTile, FetchError> {
        self.fetches
            .lock()
            .unwrap()
            .push((time, variable.name.clone()));
        let availability = self
            .availability
            .lock()
            .unwrap()
            .get(&time)
            .copied()
            .unwrap_or(Availability::NotYet);
        match availability {
            Availability::Published => Ok(RawTile::new(
                vec![HEIGHT, WIDTH],
                source_values(time, &variable.name),
            )),
            Availability::NotYet => Err(FetchError::NotYetAvailable),
            Availability::Broken => Err(FetchError::retrieval("connection reset by peer")),
        }
    }

    fn latest_available(&self, _now: DateTime<Utc>) -> DateTime<Utc> {
        *self.latest.lock().unwrap()
    }
}

/// Store wrapper that can reject region or ledger writes and slow the
/// ledger down.
pub struct FlakyStore {
    inner: ZarrStore,
    failing_regions: Mutex<HashSet<u64>>,
    failing_ledger: AtomicBool,
    ledger_delay: Mutex<Option<StdDuration>>,
    ledger_writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: ZarrStore) -> Self {
        Self {
            inner,
            failing_regions: Mutex::new(HashSet::new()),
            failing_ledger: AtomicBool::new(false),
            ledger_delay: Mutex::new(None),
            ledger_writes: AtomicUsize::new(0),
        }
    }

    pub fn fail_writes_at(&self, time_start: u64) {
        self.failing_regions.lock().unwrap().insert(time_start);
    }

    pub fn fail_ledger_writes(&self) {
        self.failing_ledger.store(true, Ordering::SeqCst);
    }

    /// Sleep for `delay` before every ledger write.
    pub fn slow_ledger_writes(&self, delay: StdDuration) {
        *self.ledger_delay.lock().unwrap() = Some(delay);
    }

    /// Ledger writes started so far.
    pub fn ledger_writes(&self) -> usize {
        self.ledger_writes.load(Ordering::SeqCst)
    }

    pub fn heal(&self) {
        self.failing_regions.lock().unwrap().clear();
        self.failing_ledger.store(false, Ordering::SeqCst);
        *self.ledger_delay.lock().unwrap() = None;
    }
}

impl TileStore for FlakyStore {
    fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    fn read_ledger(&self) -> Result<CoverageLedger, StoreError> {
        self.inner.read_ledger()
    }

    fn write_ledger(&self, ledger: &CoverageLedger) -> Result<(), StoreError> {
        self.ledger_writes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.ledger_delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if self.failing_ledger.load(Ordering::SeqCst) {
            return Err(StoreError::Io("metadata write interrupted".into()));
        }
        self.inner.write_ledger(ledger)
    }

    fn lock_for_update(&self) -> Result<UpdateLock, StoreError> {
        self.inner.lock_for_update()
    }

    fn time_len(&self) -> Result<u64, StoreError> {
        self.inner.time_len()
    }

    fn ensure_time_extent(&self, len: u64) -> Result<u64, StoreError> {
        self.inner.ensure_time_extent(len)
    }

    fn write_region(&self, region: &RegionData) -> Result<(), StoreError> {
        if self
            .failing_regions
            .lock()
            .unwrap()
            .contains(&region.time_start)
        {
            return Err(StoreError::Io("disk quota exceeded".into()));
        }
        self.inner.write_region(region)
    }

    fn read_region(
        &self,
        variable: &str,
        time_start: u64,
        time_len: u64,
    ) -> Result<Vec<f32>, StoreError> {
        self.inner.read_region(variable, time_start, time_len)
    }
}

pub fn open_store(path: &Path, time_chunk: u64) -> ZarrStore {
    ZarrStore::open_or_create(path, schema(time_chunk)).expect("open store")
}

pub fn orchestrator(
    store: Arc<dyn TileStore>,
    source: Arc<ScriptedSource>,
    max_lookahead: usize,
) -> Orchestrator {
    Orchestrator::new(
        store,
        source,
        UpdateSettings {
            max_lookahead,
            concurrency: 3,
        },
    )
}

/// Every file under `dir` with its contents, for byte-level comparisons.
pub fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<(String, Vec<u8>)> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let name = e.path().strip_prefix(dir).unwrap().display().to_string();
            (name, std::fs::read(e.path()).unwrap())
        })
        .collect();
    files.sort();
    files
}
