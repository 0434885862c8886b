//! Zarr V3 store on the local filesystem.
//!
//! Layout:
//! - root group `/` carrying the dataset attributes, the persisted schema,
//!   `schema_version`, `watermark` and `committed_ahead`
//! - one Float32 array per variable
//! - one array per dimension coordinate (`/init_time`, `/lead_time`, `/y`, `/x`)
//! - derived `/latitude`, `/longitude` and `/expected_forecast_length`

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::codec::BytesToBytesCodecTraits;
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::{Group, GroupBuilder};
use zarrs_filesystem::FilesystemStore;

use super::{CoverageLedger, RegionData, TileStore, UpdateLock, UPDATE_LOCK_FILE};
use crate::error::{ReformatError, StoreError};
use crate::schema::{
    Compression, CoordinateSpec, CoordinateValues, Schema, VariableDescriptor, SCHEMA_VERSION,
};

const LATITUDE: &str = "latitude";
const LONGITUDE: &str = "longitude";
const FORECAST_LENGTH: &str = "expected_forecast_length";

/// Chunk length of 1-D arrays along the append dimension.
const TIME_COORD_CHUNK: u64 = 1024;

/// Summary of a store's persisted state.
#[derive(Debug, Clone, Serialize)]
pub struct StoreInfo {
    pub path: PathBuf,
    pub dataset_id: String,
    pub schema_version: u64,
    pub time_len: u64,
    pub watermark: Option<DateTime<Utc>>,
    pub committed_ahead: Vec<DateTime<Utc>>,
    pub variables: Vec<String>,
}

/// A Zarr V3 store laid out by a [`Schema`].
pub struct ZarrStore {
    root: PathBuf,
    store: Arc<FilesystemStore>,
    schema: Arc<Schema>,
    /// Serialises root-group and array metadata updates.
    metadata_lock: Mutex<()>,
}

impl std::fmt::Debug for ZarrStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZarrStore")
            .field("root", &self.root)
            .field("dataset", &self.schema.attributes.id)
            .finish()
    }
}

impl ZarrStore {
    /// Open the store at `path`, creating an empty one if none exists.
    ///
    /// An existing store must have been created from a structurally
    /// identical schema; otherwise `SchemaMismatch` is returned and nothing
    /// on disk is touched.
    pub fn open_or_create(path: impl AsRef<Path>, schema: Arc<Schema>) -> Result<Self, ReformatError> {
        schema.validate()?;
        let root = path.as_ref().to_path_buf();

        if root.join("zarr.json").exists() {
            let store = Self::connect(&root, schema)?;
            store.check_persisted_schema()?;
            debug!(path = %root.display(), "Opened existing store");
            Ok(store)
        } else {
            std::fs::create_dir_all(&root).map_err(StoreError::from)?;
            let store = Self::connect(&root, schema)?;
            store.initialize()?;
            info!(
                path = %root.display(),
                dataset = %store.schema.attributes.id,
                variables = store.schema.variables.len(),
                "Created empty store"
            );
            Ok(store)
        }
    }

    /// Open an existing store using the schema persisted inside it.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self, ReformatError> {
        let root = path.as_ref().to_path_buf();
        if !root.join("zarr.json").exists() {
            return Err(StoreError::Io(format!("no store at {}", root.display())).into());
        }
        let store = Arc::new(FilesystemStore::new(&root).map_err(StoreError::zarr)?);
        let group = Group::open(store.clone(), "/").map_err(StoreError::zarr)?;
        let schema = persisted_schema(group.attributes())?;
        schema.validate()?;

        Ok(Self {
            root,
            store,
            schema: Arc::new(schema),
            metadata_lock: Mutex::new(()),
        })
    }

    fn connect(root: &Path, schema: Arc<Schema>) -> Result<Self, StoreError> {
        let store = FilesystemStore::new(root).map_err(StoreError::zarr)?;
        Ok(Self {
            root: root.to_path_buf(),
            store: Arc::new(store),
            schema,
            metadata_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn schema_arc(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.metadata_lock
            .lock()
            .map_err(|_| StoreError::Io("store metadata lock poisoned".to_string()))
    }

    fn check_persisted_schema(&self) -> Result<(), ReformatError> {
        let group = Group::open(self.store.clone(), "/").map_err(StoreError::zarr)?;
        let attrs = group.attributes();

        let version = attrs.get("schema_version").and_then(Value::as_u64);
        if version != Some(SCHEMA_VERSION as u64) {
            return Err(ReformatError::schema_mismatch(format!(
                "store schema_version {:?}, expected {}",
                version, SCHEMA_VERSION
            )));
        }

        let persisted = persisted_schema(attrs)?;
        if let Some(difference) = self.schema.structural_difference(&persisted) {
            return Err(ReformatError::schema_mismatch(difference));
        }
        if persisted != *self.schema {
            warn!(
                path = %self.root.display(),
                "Descriptive attributes differ from the configured schema; the store keeps its original titles and names"
            );
        }
        Ok(())
    }

    /// Write the root group and every array's metadata, plus the bounded
    /// coordinate values. No variable chunk is written.
    fn initialize(&self) -> Result<(), StoreError> {
        let schema = &self.schema;

        let mut attrs = Map::new();
        let dataset = serde_json::to_value(&schema.attributes)?;
        if let Value::Object(fields) = dataset {
            attrs.extend(fields);
        }
        attrs.insert("schema_version".into(), json!(SCHEMA_VERSION));
        attrs.insert("schema".into(), serde_json::to_value(schema.as_ref())?);
        if let Some(mapping) = &schema.grid_mapping {
            attrs.insert("spatial_ref".into(), Value::Object(mapping.cf_attributes()));
        }
        attrs.insert("watermark".into(), Value::Null);
        attrs.insert("committed_ahead".into(), json!([]));

        let group = GroupBuilder::new()
            .attributes(attrs)
            .build(self.store.clone(), "/")
            .map_err(StoreError::zarr)?;
        group.store_metadata().map_err(StoreError::zarr)?;

        for var in &schema.variables {
            self.create_variable_array(var)?;
        }
        for dim in &schema.dimensions {
            self.create_coordinate_array(dim)?;
        }
        self.create_derived_arrays()?;
        Ok(())
    }

    fn create_variable_array(&self, var: &VariableDescriptor) -> Result<(), StoreError> {
        let schema = &self.schema;

        let mut attrs = Map::new();
        attrs.insert("units".into(), json!(var.units));
        attrs.insert("long_name".into(), json!(var.long_name));
        if let Some(standard_name) = &var.standard_name {
            attrs.insert("standard_name".into(), json!(standard_name));
        }
        let projected = var.dimensions.iter().any(|name| {
            schema.dimension(name).map_or(false, |d| {
                matches!(d.coordinate, CoordinateSpec::ProjectionX | CoordinateSpec::ProjectionY)
            })
        });
        if projected && schema.grid_mapping.is_some() {
            attrs.insert("grid_mapping".into(), json!("spatial_ref"));
            attrs.insert("coordinates".into(), json!("latitude longitude"));
        }

        let chunk_grid: zarrs::array::ChunkGrid = schema
            .chunk_shape(var)
            .try_into()
            .map_err(|e| StoreError::metadata(format!("{:?}", e)))?;

        let mut binding = ArrayBuilder::new(
            schema.array_shape(var, 0),
            DataType::Float32,
            chunk_grid,
            FillValue::from(var.fill_value),
        );
        let mut builder = binding
            .attributes(attrs)
            .dimension_names(Some(var.dimensions.iter().map(String::as_str).collect::<Vec<_>>()));
        if let Some(codec) = self.compression_codec(4)? {
            builder = builder.bytes_to_bytes_codecs(vec![codec]);
        }

        let array = builder
            .build(self.store.clone(), &array_path(&var.name))
            .map_err(StoreError::zarr)?;
        array.store_metadata().map_err(StoreError::zarr)
    }

    fn create_coordinate_array(&self, dim: &crate::schema::Dimension) -> Result<(), StoreError> {
        let mut attrs = Map::new();
        attrs.insert("units".into(), json!(dim.units));
        attrs.insert("long_name".into(), json!(dim.long_name));
        if let Some(standard_name) = &dim.standard_name {
            attrs.insert("standard_name".into(), json!(standard_name));
        }

        let values = self.schema.dimension_values(dim, 0, 0);
        let (len, chunk) = match dim.len {
            Some(len) => (len, len.max(1)),
            None => (0, TIME_COORD_CHUNK),
        };
        let array = self.build_1d_array(&dim.name, &values, len, chunk, attrs)?;

        if len > 0 {
            store_coordinate_values(&array, 0, &values)?;
        }
        Ok(())
    }

    fn build_1d_array(
        &self,
        name: &str,
        values: &CoordinateValues,
        len: u64,
        chunk: u64,
        attrs: Map<String, Value>,
    ) -> Result<Array<FilesystemStore>, StoreError> {
        let (data_type, fill) = match values {
            CoordinateValues::Int64(_) => (DataType::Int64, FillValue::from(0i64)),
            CoordinateValues::Float64(_) => (DataType::Float64, FillValue::from(f64::NAN)),
        };
        let chunk_grid: zarrs::array::ChunkGrid = vec![chunk]
            .try_into()
            .map_err(|e| StoreError::metadata(format!("{:?}", e)))?;

        let dimension = match name {
            FORECAST_LENGTH => self.schema.append_dimension().name.as_str(),
            other => other,
        };
        let array = ArrayBuilder::new(vec![len], data_type, chunk_grid, fill)
            .attributes(attrs)
            .dimension_names(Some(vec![dimension]))
            .build(self.store.clone(), &array_path(name))
            .map_err(StoreError::zarr)?;
        array.store_metadata().map_err(StoreError::zarr)?;
        Ok(array)
    }

    fn create_derived_arrays(&self) -> Result<(), StoreError> {
        if self.schema.forecast_length.is_some() {
            let mut attrs = Map::new();
            attrs.insert("long_name".into(), json!("Expected forecast length"));
            attrs.insert("units".into(), json!("hours"));
            self.build_1d_array(
                FORECAST_LENGTH,
                &CoordinateValues::Int64(Vec::new()),
                0,
                TIME_COORD_CHUNK,
                attrs,
            )?;
        }

        let Some((lats, lons)) = self.schema.latitude_longitude() else {
            return Ok(());
        };
        let (Some(y), Some(x)) = (
            self.schema
                .dimensions
                .iter()
                .find(|d| matches!(d.coordinate, CoordinateSpec::ProjectionY)),
            self.schema
                .dimensions
                .iter()
                .find(|d| matches!(d.coordinate, CoordinateSpec::ProjectionX)),
        ) else {
            return Ok(());
        };
        let shape = vec![y.len.unwrap_or(0), x.len.unwrap_or(0)];

        for (name, values, long_name, units) in [
            (LATITUDE, lats, "Latitude", "degrees_north"),
            (LONGITUDE, lons, "Longitude", "degrees_east"),
        ] {
            let mut attrs = Map::new();
            attrs.insert("long_name".into(), json!(long_name));
            attrs.insert("standard_name".into(), json!(name));
            attrs.insert("units".into(), json!(units));

            let chunk_grid: zarrs::array::ChunkGrid = vec![y.chunk, x.chunk]
                .try_into()
                .map_err(|e| StoreError::metadata(format!("{:?}", e)))?;
            let mut binding = ArrayBuilder::new(
                shape.clone(),
                DataType::Float32,
                chunk_grid,
                FillValue::from(f32::NAN),
            );
            let mut builder = binding
                .attributes(attrs)
                .dimension_names(Some(vec![y.name.as_str(), x.name.as_str()]));
            if let Some(codec) = self.compression_codec(4)? {
                builder = builder.bytes_to_bytes_codecs(vec![codec]);
            }
            let array = builder
                .build(self.store.clone(), &array_path(name))
                .map_err(StoreError::zarr)?;
            array.store_metadata().map_err(StoreError::zarr)?;

            let subset = ArraySubset::new_with_start_shape(vec![0, 0], shape.clone())
                .map_err(StoreError::zarr)?;
            array
                .store_array_subset_elements::<f32>(&subset, &values)
                .map_err(StoreError::zarr)?;
        }
        Ok(())
    }

    /// Blosc codec per the schema encoding, or `None` when uncompressed.
    fn compression_codec(
        &self,
        typesize: usize,
    ) -> Result<Option<Arc<dyn BytesToBytesCodecTraits>>, StoreError> {
        let encoding = &self.schema.encoding;
        let compressor = match encoding.compression {
            Compression::None => return Ok(None),
            Compression::BloscLz4 => BloscCompressor::LZ4,
            Compression::BloscZstd => BloscCompressor::Zstd,
        };
        let level = BloscCompressionLevel::try_from(encoding.level)
            .map_err(|_| StoreError::metadata("invalid compression level"))?;
        let (shuffle, typesize) = if encoding.shuffle {
            (BloscShuffleMode::Shuffle, Some(typesize))
        } else {
            (BloscShuffleMode::NoShuffle, None)
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(StoreError::zarr)?;
        Ok(Some(Arc::new(codec)))
    }

    fn open_array(&self, name: &str) -> Result<Array<FilesystemStore>, StoreError> {
        Array::open(self.store.clone(), &array_path(name)).map_err(StoreError::zarr)
    }

    fn open_root(&self) -> Result<Group<FilesystemStore>, StoreError> {
        Group::open(self.store.clone(), "/").map_err(StoreError::zarr)
    }

    /// Number of elements in one time slice of `var`.
    fn slice_len(&self, var: &VariableDescriptor) -> usize {
        self.schema.tile_shape(var).iter().product()
    }

    fn variable(&self, name: &str) -> Result<&VariableDescriptor, StoreError> {
        self.schema
            .variable(name)
            .ok_or_else(|| StoreError::metadata(format!("unknown variable '{}'", name)))
    }

    fn check_time_range(&self, start: u64, len: u64) -> Result<(), StoreError> {
        let extent = self.time_len()?;
        if start + len > extent {
            return Err(StoreError::OutOfRange {
                start,
                end: start + len,
                extent,
            });
        }
        Ok(())
    }

    /// Summary of the store for the command surface.
    pub fn info(&self) -> Result<StoreInfo, StoreError> {
        let group = self.open_root()?;
        let ledger = self.read_ledger()?;
        Ok(StoreInfo {
            path: self.root.clone(),
            dataset_id: self.schema.attributes.id.clone(),
            schema_version: group
                .attributes()
                .get("schema_version")
                .and_then(Value::as_u64)
                .unwrap_or_default(),
            time_len: self.time_len()?,
            watermark: ledger.watermark().map(|i| self.schema.time_at(i)),
            committed_ahead: ledger.ahead().map(|i| self.schema.time_at(i)).collect(),
            variables: self.schema.variables.iter().map(|v| v.name.clone()).collect(),
        })
    }
}

impl TileStore for ZarrStore {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn read_ledger(&self) -> Result<CoverageLedger, StoreError> {
        let group = self.open_root()?;
        let attrs = group.attributes();

        let parse_index = |value: &Value| -> Result<u64, StoreError> {
            let text = value
                .as_str()
                .ok_or_else(|| StoreError::metadata(format!("expected a timestamp, got {}", value)))?;
            let time = DateTime::parse_from_rfc3339(text)
                .map_err(|e| StoreError::metadata(format!("invalid timestamp '{}': {}", text, e)))?
                .with_timezone(&Utc);
            self.schema
                .index_of(time)
                .ok_or_else(|| StoreError::metadata(format!("{} is not on the time grid", text)))
        };

        let watermark = match attrs.get("watermark") {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_index(value)?),
        };
        let ahead = match attrs.get("committed_ahead") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.iter().map(parse_index).collect::<Result<_, _>>()?,
            Some(other) => {
                return Err(StoreError::metadata(format!(
                    "committed_ahead must be an array, got {}",
                    other
                )))
            }
        };

        Ok(CoverageLedger::from_parts(watermark, ahead))
    }

    fn write_ledger(&self, ledger: &CoverageLedger) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        let mut merged = self.read_ledger()?;
        merged.merge(ledger);
        let ledger = &merged;
        let mut group = self.open_root()?;

        let watermark = ledger
            .watermark()
            .map(|i| json!(self.schema.time_at(i).to_rfc3339()))
            .unwrap_or(Value::Null);
        let ahead: Vec<Value> = ledger
            .ahead()
            .map(|i| json!(self.schema.time_at(i).to_rfc3339()))
            .collect();

        let attrs = group.attributes_mut();
        attrs.insert("watermark".into(), watermark);
        attrs.insert("committed_ahead".into(), Value::Array(ahead));
        group.store_metadata().map_err(StoreError::zarr)
    }

    fn lock_for_update(&self) -> Result<UpdateLock, StoreError> {
        UpdateLock::acquire(self.root.join(UPDATE_LOCK_FILE))
    }

    fn time_len(&self) -> Result<u64, StoreError> {
        let array = self.open_array(&self.schema.append_dimension().name)?;
        Ok(array.shape().first().copied().unwrap_or(0))
    }

    fn ensure_time_extent(&self, len: u64) -> Result<u64, StoreError> {
        let _guard = self.lock()?;
        let current = self.time_len()?;
        let target = self.schema.round_up_to_chunk(len);
        if target <= current {
            return Ok(current);
        }

        for var in &self.schema.variables {
            let mut array = self.open_array(&var.name)?;
            array.set_shape(self.schema.array_shape(var, target));
            array.store_metadata().map_err(StoreError::zarr)?;
        }

        if let Some(lengths) = self.schema.forecast_lengths(current, target) {
            let mut array = self.open_array(FORECAST_LENGTH)?;
            array.set_shape(vec![target]);
            array.store_metadata().map_err(StoreError::zarr)?;
            store_coordinate_values(&array, current, &CoordinateValues::Int64(lengths))?;
        }

        // The time coordinate is grown last: its length is the store's extent.
        let append = self.schema.append_dimension();
        let mut array = self.open_array(&append.name)?;
        array.set_shape(vec![target]);
        array.store_metadata().map_err(StoreError::zarr)?;
        let values = self.schema.dimension_values(append, current, target);
        store_coordinate_values(&array, current, &values)?;

        info!(from = current, to = target, "Grew append dimension");
        Ok(target)
    }

    fn write_region(&self, region: &RegionData) -> Result<(), StoreError> {
        self.check_time_range(region.time_start, region.time_len)?;

        for data in &region.variables {
            let var = self.variable(&data.name)?;
            let expected = region.time_len as usize * self.slice_len(var);
            if data.values.len() != expected {
                return Err(StoreError::BufferSize {
                    variable: data.name.clone(),
                    expected,
                    actual: data.values.len(),
                });
            }

            let array = self.open_array(&var.name)?;
            let mut start = vec![0u64; var.dimensions.len()];
            start[0] = region.time_start;
            let subset = ArraySubset::new_with_start_shape(
                start,
                self.schema.array_shape(var, region.time_len),
            )
            .map_err(StoreError::zarr)?;
            array
                .store_array_subset_elements::<f32>(&subset, &data.values)
                .map_err(StoreError::zarr)?;
        }

        debug!(
            time_start = region.time_start,
            time_len = region.time_len,
            variables = region.variables.len(),
            "Wrote region"
        );
        Ok(())
    }

    fn read_region(
        &self,
        variable: &str,
        time_start: u64,
        time_len: u64,
    ) -> Result<Vec<f32>, StoreError> {
        self.check_time_range(time_start, time_len)?;
        let var = self.variable(variable)?;

        let array = self.open_array(&var.name)?;
        let mut start = vec![0u64; var.dimensions.len()];
        start[0] = time_start;
        let subset = ArraySubset::new_with_start_shape(start, self.schema.array_shape(var, time_len))
            .map_err(StoreError::zarr)?;
        array
            .retrieve_array_subset_elements::<f32>(&subset)
            .map_err(StoreError::zarr)
    }
}

fn array_path(name: &str) -> String {
    format!("/{}", name)
}

fn persisted_schema(attrs: &Map<String, Value>) -> Result<Schema, StoreError> {
    let value = attrs
        .get("schema")
        .ok_or_else(|| StoreError::metadata("root group has no persisted schema"))?;
    Ok(serde_json::from_value(value.clone())?)
}

fn store_coordinate_values(
    array: &Array<FilesystemStore>,
    start: u64,
    values: &CoordinateValues,
) -> Result<(), StoreError> {
    if values.is_empty() {
        return Ok(());
    }
    let subset = ArraySubset::new_with_start_shape(vec![start], vec![values.len() as u64])
        .map_err(StoreError::zarr)?;
    match values {
        CoordinateValues::Int64(v) => array.store_array_subset_elements::<i64>(&subset, v),
        CoordinateValues::Float64(v) => array.store_array_subset_elements::<f64>(&subset, v),
    }
    .map_err(StoreError::zarr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::presets;
    use crate::store::VariableRegion;

    fn small_schema() -> Schema {
        let mut schema = presets::hrrr_alaska_forecast();
        schema.variables.truncate(2);
        schema.dimensions[1].len = Some(2);
        schema.dimensions[1].chunk = 2;
        schema.grid_mapping = None;
        schema.dimensions[2].coordinate = CoordinateSpec::Linear { start: 0.0, step: 1.0 };
        schema.dimensions[2].len = Some(3);
        schema.dimensions[2].chunk = 2;
        schema.dimensions[3].coordinate = CoordinateSpec::Linear { start: 0.0, step: 1.0 };
        schema.dimensions[3].len = Some(4);
        schema.dimensions[3].chunk = 4;
        schema
    }

    #[test]
    fn test_create_then_reopen() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("store.zarr");
        let schema = Arc::new(small_schema());

        let store = ZarrStore::open_or_create(&path, schema.clone()).unwrap();
        assert_eq!(store.time_len().unwrap(), 0);
        assert_eq!(store.read_ledger().unwrap(), CoverageLedger::new());
        drop(store);

        let reopened = ZarrStore::open_or_create(&path, schema).unwrap();
        assert_eq!(reopened.time_len().unwrap(), 0);
    }

    #[test]
    fn test_schema_mismatch_leaves_store_untouched() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("store.zarr");
        ZarrStore::open_or_create(&path, Arc::new(small_schema())).unwrap();
        let before = std::fs::read(path.join("zarr.json")).unwrap();

        let mut changed = small_schema();
        changed.dimensions[2].chunk = 3;
        let err = ZarrStore::open_or_create(&path, Arc::new(changed)).unwrap_err();
        assert!(matches!(err, ReformatError::SchemaMismatch(_)));

        assert_eq!(std::fs::read(path.join("zarr.json")).unwrap(), before);
    }

    #[test]
    fn test_region_roundtrip_and_extent() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let schema = Arc::new(small_schema());
        let store = ZarrStore::open_or_create(temp_dir.path().join("s.zarr"), schema.clone()).unwrap();

        assert_eq!(store.ensure_time_extent(3).unwrap(), 3);
        assert_eq!(store.ensure_time_extent(2).unwrap(), 3);

        let slice = 2 * 3 * 4;
        let values: Vec<f32> = (0..slice).map(|v| v as f32).collect();
        store
            .write_region(&RegionData {
                time_start: 1,
                time_len: 1,
                variables: vec![VariableRegion {
                    name: schema.variables[0].name.clone(),
                    values: values.clone(),
                }],
            })
            .unwrap();

        assert_eq!(store.read_region(&schema.variables[0].name, 1, 1).unwrap(), values);
        let untouched = store.read_region(&schema.variables[0].name, 0, 1).unwrap();
        assert!(untouched.iter().all(|v| v.is_nan()));

        let err = store.read_region(&schema.variables[0].name, 2, 2).unwrap_err();
        assert!(matches!(err, StoreError::OutOfRange { .. }));
    }

    #[test]
    fn test_ledger_persistence() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let schema = Arc::new(small_schema());
        let store = ZarrStore::open_or_create(temp_dir.path().join("s.zarr"), schema.clone()).unwrap();

        let ledger = CoverageLedger::from_parts(Some(2), [5]);
        store.write_ledger(&ledger).unwrap();
        assert_eq!(store.read_ledger().unwrap(), ledger);
        assert_eq!(store.read_watermark().unwrap(), Some(schema.time_at(2)));

        let info = store.info().unwrap();
        assert_eq!(info.watermark, Some(schema.time_at(2)));
        assert_eq!(info.committed_ahead, vec![schema.time_at(5)]);
        assert_eq!(info.schema_version, SCHEMA_VERSION as u64);
    }

    #[test]
    fn test_stale_ledger_write_cannot_undo_commits() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("s.zarr");
        let schema = Arc::new(small_schema());
        let first = ZarrStore::open_or_create(&path, schema.clone()).unwrap();
        let second = ZarrStore::open_or_create(&path, schema).unwrap();

        first.write_ledger(&CoverageLedger::from_parts(Some(2), [5])).unwrap();
        // A writer that read the ledger before the commit above.
        second.write_ledger(&CoverageLedger::from_parts(None, [4])).unwrap();

        let ledger = first.read_ledger().unwrap();
        assert_eq!(ledger.watermark(), Some(2));
        assert_eq!(ledger.ahead().collect::<Vec<_>>(), vec![4, 5]);
    }

    #[test]
    fn test_update_lock_is_exclusive_across_handles() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("s.zarr");
        let schema = Arc::new(small_schema());
        let first = ZarrStore::open_or_create(&path, schema.clone()).unwrap();
        let second = ZarrStore::open_or_create(&path, schema).unwrap();

        let claim = first.lock_for_update().unwrap();
        assert!(path.join(UPDATE_LOCK_FILE).exists());
        assert!(matches!(second.lock_for_update(), Err(StoreError::Locked(_))));

        drop(claim);
        assert!(!path.join(UPDATE_LOCK_FILE).exists());
        assert!(second.lock_for_update().is_ok());
    }

    #[test]
    fn test_open_existing_uses_persisted_schema() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("s.zarr");
        ZarrStore::open_or_create(&path, Arc::new(small_schema())).unwrap();

        let store = ZarrStore::open_existing(&path).unwrap();
        assert_eq!(store.schema().variables.len(), 2);
        assert!(ZarrStore::open_existing(temp_dir.path().join("missing")).is_err());
    }
}
